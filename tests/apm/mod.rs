use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bson::Document;

use mock::{self, MockServer};
use mongodb_core::apm::{CommandResult, CommandStarted, Listener};
use mongodb_core::connection::Connection;
use mongodb_core::ops;
use mongodb_core::stream::StreamConnector;
use mongodb_core::CommandType;

static PING_STARTED: AtomicBool = AtomicBool::new(false);
static PING_COMPLETED: AtomicBool = AtomicBool::new(false);

fn note_started(event: &CommandStarted) {
    if event.command_name == "ping" {
        PING_STARTED.store(true, Ordering::SeqCst);
    }
}

fn note_completed(event: &CommandResult) {
    let name = match *event {
        CommandResult::Success { ref command_name, .. } |
        CommandResult::Failure { ref command_name, .. } => command_name,
    };
    if name == "ping" {
        PING_COMPLETED.store(true, Ordering::SeqCst);
    }
}

#[test]
fn hooks_observe_command_exchanges() {
    let server = MockServer::start(|_db, command: &Document| {
        if command.contains_key("isMaster") {
            return mock::standalone_is_master();
        }
        doc! { "ok": 1 }
    });
    let cluster = mock::cluster(vec![server.host.clone()]);
    cluster.listener().add_start_hook(note_started).unwrap();
    cluster.listener().add_completion_hook(note_completed).unwrap();

    let selected = ops::select_for_write(&cluster).unwrap();
    ops::run_command(&selected, "app", doc! { "ping": 1 }).unwrap();

    assert!(PING_STARTED.load(Ordering::SeqCst));
    assert!(PING_COMPLETED.load(Ordering::SeqCst));
}

static EVENTS: AtomicUsize = AtomicUsize::new(0);

fn count_event(_event: &CommandStarted) {
    EVENTS.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn suppressed_commands_never_reach_hooks() {
    let server = MockServer::start(|_db, _command: &Document| doc! { "ok": 1 });

    let listener = Arc::new(Listener::new());
    listener.add_start_hook(count_event).unwrap();

    let mut conn =
        Connection::connect(&server.host, &StreamConnector::default(), listener).unwrap();

    conn.execute_command("app", doc! { "saslStart": 1 }, false, CommandType::Suppressed)
        .unwrap();
    assert_eq!(EVENTS.load(Ordering::SeqCst), 0);

    conn.execute_command("app", doc! { "ping": 1 }, false, CommandType::Command)
        .unwrap();
    assert_eq!(EVENTS.load(Ordering::SeqCst), 1);
}
