use bson::{Bson, Document};

use mock::{self, MockServer};
use mongodb_core::ops::options::{UpdateModel, UpdateOptions};
use mongodb_core::ops::{self, Namespace};
use mongodb_core::Error;

fn standalone_responder(_db: &str, command: &Document) -> Document {
    if command.contains_key("isMaster") {
        return mock::standalone_is_master();
    }
    if command.contains_key("update") {
        return doc! { "ok": 1, "n": 2, "nModified": 2 };
    }
    if command.contains_key("dbStats") {
        return doc! { "ok": 1, "db": "app", "collections": 3 };
    }
    doc! { "ok": 0, "errmsg": "no such command" }
}

#[test]
fn run_command_returns_the_reply_document() {
    let server = MockServer::start(standalone_responder);
    let cluster = mock::cluster(vec![server.host.clone()]);

    let selected = ops::select_for_write(&cluster).unwrap();
    let reply = ops::run_command(&selected, "app", doc! { "dbStats": 1 }).unwrap();
    assert_eq!(reply.get_i32("collections").unwrap(), 3);
}

#[test]
fn failed_commands_surface_the_server_message() {
    let server = MockServer::start(standalone_responder);
    let cluster = mock::cluster(vec![server.host.clone()]);

    let selected = ops::select_for_write(&cluster).unwrap();
    match ops::run_command(&selected, "app", doc! { "frobnicate": 1 }) {
        Err(Error::OperationError(ref message)) => assert!(message.contains("no such command")),
        other => panic!("Expected an operation error, got {:?}", other),
    }
}

#[test]
fn update_sends_one_entry_per_model() {
    let server = MockServer::start(standalone_responder);
    let cluster = mock::cluster(vec![server.host.clone()]);

    let selected = ops::select_for_write(&cluster).unwrap();
    let namespace = Namespace::new("app", "events").unwrap();
    let updates = vec![
        UpdateModel::new(doc! { "state": "new" }, doc! { "$set": { "state": "seen" } })
            .with_multi(true),
        UpdateModel::new(doc! { "_id": 9 }, doc! { "$inc": { "hits": 1 } }).with_upsert(true),
    ];
    let options = UpdateOptions {
        ordered: Some(true),
        bypass_document_validation: None,
        write_concern: None,
    };

    let reply = ops::update(&selected, &namespace, updates, &options).unwrap();
    assert_eq!(reply.get_i32("nModified").unwrap(), 2);

    let commands = server.commands();
    let update = commands
        .iter()
        .find(|&&(ref name, _)| name == "update")
        .map(|&(_, ref body)| body.clone())
        .expect("expected an update command");

    assert_eq!(update.get_str("update").unwrap(), "events");
    assert_eq!(update.get_bool("ordered").unwrap(), true);

    let entries = update.get_array("updates").unwrap();
    assert_eq!(entries.len(), 2);
    match entries[0] {
        Bson::Document(ref entry) => {
            assert_eq!(entry.get_bool("multi").unwrap(), true);
            assert!(entry.get("upsert").is_none());
        }
        _ => panic!("Expected a document entry."),
    }
}

#[test]
fn update_requires_at_least_one_model() {
    let server = MockServer::start(standalone_responder);
    let cluster = mock::cluster(vec![server.host.clone()]);

    let selected = ops::select_for_write(&cluster).unwrap();
    let namespace = Namespace::new("app", "events").unwrap();
    match ops::update(&selected, &namespace, vec![], &UpdateOptions::default()) {
        Err(Error::ArgumentError(_)) => {}
        other => panic!("Expected an argument error, got {:?}", other),
    }
}
