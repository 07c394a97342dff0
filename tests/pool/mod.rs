use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bson::Document;

use mock::{self, MockServer};
use mongodb_core::apm::Listener;
use mongodb_core::connstring::Host;
use mongodb_core::pool::{ConnectionPool, PoolOptions};
use mongodb_core::stream::StreamConnector;
use mongodb_core::{CommandType, Error};

fn idle_responder(_db: &str, _command: &Document) -> Document {
    doc! { "ok": 1 }
}

fn pool_for(host: Host, options: PoolOptions) -> ConnectionPool {
    ConnectionPool::new(
        host,
        options,
        StreamConnector::default(),
        Arc::new(Listener::new()),
        None,
        Arc::new(Mutex::new(None)),
    )
}

#[test]
fn returned_connections_are_reused() {
    let server = MockServer::start(idle_responder);
    let pool = pool_for(server.host.clone(), PoolOptions::default());

    for _ in 0..3 {
        let conn = pool.acquire().unwrap();
        drop(conn);
    }

    assert_eq!(pool.len(), 1);
    assert_eq!(server.accepted(), 1);
}

#[test]
fn closed_connections_are_not_returned() {
    let server = MockServer::start(idle_responder);
    let pool = pool_for(server.host.clone(), PoolOptions::default());

    pool.acquire().unwrap().close();
    assert_eq!(pool.len(), 0);

    pool.acquire().unwrap();
    assert_eq!(server.accepted(), 2);
}

#[test]
fn a_saturated_pool_blocks_until_the_wait_timeout() {
    let server = MockServer::start(idle_responder);
    let mut options = PoolOptions::default();
    options.max_size = 1;
    options.wait_timeout = Duration::from_millis(100);
    let pool = pool_for(server.host.clone(), options);

    let held = pool.acquire().unwrap();

    let start = Instant::now();
    match pool.acquire() {
        Err(Error::OperationError(_)) => {}
        other => panic!("Expected a wait timeout, got {:?}", other.map(|_| ())),
    }
    assert!(start.elapsed() >= Duration::from_millis(100));

    drop(held);
    pool.acquire().unwrap();
}

#[test]
fn a_returned_connection_unblocks_a_waiter() {
    let server = MockServer::start(idle_responder);
    let mut options = PoolOptions::default();
    options.max_size = 1;
    options.wait_timeout = Duration::from_secs(5);
    let pool = pool_for(server.host.clone(), options);

    let held = pool.acquire().unwrap();

    let waiter_pool = pool.clone();
    let waiter = thread::spawn(move || waiter_pool.acquire().map(|_| ()));

    thread::sleep(Duration::from_millis(50));
    drop(held);

    waiter.join().unwrap().unwrap();
    assert_eq!(server.accepted(), 1);
}

#[test]
fn expired_idle_connections_are_redialed() {
    let server = MockServer::start(idle_responder);
    let mut options = PoolOptions::default();
    options.idle_timeout = Some(Duration::from_millis(10));
    let pool = pool_for(server.host.clone(), options);

    drop(pool.acquire().unwrap());
    thread::sleep(Duration::from_millis(50));

    drop(pool.acquire().unwrap());
    assert_eq!(server.accepted(), 2);
    assert_eq!(pool.len(), 1);
}

#[test]
fn connections_past_their_lifetime_are_redialed() {
    let server = MockServer::start(idle_responder);
    let mut options = PoolOptions::default();
    options.life_timeout = Some(Duration::from_millis(10));
    let pool = pool_for(server.host.clone(), options);

    let mut conn = pool.acquire().unwrap();
    conn.execute_command("app", doc! { "ping": 1 }, false, CommandType::Command)
        .unwrap();
    drop(conn);
    thread::sleep(Duration::from_millis(50));

    // Recent activity does not matter, the connection's age governs.
    drop(pool.acquire().unwrap());
    assert_eq!(server.accepted(), 2);
    assert_eq!(pool.len(), 1);
}

#[test]
fn clear_retires_connections_borrowed_before_it() {
    let server = MockServer::start(idle_responder);
    let pool = pool_for(server.host.clone(), PoolOptions::default());

    let old = pool.acquire().unwrap();
    pool.clear();

    // The invalidated borrow is discarded on drop instead of pooled.
    drop(old);
    assert_eq!(pool.len(), 0);

    drop(pool.acquire().unwrap());
    assert_eq!(server.accepted(), 2);
    assert_eq!(pool.len(), 1);
}

#[test]
fn dial_failures_land_in_the_error_slot() {
    let host = mock::dead_host();
    let error_slot = Arc::new(Mutex::new(None));
    let pool = ConnectionPool::new(
        host,
        PoolOptions::default(),
        StreamConnector::default(),
        Arc::new(Listener::new()),
        None,
        error_slot.clone(),
    );

    assert!(pool.acquire().is_err());
    assert!(error_slot.lock().unwrap().is_some());
    assert_eq!(pool.len(), 0);
}
