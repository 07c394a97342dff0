use bson::{Bson, Document};

use mock::{self, MockServer};
use mongodb_core::common::ReadPreference;
use mongodb_core::ops::options::FindOptions;
use mongodb_core::ops::{self, Namespace};
use mongodb_core::Error;

fn events_namespace() -> Namespace {
    Namespace::new("app", "events").unwrap()
}

// Serves one logical query: two documents in the first batch, one more
// behind a getMore, then exhaustion.
fn two_batch_responder(_db: &str, command: &Document) -> Document {
    if command.contains_key("isMaster") {
        return mock::standalone_is_master();
    }
    if command.contains_key("find") {
        return doc! {
            "ok": 1,
            "cursor": {
                "id": Bson::I64(99),
                "ns": "app.events",
                "firstBatch": [{ "seq": 1 }, { "seq": 2 }]
            }
        };
    }
    if command.contains_key("getMore") {
        return doc! {
            "ok": 1,
            "cursor": {
                "id": Bson::I64(0),
                "ns": "app.events",
                "nextBatch": [{ "seq": 3 }]
            }
        };
    }
    if command.contains_key("killCursors") {
        return doc! { "ok": 1 };
    }
    doc! { "ok": 0, "errmsg": "unexpected command" }
}

#[test]
fn find_iterates_across_batches_with_one_get_more() {
    let server = MockServer::start(two_batch_responder);
    let cluster = mock::cluster(vec![server.host.clone()]);

    let selected = ops::select_for_read(&cluster, &ReadPreference::primary()).unwrap();
    let options = FindOptions::new().with_batch_size(2);
    let mut cursor = ops::find(selected, &events_namespace(), doc! {}, options).unwrap();

    let seqs: Vec<i32> = cursor
        .by_ref()
        .map(|doc| doc.get_i32("seq").unwrap())
        .collect();
    assert_eq!(seqs, vec![1, 2, 3]);
    assert!(cursor.err().is_none());
    assert_eq!(cursor.id(), 0);

    // Exhausted server-side; closing performs no network traffic.
    cursor.close().unwrap();

    let commands = server.commands();
    let get_mores: Vec<&Document> = commands
        .iter()
        .filter(|&&(ref name, _)| name == "getMore")
        .map(|&(_, ref body)| body)
        .collect();
    assert_eq!(get_mores.len(), 1);
    assert_eq!(get_mores[0].get_i64("getMore").unwrap(), 99);
    assert_eq!(get_mores[0].get_i32("batchSize").unwrap(), 2);

    assert!(!server.command_names().contains(&String::from("killCursors")));
}

#[test]
fn close_kills_a_live_cursor() {
    let server = MockServer::start(|_db, command: &Document| {
        if command.contains_key("isMaster") {
            return mock::standalone_is_master();
        }
        if command.contains_key("find") {
            return doc! {
                "ok": 1,
                "cursor": {
                    "id": Bson::I64(42),
                    "ns": "app.events",
                    "firstBatch": [{ "seq": 1 }]
                }
            };
        }
        doc! { "ok": 1 }
    });
    let cluster = mock::cluster(vec![server.host.clone()]);

    let selected = ops::select_for_read(&cluster, &ReadPreference::primary()).unwrap();
    let mut cursor = ops::find(selected, &events_namespace(), doc! {}, FindOptions::new()).unwrap();
    cursor.close().unwrap();
    assert_eq!(cursor.id(), 0);

    let commands = server.commands();
    let kill = commands
        .iter()
        .find(|&&(ref name, _)| name == "killCursors")
        .map(|&(_, ref body)| body.clone())
        .expect("expected a killCursors command");
    assert_eq!(kill.get_str("killCursors").unwrap(), "events");
    assert_eq!(kill.get_array("cursors").unwrap(), &vec![Bson::I64(42)]);
}

#[test]
fn get_more_failures_are_sticky() {
    let server = MockServer::start(|_db, command: &Document| {
        if command.contains_key("isMaster") {
            return mock::standalone_is_master();
        }
        if command.contains_key("find") {
            return doc! {
                "ok": 1,
                "cursor": {
                    "id": Bson::I64(7),
                    "ns": "app.events",
                    "firstBatch": [{ "seq": 1 }]
                }
            };
        }
        if command.contains_key("getMore") {
            return doc! { "ok": 0, "errmsg": "interrupted at shutdown" };
        }
        doc! { "ok": 1 }
    });
    let cluster = mock::cluster(vec![server.host.clone()]);

    let selected = ops::select_for_read(&cluster, &ReadPreference::primary()).unwrap();
    let mut cursor = ops::find(selected, &events_namespace(), doc! {}, FindOptions::new()).unwrap();

    assert!(cursor.next().is_some());
    assert!(cursor.next().is_none());
    match cursor.err() {
        Some(&Error::OperationError(ref message)) => {
            assert!(message.contains("interrupted"));
        }
        other => panic!("Expected a sticky operation error, got {:?}", other),
    }

    // The error resurfaces from close and stays observable afterwards,
    // and further iteration stays dead.
    assert!(cursor.close().is_err());
    match cursor.err() {
        Some(&Error::OperationError(ref message)) => {
            assert!(message.contains("interrupted"));
        }
        other => panic!("Expected the failure to survive close, got {:?}", other),
    }
    assert!(cursor.next().is_none());
    assert!(cursor.close().is_err());
}
