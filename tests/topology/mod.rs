use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bson::{Bson, Document};

use mock::{self, MockServer};
use mongodb_core::common::{ReadMode, ReadPreference};
use mongodb_core::ops;
use mongodb_core::topology::select::Selector;
use mongodb_core::topology::server::ServerType;
use mongodb_core::topology::{Cluster, ClusterOptions, TopologyDescription, TopologyType};
use mongodb_core::Error;

fn wait_for<F>(cluster: &Cluster, predicate: F) -> Arc<TopologyDescription>
    where F: Fn(&TopologyDescription) -> bool
{
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let model = cluster.model().unwrap();
        if predicate(&model) {
            return model;
        }
        if Instant::now() >= deadline {
            panic!("Topology never reached the expected state: {:?}", model);
        }
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn a_standalone_seed_is_discovered_as_single() {
    let server = MockServer::start(|_db, command: &Document| {
        if command.contains_key("isMaster") {
            return mock::standalone_is_master();
        }
        doc! { "ok": 1 }
    });
    let cluster = mock::cluster(vec![server.host.clone()]);

    let model = wait_for(&cluster, |model| {
        model
            .servers
            .get(&server.host)
            .map(|description| description.server_type == ServerType::Standalone)
            .unwrap_or(false)
    });

    assert_eq!(model.topology_type, TopologyType::Single);
    let description = &model.servers[&server.host];
    assert!(description.err.is_none());
    assert!(description.round_trip_time.is_some());
}

#[test]
fn probes_carry_client_metadata() {
    let server = MockServer::start(|_db, command: &Document| {
        if command.contains_key("isMaster") {
            return mock::standalone_is_master();
        }
        doc! { "ok": 1 }
    });
    let cluster = mock::cluster(vec![server.host.clone()]);
    wait_for(&cluster, |model| {
        model.servers[&server.host].server_type == ServerType::Standalone
    });

    let commands = server.commands();
    let &(_, ref body) = commands
        .iter()
        .find(|&&(ref name, _)| name == "isMaster")
        .expect("expected an isMaster probe");
    let client = body.get_document("client").unwrap();
    assert!(client.get_document("driver").unwrap().get_str("name").is_ok());
    assert!(client.get_document("os").unwrap().get_str("type").is_ok());
}

fn member_reply(is_master: bool, hosts: &Arc<Mutex<Vec<String>>>,
                primary: &Arc<Mutex<String>>) -> Document {
    let host_list: Vec<Bson> = hosts
        .lock()
        .unwrap()
        .iter()
        .map(|h| Bson::String(h.clone()))
        .collect();
    doc! {
        "ok": 1,
        "ismaster": is_master,
        "secondary": !is_master,
        "setName": "streams",
        "hosts": Bson::Array(host_list),
        "primary": primary.lock().unwrap().clone(),
        "minWireVersion": 2,
        "maxWireVersion": 6
    }
}

#[test]
fn replica_set_members_are_discovered_from_one_seed() {
    let member_hosts: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let primary_addr: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));

    let hosts_a = member_hosts.clone();
    let primary_a = primary_addr.clone();
    let primary_server = MockServer::start(move |_db, command: &Document| {
        if command.contains_key("isMaster") {
            return member_reply(true, &hosts_a, &primary_a);
        }
        doc! { "ok": 1 }
    });

    let hosts_b = member_hosts.clone();
    let primary_b = primary_addr.clone();
    let secondary_server = MockServer::start(move |_db, command: &Document| {
        if command.contains_key("isMaster") {
            return member_reply(false, &hosts_b, &primary_b);
        }
        doc! { "ok": 1 }
    });

    *member_hosts.lock().unwrap() = vec![
        primary_server.host.to_string(),
        secondary_server.host.to_string(),
    ];
    *primary_addr.lock().unwrap() = primary_server.host.to_string();

    // Seed only the secondary; the primary must be discovered.
    let cluster = mock::cluster(vec![secondary_server.host.clone()]);

    let model = wait_for(&cluster, |model| {
        model.servers.len() == 2 &&
            model.topology_type == TopologyType::ReplicaSetWithPrimary
    });
    assert_eq!(model.set_name, "streams");
    assert_eq!(
        model.servers[&primary_server.host].server_type,
        ServerType::RSPrimary
    );
    assert_eq!(
        model.servers[&secondary_server.host].server_type,
        ServerType::RSSecondary
    );

    // Selection routes writes to the primary and secondary reads away
    // from it.
    let selected = ops::select_for_write(&cluster).unwrap();
    assert_eq!(selected.server.host, primary_server.host);

    let pref = ReadPreference::new(ReadMode::Secondary, None);
    let selected = ops::select_for_read(&cluster, &pref).unwrap();
    assert_eq!(selected.server.host, secondary_server.host);
}

#[test]
fn selection_times_out_with_per_server_errors() {
    let dead = mock::dead_host();
    let mut options = ClusterOptions::with_hosts(vec![dead.clone()]);
    options.heartbeat_frequency = Duration::from_millis(20);
    options.server_selection_timeout = Duration::from_millis(300);
    let cluster = Cluster::new(options).unwrap();

    // Give the monitor a moment to record the dial failure.
    thread::sleep(Duration::from_millis(100));

    let start = Instant::now();
    match cluster.select_server(&Selector::ReadPref(ReadPreference::primary())) {
        Err(Error::SelectionTimeoutError { server_errors, .. }) => {
            assert_eq!(server_errors.len(), 1);
            assert_eq!(server_errors[0].0, dead);
        }
        other => panic!("Expected a selection timeout, got {:?}", other.map(|_| ())),
    }
    assert!(start.elapsed() >= Duration::from_millis(250));
}

#[test]
fn an_empty_seed_list_is_rejected() {
    match Cluster::new(ClusterOptions::with_hosts(vec![])) {
        Err(Error::ArgumentError(_)) => {}
        other => panic!("Expected an argument error, got {:?}", other.map(|_| ())),
    }
}
