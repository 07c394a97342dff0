//! Background discovery and monitoring using isMaster observations.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::thread;

use bson::{self, Bson};
use time;

use command_type::CommandType;
use connection::Connection;
use connstring::{self, Host};
use error::Error::ArgumentError;
use error::Result;

use super::server::{Server, ServerDescription, ServerType};
use super::{ClusterInner, TopologyDescription, TopologyType};

/// The result of an isMaster observation.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct IsMasterResult {
    pub ok: bool,
    pub is_master: bool,
    pub min_wire_version: i64,
    pub max_wire_version: i64,

    /// Shard-specific. mongos instances add this field to the isMaster
    /// reply, and it will contain the value "isdbgrid".
    pub msg: String,

    // Replica set specific
    pub is_replica_set: bool,
    pub is_secondary: bool,
    pub arbiter_only: bool,
    pub hidden: bool,
    pub me: Option<Host>,
    pub hosts: Vec<Host>,
    pub passives: Vec<Host>,
    pub arbiters: Vec<Host>,
    pub tags: BTreeMap<String, String>,
    pub set_name: String,
    pub primary: Option<Host>,
}

impl IsMasterResult {
    /// Parses an isMaster reply document from the server.
    pub fn new(doc: bson::Document) -> Result<IsMasterResult> {
        let ok = match doc.get("ok") {
            Some(&Bson::I32(v)) => v != 0,
            Some(&Bson::I64(v)) => v != 0,
            Some(&Bson::FloatingPoint(v)) => v != 0.0,
            _ => return Err(ArgumentError("result does not contain `ok`.".to_owned())),
        };

        let mut result = IsMasterResult::default();
        result.ok = ok;

        if let Some(&Bson::Boolean(b)) = doc.get("ismaster") {
            result.is_master = b;
        }

        if let Some(&Bson::I32(v)) = doc.get("minWireVersion") {
            result.min_wire_version = i64::from(v);
        }

        if let Some(&Bson::I32(v)) = doc.get("maxWireVersion") {
            result.max_wire_version = i64::from(v);
        }

        if let Some(&Bson::String(ref s)) = doc.get("msg") {
            result.msg = s.to_owned();
        }

        if let Some(&Bson::Boolean(b)) = doc.get("secondary") {
            result.is_secondary = b;
        }

        if let Some(&Bson::Boolean(b)) = doc.get("isreplicaset") {
            result.is_replica_set = b;
        }

        if let Some(&Bson::Boolean(b)) = doc.get("arbiterOnly") {
            result.arbiter_only = b;
        }

        if let Some(&Bson::Boolean(b)) = doc.get("hidden") {
            result.hidden = b;
        }

        if let Some(&Bson::String(ref s)) = doc.get("me") {
            result.me = Some(connstring::parse_host(s)?);
        }

        if let Some(&Bson::Array(ref arr)) = doc.get("hosts") {
            result.hosts = IsMasterResult::parse_host_array(arr)?;
        }

        if let Some(&Bson::Array(ref arr)) = doc.get("passives") {
            result.passives = IsMasterResult::parse_host_array(arr)?;
        }

        if let Some(&Bson::Array(ref arr)) = doc.get("arbiters") {
            result.arbiters = IsMasterResult::parse_host_array(arr)?;
        }

        if let Some(&Bson::Document(ref tags)) = doc.get("tags") {
            for (key, value) in tags.iter() {
                if let Bson::String(ref tag) = *value {
                    result.tags.insert(key.to_owned(), tag.to_owned());
                }
            }
        }

        if let Some(&Bson::String(ref s)) = doc.get("setName") {
            result.set_name = s.to_owned();
        }

        if let Some(&Bson::String(ref s)) = doc.get("primary") {
            result.primary = Some(connstring::parse_host(s)?);
        }

        Ok(result)
    }

    fn parse_host_array(array: &[Bson]) -> Result<Vec<Host>> {
        let mut hosts = Vec::with_capacity(array.len());
        for entry in array {
            if let Bson::String(ref s) = *entry {
                hosts.push(connstring::parse_host(s)?);
            }
        }
        Ok(hosts)
    }
}

/// Observes every known server on a fixed interval and swaps in fresh
/// topology snapshots.
///
/// One monitor thread serves the whole cluster. It holds only a weak
/// reference, so dropping the last cluster handle stops it.
pub struct Monitor {
    cluster: Weak<ClusterInner>,
}

impl Monitor {
    /// Spawns the monitoring thread for a cluster.
    pub fn start(cluster: Weak<ClusterInner>) {
        let monitor = Monitor { cluster: cluster };
        let _ = thread::Builder::new()
            .name(String::from("topology-monitor"))
            .spawn(move || monitor.run());
    }

    fn run(&self) {
        loop {
            let inner = match self.cluster.upgrade() {
                Some(inner) => inner,
                None => break,
            };

            if !inner.running.load(Ordering::SeqCst) {
                break;
            }

            self.sweep(&inner);

            // Sleep until the next interval, or earlier when a probe has
            // been requested.
            let heartbeat = inner.options.heartbeat_frequency;
            let mut pending = match inner.probe_pending.lock() {
                Ok(guard) => guard,
                Err(_) => break,
            };
            if !*pending && inner.running.load(Ordering::SeqCst) {
                pending = match inner.probe_signal.wait_timeout(pending, heartbeat) {
                    Ok((guard, _)) => guard,
                    Err(_) => break,
                };
            }
            *pending = false;
        }
    }

    // Probes every known address, discovers peers, reconciles the server
    // handle map, and replaces the topology snapshot wholesale.
    fn sweep(&self, inner: &ClusterInner) {
        let handles: BTreeMap<Host, Arc<Server>> = match inner.servers.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };

        let mut descriptions: BTreeMap<Host, ServerDescription> = BTreeMap::new();
        let mut to_probe: Vec<Host> = handles.keys().cloned().collect();

        while let Some(host) = to_probe.pop() {
            if descriptions.contains_key(&host) {
                continue;
            }

            let description = self.observe(inner, &host, handles.get(&host));

            if !inner.options.direct {
                for peer in reported_peers(&description) {
                    if !descriptions.contains_key(&peer) && !to_probe.contains(&peer) {
                        to_probe.push(peer);
                    }
                }
            }

            descriptions.insert(host, description);
        }

        // Seeds persist even while unreachable; other addresses stay known
        // only as long as some member still reports them.
        let mut keep: BTreeSet<Host> = inner.options.hosts.iter().cloned().collect();
        for description in descriptions.values() {
            for peer in reported_peers(description) {
                keep.insert(peer);
            }
        }
        let descriptions: BTreeMap<Host, ServerDescription> = descriptions
            .into_iter()
            .filter(|&(ref host, _)| keep.contains(host))
            .collect();

        if let Ok(mut servers) = inner.servers.lock() {
            let stale: Vec<Host> = servers
                .keys()
                .filter(|host| !descriptions.contains_key(host))
                .cloned()
                .collect();
            for host in stale {
                servers.remove(&host);
            }

            for host in descriptions.keys() {
                if !servers.contains_key(host) {
                    servers.insert(
                        host.clone(),
                        Arc::new(Server::new(
                            host.clone(),
                            inner.options.pool_options.clone(),
                            inner.options.stream_connector.clone(),
                            inner.listener.clone(),
                            inner.options.auth.clone(),
                        )),
                    );
                }
            }
        }

        let (topology_type, set_name) = classify(&descriptions, inner.options.direct);
        let snapshot = TopologyDescription {
            topology_type: topology_type,
            set_name: set_name,
            servers: descriptions,
        };

        if let Ok(mut guard) = inner.snapshot.lock() {
            *guard = Arc::new(snapshot);
        }
        inner.snapshot_changed.notify_all();
    }

    // Builds this sweep's description for one address, folding in any dial
    // error the pool recorded since the last sweep.
    fn observe(&self, inner: &ClusterInner, host: &Host, server: Option<&Arc<Server>>)
               -> ServerDescription {
        let recorded = server.and_then(|server| server.take_error());

        match self.probe(inner, host) {
            Ok((ismaster, round_trip_time)) => {
                ServerDescription::from_is_master(host.clone(), ismaster, round_trip_time)
            }
            Err(err) => {
                // Sockets pooled before the failure are suspect.
                if let Some(server) = server {
                    server.clear_pool();
                }
                ServerDescription::from_error(
                    host.clone(),
                    recorded.unwrap_or_else(|| err.to_string()),
                )
            }
        }
    }

    // One timed isMaster exchange over a fresh connection.
    fn probe(&self, inner: &ClusterInner, host: &Host) -> Result<(IsMasterResult, i64)> {
        let mut conn =
            Connection::connect(host, &inner.options.stream_connector, inner.listener.clone())?;

        let command = doc! {
            "isMaster": 1,
            "client": {
                "driver": {
                    "name": ::DRIVER_NAME,
                    "version": env!("CARGO_PKG_VERSION")
                },
                "os": {
                    "type": ::std::env::consts::OS,
                    "architecture": ::std::env::consts::ARCH
                }
            }
        };

        let start = time::precise_time_ns();
        let reply = conn.execute_command("admin", command, true, CommandType::IsMaster)?;
        let round_trip_time = ((time::precise_time_ns() - start) / 1_000_000) as i64;

        Ok((IsMasterResult::new(reply)?, round_trip_time))
    }
}

// The addresses a member makes discoverable: its host lists and its view of
// the primary. Arbiters are tracked but never selectable.
fn reported_peers(description: &ServerDescription) -> Vec<Host> {
    let mut peers = description.hosts.clone();
    peers.extend(description.passives.iter().cloned());
    peers.extend(description.arbiters.iter().cloned());
    if let Some(ref primary) = description.primary {
        peers.push(primary.clone());
    }
    peers
}

fn classify(descriptions: &BTreeMap<Host, ServerDescription>, direct: bool)
            -> (TopologyType, String) {
    let set_name = descriptions
        .values()
        .find(|description| !description.set_name.is_empty())
        .map(|description| description.set_name.clone())
        .unwrap_or_default();

    if direct {
        return (TopologyType::Single, set_name);
    }

    let mut topology_type = TopologyType::Unknown;
    for description in descriptions.values() {
        match description.server_type {
            ServerType::Mongos => return (TopologyType::Sharded, String::new()),
            ServerType::RSPrimary => return (TopologyType::ReplicaSetWithPrimary, set_name),
            ServerType::RSSecondary |
            ServerType::RSArbiter |
            ServerType::RSOther => topology_type = TopologyType::ReplicaSetNoPrimary,
            ServerType::Standalone => {
                if topology_type == TopologyType::Unknown {
                    topology_type = TopologyType::Single;
                }
            }
            ServerType::RSGhost | ServerType::Unknown => {}
        }
    }

    (topology_type, set_name)
}
