//! Per-server state: the immutable description and the pooled handle.
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use apm::Listener;
use connstring::Host;
use error::Error;
use error::Result;
use pool::{ConnectionPool, PoolAuth, PoolOptions, PooledConnection};
use stream::StreamConnector;

use super::monitor::IsMasterResult;

/// Describes the server role within a server set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerType {
    /// Standalone server.
    Standalone,
    /// Shard router.
    Mongos,
    /// Replica set primary.
    RSPrimary,
    /// Replica set secondary.
    RSSecondary,
    /// Replica set arbiter.
    RSArbiter,
    /// Replica set member of some other type.
    RSOther,
    /// Replica set ghost member.
    RSGhost,
    /// Server type is currently unknown.
    Unknown,
}

impl FromStr for ServerType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "Standalone" => ServerType::Standalone,
            "Mongos" => ServerType::Mongos,
            "RSPrimary" => ServerType::RSPrimary,
            "RSSecondary" => ServerType::RSSecondary,
            "RSArbiter" => ServerType::RSArbiter,
            "RSOther" => ServerType::RSOther,
            "RSGhost" => ServerType::RSGhost,
            _ => ServerType::Unknown,
        })
    }
}

/// Server information gathered from one monitoring observation.
///
/// Descriptions are built wholesale and never mutated afterwards; a new
/// observation produces a new description.
#[derive(Clone, Debug)]
pub struct ServerDescription {
    /// Host connection details.
    pub host: Host,
    /// The server type.
    pub server_type: ServerType,
    /// The most recent error observed while monitoring or dialing this
    /// server.
    pub err: Option<String>,
    /// The round-trip time of the last monitoring check, in milliseconds.
    pub round_trip_time: Option<i64>,
    /// The minimum wire version supported by this server.
    pub min_wire_version: i64,
    /// The maximum wire version supported by this server.
    pub max_wire_version: i64,
    /// All voting hosts in the replica set known by this server.
    pub hosts: Vec<Host>,
    /// All passive members of the replica set known by this server.
    pub passives: Vec<Host>,
    /// All arbiters in the replica set known by this server.
    pub arbiters: Vec<Host>,
    /// Server tags for targeted read operations on specific members.
    pub tags: BTreeMap<String, String>,
    /// The replica set name.
    pub set_name: String,
    /// The server's opinion of who the primary is.
    pub primary: Option<Host>,
}

impl ServerDescription {
    /// Returns a default, unknown server description.
    pub fn new(host: Host) -> ServerDescription {
        ServerDescription {
            host: host,
            server_type: ServerType::Unknown,
            err: None,
            round_trip_time: None,
            min_wire_version: 0,
            max_wire_version: 0,
            hosts: Vec::new(),
            passives: Vec::new(),
            arbiters: Vec::new(),
            tags: BTreeMap::new(),
            set_name: String::new(),
            primary: None,
        }
    }

    /// Builds a description from an isMaster observation.
    pub fn from_is_master(host: Host, ismaster: IsMasterResult, round_trip_time: i64)
                          -> ServerDescription {
        if !ismaster.ok {
            return ServerDescription::from_error(
                host,
                "isMaster returned a not-ok response.".to_owned(),
            );
        }

        let set_name_empty = ismaster.set_name.is_empty();
        let msg_empty = ismaster.msg.is_empty();

        let server_type = if msg_empty && set_name_empty && !ismaster.is_replica_set {
            ServerType::Standalone
        } else if !msg_empty {
            ServerType::Mongos
        } else if ismaster.is_master && !set_name_empty {
            ServerType::RSPrimary
        } else if ismaster.is_secondary && !set_name_empty {
            ServerType::RSSecondary
        } else if ismaster.arbiter_only && !set_name_empty {
            ServerType::RSArbiter
        } else if !set_name_empty {
            ServerType::RSOther
        } else if ismaster.is_replica_set {
            ServerType::RSGhost
        } else {
            ServerType::Unknown
        };

        ServerDescription {
            host: host,
            server_type: server_type,
            err: None,
            round_trip_time: Some(round_trip_time),
            min_wire_version: ismaster.min_wire_version,
            max_wire_version: ismaster.max_wire_version,
            hosts: ismaster.hosts,
            passives: ismaster.passives,
            arbiters: ismaster.arbiters,
            tags: ismaster.tags,
            set_name: ismaster.set_name,
            primary: ismaster.primary,
        }
    }

    /// Builds an unknown description carrying a monitoring error.
    pub fn from_error(host: Host, err: String) -> ServerDescription {
        let mut description = ServerDescription::new(host);
        description.err = Some(err);
        description
    }
}

/// Holds connection state for a single server address.
///
/// A server is created when its address is discovered and dropped when the
/// address leaves the topology; its pool and the sockets borrowed from it
/// share ownership, so in-flight operations survive removal.
pub struct Server {
    /// Host connection details.
    pub host: Host,
    pool: ConnectionPool,
    // Dial and handshake failures recorded by the pool, drained into the
    // next topology snapshot.
    error_slot: Arc<Mutex<Option<String>>>,
}

impl Server {
    pub fn new(host: Host, pool_options: PoolOptions, connector: StreamConnector,
               listener: Arc<Listener>, auth: Option<PoolAuth>) -> Server {
        let error_slot = Arc::new(Mutex::new(None));
        let pool = ConnectionPool::new(
            host.clone(),
            pool_options,
            connector,
            listener,
            auth,
            error_slot.clone(),
        );

        Server {
            host: host,
            pool: pool,
            error_slot: error_slot,
        }
    }

    /// Borrows a pooled connection to this server.
    pub fn acquire(&self) -> Result<PooledConnection> {
        self.pool.acquire()
    }

    /// Invalidates every pooled socket for this server.
    pub fn clear_pool(&self) {
        self.pool.clear()
    }

    /// The number of open pooled connections.
    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    /// Takes the most recently recorded dial error, if any.
    pub fn take_error(&self) -> Option<String> {
        match self.error_slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        }
    }
}
