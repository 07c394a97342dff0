//! Cluster state: discovery, monitoring, and server selection.
pub mod monitor;
pub mod select;
pub mod server;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

use rand::{thread_rng, Rng};

use apm::Listener;
use connstring::Host;
use error::Error::{ArgumentError, SelectionTimeoutError};
use error::Result;
use pool::{PoolAuth, PoolOptions};
use stream::StreamConnector;

use self::monitor::Monitor;
use self::select::{select, Selector};
use self::server::{Server, ServerDescription};

pub const DEFAULT_HEARTBEAT_FREQUENCY_MS: u64 = 10_000;
pub const DEFAULT_SERVER_SELECTION_TIMEOUT_MS: u64 = 30_000;

/// Describes the type of topology for a server set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopologyType {
    Single,
    ReplicaSetNoPrimary,
    ReplicaSetWithPrimary,
    Sharded,
    Unknown,
}

/// Topology information gathered from server set monitoring.
///
/// A description is an immutable snapshot. The monitor replaces the
/// cluster's current snapshot wholesale, so a reader holding one never
/// observes servers from two different observations.
#[derive(Clone, Debug)]
pub struct TopologyDescription {
    pub topology_type: TopologyType,
    /// The set name for a replica set topology. If the topology is not a
    /// replica set, this will be an empty string.
    pub set_name: String,
    /// Known servers within the topology.
    pub servers: BTreeMap<Host, ServerDescription>,
}

impl TopologyDescription {
    fn seeded(hosts: &[Host]) -> TopologyDescription {
        let servers = hosts
            .iter()
            .map(|host| (host.clone(), ServerDescription::new(host.clone())))
            .collect();

        TopologyDescription {
            topology_type: TopologyType::Unknown,
            set_name: String::new(),
            servers: servers,
        }
    }
}

/// How a cluster connects and monitors.
#[derive(Clone)]
pub struct ClusterOptions {
    /// The seed list. Must be non-empty.
    pub hosts: Vec<Host>,
    /// Connect only to the seed hosts, ignoring discovered peers.
    pub direct: bool,
    /// How often the monitor re-observes every known server.
    pub heartbeat_frequency: Duration,
    /// The default deadline for `select_server`.
    pub server_selection_timeout: Duration,
    pub pool_options: PoolOptions,
    pub stream_connector: StreamConnector,
    /// Credentials applied to every pooled connection.
    pub auth: Option<PoolAuth>,
}

impl ClusterOptions {
    pub fn with_hosts(hosts: Vec<Host>) -> ClusterOptions {
        ClusterOptions {
            hosts: hosts,
            direct: false,
            heartbeat_frequency: Duration::from_millis(DEFAULT_HEARTBEAT_FREQUENCY_MS),
            server_selection_timeout: Duration::from_millis(DEFAULT_SERVER_SELECTION_TIMEOUT_MS),
            pool_options: PoolOptions::default(),
            stream_connector: StreamConnector::default(),
            auth: None,
        }
    }
}

/// Shared cluster state: the monitored snapshot and the per-server handles.
///
/// Lock order: `snapshot` and `servers` are never held at the same time.
pub struct ClusterInner {
    options: ClusterOptions,
    listener: Arc<Listener>,
    // The current snapshot, swapped wholesale by the monitor. Readers
    // clone the Arc and release the lock.
    snapshot: Mutex<Arc<TopologyDescription>>,
    // Notified on every snapshot swap; selection waits here.
    snapshot_changed: Condvar,
    servers: Mutex<BTreeMap<Host, Arc<Server>>>,
    // Set when a caller wants an immediate re-observation.
    probe_pending: Mutex<bool>,
    probe_signal: Condvar,
    running: AtomicBool,
}

// Stops the monitor once the last user-facing cluster handle is gone. The
// monitor thread holds its own reference to the inner state, so this lives
// outside it.
struct ShutdownGuard {
    inner: Weak<ClusterInner>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.running.store(false, Ordering::SeqCst);
            inner.probe_signal.notify_all();
            inner.snapshot_changed.notify_all();
        }
    }
}

/// A monitored set of servers.
#[derive(Clone)]
pub struct Cluster {
    inner: Arc<ClusterInner>,
    _shutdown: Arc<ShutdownGuard>,
}

impl Cluster {
    /// Starts monitoring the given seed list.
    pub fn new(options: ClusterOptions) -> Result<Cluster> {
        if options.hosts.is_empty() {
            return Err(ArgumentError(
                "At least one seed host is required.".to_owned(),
            ));
        }

        let seed_snapshot = TopologyDescription::seeded(&options.hosts);
        let listener = Arc::new(Listener::new());

        let mut servers = BTreeMap::new();
        for host in &options.hosts {
            servers.insert(
                host.clone(),
                Arc::new(Server::new(
                    host.clone(),
                    options.pool_options.clone(),
                    options.stream_connector.clone(),
                    listener.clone(),
                    options.auth.clone(),
                )),
            );
        }

        let inner = Arc::new(ClusterInner {
            options: options,
            listener: listener,
            snapshot: Mutex::new(Arc::new(seed_snapshot)),
            snapshot_changed: Condvar::new(),
            servers: Mutex::new(servers),
            probe_pending: Mutex::new(false),
            probe_signal: Condvar::new(),
            running: AtomicBool::new(true),
        });

        Monitor::start(Arc::downgrade(&inner));

        Ok(Cluster {
            _shutdown: Arc::new(ShutdownGuard { inner: Arc::downgrade(&inner) }),
            inner: inner,
        })
    }

    /// The command-monitoring hooks shared by every connection.
    pub fn listener(&self) -> &Arc<Listener> {
        &self.inner.listener
    }

    /// Returns the current topology snapshot.
    pub fn model(&self) -> Result<Arc<TopologyDescription>> {
        let guard = self.inner.snapshot.lock()?;
        Ok(guard.clone())
    }

    /// Asks the monitor for an immediate re-observation of every server.
    pub fn request_probe(&self) {
        if let Ok(mut pending) = self.inner.probe_pending.lock() {
            *pending = true;
        }
        self.inner.probe_signal.notify_all();
    }

    /// Selects a server using the cluster's configured selection timeout.
    pub fn select_server(&self, selector: &Selector) -> Result<Arc<Server>> {
        self.select_server_with_timeout(selector, self.inner.options.server_selection_timeout)
    }

    /// Waits until some server satisfies the selector, picking randomly
    /// among the admissible ones. Fails with a selection timeout carrying
    /// the latest per-server errors once the deadline passes.
    pub fn select_server_with_timeout(&self, selector: &Selector, timeout: Duration)
                                      -> Result<Arc<Server>> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.snapshot.lock()?;

        loop {
            let snapshot = guard.clone();
            let candidates = select(&snapshot, selector);

            if !candidates.is_empty() {
                drop(guard);
                let index = thread_rng().gen_range(0, candidates.len());
                let host = candidates[index].clone();

                {
                    let servers = self.inner.servers.lock()?;
                    if let Some(server) = servers.get(&host) {
                        return Ok(server.clone());
                    }
                }

                // The monitor removed this host after the snapshot was
                // taken; try again against the next snapshot.
                guard = self.inner.snapshot.lock()?;
                continue;
            }

            let now = Instant::now();
            if now >= deadline {
                let server_errors = snapshot
                    .servers
                    .iter()
                    .filter_map(|(host, description)| {
                        description.err.as_ref().map(|err| (host.clone(), err.clone()))
                    })
                    .collect();

                return Err(SelectionTimeoutError {
                    message: format!(
                        "No server matched the selector within {} ms.",
                        timeout.as_secs() * 1000 + u64::from(timeout.subsec_millis())
                    ),
                    server_errors: server_errors,
                });
            }

            drop(guard);
            self.request_probe();
            guard = self.inner.snapshot.lock()?;

            let remaining = deadline.saturating_duration_since(Instant::now());
            let (reacquired, _) = self.inner.snapshot_changed.wait_timeout(guard, remaining)?;
            guard = reacquired;
        }
    }
}
