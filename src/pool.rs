//! Connection pooling for a single server.
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use apm::Listener;
use auth::{self, Credential};
use connection::Connection;
use connstring::Host;
use error::Error::OperationError;
use error::{Error, Result};
use stream::StreamConnector;

pub static DEFAULT_POOL_SIZE: usize = 5;
pub static DEFAULT_WAIT_TIMEOUT_SECS: u64 = 10;

/// Limits applied to a single server's pool.
#[derive(Clone, Debug)]
pub struct PoolOptions {
    /// The maximum number of concurrently borrowed connections.
    /// Zero removes the cap.
    pub max_size: usize,
    /// The maximum number of idle connections retained for reuse.
    /// Zero removes the cap.
    pub max_idle: usize,
    /// Idle connections older than this are closed instead of reused.
    pub idle_timeout: Option<Duration>,
    /// Connections older than this are closed instead of reused,
    /// regardless of activity.
    pub life_timeout: Option<Duration>,
    /// How long `acquire` blocks for capacity before failing.
    pub wait_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> PoolOptions {
        PoolOptions {
            max_size: DEFAULT_POOL_SIZE,
            max_idle: 0,
            idle_timeout: None,
            life_timeout: None,
            wait_timeout: Duration::from_secs(DEFAULT_WAIT_TIMEOUT_SECS),
        }
    }
}

/// Authentication applied to every freshly dialed connection before it is
/// handed out.
#[derive(Clone)]
pub struct PoolAuth {
    pub mechanism: String,
    pub credential: Credential,
}

/// Hands out connections to a single server, dialing new sockets up to a
/// cap and recycling returned ones.
#[derive(Clone)]
pub struct ConnectionPool {
    /// The pooled host.
    pub host: Host,
    inner: Arc<Mutex<Pool>>,
    // Threads waiting for capacity or a returned connection block here.
    wait_lock: Arc<Condvar>,
    options: PoolOptions,
    stream_connector: StreamConnector,
    listener: Arc<Listener>,
    auth: Option<PoolAuth>,
    // Dial and handshake failures land here for the next topology sweep.
    error_slot: Arc<Mutex<Option<String>>>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("host", &self.host)
            .field("options", &self.options)
            .finish()
    }
}

struct Pool {
    // The number of connections currently dialed and not yet closed,
    // borrowed and idle alike.
    len: usize,
    // Connections available for reuse, most recently returned last.
    idle: Vec<Connection>,
    // Incremented by `clear`. Connections borrowed under an older
    // generation are closed on return instead of pooled.
    generation: usize,
}

impl ConnectionPool {
    pub fn new(host: Host, options: PoolOptions, connector: StreamConnector,
               listener: Arc<Listener>, auth: Option<PoolAuth>,
               error_slot: Arc<Mutex<Option<String>>>) -> ConnectionPool {
        ConnectionPool {
            host: host,
            inner: Arc::new(Mutex::new(Pool {
                len: 0,
                idle: Vec::new(),
                generation: 0,
            })),
            wait_lock: Arc::new(Condvar::new()),
            options: options,
            stream_connector: connector,
            listener: listener,
            auth: auth,
            error_slot: error_slot,
        }
    }

    /// The number of open connections, borrowed and idle alike.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|locked| locked.len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes all idle connections and invalidates every borrowed one, so
    /// that none of the pool's current sockets outlive this call.
    pub fn clear(&self) {
        if let Ok(mut locked) = self.inner.lock() {
            locked.generation += 1;
            locked.len = 0;
            locked.idle.clear();
        }
        self.wait_lock.notify_all();
    }

    /// Borrows a connection, dialing a new one when no fresh idle connection
    /// exists and the pool is under its cap. Blocks for up to the configured
    /// wait timeout when the pool is saturated.
    pub fn acquire(&self) -> Result<PooledConnection> {
        let deadline = Instant::now() + self.options.wait_timeout;
        let mut locked = self.inner.lock()?;

        loop {
            // Reuse the most recently returned connection that has not
            // expired; expired ones are closed and forgotten.
            while let Some(conn) = locked.idle.pop() {
                if conn.is_expired(self.options.idle_timeout, self.options.life_timeout) {
                    locked.len -= 1;
                    continue;
                }
                return Ok(self.wrap(conn, locked.generation));
            }

            if self.options.max_size == 0 || locked.len < self.options.max_size {
                locked.len += 1;
                let generation = locked.generation;

                // The slot is reserved; dial without holding the lock.
                drop(locked);
                match self.dial() {
                    Ok(conn) => return Ok(self.wrap(conn, generation)),
                    Err(err) => {
                        self.record_error(&err);
                        let mut relocked = self.inner.lock()?;
                        if relocked.generation == generation {
                            relocked.len -= 1;
                        }
                        self.wait_lock.notify_one();
                        return Err(err);
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(OperationError(format!(
                    "Timed out waiting for a pooled connection to {}.",
                    self.host
                )));
            }

            let (guard, _) = self.wait_lock.wait_timeout(locked, deadline - now)?;
            locked = guard;
        }
    }

    fn wrap(&self, conn: Connection, generation: usize) -> PooledConnection {
        PooledConnection {
            conn: Some(conn),
            pool: self.inner.clone(),
            wait_lock: self.wait_lock.clone(),
            generation: generation,
            max_idle: self.options.max_idle,
            discarded: false,
        }
    }

    // Dials and, when the pool carries credentials, authenticates a new
    // connection. A connection whose handshake fails is never handed out.
    fn dial(&self) -> Result<Connection> {
        let mut conn =
            Connection::connect(&self.host, &self.stream_connector, self.listener.clone())?;

        if let Some(ref auth) = self.auth {
            let authenticator =
                auth::create_authenticator(&auth.mechanism, auth.credential.clone())?;
            authenticator.auth(&mut conn)?;
            conn.authenticated_mechanism = Some(auth.mechanism.clone());
        }

        Ok(conn)
    }

    fn record_error(&self, err: &Error) {
        if let Ok(mut slot) = self.error_slot.lock() {
            *slot = Some(err.to_string());
        }
    }
}

/// A borrowed connection, with logic to return it to its pool when dropped.
pub struct PooledConnection {
    // Always Some until taken by drop.
    conn: Option<Connection>,
    pool: Arc<Mutex<Pool>>,
    wait_lock: Arc<Condvar>,
    // The pool generation at the moment of extraction.
    generation: usize,
    max_idle: usize,
    discarded: bool,
}

impl PooledConnection {
    /// Consumes the borrow and closes the underlying socket instead of
    /// returning it to the pool.
    pub fn close(mut self) {
        self.discarded = true;
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().unwrap()
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().unwrap()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };

        // Give up if the pool lock has been poisoned.
        if let Ok(mut locked) = self.pool.lock() {
            if locked.generation != self.generation {
                // The pool was cleared while this connection was out; its
                // accounting no longer includes us.
                return;
            }

            let over_idle_cap = self.max_idle != 0 && locked.idle.len() >= self.max_idle;
            if self.discarded || conn.is_broken() || over_idle_cap {
                locked.len -= 1;
            } else {
                locked.idle.push(conn);
            }

            // Either a connection or a slot just became available.
            self.wait_lock.notify_one();
        }
    }
}
