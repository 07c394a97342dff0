//! Cluster topology, connection pooling, and command execution core for a
//! native MongoDB driver.
//!
//! This crate implements the lower half of a driver: it discovers and
//! monitors the members of a server set, selects an eligible server for each
//! operation according to a read preference, maintains a bounded connection
//! pool per server, authenticates fresh connections, and executes wire
//! commands including multi-batch cursor iteration.
//!
//! Connection-string parsing, BSON encoding, and the high-level
//! collection/database API live in separate crates; this one consumes their
//! types at the boundary.
//!
//! ```no_run
//! use mongodb_core::bson::Document;
//! use mongodb_core::common::{ReadMode, ReadPreference};
//! use mongodb_core::connstring;
//! use mongodb_core::ops::{self, Namespace};
//! use mongodb_core::ops::options::FindOptions;
//! use mongodb_core::topology::{Cluster, ClusterOptions};
//!
//! let seed = connstring::parse_host("localhost:27017").unwrap();
//! let cluster = Cluster::new(ClusterOptions::with_hosts(vec![seed])).unwrap();
//!
//! let read_pref = ReadPreference::new(ReadMode::SecondaryPreferred, None);
//! let selected = ops::select_for_read(&cluster, &read_pref).unwrap();
//!
//! let namespace = "test.events".parse::<Namespace>().unwrap();
//! let filter = Document::new();
//! let mut cursor = ops::find(selected, &namespace, filter, FindOptions::new()).unwrap();
//! for doc in &mut cursor {
//!     println!("{}", doc);
//! }
//! cursor.close().unwrap();
//! ```
#[macro_use]
extern crate bitflags;
#[macro_use(bson, doc)]
pub extern crate bson;
extern crate bufstream;
extern crate byteorder;
extern crate data_encoding;
extern crate hex;
extern crate hmac;
extern crate md5;
extern crate pbkdf2;
extern crate rand;
#[macro_use]
extern crate scan_fmt;
extern crate sha1;
extern crate textnonce;
extern crate time;

pub mod apm;
pub mod auth;
pub mod command_type;
pub mod common;
pub mod connection;
pub mod connstring;
pub mod cursor;
pub mod error;
pub mod ops;
pub mod pool;
pub mod stream;
pub mod topology;
pub mod wire_protocol;

pub use command_type::CommandType;
pub use error::{Error, Result};

/// The name reported to the server in the handshake metadata.
pub const DRIVER_NAME: &'static str = "mongo-rust-driver-core";
