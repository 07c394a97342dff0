//! Host addresses consumed from connection-string parsing.
//!
//! Full URI parsing lives in a separate crate; the cluster only needs the
//! already-parsed host list plus the ability to parse the `host:port`
//! strings that appear inside isMaster replies.
use error::Error::ArgumentError;
use error::Result;

use std::fmt;

pub const DEFAULT_PORT: u16 = 27017;

/// The address of one server in the set.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Host {
    pub host_name: String,
    pub port: u16,
}

impl Host {
    pub fn new(host_name: String, port: u16) -> Host {
        Host {
            host_name: host_name,
            port: port,
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}:{}", self.host_name, self.port)
    }
}

/// Parses a `host` or `host:port` string into a Host.
pub fn parse_host(address: &str) -> Result<Host> {
    if address.is_empty() {
        return Err(ArgumentError("Host name must not be empty.".to_owned()));
    }

    let mut parts = address.splitn(2, ':');
    let host_name = match parts.next() {
        Some(name) if !name.is_empty() => name.to_owned(),
        _ => return Err(ArgumentError("Host name must not be empty.".to_owned())),
    };

    let port = match parts.next() {
        Some(port_str) => {
            match port_str.parse::<u16>() {
                Ok(port) => port,
                Err(_) => {
                    return Err(ArgumentError(
                        format!("Invalid port in host string '{}'.", address),
                    ))
                }
            }
        }
        None => DEFAULT_PORT,
    };

    Ok(Host::new(host_name, port))
}
