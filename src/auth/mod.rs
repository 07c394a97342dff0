//! Credential handling and authentication mechanism dispatch.
mod gssapi;
mod scram;

pub use self::gssapi::{GssapiAuthenticator, SecurityContext, SecurityContextFactory};
pub use self::scram::ScramSha1Authenticator;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use connection::Connection;
use error::Error::{ArgumentError, UnsupportedMechanism};
use error::Result;

pub const SCRAM_SHA_1: &'static str = "SCRAM-SHA-1";
pub const GSSAPI: &'static str = "GSSAPI";

/// What a user presents to authenticate: a name, an optional password, the
/// database holding the user record, and mechanism-specific extras.
#[derive(Clone)]
pub struct Credential {
    pub username: String,
    pub password: Option<String>,
    /// The database the user is defined on.
    pub source: String,
    /// Free-form per-mechanism settings, such as the GSSAPI service name.
    pub mechanism_properties: BTreeMap<String, String>,
    /// Supplies external security contexts for GSSAPI conversations.
    pub security_context_factory: Option<Arc<SecurityContextFactory>>,
}

impl Credential {
    pub fn new(username: &str) -> Credential {
        Credential {
            username: String::from(username),
            password: None,
            source: String::from("admin"),
            mechanism_properties: BTreeMap::new(),
            security_context_factory: None,
        }
    }

    pub fn with_password(mut self, password: &str) -> Credential {
        self.password = Some(String::from(password));
        self
    }

    pub fn with_source(mut self, source: &str) -> Credential {
        self.source = String::from(source);
        self
    }

    pub fn with_mechanism_property(mut self, key: &str, value: &str) -> Credential {
        self.mechanism_properties.insert(String::from(key), String::from(value));
        self
    }

    pub fn with_security_context_factory(mut self, factory: Arc<SecurityContextFactory>)
                                         -> Credential {
        self.security_context_factory = Some(factory);
        self
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("source", &self.source)
            .field("mechanism_properties", &self.mechanism_properties)
            .finish()
    }
}

/// One authentication mechanism, ready to run its handshake on a freshly
/// dialed connection.
pub trait Authenticator: Send + Sync {
    fn auth(&self, conn: &mut Connection) -> Result<()>;
}

/// Maps a mechanism name and credential to a ready authenticator, checking
/// up front that the credential carries what the mechanism needs.
pub fn create_authenticator(mechanism: &str, credential: Credential)
                            -> Result<Box<Authenticator>> {
    match mechanism {
        SCRAM_SHA_1 => {
            if credential.password.is_none() {
                return Err(ArgumentError(
                    "SCRAM-SHA-1 requires a password.".to_owned(),
                ));
            }
            Ok(Box::new(ScramSha1Authenticator::new(credential)))
        }
        GSSAPI => {
            if credential.security_context_factory.is_none() {
                return Err(ArgumentError(
                    "GSSAPI requires a security context factory.".to_owned(),
                ));
            }
            Ok(Box::new(GssapiAuthenticator::new(credential)))
        }
        other => Err(UnsupportedMechanism(String::from(other))),
    }
}
