//! The GSSAPI conversation, driven by an externally supplied security
//! context.
//!
//! Kerberos itself lives outside this crate. Callers hand in a
//! `SecurityContextFactory`; this module only sequences the tokens it
//! produces through saslStart/saslContinue until both sides agree the
//! context is established.
use bson::Bson::{self, Binary};
use bson::spec::BinarySubtype::Generic;
use bson::Document;

use auth::{Authenticator, Credential};
use command_type::CommandType::Suppressed;
use connection::Connection;
use error::Error::{ArgumentError, AuthenticationError, ResponseError};
use error::Result;

/// Users authenticating over GSSAPI are always defined externally.
const GSSAPI_SOURCE: &'static str = "$external";
const DEFAULT_SERVICE_NAME: &'static str = "mongodb";
const SERVICE_NAME_PROPERTY: &'static str = "SERVICE_NAME";

/// Produces security contexts for a given service principal.
pub trait SecurityContextFactory: Send + Sync {
    fn create(&self, principal: &str) -> ::std::result::Result<Box<SecurityContext>, String>;
}

/// One in-progress GSSAPI context negotiation.
pub trait SecurityContext: Send {
    /// Produces the initial token to send to the server.
    fn initiate(&mut self) -> ::std::result::Result<Vec<u8>, String>;

    /// Consumes a server challenge and produces the next token.
    fn step(&mut self, challenge: &[u8]) -> ::std::result::Result<Vec<u8>, String>;

    /// True once the context negotiation has completed on this side.
    fn established(&self) -> bool;
}

pub struct GssapiAuthenticator {
    credential: Credential,
}

impl GssapiAuthenticator {
    pub fn new(credential: Credential) -> GssapiAuthenticator {
        GssapiAuthenticator { credential: credential }
    }

    fn service_principal(&self, host_name: &str) -> String {
        let service = self.credential
            .mechanism_properties
            .get(SERVICE_NAME_PROPERTY)
            .map(|name| &name[..])
            .unwrap_or(DEFAULT_SERVICE_NAME);
        format!("{}/{}", service, host_name)
    }
}

impl Authenticator for GssapiAuthenticator {
    fn auth(&self, conn: &mut Connection) -> Result<()> {
        let result = self.converse(conn);
        if result.is_err() {
            conn.mark_broken();
        }
        result
    }
}

impl GssapiAuthenticator {
    fn converse(&self, conn: &mut Connection) -> Result<()> {
        let factory = match self.credential.security_context_factory {
            Some(ref factory) => factory.clone(),
            None => {
                return Err(ArgumentError(
                    "GSSAPI requires a security context factory.".to_owned(),
                ))
            }
        };

        let principal = self.service_principal(&conn.host().host_name);
        let mut context = factory.create(&principal).map_err(AuthenticationError)?;
        let token = context.initiate().map_err(AuthenticationError)?;

        let start_doc = doc! {
            "saslStart": 1,
            "mechanism": "GSSAPI",
            "payload": Binary(Generic, token),
            "autoAuthorize": 1
        };

        let mut reply = conn.execute_command(GSSAPI_SOURCE, start_doc, false, Suppressed)?;
        let conversation_id = match reply.get("conversationId") {
            Some(bson) => bson.clone(),
            None => return Err(ResponseError("No conversationId returned.".to_owned())),
        };

        loop {
            if let Some(&Bson::Boolean(true)) = reply.get("done") {
                break;
            }

            let challenge = payload_bytes(&reply)?;

            // Once the context is established locally, the remaining rounds
            // are empty-payload acknowledgements until the server is done.
            let token = if context.established() {
                Vec::new()
            } else {
                context.step(&challenge).map_err(AuthenticationError)?
            };

            let continue_doc = doc! {
                "saslContinue": 1,
                "conversationId": conversation_id.clone(),
                "payload": Binary(Generic, token)
            };

            reply = conn.execute_command(GSSAPI_SOURCE, continue_doc, false, Suppressed)?;
        }

        if !context.established() {
            return Err(AuthenticationError(
                "Server completed the conversation before the security context was established."
                    .to_owned(),
            ));
        }

        Ok(())
    }
}

fn payload_bytes(doc: &Document) -> Result<Vec<u8>> {
    match doc.get("payload") {
        Some(&Binary(_, ref payload)) => Ok(payload.to_owned()),
        _ => Err(ResponseError("Invalid payload returned.".to_owned())),
    }
}
