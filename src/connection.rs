//! A single authenticated socket and its command-exchange funnel.
use std::time::{Duration, Instant};

use bson::{Bson, Document};
use bufstream::BufStream;

use apm::{CommandResult, CommandStarted, Listener};
use command_type::CommandType;
use connstring::Host;
use error::Error::{CursorNotFoundError, OperationError, ResponseError};
use error::Result;
use std::sync::Arc;
use stream::{Stream, StreamConnector};
use wire_protocol::flags::{OpQueryFlags, OpReplyFlags};
use wire_protocol::next_request_id;
use wire_protocol::operations::Message;

/// Server error code reported when a cursor id is no longer registered.
const CURSOR_NOT_FOUND_CODE: i64 = 43;

/// One connected, optionally authenticated socket to a single server.
///
/// A connection is exclusively owned by whoever borrowed it from the pool,
/// so no locking happens at this level. All commands funnel through
/// `execute_command`, which is also where monitoring events are emitted.
pub struct Connection {
    stream: BufStream<Stream>,
    host: Host,
    listener: Arc<Listener>,
    created_at: Instant,
    last_used_at: Instant,
    /// Name of the mechanism this connection authenticated with, if any.
    pub authenticated_mechanism: Option<String>,
    broken: bool,
}

impl Connection {
    /// Dials the given host and wraps the socket in a buffered stream.
    pub fn connect(host: &Host, connector: &StreamConnector, listener: Arc<Listener>)
                   -> Result<Connection> {
        let stream = connector.connect(&host.host_name, host.port)?;
        let now = Instant::now();

        Ok(Connection {
            stream: BufStream::new(stream),
            host: host.clone(),
            listener: listener,
            created_at: now,
            last_used_at: now,
            authenticated_mechanism: None,
            broken: false,
        })
    }

    /// The host this connection is attached to.
    pub fn host(&self) -> &Host {
        &self.host
    }

    /// True once the transport has failed; a broken connection must be
    /// discarded rather than reused.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Marks the transport as unusable.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    /// True when the connection has outlived either limit. `None` disables
    /// the corresponding check.
    pub fn is_expired(&self, idle_timeout: Option<Duration>, life_timeout: Option<Duration>)
                      -> bool {
        if let Some(idle) = idle_timeout {
            if self.last_used_at.elapsed() >= idle {
                return true;
            }
        }
        if let Some(life) = life_timeout {
            if self.created_at.elapsed() >= life {
                return true;
            }
        }
        false
    }

    /// Sends a database command and reads its single reply document.
    ///
    /// The command is serialized as an OP_QUERY against `<db>.$cmd` with a
    /// return count of -1. Replies flagged as query failures and replies
    /// whose `ok` field is zero both surface as errors carrying the server's
    /// payload. Transport and codec failures additionally mark the
    /// connection broken.
    pub fn execute_command(&mut self, db: &str, command: Document, slave_ok: bool,
                           cmd_type: CommandType) -> Result<Document> {
        let command_name = command.keys().next().cloned().unwrap_or_default();
        let request_id = next_request_id();

        let flags = OpQueryFlags::with_slave_ok(slave_ok);
        let message = Message::with_query(
            request_id,
            flags,
            format!("{}.$cmd", db),
            0,
            -1,
            command.clone(),
            None,
        )?;

        if !cmd_type.is_suppressed() {
            self.listener.run_start_hooks(&CommandStarted {
                command: command,
                database_name: String::from(db),
                command_name: command_name.clone(),
                request_id: request_id,
                host: self.host.clone(),
            })?;
        }

        let start_time = Instant::now();
        let result = self.round_trip(message);
        let duration = start_time.elapsed();

        if !cmd_type.is_suppressed() {
            let completion = match result {
                Ok(ref reply) => CommandResult::Success {
                    duration: duration,
                    reply: reply.clone(),
                    command_name: command_name,
                    request_id: request_id,
                    host: self.host.clone(),
                },
                Err(ref err) => CommandResult::Failure {
                    duration: duration,
                    command_name: command_name,
                    failure: err,
                    request_id: request_id,
                    host: self.host.clone(),
                },
            };

            self.listener.run_completion_hooks(&completion)?;
        }

        result
    }

    fn round_trip(&mut self, message: Message) -> Result<Document> {
        self.last_used_at = Instant::now();

        if let Err(err) = message.write(&mut self.stream) {
            self.broken = true;
            return Err(err);
        }

        let reply = match Message::read(&mut self.stream) {
            Ok(reply) => reply,
            Err(err) => {
                self.broken = true;
                return Err(err);
            }
        };

        let (flags, documents) = match reply {
            Message::OpReply { flags, documents, .. } => (flags, documents),
            _ => {
                self.broken = true;
                return Err(ResponseError("Expected a reply message.".to_owned()));
            }
        };

        if flags.contains(OpReplyFlags::CURSOR_NOT_FOUND) {
            return Err(CursorNotFoundError);
        }

        let doc = match documents.into_iter().next() {
            Some(doc) => doc,
            None => {
                self.broken = true;
                return Err(ResponseError("Expected a reply document.".to_owned()));
            }
        };

        if flags.contains(OpReplyFlags::QUERY_FAILURE) {
            let message = doc.get_str("$err")
                .map(String::from)
                .unwrap_or_else(|_| format!("{:?}", doc));
            return Err(OperationError(message));
        }

        Connection::validate_reply(doc)
    }

    /// Checks the `ok` field of a command reply, converting server-reported
    /// failures into errors that carry the server's message.
    fn validate_reply(doc: Document) -> Result<Document> {
        let ok = match doc.get("ok") {
            Some(&Bson::I32(v)) => i64::from(v),
            Some(&Bson::I64(v)) => v,
            Some(&Bson::FloatingPoint(v)) => v as i64,
            _ => return Err(ResponseError("Command reply is missing `ok`.".to_owned())),
        };

        if ok != 0 {
            return Ok(doc);
        }

        if doc.get_i32("code").map(i64::from).ok() == Some(CURSOR_NOT_FOUND_CODE) {
            return Err(CursorNotFoundError);
        }

        let message = doc.get_str("errmsg")
            .map(String::from)
            .unwrap_or_else(|_| format!("{:?}", doc));
        Err(OperationError(message))
    }
}
