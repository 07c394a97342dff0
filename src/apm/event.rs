use std::fmt::{Display, Error, Formatter};
use std::time::Duration;

use bson::Document;

use connstring::Host;
use error::Error as ClientError;

/// Emitted just before a command is written to the wire.
pub struct CommandStarted {
    pub command: Document,
    pub database_name: String,
    pub command_name: String,
    pub request_id: i32,
    pub host: Host,
}

impl Display for CommandStarted {
    fn fmt(&self, fmt: &mut Formatter) -> Result<(), Error> {
        fmt.write_fmt(format_args!("COMMAND.{} {} STARTED: {:?}", self.command_name,
                                   self.host, self.command))
    }
}

/// Emitted once a command exchange has finished, either way.
pub enum CommandResult<'a> {
    Success {
        duration: Duration,
        reply: Document,
        command_name: String,
        request_id: i32,
        host: Host,
    },
    Failure {
        duration: Duration,
        command_name: String,
        failure: &'a ClientError,
        request_id: i32,
        host: Host,
    },
}

impl<'a> Display for CommandResult<'a> {
    fn fmt(&self, fmt: &mut Formatter) -> Result<(), Error> {
        match *self {
            CommandResult::Success { duration, ref reply, ref command_name, request_id: _,
                                     ref host } => {
                fmt.write_fmt(format_args!("COMMAND.{} {} COMPLETED: {:?} ({:?})", command_name,
                                           host, reply, duration))
            }
            CommandResult::Failure { duration, ref command_name, ref failure, request_id: _,
                                     ref host } => {
                fmt.write_fmt(format_args!("COMMAND.{} {} FAILURE: {} ({:?})", command_name,
                                           host, failure, duration))
            }
        }
    }
}
