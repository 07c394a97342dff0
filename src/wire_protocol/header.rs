use std::fmt;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use error::Error::ResponseError;
use error::Result;

/// Represents an opcode in the MongoDB Wire Protocol.
///
/// This driver speaks the command protocol exclusively, so only OP_QUERY
/// (the command carrier) and OP_REPLY are ever exchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpCode {
    Reply = 1,
    Query = 2004,
}

impl OpCode {
    /// Maps integer values to OpCodes.
    pub fn from_i32(i: i32) -> Option<OpCode> {
        match i {
            1 => Some(OpCode::Reply),
            2004 => Some(OpCode::Query),
            _ => None,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            OpCode::Reply => write!(fmt, "OP_REPLY"),
            OpCode::Query => write!(fmt, "OP_QUERY"),
        }
    }
}

/// Represents a header in the MongoDB Wire Protocol.
///
/// # Fields
///
/// `message_length` - The length of the entire message in bytes.
/// `request_id` - Identifies the request being sent.
/// `response_to` - Identifies which request the message is a response to;
///                 `0` in a request from the client.
/// `op_code` - Identifies which type of message is being sent.
#[derive(Clone, Debug)]
pub struct Header {
    pub message_length: i32,
    pub request_id: i32,
    pub response_to: i32,
    pub op_code: OpCode,
}

impl Header {
    /// Constructs a new Header.
    pub fn new(message_length: i32, request_id: i32, response_to: i32, op_code: OpCode) -> Header {
        Header {
            message_length: message_length,
            request_id: request_id,
            response_to: response_to,
            op_code: op_code,
        }
    }

    /// Constructs a new Header for an OP_QUERY request.
    pub fn new_query(message_length: i32, request_id: i32) -> Header {
        Header::new(message_length, request_id, 0, OpCode::Query)
    }

    /// Constructs a new Header for an OP_REPLY response.
    pub fn new_reply(message_length: i32, request_id: i32, response_to: i32) -> Header {
        Header::new(message_length, request_id, response_to, OpCode::Reply)
    }

    /// Writes the serialized Header to a buffer.
    pub fn write<W: Write>(&self, buffer: &mut W) -> Result<()> {
        buffer.write_i32::<LittleEndian>(self.message_length)?;
        buffer.write_i32::<LittleEndian>(self.request_id)?;
        buffer.write_i32::<LittleEndian>(self.response_to)?;
        buffer.write_i32::<LittleEndian>(self.op_code as i32)?;
        Ok(())
    }

    /// Reads a serialized Header from a buffer.
    pub fn read<R: Read>(buffer: &mut R) -> Result<Header> {
        let message_length = buffer.read_i32::<LittleEndian>()?;
        let request_id = buffer.read_i32::<LittleEndian>()?;
        let response_to = buffer.read_i32::<LittleEndian>()?;

        let op_code_i32 = buffer.read_i32::<LittleEndian>()?;
        let op_code = match OpCode::from_i32(op_code_i32) {
            Some(code) => code,
            None => {
                return Err(ResponseError(
                    format!("Invalid header opcode from server: {}.", op_code_i32),
                ))
            }
        };

        Ok(Header::new(message_length, request_id, response_to, op_code))
    }
}
