use std::io::{Cursor, Read, Write};
use std::mem;

use bson;
use bson::Document;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use error::Error::ResponseError;
use error::Result;
use wire_protocol::flags::{OpQueryFlags, OpReplyFlags};
use wire_protocol::header::{Header, OpCode};

/// Size of the wire header in bytes.
const HEADER_LENGTH: i32 = 16;

trait ByteLength {
    /// Calculates the number of bytes in the serialized version of the struct.
    fn byte_length(&self) -> Result<i32>;
}

impl ByteLength for Document {
    fn byte_length(&self) -> Result<i32> {
        let mut temp_buffer = vec![];
        bson::encode_document(&mut temp_buffer, self)?;
        Ok(temp_buffer.len() as i32)
    }
}

/// Represents a message in the MongoDB Wire Protocol.
#[derive(Clone, Debug)]
pub enum Message {
    OpReply {
        /// The message header.
        header: Header,
        /// A bit vector of reply options.
        flags: OpReplyFlags,
        /// Uniquely identifies the cursor being returned.
        cursor_id: i64,
        /// The starting position for the cursor.
        starting_from: i32,
        /// The total number of documents being returned.
        number_returned: i32,
        /// The documents being returned.
        documents: Vec<Document>,
    },
    OpQuery {
        /// The message header.
        header: Header,
        /// A bit vector of query options.
        flags: OpQueryFlags,
        /// The full qualified name of the collection, beginning with the
        /// database name and a dot.
        namespace: String,
        /// The number of initial documents to skip over in the query results.
        number_to_skip: i32,
        /// The total number of documents that should be returned by the query.
        number_to_return: i32,
        /// Specifies which documents to return.
        query: Document,
        /// An optional projection of which fields should be present in the
        /// documents to be returned by the query.
        return_field_selector: Option<Document>,
    },
}

impl Message {
    /// Constructs a new message for an OP_QUERY command exchange.
    pub fn with_query(
        request_id: i32,
        flags: OpQueryFlags,
        namespace: String,
        number_to_skip: i32,
        number_to_return: i32,
        query: Document,
        return_field_selector: Option<Document>,
    ) -> Result<Message> {
        let header_length = HEADER_LENGTH;
        let flags_length = mem::size_of::<i32>() as i32;

        // Add an extra byte for the trailing null
        let namespace_length = namespace.len() as i32 + 1;

        let skip_length = mem::size_of::<i32>() as i32;
        let return_length = mem::size_of::<i32>() as i32;
        let query_length = query.byte_length()?;

        let selector_length = match return_field_selector {
            Some(ref doc) => doc.byte_length()?,
            None => 0,
        };

        let total_length = header_length + flags_length + namespace_length + skip_length +
            return_length + query_length + selector_length;

        let header = Header::new_query(total_length, request_id);

        Ok(Message::OpQuery {
            header: header,
            flags: flags,
            namespace: namespace,
            number_to_skip: number_to_skip,
            number_to_return: number_to_return,
            query: query,
            return_field_selector: return_field_selector,
        })
    }

    /// Constructs a new message for an OP_REPLY response.
    pub fn with_reply(
        request_id: i32,
        response_to: i32,
        flags: OpReplyFlags,
        cursor_id: i64,
        starting_from: i32,
        documents: Vec<Document>,
    ) -> Result<Message> {
        let header_length = HEADER_LENGTH;
        let flags_length = mem::size_of::<i32>() as i32;
        let cursor_id_length = mem::size_of::<i64>() as i32;
        let from_length = mem::size_of::<i32>() as i32;
        let number_length = mem::size_of::<i32>() as i32;

        let mut documents_length = 0;
        for doc in &documents {
            documents_length += doc.byte_length()?;
        }

        let total_length = header_length + flags_length + cursor_id_length + from_length +
            number_length + documents_length;

        let header = Header::new_reply(total_length, request_id, response_to);

        Ok(Message::OpReply {
            header: header,
            flags: flags,
            cursor_id: cursor_id,
            starting_from: starting_from,
            number_returned: documents.len() as i32,
            documents: documents,
        })
    }

    /// Writes a serialized BSON document to the given buffer.
    fn write_bson_document<W: Write>(buffer: &mut W, bson: &Document) -> Result<()> {
        let mut temp_buffer = vec![];
        bson::encode_document(&mut temp_buffer, bson)?;
        buffer.write_all(&temp_buffer)?;
        Ok(())
    }

    /// Writes a serialized query message to the given buffer.
    #[cfg_attr(feature = "cargo-clippy", allow(too_many_arguments))]
    fn write_query<W: Write>(
        buffer: &mut W,
        header: &Header,
        flags: OpQueryFlags,
        namespace: &str,
        number_to_skip: i32,
        number_to_return: i32,
        query: &Document,
        return_field_selector: &Option<Document>,
    ) -> Result<()> {
        header.write(buffer)?;
        buffer.write_i32::<LittleEndian>(flags.bits())?;

        for byte in namespace.bytes() {
            buffer.write_u8(byte)?;
        }

        // Writes the null terminator for the collection name string.
        buffer.write_u8(0)?;

        buffer.write_i32::<LittleEndian>(number_to_skip)?;
        buffer.write_i32::<LittleEndian>(number_to_return)?;

        Message::write_bson_document(buffer, query)?;
        if let Some(ref doc) = *return_field_selector {
            Message::write_bson_document(buffer, doc)?;
        }

        buffer.flush()?;
        Ok(())
    }

    /// Writes a serialized reply message to the given buffer.
    fn write_reply<W: Write>(
        buffer: &mut W,
        header: &Header,
        flags: OpReplyFlags,
        cursor_id: i64,
        starting_from: i32,
        number_returned: i32,
        documents: &[Document],
    ) -> Result<()> {
        header.write(buffer)?;
        buffer.write_i32::<LittleEndian>(flags.bits())?;
        buffer.write_i64::<LittleEndian>(cursor_id)?;
        buffer.write_i32::<LittleEndian>(starting_from)?;
        buffer.write_i32::<LittleEndian>(number_returned)?;

        for doc in documents {
            Message::write_bson_document(buffer, doc)?;
        }

        buffer.flush()?;
        Ok(())
    }

    /// Attempts to write the serialized message to the given buffer.
    pub fn write<W: Write>(&self, buffer: &mut W) -> Result<()> {
        match *self {
            Message::OpQuery {
                ref header,
                flags,
                ref namespace,
                number_to_skip,
                number_to_return,
                ref query,
                ref return_field_selector,
            } => {
                Message::write_query(
                    buffer,
                    header,
                    flags,
                    namespace,
                    number_to_skip,
                    number_to_return,
                    query,
                    return_field_selector,
                )
            }
            Message::OpReply {
                ref header,
                flags,
                cursor_id,
                starting_from,
                number_returned,
                ref documents,
            } => {
                Message::write_reply(
                    buffer,
                    header,
                    flags,
                    cursor_id,
                    starting_from,
                    number_returned,
                    documents,
                )
            }
        }
    }

    /// Reads a reply message body from a buffer holding exactly the bytes
    /// after the header.
    fn read_reply_body(header: Header, body: &[u8]) -> Result<Message> {
        let mut cursor = Cursor::new(body);

        let flag_bits = cursor.read_i32::<LittleEndian>()?;
        let flags = OpReplyFlags::from_bits_truncate(flag_bits);
        let cursor_id = cursor.read_i64::<LittleEndian>()?;
        let starting_from = cursor.read_i32::<LittleEndian>()?;
        let number_returned = cursor.read_i32::<LittleEndian>()?;

        let mut documents = vec![];
        while (cursor.position() as usize) < body.len() {
            documents.push(bson::decode_document(&mut cursor)?);
        }

        if documents.len() as i32 != number_returned {
            return Err(ResponseError(format!(
                "Expected {} documents in reply but read {}.",
                number_returned,
                documents.len()
            )));
        }

        Ok(Message::OpReply {
            header: header,
            flags: flags,
            cursor_id: cursor_id,
            starting_from: starting_from,
            number_returned: number_returned,
            documents: documents,
        })
    }

    /// Reads a query message body from a buffer holding exactly the bytes
    /// after the header.
    fn read_query_body(header: Header, body: &[u8]) -> Result<Message> {
        let mut cursor = Cursor::new(body);

        let flag_bits = cursor.read_i32::<LittleEndian>()?;
        let flags = OpQueryFlags::from_bits_truncate(flag_bits);

        let mut namespace_bytes = vec![];
        loop {
            let byte = cursor.read_u8()?;
            if byte == 0 {
                break;
            }
            namespace_bytes.push(byte);
        }
        let namespace = String::from_utf8(namespace_bytes)
            .map_err(|_| ResponseError("Invalid UTF-8 in message namespace.".to_owned()))?;

        let number_to_skip = cursor.read_i32::<LittleEndian>()?;
        let number_to_return = cursor.read_i32::<LittleEndian>()?;

        let query = bson::decode_document(&mut cursor)?;
        let return_field_selector = if (cursor.position() as usize) < body.len() {
            Some(bson::decode_document(&mut cursor)?)
        } else {
            None
        };

        Ok(Message::OpQuery {
            header: header,
            flags: flags,
            namespace: namespace,
            number_to_skip: number_to_skip,
            number_to_return: number_to_return,
            query: query,
            return_field_selector: return_field_selector,
        })
    }

    /// Attempts to read a serialized message from the given buffer.
    ///
    /// The entire body is read before parsing, so a connection that delivers
    /// a truncated message fails with an I/O error instead of leaving the
    /// stream positioned mid-message.
    pub fn read<R: Read>(buffer: &mut R) -> Result<Message> {
        let header = Header::read(buffer)?;

        let body_length = header.message_length - HEADER_LENGTH;
        if body_length < 0 {
            return Err(ResponseError(format!(
                "Invalid message length from server: {}.",
                header.message_length
            )));
        }

        let mut body = vec![0; body_length as usize];
        buffer.read_exact(&mut body)?;

        match header.op_code {
            OpCode::Reply => Message::read_reply_body(header, &body),
            OpCode::Query => Message::read_query_body(header, &body),
        }
    }
}
