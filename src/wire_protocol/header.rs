//! Message headers for the MongoDB Wire Protocol.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use Error::ResponseError;
use Result;

use std::fmt;
use std::io::{Read, Write};

/// Identifies the type of a wire protocol message.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Reply = 1,
    Update = 2001,
    Insert = 2002,
    Query = 2004,
    GetMore = 2005,
    Delete = 2006,
    KillCursors = 2007,
}

impl OpCode {
    /// Maps an i32 to its corresponding opcode, if any.
    pub fn from_i32(i: i32) -> Option<OpCode> {
        match i {
            1 => Some(OpCode::Reply),
            2001 => Some(OpCode::Update),
            2002 => Some(OpCode::Insert),
            2004 => Some(OpCode::Query),
            2005 => Some(OpCode::GetMore),
            2006 => Some(OpCode::Delete),
            2007 => Some(OpCode::KillCursors),
            _ => None,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let string = match *self {
            OpCode::Reply => "OP_REPLY",
            OpCode::Update => "OP_UPDATE",
            OpCode::Insert => "OP_INSERT",
            OpCode::Query => "OP_QUERY",
            OpCode::GetMore => "OP_GET_MORE",
            OpCode::Delete => "OP_DELETE",
            OpCode::KillCursors => "OP_KILL_CURSORS",
        };

        fmt.write_str(string)
    }
}

/// Represents a header in the MongoDB Wire Protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// The length of the entire message in bytes, header included.
    pub message_length: i32,
    /// Uniquely identifies the request.
    pub request_id: i32,
    /// For a reply, the request id of the message being responded to;
    /// zero otherwise.
    pub response_to: i32,
    /// Identifies the type of the message.
    pub op_code: OpCode,
}

impl Header {
    fn new(message_length: i32, request_id: i32, response_to: i32, op_code: OpCode) -> Header {
        Header {
            message_length: message_length,
            request_id: request_id,
            response_to: response_to,
            op_code: op_code,
        }
    }

    /// Constructs a new header for an update.
    pub fn new_update(message_length: i32, request_id: i32) -> Header {
        Header::new(message_length, request_id, 0, OpCode::Update)
    }

    /// Constructs a new header for an insertion.
    pub fn new_insert(message_length: i32, request_id: i32) -> Header {
        Header::new(message_length, request_id, 0, OpCode::Insert)
    }

    /// Constructs a new header for a query.
    pub fn new_query(message_length: i32, request_id: i32) -> Header {
        Header::new(message_length, request_id, 0, OpCode::Query)
    }

    /// Constructs a new header for a "get more" request.
    pub fn new_get_more(message_length: i32, request_id: i32) -> Header {
        Header::new(message_length, request_id, 0, OpCode::GetMore)
    }

    /// Constructs a new header for a deletion.
    pub fn new_delete(message_length: i32, request_id: i32) -> Header {
        Header::new(message_length, request_id, 0, OpCode::Delete)
    }

    /// Constructs a new header for a "kill cursors" request.
    pub fn new_kill_cursors(message_length: i32, request_id: i32) -> Header {
        Header::new(message_length, request_id, 0, OpCode::KillCursors)
    }

    /// Writes the serialized header to a buffer.
    pub fn write<W: Write>(&self, buffer: &mut W) -> Result<()> {
        buffer.write_i32::<LittleEndian>(self.message_length)?;
        buffer.write_i32::<LittleEndian>(self.request_id)?;
        buffer.write_i32::<LittleEndian>(self.response_to)?;
        buffer.write_i32::<LittleEndian>(self.op_code as i32)?;
        Ok(())
    }

    /// Reads a serialized header from a buffer.
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
