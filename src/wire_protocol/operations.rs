//! Wire protocol operational client-server communication logic.

use bson::{self, Document};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use Error::{ArgumentError, ResponseError};
use Result;
use wire_protocol::header::{Header, OpCode};
use wire_protocol::flags::{OpDeleteFlags, OpInsertFlags, OpQueryFlags, OpReplyFlags, OpUpdateFlags};

use std::io::{Read, Write};
use std::mem;

trait ByteLength {
    /// Calculates the number of bytes in the serialized version of the struct.
    fn byte_length(&self) -> Result<i32>;
}

impl ByteLength for Document {
    fn byte_length(&self) -> Result<i32> {
        let mut buffer = Vec::new();
        bson::encode_document(&mut buffer, self)?;
        Ok(buffer.len() as i32)
    }
}

impl ByteLength for [Document] {
    fn byte_length(&self) -> Result<i32> {
        let mut length = 0;
        for doc in self {
            length += doc.byte_length()?;
        }
        Ok(length)
    }
}

/// Represents a message in the MongoDB Wire Protocol.
///
/// `OpUpdate`, `OpInsert`, `OpDelete`, and `OpKillCursors` are *notices*:
/// fire-and-forget messages the server never responds to. `OpQuery` and
/// `OpGetMore` each expect an `OpReply`, which is the only message the
/// client reads.
#[derive(Debug, Clone, PartialEq)]
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
    OpUpdate {
        /// The message header.
        header: Header,
        // The wire protocol specifies that a 32-bit 0 field goes here
        /// The full qualified name of the collection, beginning with the
        /// database name and a dot separator.
        namespace: String,
        /// A bit vector of update options.
        flags: OpUpdateFlags,
        /// Identifies the document(s) to be updated.
        selector: Document,
        /// Instruction document for how to update the document(s).
        update: Document,
    },
    OpInsert {
        /// The message header.
        header: Header,
        /// A bit vector of insert options.
        flags: OpInsertFlags,
        /// The full qualified name of the collection, beginning with the
        /// database name and a dot separator.
        namespace: String,
        /// The documents to be inserted.
        documents: Vec<Document>,
    },
    OpQuery {
        /// The message header.
        header: Header,
        /// A bit vector of query options.
        flags: OpQueryFlags,
        /// The full qualified name of the collection, beginning with the
        /// database name and a dot separator.
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
    OpGetMore {
        /// The message header.
        header: Header,
        // The wire protocol specifies that a 32-bit 0 field goes here
        /// The full qualified name of the collection, beginning with the
        /// database name and a dot separator.
        namespace: String,
        /// The total number of documents that should be returned by the query.
        number_to_return: i32,
        /// Uniquely identifies the cursor being read from.
        cursor_id: i64,
    },
    OpDelete {
        /// The message header.
        header: Header,
        // The wire protocol specifies that a 32-bit 0 field goes here
        /// The full qualified name of the collection, beginning with the
        /// database name and a dot separator.
        namespace: String,
        /// A bit vector of delete options.
        flags: OpDeleteFlags,
        /// Identifies the document(s) to be removed.
        selector: Document,
    },
    OpKillCursors {
        /// The message header.
        header: Header,
        // The wire protocol specifies that a 32-bit 0 field goes here
        /// The server-side cursors to be discarded.
        cursor_ids: Vec<i64>,
    },
}

impl Message {
    /// Constructs a new message for a reply.
    fn new_reply(
        header: Header,
        flags: i32,
        cursor_id: i64,
        starting_from: i32,
        number_returned: i32,
        documents: Vec<Document>,
    ) -> Message {
        Message::OpReply {
            header: header,
            flags: OpReplyFlags::from_bits_truncate(flags),
            cursor_id: cursor_id,
            starting_from: starting_from,
            number_returned: number_returned,
            documents: documents,
        }
    }

    /// Constructs a new message for an update.
    pub fn new_update(
        request_id: i32,
        namespace: String,
        flags: OpUpdateFlags,
        selector: Document,
        update: Document,
    ) -> Result<Message> {
        let header_length = mem::size_of::<Header>() as i32;

        // Add an extra byte after the string for null-termination.
        let string_length = namespace.len() as i32 + 1;

        // There are two i32 fields -- `flags` is represented in the struct as
        // a bit vector, and the wire protocol-specified ZERO field.
        let i32_length = mem::size_of::<i32>() as i32 * 2;

        let selector_length = selector.byte_length()?;
        let update_length = update.byte_length()?;

        let total_length =
            header_length + string_length + i32_length + selector_length + update_length;

        let header = Header::new_update(total_length, request_id);

        Ok(Message::OpUpdate {
            header: header,
            namespace: namespace,
            flags: flags,
            selector: selector,
            update: update,
        })
    }

    /// Constructs a new message request for an insertion.
    pub fn new_insert(
        request_id: i32,
        flags: OpInsertFlags,
        namespace: String,
        documents: Vec<Document>,
    ) -> Result<Message> {
        let header_length = mem::size_of::<Header>() as i32;
        let flags_length = mem::size_of::<i32>() as i32;

        // Add an extra byte after the string for null-termination.
        let string_length = namespace.len() as i32 + 1;

        let total_length =
            header_length + flags_length + string_length + documents[..].byte_length()?;

        let header = Header::new_insert(total_length, request_id);

        Ok(Message::OpInsert {
            header: header,
            flags: flags,
            namespace: namespace,
            documents: documents,
        })
    }

    /// Constructs a new message request for a query.
    pub fn new_query(
        request_id: i32,
        flags: OpQueryFlags,
        namespace: String,
        number_to_skip: i32,
        number_to_return: i32,
        query: Document,
        return_field_selector: Option<Document>,
    ) -> Result<Message> {
        let header_length = mem::size_of::<Header>() as i32;

        // There are three i32 fields in an OpQuery (since OpQueryFlags is
        // represented as a 32-bit vector in the wire protocol).
        let i32_length = 3 * mem::size_of::<i32>() as i32;

        // Add an extra byte after the string for null-termination.
        let string_length = namespace.len() as i32 + 1;

        let bson_length = query.byte_length()?;

        // Add the length of the optional BSON document only if it exists.
        let option_length = match return_field_selector {
            Some(ref doc) => doc.byte_length()?,
            None => 0,
        };

        let total_length = header_length + i32_length + string_length + bson_length + option_length;

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

    /// Constructs a new "get more" request message.
    pub fn new_get_more(
        request_id: i32,
        namespace: String,
        number_to_return: i32,
        cursor_id: i64,
    ) -> Message {
        let header_length = mem::size_of::<Header>() as i32;

        // There are two i32 fields because of the reserved "ZERO".
        let i32_length = 2 * mem::size_of::<i32>() as i32;

        // Add an extra byte after the string for null-termination.
        let string_length = namespace.len() as i32 + 1;

        let i64_length = mem::size_of::<i64>() as i32;
        let total_length = header_length + i32_length + string_length + i64_length;

        let header = Header::new_get_more(total_length, request_id);

        Message::OpGetMore {
            header: header,
            namespace: namespace,
            number_to_return: number_to_return,
            cursor_id: cursor_id,
        }
    }

    /// Constructs a new message for a deletion.
    pub fn new_delete(
        request_id: i32,
        namespace: String,
        flags: OpDeleteFlags,
        selector: Document,
    ) -> Result<Message> {
        let header_length = mem::size_of::<Header>() as i32;

        // The reserved "ZERO" and the flag bit vector.
        let i32_length = 2 * mem::size_of::<i32>() as i32;

        // Add an extra byte after the string for null-termination.
        let string_length = namespace.len() as i32 + 1;

        let total_length = header_length + i32_length + string_length + selector.byte_length()?;

        let header = Header::new_delete(total_length, request_id);

        Ok(Message::OpDelete {
            header: header,
            namespace: namespace,
            flags: flags,
            selector: selector,
        })
    }

    /// Constructs a new "kill cursors" request message.
    pub fn new_kill_cursors(request_id: i32, cursor_ids: Vec<i64>) -> Message {
        let header_length = mem::size_of::<Header>() as i32;

        // The reserved "ZERO" and the number of cursor ids.
        let i32_length = 2 * mem::size_of::<i32>() as i32;

        let ids_length = (cursor_ids.len() * mem::size_of::<i64>()) as i32;
        let total_length = header_length + i32_length + ids_length;

        let header = Header::new_kill_cursors(total_length, request_id);

        Message::OpKillCursors {
            header: header,
            cursor_ids: cursor_ids,
        }
    }

    /// Returns the request id of the message.
    pub fn request_id(&self) -> i32 {
        self.header().request_id
    }

    /// For a reply, returns the request id of the message being responded to.
    pub fn response_to(&self) -> i32 {
        self.header().response_to
    }

    fn header(&self) -> &Header {
        match *self {
            Message::OpReply { ref header, .. } |
            Message::OpUpdate { ref header, .. } |
            Message::OpInsert { ref header, .. } |
            Message::OpQuery { ref header, .. } |
            Message::OpGetMore { ref header, .. } |
            Message::OpDelete { ref header, .. } |
            Message::OpKillCursors { ref header, .. } => header,
        }
    }

    /// Writes a serialized update message to a given buffer.
    fn write_update<W: Write>(
        buffer: &mut W,
        header: &Header,
        namespace: &str,
        flags: &OpUpdateFlags,
        selector: &Document,
        update: &Document,
    ) -> Result<()> {
        header.write(buffer)?;

        // Write ZERO field
        buffer.write_i32::<LittleEndian>(0)?;

        Message::write_cstring(buffer, namespace)?;
        buffer.write_i32::<LittleEndian>(flags.bits())?;

        bson::encode_document(buffer, selector)?;
        bson::encode_document(buffer, update)?;
        Ok(())
    }

    /// Writes a serialized insert message to a given buffer.
    fn write_insert<W: Write>(
        buffer: &mut W,
        header: &Header,
        flags: &OpInsertFlags,
        namespace: &str,
        documents: &[Document],
    ) -> Result<()> {
        header.write(buffer)?;
        buffer.write_i32::<LittleEndian>(flags.bits())?;
        Message::write_cstring(buffer, namespace)?;

        for doc in documents {
            bson::encode_document(buffer, doc)?;
        }

        Ok(())
    }

    /// Writes a serialized query message to a given buffer.
    fn write_query<W: Write>(
        buffer: &mut W,
        header: &Header,
        flags: &OpQueryFlags,
        namespace: &str,
        number_to_skip: i32,
        number_to_return: i32,
        query: &Document,
        return_field_selector: &Option<Document>,
    ) -> Result<()> {
        header.write(buffer)?;
        buffer.write_i32::<LittleEndian>(flags.bits())?;
        Message::write_cstring(buffer, namespace)?;
        buffer.write_i32::<LittleEndian>(number_to_skip)?;
        buffer.write_i32::<LittleEndian>(number_to_return)?;
        bson::encode_document(buffer, query)?;

        if let Some(ref doc) = *return_field_selector {
            bson::encode_document(buffer, doc)?;
        }

        Ok(())
    }

    /// Writes a serialized "get more" request to a given buffer.
    fn write_get_more<W: Write>(
        buffer: &mut W,
        header: &Header,
        namespace: &str,
        number_to_return: i32,
        cursor_id: i64,
    ) -> Result<()> {
        header.write(buffer)?;

        // Write ZERO field
        buffer.write_i32::<LittleEndian>(0)?;

        Message::write_cstring(buffer, namespace)?;
        buffer.write_i32::<LittleEndian>(number_to_return)?;
        buffer.write_i64::<LittleEndian>(cursor_id)?;
        Ok(())
    }

    /// Writes a serialized delete message to a given buffer.
    fn write_delete<W: Write>(
        buffer: &mut W,
        header: &Header,
        namespace: &str,
        flags: &OpDeleteFlags,
        selector: &Document,
    ) -> Result<()> {
        header.write(buffer)?;

        // Write ZERO field
        buffer.write_i32::<LittleEndian>(0)?;

        Message::write_cstring(buffer, namespace)?;
        buffer.write_i32::<LittleEndian>(flags.bits())?;
        bson::encode_document(buffer, selector)?;
        Ok(())
    }

    /// Writes a serialized "kill cursors" request to a given buffer.
    fn write_kill_cursors<W: Write>(
        buffer: &mut W,
        header: &Header,
        cursor_ids: &[i64],
    ) -> Result<()> {
        header.write(buffer)?;

        // Write ZERO field
        buffer.write_i32::<LittleEndian>(0)?;

        buffer.write_i32::<LittleEndian>(cursor_ids.len() as i32)?;
        for &id in cursor_ids {
            buffer.write_i64::<LittleEndian>(id)?;
        }

        Ok(())
    }

    // Namespaces are encoded as null-terminated cstrings.
    fn write_cstring<W: Write>(buffer: &mut W, string: &str) -> Result<()> {
        buffer.write_all(string.as_bytes())?;
        buffer.write_u8(0)?;
        Ok(())
    }

    /// Attempts to write the serialized message to a buffer.
    pub fn write<W: Write>(&self, buffer: &mut W) -> Result<()> {
        match *self {
            // Only the server should send replies
            Message::OpReply { .. } => {
                Err(ArgumentError(
                    String::from("OP_REPLY should not be sent by the client."),
                ))
            }
            Message::OpUpdate {
                ref header,
                ref namespace,
                ref flags,
                ref selector,
                ref update,
            } => Message::write_update(buffer, header, namespace, flags, selector, update),
            Message::OpInsert {
                ref header,
                ref flags,
                ref namespace,
                ref documents,
            } => Message::write_insert(buffer, header, flags, namespace, documents),
            Message::OpQuery {
                ref header,
                ref flags,
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
            Message::OpGetMore {
                ref header,
                ref namespace,
                number_to_return,
                cursor_id,
            } => Message::write_get_more(buffer, header, namespace, number_to_return, cursor_id),
            Message::OpDelete {
                ref header,
                ref namespace,
                ref flags,
                ref selector,
            } => Message::write_delete(buffer, header, namespace, flags, selector),
            Message::OpKillCursors {
                ref header,
                ref cursor_ids,
            } => Message::write_kill_cursors(buffer, header, cursor_ids),
        }
    }

    /// Reads a serialized reply message from a buffer.
    fn read_reply<R: Read>(buffer: &mut R, header: Header) -> Result<Message> {
        let mut length = header.message_length - mem::size_of::<Header>() as i32;

        // Read flags
        let flags = buffer.read_i32::<LittleEndian>()?;
        length -= mem::size_of::<i32>() as i32;

        // Read cursor_id
        let cid = buffer.read_i64::<LittleEndian>()?;
        length -= mem::size_of::<i64>() as i32;

        // Read starting_from
        let sf = buffer.read_i32::<LittleEndian>()?;
        length -= mem::size_of::<i32>() as i32;

        // Read number_returned
        let nr = buffer.read_i32::<LittleEndian>()?;
        length -= mem::size_of::<i32>() as i32;

        let mut payload = vec![0; length as usize];
        buffer.read_exact(&mut payload[..])?;

        let mut documents = Vec::new();
        let mut slice = &payload[..];
        while !slice.is_empty() {
            documents.push(bson::decode_document(&mut slice)?);
        }

        Ok(Message::new_reply(header, flags, cid, sf, nr, documents))
    }

    /// Attempts to read a serialized reply message from a buffer.
    pub fn read<R: Read>(buffer: &mut R) -> Result<Message> {
        let header = Header::read(buffer)?;
        match header.op_code {
            OpCode::Reply => Message::read_reply(buffer, header),
            opcode => {
                Err(ResponseError(format!(
                    "Expected to read OpCode::Reply but instead found \
                     opcode {}",
                    opcode
                )))
            }
        }
    }
}
