//! An in-process wire protocol server for driving the client end to end.
//!
//! The server accepts one connection, parses every client message with its
//! own reader (independent of the driver's serializers), records it, and
//! answers queries from a test-provided script. Joining the server after the
//! connection closes yields the full observed request sequence.
use bson::{self, Document};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use mongolite::{Connection, Context};

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub const CURSOR_NOT_FOUND: i32 = 1;
pub const QUERY_FAILURE: i32 = 2;

/// A client message observed by the mock server.
#[derive(Debug, Clone)]
pub enum Request {
    Query {
        request_id: i32,
        flags: i32,
        namespace: String,
        number_to_skip: i32,
        number_to_return: i32,
        query: Document,
        projector: Option<Document>,
    },
    GetMore {
        request_id: i32,
        namespace: String,
        number_to_return: i32,
        cursor_id: i64,
    },
    Insert {
        request_id: i32,
        namespace: String,
        documents: Vec<Document>,
    },
    Update {
        request_id: i32,
        namespace: String,
        flags: i32,
        selector: Document,
        update: Document,
    },
    Delete {
        request_id: i32,
        namespace: String,
        flags: i32,
        selector: Document,
    },
    KillCursors { request_id: i32, cursor_ids: Vec<i64> },
}

impl Request {
    fn request_id(&self) -> i32 {
        match *self {
            Request::Query { request_id, .. } |
            Request::GetMore { request_id, .. } |
            Request::Insert { request_id, .. } |
            Request::Update { request_id, .. } |
            Request::Delete { request_id, .. } |
            Request::KillCursors { request_id, .. } => request_id,
        }
    }

    /// The query document, for requests that carry one.
    pub fn query_doc(&self) -> &Document {
        match *self {
            Request::Query { ref query, .. } => query,
            ref other => panic!("Request {:?} carries no query document.", other),
        }
    }
}

/// A scripted server reply.
pub struct Reply {
    pub flags: i32,
    pub cursor_id: i64,
    pub documents: Vec<Document>,
}

impl Reply {
    /// A complete reply: documents with no live cursor behind them.
    pub fn docs(documents: Vec<Document>) -> Reply {
        Reply {
            flags: 0,
            cursor_id: 0,
            documents: documents,
        }
    }

    /// One batch of a cursor the server keeps open.
    pub fn batch(cursor_id: i64, documents: Vec<Document>) -> Reply {
        Reply {
            flags: 0,
            cursor_id: cursor_id,
            documents: documents,
        }
    }

    /// A reply carrying only response flags.
    pub fn flagged(flags: i32) -> Reply {
        Reply {
            flags: flags,
            cursor_id: 0,
            documents: Vec::new(),
        }
    }
}

pub struct MockServer {
    port: u16,
    handle: JoinHandle<Vec<Request>>,
}

impl MockServer {
    /// Opens a driver context talking to this server.
    pub fn context(&self, db: &str) -> Context {
        let conn = Connection::connect("127.0.0.1", self.port).unwrap();
        Context::new(Arc::new(conn), db)
    }

    /// Waits for the client to hang up and returns every observed request
    /// in arrival order.
    pub fn finish(self) -> Vec<Request> {
        self.handle.join().unwrap()
    }
}

/// Starts a server on a random local port. The script is consulted for
/// every observed request; returning a reply answers the request.
pub fn start<F>(script: F) -> MockServer
where
    F: FnMut(&Request) -> Option<Reply> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || serve(listener, script));

    MockServer {
        port: port,
        handle: handle,
    }
}

fn serve<F>(listener: TcpListener, mut script: F) -> Vec<Request>
where
    F: FnMut(&Request) -> Option<Reply>,
{
    let (mut stream, _) = listener.accept().unwrap();
    let mut observed = Vec::new();

    while let Some(request) = read_request(&mut stream) {
        if let Some(reply) = script(&request) {
            write_reply(&mut stream, request.request_id(), &reply);
        }
        observed.push(request);
    }

    observed
}

fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let message_length = match stream.read_i32::<LittleEndian>() {
        Ok(length) => length,
        // The client hung up.
        Err(_) => return None,
    };
    let request_id = stream.read_i32::<LittleEndian>().unwrap();
    let _response_to = stream.read_i32::<LittleEndian>().unwrap();
    let op_code = stream.read_i32::<LittleEndian>().unwrap();

    let mut body = vec![0; (message_length - 16) as usize];
    stream.read_exact(&mut body).unwrap();
    let mut body = &body[..];

    Some(match op_code {
        // OP_UPDATE
        2001 => {
            let _zero = body.read_i32::<LittleEndian>().unwrap();
            let namespace = read_cstring(&mut body);
            let flags = body.read_i32::<LittleEndian>().unwrap();
            let selector = bson::decode_document(&mut body).unwrap();
            let update = bson::decode_document(&mut body).unwrap();
            Request::Update {
                request_id: request_id,
                namespace: namespace,
                flags: flags,
                selector: selector,
                update: update,
            }
        }
        // OP_INSERT
        2002 => {
            let _flags = body.read_i32::<LittleEndian>().unwrap();
            let namespace = read_cstring(&mut body);
            let mut documents = Vec::new();
            while !body.is_empty() {
                documents.push(bson::decode_document(&mut body).unwrap());
            }
            Request::Insert {
                request_id: request_id,
                namespace: namespace,
                documents: documents,
            }
        }
        // OP_QUERY
        2004 => {
            let flags = body.read_i32::<LittleEndian>().unwrap();
            let namespace = read_cstring(&mut body);
            let number_to_skip = body.read_i32::<LittleEndian>().unwrap();
            let number_to_return = body.read_i32::<LittleEndian>().unwrap();
            let query = bson::decode_document(&mut body).unwrap();
            let projector = if body.is_empty() {
                None
            } else {
                Some(bson::decode_document(&mut body).unwrap())
            };
            Request::Query {
                request_id: request_id,
                flags: flags,
                namespace: namespace,
                number_to_skip: number_to_skip,
                number_to_return: number_to_return,
                query: query,
                projector: projector,
            }
        }
        // OP_GET_MORE
        2005 => {
            let _zero = body.read_i32::<LittleEndian>().unwrap();
            let namespace = read_cstring(&mut body);
            let number_to_return = body.read_i32::<LittleEndian>().unwrap();
            let cursor_id = body.read_i64::<LittleEndian>().unwrap();
            Request::GetMore {
                request_id: request_id,
                namespace: namespace,
                number_to_return: number_to_return,
                cursor_id: cursor_id,
            }
        }
        // OP_DELETE
        2006 => {
            let _zero = body.read_i32::<LittleEndian>().unwrap();
            let namespace = read_cstring(&mut body);
            let flags = body.read_i32::<LittleEndian>().unwrap();
            let selector = bson::decode_document(&mut body).unwrap();
            Request::Delete {
                request_id: request_id,
                namespace: namespace,
                flags: flags,
                selector: selector,
            }
        }
        // OP_KILL_CURSORS
        2007 => {
            let _zero = body.read_i32::<LittleEndian>().unwrap();
            let count = body.read_i32::<LittleEndian>().unwrap();
            let mut cursor_ids = Vec::new();
            for _ in 0..count {
                cursor_ids.push(body.read_i64::<LittleEndian>().unwrap());
            }
            Request::KillCursors {
                request_id: request_id,
                cursor_ids: cursor_ids,
            }
        }
        other => panic!("Unexpected opcode {} from the client.", other),
    })
}

fn read_cstring(body: &mut &[u8]) -> String {
    let mut bytes = Vec::new();
    loop {
        let byte = body.read_u8().unwrap();
        if byte == 0 {
            break;
        }
        bytes.push(byte);
    }
    String::from_utf8(bytes).unwrap()
}

fn write_reply(stream: &mut TcpStream, response_to: i32, reply: &Reply) {
    let mut payload = Vec::new();
    for doc in &reply.documents {
        bson::encode_document(&mut payload, doc).unwrap();
    }

    let total_length = 16 + 20 + payload.len() as i32;
    stream.write_i32::<LittleEndian>(total_length).unwrap();
    stream.write_i32::<LittleEndian>(0).unwrap();
    stream.write_i32::<LittleEndian>(response_to).unwrap();
    stream.write_i32::<LittleEndian>(1).unwrap(); // OP_REPLY
    stream.write_i32::<LittleEndian>(reply.flags).unwrap();
    stream.write_i64::<LittleEndian>(reply.cursor_id).unwrap();
    stream.write_i32::<LittleEndian>(0).unwrap();
    stream
        .write_i32::<LittleEndian>(reply.documents.len() as i32)
        .unwrap();
    stream.write_all(&payload).unwrap();
    stream.flush().unwrap();
}
