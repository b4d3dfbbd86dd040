//! A single pipelined connection to one MongoDB server.
use Result;
use connstring;
use wire_protocol::operations::Message;

use bufstream::BufStream;
use std::collections::HashMap;
use std::io::Write;
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicIsize, Ordering};

/// An ordered byte channel to a single MongoDB server.
///
/// All driver operations funnel through [`send`](#method.send) (fire-and-forget
/// notices) and [`call`](#method.call) (a pipelined round-trip). The connection
/// may be shared between threads; writes of a batch happen under one lock so
/// the server observes them contiguously, and replies are claimed by request
/// id so callers may resolve their promises in any order.
pub struct Connection {
    // Request id source; the server echoes the id in `response_to`.
    req_id: AtomicIsize,
    stream: Mutex<BufStream<TcpStream>>,
    // Replies read off the stream on behalf of other outstanding promises.
    stashed: Mutex<HashMap<i32, Message>>,
}

impl Connection {
    /// Opens a connection to a single MongoDB server.
    pub fn connect(host: &str, port: u16) -> Result<Connection> {
        let socket = TcpStream::connect((host, port))?;

        Ok(Connection {
            req_id: AtomicIsize::new(1),
            stream: Mutex::new(BufStream::new(socket)),
            stashed: Mutex::new(HashMap::new()),
        })
    }

    /// Opens a connection to the server named by a MongoDB connection
    /// string URI.
    pub fn with_uri(uri: &str) -> Result<Connection> {
        let config = connstring::parse(uri)?;
        Connection::connect(&config.host, config.port)
    }

    /// Returns a unique operational request id.
    pub fn next_request_id(&self) -> i32 {
        self.req_id.fetch_add(1, Ordering::SeqCst) as i32
    }

    /// Sends a batch of notices. The server does not respond to any of them.
    pub fn send(&self, notices: &[Message]) -> Result<()> {
        let mut stream = self.stream.lock()?;

        for notice in notices {
            notice.write(&mut *stream)?;
        }

        stream.flush()?;
        Ok(())
    }

    /// Sends a batch of notices followed by a request in the same batch and
    /// returns a promise for the request's reply.
    ///
    /// The reply is not read here; it is claimed from the stream when the
    /// promise is resolved. Several promises may be outstanding at once.
    pub fn call(conn: &Arc<Connection>, notices: &[Message], request: Message) -> Result<ReplyPromise> {
        let request_id = request.request_id();

        {
            let mut stream = conn.stream.lock()?;

            for notice in notices {
                notice.write(&mut *stream)?;
            }

            request.write(&mut *stream)?;
            stream.flush()?;
        }

        Ok(ReplyPromise {
            conn: conn.clone(),
            request_id: request_id,
        })
    }

    // Claims the reply addressed to `request_id`, reading replies off the
    // stream in arrival order and stashing the ones that belong to other
    // outstanding promises.
    fn receive(&self, request_id: i32) -> Result<Message> {
        if let Some(reply) = self.stashed.lock()?.remove(&request_id) {
            return Ok(reply);
        }

        let mut stream = self.stream.lock()?;

        // Another caller may have claimed the stream first and stashed our
        // reply while we were waiting for the lock.
        if let Some(reply) = self.stashed.lock()?.remove(&request_id) {
            return Ok(reply);
        }

        loop {
            let reply = Message::read(&mut *stream)?;
            let response_to = reply.response_to();

            if response_to == request_id {
                return Ok(reply);
            }

            self.stashed.lock()?.insert(response_to, reply);
        }
    }
}

/// A reply that has been requested but not yet observed.
///
/// Resolving blocks on the connection's receive path until the server's
/// reply for this request arrives. Dropping an unresolved promise abandons
/// the reply; it will be stashed and discarded with the connection.
pub struct ReplyPromise {
    conn: Arc<Connection>,
    request_id: i32,
}

impl ReplyPromise {
    /// Blocks until the reply for this request is available.
    pub fn resolve(self) -> Result<Message> {
        self.conn.receive(self.request_id)
    }
}
