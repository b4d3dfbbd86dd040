//! Lazily returns documents from a server-side cursor, one batch at a time.
use bson::{Bson, Document};
use connection::{Connection, ReplyPromise};
use Error::{CursorNotFound, QueryFailure, ResponseError};
use Result;
use query::batch_size_remaining_limit;
use wire_protocol::flags::OpReplyFlags;
use wire_protocol::operations::Message;

use std::collections::VecDeque;
use std::mem;
use std::sync::{Arc, Mutex};

/// One observed batch of a server-side cursor.
///
/// A zero `cursor_id` means the server holds no more data for this cursor;
/// once it has been observed no further batches are requested.
#[derive(Debug)]
pub struct CursorState {
    // The limit to carry into the next "get more" request.
    remaining_limit: u32,
    cursor_id: i64,
    buffer: VecDeque<Document>,
}

impl CursorState {
    fn exhausted() -> CursorState {
        CursorState {
            remaining_limit: 0,
            cursor_id: 0,
            buffer: VecDeque::new(),
        }
    }
}

// A batch that has been observed, or the promise of one in flight. The
// promise carries the limit remaining once it lands.
enum State {
    Delayed(ReplyPromise, u32),
    Ready(CursorState),
}

/// Maintains ownership of a server-side cursor and lazily returns documents
/// from a query.
///
/// The next batch is requested as soon as the current one is handed out, so
/// the server round-trip overlaps with the caller consuming documents. A
/// drained cursor returns `None` from [`next`](#method.next); a dropped
/// cursor makes a best-effort attempt to kill its server-side half.
pub struct Cursor {
    conn: Arc<Connection>,
    namespace: String,
    batch_size: u32,
    state: Mutex<State>,
}

// Converts a reply into cursor state, raising the failure the server
// flagged, if any.
fn from_reply(remaining_limit: u32, reply: Message) -> Result<CursorState> {
    match reply {
        Message::OpReply {
            flags,
            cursor_id,
            documents,
            ..
        } => {
            if flags.contains(OpReplyFlags::CURSOR_NOT_FOUND) {
                return Err(CursorNotFound(cursor_id));
            }

            if flags.contains(OpReplyFlags::QUERY_FAILURE) {
                let message = match documents.first().and_then(|doc| doc.get("$err")) {
                    Some(&Bson::String(ref err)) => err.clone(),
                    _ => panic!("Server flagged a query failure without a $err document."),
                };
                return Err(QueryFailure(message));
            }

            Ok(CursorState {
                remaining_limit: remaining_limit,
                cursor_id: cursor_id,
                buffer: documents.into_iter().collect(),
            })
        }
        _ => Err(ResponseError(
            String::from("Expected OP_REPLY while reading a cursor batch."),
        )),
    }
}

impl Cursor {
    // Wraps the reply promise of a freshly issued query.
    pub(crate) fn delayed(
        conn: Arc<Connection>,
        namespace: String,
        batch_size: u32,
        promise: ReplyPromise,
        remaining_limit: u32,
    ) -> Cursor {
        Cursor {
            conn: conn,
            namespace: namespace,
            batch_size: batch_size,
            state: Mutex::new(State::Delayed(promise, remaining_limit)),
        }
    }

    /// Attempts to read a document from the cursor, requesting the next
    /// batch from the server when this one is handed out.
    ///
    /// Returns `Ok(None)` once the cursor is exhausted; resolving a batch
    /// that the server failed leaves the cursor closed and returns the
    /// failure.
    pub fn next(&self) -> Result<Option<Document>> {
        let mut state = self.state.lock()?;
        let mut batch = Cursor::force(&mut state)?;

        let doc = match batch.buffer.pop_front() {
            Some(doc) => doc,
            None => {
                if batch.cursor_id == 0 {
                    return Ok(None);
                }
                // The server promised more data for this cursor but the
                // batch came back empty; the reply cannot be trusted.
                panic!(
                    "Server returned an empty batch for live cursor {}.",
                    batch.cursor_id
                );
            }
        };

        if batch.buffer.is_empty() && batch.cursor_id != 0 {
            let (wire_batch, remaining_limit) =
                batch_size_remaining_limit(self.batch_size, batch.remaining_limit);
            let get_more = Message::new_get_more(
                self.conn.next_request_id(),
                self.namespace.clone(),
                wire_batch,
                batch.cursor_id,
            );
            let promise = Connection::call(&self.conn, &[], get_more)?;
            *state = State::Delayed(promise, remaining_limit);
        } else {
            *state = State::Ready(batch);
        }

        Ok(Some(doc))
    }

    /// Attempts to read up to `n` documents from the cursor, stopping early
    /// if the cursor is exhausted.
    pub fn next_n(&self, n: usize) -> Result<Vec<Document>> {
        let mut docs = Vec::new();

        for _ in 0..n {
            match self.next()? {
                Some(doc) => docs.push(doc),
                None => break,
            }
        }

        Ok(docs)
    }

    /// Reads every remaining document out of the cursor.
    pub fn rest(&self) -> Result<Vec<Document>> {
        let mut docs = Vec::new();

        while let Some(doc) = self.next()? {
            docs.push(doc);
        }

        Ok(docs)
    }

    /// Returns `true` if the cursor holds no more documents locally and the
    /// server holds none for it either.
    pub fn is_closed(&self) -> Result<bool> {
        let mut state = self.state.lock()?;
        let batch = Cursor::force(&mut state)?;
        let closed = batch.cursor_id == 0 && batch.buffer.is_empty();
        *state = State::Ready(batch);
        Ok(closed)
    }

    /// Discards the cursor, killing its server-side half if one is still
    /// live. Closing an already-closed cursor does nothing.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock()?;

        let cursor_id = match mem::replace(&mut *state, State::Ready(CursorState::exhausted())) {
            // A cursor whose batch cannot be resolved has nothing left to
            // kill; the server has already discarded it.
            State::Delayed(promise, remaining_limit) => {
                match promise.resolve().and_then(|reply| from_reply(remaining_limit, reply)) {
                    Ok(batch) => batch.cursor_id,
                    Err(_) => 0,
                }
            }
            State::Ready(batch) => batch.cursor_id,
        };

        if cursor_id != 0 {
            let kill = Message::new_kill_cursors(self.conn.next_request_id(), vec![cursor_id]);
            self.conn.send(&[kill])?;
        }

        Ok(())
    }

    // Resolves the current state into an observed batch. A batch that fails
    // to resolve leaves the cursor closed behind it.
    fn force(state: &mut State) -> Result<CursorState> {
        match mem::replace(state, State::Ready(CursorState::exhausted())) {
            State::Delayed(promise, remaining_limit) => {
                from_reply(remaining_limit, promise.resolve()?)
            }
            State::Ready(batch) => Ok(batch),
        }
    }
}

impl Iterator for Cursor {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Result<Document>> {
        match Cursor::next(self) {
            Ok(Some(doc)) => Some(Ok(doc)),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        // Attempt to kill the server-side cursor, or give up if the
        // connection is gone.
        let _ = self.close();
    }
}
