//! Query descriptions and their translation into wire requests.
use bson::{Bson, Document};
use common::ReadMode;
use Result;
use wire_protocol::flags::OpQueryFlags;
use wire_protocol::operations::Message;

/// Per-query wire protocol options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOption {
    /// Leave the cursor open after the last batch; used on capped
    /// collections.
    TailableCursor,
    /// Exempt the cursor from the server's idle timeout.
    NoCursorTimeout,
    /// Block for a while for new data instead of returning an empty batch
    /// on a tailable cursor.
    AwaitData,
}

/// A filter paired with the collection it applies to. An empty selector
/// matches every document.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub selector: Document,
    pub coll: String,
}

/// Creates a selection on a collection within the current database.
pub fn select(selector: Document, coll: &str) -> Selection {
    Selection {
        selector: selector,
        coll: String::from(coll),
    }
}

/// Everything the server needs to know about a read.
///
/// `limit` of 0 means unlimited, and a `batch_size` of 0 leaves the batch
/// size up to the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub options: Vec<QueryOption>,
    pub selection: Selection,
    pub projection: Document,
    pub skip: u32,
    pub limit: u32,
    pub sort: Document,
    pub snapshot: bool,
    pub batch_size: u32,
    pub hint: Document,
}

/// Creates a query on a collection with default options.
pub fn query(selector: Document, coll: &str) -> Query {
    Query::new(select(selector, coll))
}

impl Query {
    /// Creates a query from a selection with default options.
    pub fn new(selection: Selection) -> Query {
        Query {
            options: Vec::new(),
            selection: selection,
            projection: Document::new(),
            skip: 0,
            limit: 0,
            sort: Document::new(),
            snapshot: false,
            batch_size: 0,
            hint: Document::new(),
        }
    }

    /// `self` with an upper bound on the number of documents returned.
    pub fn with_limit(mut self, limit: u32) -> Query {
        self.limit = limit;
        self
    }

    /// `self` with a sorting order.
    pub fn with_sort(mut self, sort: Document) -> Query {
        self.sort = sort;
        self
    }

    /// `self` with a specified number of documents per server batch.
    pub fn with_batch_size(mut self, batch_size: u32) -> Query {
        self.batch_size = batch_size;
        self
    }

    /// `self` returning only the fields named by the projection.
    pub fn with_projection(mut self, projection: Document) -> Query {
        self.projection = projection;
        self
    }

    /// Folds the query into a wire request against the given database,
    /// returning the request along with the limit remaining for any
    /// follow-on "get more" requests.
    pub fn build_request(
        &self,
        is_explain: bool,
        mode: ReadMode,
        db: &str,
        request_id: i32,
    ) -> Result<(Message, u32)> {
        let flags = OpQueryFlags::with_context(&self.options, mode);
        let namespace = format!("{}.{}", db, self.selection.coll);
        let (number_to_return, remaining_limit) =
            batch_size_remaining_limit(self.batch_size, self.limit);

        let message = Message::new_query(
            request_id,
            flags,
            namespace,
            self.skip as i32,
            number_to_return,
            self.wrap_selector(is_explain),
            Some(self.projection.clone()),
        )?;

        Ok((message, remaining_limit))
    }

    // Wraps the selector in a $query envelope when any special field is
    // active; a bare selector is sent otherwise.
    fn wrap_selector(&self, is_explain: bool) -> Document {
        let special =
            !self.sort.is_empty() || self.snapshot || !self.hint.is_empty() || is_explain;
        if !special {
            return self.selection.selector.clone();
        }

        let mut outer = Document::new();
        outer.insert("$query", Bson::Document(self.selection.selector.clone()));
        if !self.sort.is_empty() {
            outer.insert("$orderby", self.sort.clone());
        }
        if self.snapshot {
            outer.insert("$snapshot", true);
        }
        if !self.hint.is_empty() {
            outer.insert("$hint", self.hint.clone());
        }
        if is_explain {
            outer.insert("$explain", true);
        }
        outer
    }
}

/// Reconciles a batch size and a remaining limit into the wire batch value
/// for the next request, along with the limit left over after that batch.
///
/// The server treats a wire batch of 1 the same as -1 and closes the cursor
/// after a single document, so a batch size of exactly 1 is sent as 2. When
/// the limit is positive and no full batch fits under it, the limit is sent
/// negated: the server returns at most that many documents and closes the
/// cursor itself, so the returned remainder of 1 is never consulted.
pub fn batch_size_remaining_limit(batch_size: u32, limit: u32) -> (i32, u32) {
    let batch_size = if batch_size == 1 { 2 } else { batch_size };

    if limit == 0 {
        (batch_size as i32, 0)
    } else if 0 < batch_size && batch_size < limit {
        (batch_size as i32, limit - batch_size)
    } else {
        (-(limit as i32), 1)
    }
}
