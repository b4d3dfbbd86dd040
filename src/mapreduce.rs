//! Map-reduce over a collection.
use bson::{Bson, Document};

/// Configuration for a `mapreduce` command.
///
/// The output lands in the collection named by the reply's `result` field
/// unless `out` redirects it.
#[derive(Debug, Clone, PartialEq)]
pub struct MapReduce {
    /// The collection to map over.
    pub coll: String,
    /// JavaScript emitting zero or more key/value pairs per document.
    pub map: String,
    /// JavaScript folding the values emitted under one key into a single
    /// value.
    pub reduce: String,
    /// Restricts mapping to the documents matching this selector.
    pub selector: Document,
    /// Sorts the input documents before mapping.
    pub sort: Document,
    /// Caps the number of input documents; 0 means no cap.
    pub limit: i64,
    /// Names or describes the output collection.
    pub out: Option<Bson>,
    /// JavaScript applied to each reduced value before output.
    pub finalize: Option<String>,
    /// Keeps the temporary output collection past the connection's end.
    pub keep_temp: bool,
    /// Global variables visible to the map, reduce, and finalize functions.
    pub scope: Document,
    /// Asks the server to include timing information in the reply.
    pub verbose: bool,
}

/// Creates a map-reduce configuration over every document of a collection.
pub fn map_reduce(coll: &str, map: &str, reduce: &str) -> MapReduce {
    MapReduce {
        coll: String::from(coll),
        map: String::from(map),
        reduce: String::from(reduce),
        selector: Document::new(),
        sort: Document::new(),
        limit: 0,
        out: None,
        finalize: None,
        keep_temp: false,
        scope: Document::new(),
        verbose: false,
    }
}

impl MapReduce {
    /// Serializes the configuration into a `mapreduce` command document.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();

        doc.insert("mapreduce", self.coll.clone());

        if let Some(ref out) = self.out {
            doc.insert("out", out.clone());
        }

        if let Some(ref finalize) = self.finalize {
            doc.insert("finalize", Bson::JavaScriptCode(finalize.clone()));
        }

        doc.insert("map", Bson::JavaScriptCode(self.map.clone()));
        doc.insert("reduce", Bson::JavaScriptCode(self.reduce.clone()));
        doc.insert("query", self.selector.clone());
        doc.insert("sort", self.sort.clone());
        doc.insert("limit", self.limit);
        doc.insert("keeptemp", self.keep_temp);
        doc.insert("scope", self.scope.clone());
        doc.insert("verbose", self.verbose);
        doc
    }
}
