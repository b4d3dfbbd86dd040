//! Grouped aggregation over a collection.
use bson::{Bson, Document};

/// How documents are partitioned into groups: either by a set of named
/// fields, or by a JavaScript function computing a key object per document.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupKey {
    Fields(Vec<String>),
    Function(String),
}

/// Configuration for a `group` command.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// The collection to group over.
    pub coll: String,
    pub key: GroupKey,
    /// JavaScript aggregating each document into its group's accumulator.
    pub reduce: String,
    /// The initial accumulator for every group.
    pub initial: Document,
    /// Restricts grouping to the documents matching this selector.
    pub cond: Document,
    /// JavaScript applied to each accumulator once grouping is finished.
    pub finalize: Option<String>,
}

impl Group {
    /// Creates a group configuration over every document of a collection,
    /// with no finalizer.
    pub fn new(coll: &str, key: GroupKey, reduce: &str, initial: Document) -> Group {
        Group {
            coll: String::from(coll),
            key: key,
            reduce: String::from(reduce),
            initial: initial,
            cond: Document::new(),
            finalize: None,
        }
    }

    /// Serializes the configuration into the inner document of a `group`
    /// command.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();

        if let Some(ref finalize) = self.finalize {
            doc.insert("finalize", Bson::JavaScriptCode(finalize.clone()));
        }

        doc.insert("ns", self.coll.clone());

        match self.key {
            GroupKey::Fields(ref fields) => {
                let mut key = Document::new();
                for field in fields {
                    key.insert(field.clone(), true);
                }
                doc.insert("key", key);
            }
            GroupKey::Function(ref keyf) => {
                doc.insert("$keyf", Bson::JavaScriptCode(keyf.clone()));
            }
        }

        doc.insert("$reduce", Bson::JavaScriptCode(self.reduce.clone()));
        doc.insert("initial", self.initial.clone());
        doc.insert("cond", self.cond.clone());
        doc
    }
}
