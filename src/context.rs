//! The ambient context for driver operations.
//!
//! A [`Context`](struct.Context.html) bundles the connection with the target
//! database, the read mode, and the write mode. Contexts are immutable;
//! the scoped mutators return a derived context for the nested work and
//! leave the original untouched.
//!
//! ```no_run
//! # #[macro_use] extern crate bson;
//! # extern crate mongolite;
//! # use std::sync::Arc;
//! # use mongolite::{query, Connection, Context};
//! # fn main() {
//! let conn = Arc::new(Connection::connect("localhost", 27017).unwrap());
//! let ctx = Context::new(conn, "blog");
//!
//! ctx.insert_one("posts", doc! { "title": "Hello" }).unwrap();
//! let posts = ctx.find(query(doc! {}, "posts")).unwrap().rest().unwrap();
//! assert!(!posts.is_empty());
//! # }
//! ```
use auth;
use bson::{oid, Bson, Document};
use common::{ReadMode, WriteMode};
use connection::Connection;
use connstring;
use cursor::Cursor;
use Error::{ResponseError, WriteFailure};
use group::Group;
use mapreduce::MapReduce;
use query::{query, Query, Selection};
use Result;
use semver::Version;
use wire_protocol::flags::{OpDeleteFlags, OpInsertFlags, OpUpdateFlags};
use wire_protocol::operations::Message;

use std::sync::Arc;

/// The connection, target database, read mode, and write mode shared by a
/// group of operations.
#[derive(Clone)]
pub struct Context {
    conn: Arc<Connection>,
    database: String,
    read_mode: ReadMode,
    write_mode: WriteMode,
}

// True when a command reply carries ok = 1 in any of its numeric spellings.
fn ok_true(doc: &Document) -> bool {
    match doc.get("ok") {
        Some(&Bson::FloatingPoint(ok)) => ok == 1.0,
        Some(&Bson::I32(ok)) => ok == 1,
        Some(&Bson::I64(ok)) => ok == 1,
        Some(&Bson::Boolean(ok)) => ok,
        _ => false,
    }
}

impl Context {
    /// Creates a context on the given database, reading from the master and
    /// confirming writes.
    pub fn new(conn: Arc<Connection>, database: &str) -> Context {
        Context {
            conn: conn,
            database: String::from(database),
            read_mode: ReadMode::Master,
            write_mode: WriteMode::Safe,
        }
    }

    /// Connects to the server named by a MongoDB connection string URI and
    /// creates a context on the URI's database (or `test` if it names none).
    pub fn with_uri(uri: &str) -> Result<Context> {
        let config = connstring::parse(uri)?;
        let conn = Connection::connect(&config.host, config.port)?;
        let database = config.database.unwrap_or_else(|| String::from("test"));
        Ok(Context::new(Arc::new(conn), &database))
    }

    /// The name of the database operations are bound to.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// The read mode operations run under.
    pub fn read_mode(&self) -> ReadMode {
        self.read_mode
    }

    /// The write mode operations run under.
    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    /// A context bound to another database on the same connection.
    pub fn use_db(&self, database: &str) -> Context {
        let mut ctx = self.clone();
        ctx.database = String::from(database);
        ctx
    }

    /// A context whose reads tolerate a secondary replica.
    pub fn slave_ok(&self) -> Context {
        let mut ctx = self.clone();
        ctx.read_mode = ReadMode::SlaveOk;
        ctx
    }

    /// A context writing under the given mode.
    pub fn with_write_mode(&self, mode: WriteMode) -> Context {
        let mut ctx = self.clone();
        ctx.write_mode = mode;
        ctx
    }

    // "<db>.<coll>"; collections are always addressed through the ambient
    // database.
    fn namespace(&self, coll: &str) -> String {
        format!("{}.{}", self.database, coll)
    }

    ///////////////////////////////////////////////////////////////////////
    // Writes

    // Issues a write notice under the ambient write mode. Unsafe writes are
    // fire-and-forget; safe writes are confirmed through a getlasterror
    // command sent in the same batch as the notice.
    fn write(&self, notice: Message) -> Result<()> {
        match self.write_mode {
            WriteMode::Unsafe => self.conn.send(&[notice]),
            WriteMode::Safe => {
                let reply = self.get_last_error(&[notice])?;
                match reply.get("err") {
                    None | Some(&Bson::Null) => Ok(()),
                    Some(&Bson::String(ref err)) => {
                        let code = match reply.get("code") {
                            Some(&Bson::I32(code)) => code,
                            Some(&Bson::I64(code)) => code as i32,
                            _ => 0,
                        };
                        Err(WriteFailure(code, err.clone()))
                    }
                    Some(other) => Err(WriteFailure(0, format!("{:?}", other))),
                }
            }
        }
    }

    // Sends the notices followed by a getlasterror command in the same
    // batch, so the command observes the notices' outcome on this
    // connection.
    fn get_last_error(&self, notices: &[Message]) -> Result<Document> {
        let q = query(doc! { "getlasterror": 1 }, "$cmd").with_limit(1);
        let request_id = self.conn.next_request_id();
        let (request, remaining_limit) =
            q.build_request(false, self.read_mode, &self.database, request_id)?;

        let promise = Connection::call(&self.conn, notices, request)?;
        let cursor = Cursor::delayed(
            self.conn.clone(),
            self.namespace("$cmd"),
            q.batch_size,
            promise,
            remaining_limit,
        );

        match cursor.next()? {
            Some(doc) => Ok(doc),
            None => panic!("Server sent no reply document for getlasterror."),
        }
    }

    /// Inserts a document into a collection and returns its `_id`,
    /// generating a fresh ObjectId if the document carries none.
    pub fn insert_one(&self, coll: &str, doc: Document) -> Result<Bson> {
        let mut ids = self.insert_many(coll, vec![doc])?;
        Ok(ids.remove(0))
    }

    /// Inserts a batch of documents in one notice and returns their `_id`s
    /// in order. Documents without an `_id` are each assigned a fresh
    /// ObjectId.
    pub fn insert_many(&self, coll: &str, docs: Vec<Document>) -> Result<Vec<Bson>> {
        let mut ids = Vec::with_capacity(docs.len());
        let mut keyed_docs = Vec::with_capacity(docs.len());

        for doc in docs {
            match doc.get("_id").map(Clone::clone) {
                Some(id) => {
                    ids.push(id);
                    keyed_docs.push(doc);
                }
                None => {
                    let id = Bson::ObjectId(oid::ObjectId::new()?);
                    let mut keyed = Document::new();
                    keyed.insert("_id", id.clone());
                    for (key, value) in doc {
                        keyed.insert(key, value);
                    }
                    ids.push(id);
                    keyed_docs.push(keyed);
                }
            }
        }

        let notice = Message::new_insert(
            self.conn.next_request_id(),
            OpInsertFlags::empty(),
            self.namespace(coll),
            keyed_docs,
        )?;

        self.write(notice)?;
        Ok(ids)
    }

    /// Applies an update to the documents matching a selection, with the
    /// given wire flags.
    pub fn update(
        &self,
        flags: OpUpdateFlags,
        selection: Selection,
        update: Document,
    ) -> Result<()> {
        let notice = Message::new_update(
            self.conn.next_request_id(),
            self.namespace(&selection.coll),
            flags,
            selection.selector,
            update,
        )?;

        self.write(notice)
    }

    /// Replaces the first document matching the selection.
    pub fn replace(&self, selection: Selection, doc: Document) -> Result<()> {
        self.update(OpUpdateFlags::empty(), selection, doc)
    }

    /// Replaces the first document matching the selection, inserting the
    /// replacement if nothing matches.
    pub fn repsert(&self, selection: Selection, doc: Document) -> Result<()> {
        self.update(OpUpdateFlags::UPSERT, selection, doc)
    }

    /// Applies an update expression to every document matching the
    /// selection.
    pub fn modify(&self, selection: Selection, update: Document) -> Result<()> {
        self.update(OpUpdateFlags::MULTI_UPDATE, selection, update)
    }

    /// Stores a document: an upsert keyed on its `_id` when it has one, a
    /// plain insert otherwise.
    pub fn save(&self, coll: &str, doc: Document) -> Result<()> {
        match doc.get("_id").map(Clone::clone) {
            Some(id) => {
                let mut selector = Document::new();
                selector.insert("_id", id);
                self.repsert(
                    Selection {
                        selector: selector,
                        coll: String::from(coll),
                    },
                    doc,
                )
            }
            None => self.insert_one(coll, doc).map(|_| ()),
        }
    }

    /// Removes every document matching the selection.
    pub fn delete(&self, selection: Selection) -> Result<()> {
        let notice = Message::new_delete(
            self.conn.next_request_id(),
            self.namespace(&selection.coll),
            OpDeleteFlags::empty(),
            selection.selector,
        )?;

        self.write(notice)
    }

    /// Removes the first document matching the selection.
    pub fn delete_one(&self, selection: Selection) -> Result<()> {
        let notice = Message::new_delete(
            self.conn.next_request_id(),
            self.namespace(&selection.coll),
            OpDeleteFlags::SINGLE_REMOVE,
            selection.selector,
        )?;

        self.write(notice)
    }

    ///////////////////////////////////////////////////////////////////////
    // Reads

    /// Runs a query and returns a cursor over its results.
    pub fn find(&self, q: Query) -> Result<Cursor> {
        let request_id = self.conn.next_request_id();
        let (request, remaining_limit) =
            q.build_request(false, self.read_mode, &self.database, request_id)?;

        let promise = Connection::call(&self.conn, &[], request)?;
        Ok(Cursor::delayed(
            self.conn.clone(),
            self.namespace(&q.selection.coll),
            q.batch_size,
            promise,
            remaining_limit,
        ))
    }

    /// Returns the first document matching a query, if any.
    pub fn find_one(&self, q: Query) -> Result<Option<Document>> {
        self.find(q.with_limit(1))?.next()
    }

    /// Asks the server how it would execute a query instead of executing
    /// it, returning the server's explanation document.
    pub fn explain(&self, q: Query) -> Result<Document> {
        let q = q.with_limit(1);
        let request_id = self.conn.next_request_id();
        let (request, remaining_limit) =
            q.build_request(true, self.read_mode, &self.database, request_id)?;

        let promise = Connection::call(&self.conn, &[], request)?;
        let cursor = Cursor::delayed(
            self.conn.clone(),
            self.namespace(&q.selection.coll),
            q.batch_size,
            promise,
            remaining_limit,
        );

        match cursor.next()? {
            Some(doc) => Ok(doc),
            None => panic!("Server sent no explanation for the query."),
        }
    }

    ///////////////////////////////////////////////////////////////////////
    // Commands

    /// Runs a database command and returns its reply document.
    pub fn run_command(&self, cmd: Document) -> Result<Document> {
        match self.find_one(query(cmd.clone(), "$cmd"))? {
            Some(doc) => Ok(doc),
            None => panic!("Server sent no reply document for command {:?}.", cmd),
        }
    }

    /// Runs the command `{ <name>: 1 }`.
    pub fn run_command1(&self, name: &str) -> Result<Document> {
        let mut cmd = Document::new();
        cmd.insert(name, 1);
        self.run_command(cmd)
    }

    /// Counts the documents a query would return, honoring its skip and
    /// limit.
    pub fn count(&self, q: &Query) -> Result<i64> {
        let mut cmd = Document::new();
        cmd.insert("count", q.selection.coll.clone());
        cmd.insert("query", q.selection.selector.clone());
        cmd.insert("skip", q.skip as i32);
        if q.limit != 0 {
            cmd.insert("limit", q.limit as i32);
        }

        let reply = self.run_command(cmd)?;
        match reply.get("n") {
            Some(&Bson::I32(n)) => Ok(i64::from(n)),
            Some(&Bson::I64(n)) => Ok(n),
            Some(&Bson::FloatingPoint(n)) => Ok(n as i64),
            _ => panic!("Server sent no count in reply {:?}.", reply),
        }
    }

    /// Returns the distinct values a field takes across the documents
    /// matching a selection.
    pub fn distinct(&self, key: &str, selection: Selection) -> Result<Vec<Bson>> {
        let mut cmd = Document::new();
        cmd.insert("distinct", selection.coll);
        cmd.insert("key", key);
        cmd.insert("query", selection.selector);

        let reply = self.run_command(cmd)?;
        match reply.get("values") {
            Some(&Bson::Array(ref values)) => Ok(values.clone()),
            _ => panic!("Server sent no distinct values in reply {:?}.", reply),
        }
    }

    /// Evaluates a JavaScript expression on the server and returns its
    /// value.
    pub fn eval(&self, code: &str) -> Result<Bson> {
        let mut cmd = Document::new();
        cmd.insert("$eval", Bson::JavaScriptCode(String::from(code)));

        let reply = self.run_command(cmd)?;
        match reply.get("retval").map(Clone::clone) {
            Some(retval) => Ok(retval),
            None => panic!("Server sent no retval in eval reply {:?}.", reply),
        }
    }

    /// Authenticates a user against the ambient database. Authentication
    /// holds for this connection only and must be repeated on a new one.
    pub fn auth(&self, user: &str, password: &str) -> Result<bool> {
        let reply = self.run_command1("getnonce")?;
        let nonce = match reply.get("nonce") {
            Some(&Bson::String(ref nonce)) => nonce.clone(),
            _ => panic!("Server sent no nonce during authentication."),
        };

        let mut cmd = Document::new();
        cmd.insert("authenticate", 1);
        cmd.insert("user", user);
        cmd.insert("nonce", nonce.clone());
        cmd.insert("key", auth::pw_key(&nonce, user, password));

        Ok(ok_true(&self.run_command(cmd)?))
    }

    /// Runs a grouped aggregation and returns the grouped rows.
    pub fn group(&self, group: &Group) -> Result<Vec<Document>> {
        let mut cmd = Document::new();
        cmd.insert("group", group.to_document());

        let reply = self.run_command(cmd)?;
        match reply.get("retval") {
            Some(&Bson::Array(ref retval)) => {
                Ok(retval
                    .iter()
                    .map(|row| match *row {
                        Bson::Document(ref doc) => doc.clone(),
                        ref other => {
                            panic!("Server sent a non-document group row: {:?}", other)
                        }
                    })
                    .collect())
            }
            _ => panic!("Server sent no retval in group reply {:?}.", reply),
        }
    }

    /// Runs a map-reduce and returns the server's reply document, aborting
    /// if the server reports a failure.
    pub fn run_mr_command(&self, mr: &MapReduce) -> Result<Document> {
        let reply = self.run_command(mr.to_document())?;
        if !ok_true(&reply) {
            match reply.get("errmsg") {
                Some(&Bson::String(ref errmsg)) => panic!("mapReduce failed: {}", errmsg),
                _ => panic!("mapReduce failed: {:?}", reply),
            }
        }
        Ok(reply)
    }

    /// Runs a map-reduce and opens a cursor over its output collection.
    // TODO: drop temporary map-reduce output collections once their cursor
    // is drained; for now the server keeps them until the connection closes.
    pub fn run_mr(&self, mr: &MapReduce) -> Result<Cursor> {
        let reply = self.run_mr_command(mr)?;
        match reply.get("result") {
            Some(&Bson::String(ref coll)) => self.find(query(Document::new(), coll)),
            _ => panic!("Server sent no result collection in mapReduce reply {:?}.", reply),
        }
    }

    ///////////////////////////////////////////////////////////////////////
    // Administration

    /// Names every database on the server.
    pub fn all_databases(&self) -> Result<Vec<String>> {
        let reply = self.use_db("admin").run_command1("listDatabases")?;
        match reply.get("databases") {
            Some(&Bson::Array(ref databases)) => {
                Ok(databases
                    .iter()
                    .map(|entry| match *entry {
                        Bson::Document(ref doc) => {
                            match doc.get("name") {
                                Some(&Bson::String(ref name)) => name.clone(),
                                _ => panic!("listDatabases entry without a name: {:?}", doc),
                            }
                        }
                        ref other => {
                            panic!("listDatabases entry is not a document: {:?}", other)
                        }
                    })
                    .collect())
            }
            _ => panic!("Server sent no databases in listDatabases reply {:?}.", reply),
        }
    }

    /// Names every user collection in the ambient database.
    pub fn all_collections(&self) -> Result<Vec<String>> {
        let q = query(Document::new(), "system.namespaces").with_sort(doc! { "name": 1 });
        let docs = self.find(q)?.rest()?;

        let mut names = Vec::new();
        for doc in &docs {
            let namespace = match doc.get("name") {
                Some(&Bson::String(ref name)) => name,
                _ => panic!("system.namespaces entry without a name: {:?}", doc),
            };
            let coll = match namespace.find('.') {
                Some(idx) => &namespace[idx + 1..],
                None => panic!("Malformed namespace '{}' from the server.", namespace),
            };

            // Names holding a '$' are internal to the server, except for
            // the main replication oplog.
            if !coll.contains('$') ||
                format!("{}.{}", self.database, coll) == "local.oplog.$main"
            {
                names.push(String::from(coll));
            }
        }

        Ok(names)
    }

    /// Returns the server's version.
    pub fn server_version(&self) -> Result<Version> {
        let reply = self.run_command1("buildinfo")?;
        match reply.get("version") {
            Some(&Bson::String(ref version)) => {
                Version::parse(version).map_err(|err| ResponseError(err.to_string()))
            }
            _ => Err(ResponseError(
                String::from("No version received from server."),
            )),
        }
    }

    /// Permanently deletes the ambient database from the server.
    pub fn drop_database(&self) -> Result<()> {
        let mut cmd = Document::new();
        cmd.insert("dropDatabase", 1);
        self.run_command(cmd).map(|_| ())
    }

    /// Permanently deletes a collection from the ambient database.
    pub fn drop_collection(&self, coll: &str) -> Result<()> {
        let mut cmd = Document::new();
        cmd.insert("drop", coll);
        self.run_command(cmd).map(|_| ())
    }
}
