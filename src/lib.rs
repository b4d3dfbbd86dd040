//! A lightweight MongoDB client driver over a single server connection.
//!
//! The driver speaks the MongoDB wire protocol directly: writes are emitted
//! as fire-and-forget notices (confirmed through `getlasterror` when the
//! ambient [`WriteMode`](common/enum.WriteMode.html) asks for it), reads go
//! through server-side cursors that prefetch their next batch while the
//! caller consumes the current one, and commands are queries against the
//! `$cmd` collection. All operations are issued against a
//! [`Context`](context/struct.Context.html) carrying the connection, the
//! target database, and the ambient read and write modes.
#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate bson;
extern crate bufstream;
extern crate byteorder;
extern crate hex;
extern crate md5;
extern crate semver;

pub mod auth;
pub mod common;
pub mod connection;
pub mod connstring;
pub mod context;
pub mod cursor;
pub mod error;
pub mod group;
pub mod mapreduce;
pub mod query;
pub mod wire_protocol;

pub use common::{ReadMode, WriteMode};
pub use connection::{Connection, ReplyPromise};
pub use context::Context;
pub use cursor::Cursor;
pub use error::{Error, Result};
pub use group::{Group, GroupKey};
pub use mapreduce::{map_reduce, MapReduce};
pub use query::{query, select, Query, QueryOption, Selection};
