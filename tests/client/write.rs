use bson::{Bson, Document};
use mongolite::{query, select, Error, WriteMode};
use support::{self, Reply, Request};

// Serves getlasterror confirmations and echoes stored documents back for
// any other query.
fn echo_server() -> support::MockServer {
    let mut stored: Vec<Document> = Vec::new();

    support::start(move |request| match *request {
        Request::Insert { ref documents, .. } => {
            stored.extend(documents.iter().cloned());
            None
        }
        Request::Query { ref query, .. } => {
            if query.contains_key("getlasterror") {
                Some(Reply::docs(vec![doc! { "n": 1, "ok": 1.0 }]))
            } else {
                Some(Reply::docs(stored.clone()))
            }
        }
        _ => None,
    })
}

#[test]
fn inserted_documents_come_back_under_their_id() {
    let server = echo_server();

    {
        let ctx = server.context("test");
        let id = ctx.insert_one("t", doc! { "x": 1 }).unwrap();

        match id {
            Bson::ObjectId(_) => (),
            ref other => panic!("Expected a generated ObjectId, got {:?}", other),
        }

        let found = ctx.find_one(query(doc! { "x": 1 }, "t")).unwrap().unwrap();
        assert_eq!(found.get("_id"), Some(&id));
        assert_eq!(found.get("x"), Some(&Bson::I32(1)));
    }

    server.finish();
}

#[test]
fn insert_many_assigns_ids_individually() {
    let server = support::start(|_| None);

    let ids = {
        let ctx = server.context("test").with_write_mode(WriteMode::Unsafe);
        ctx.insert_many(
            "t",
            vec![doc! { "_id": 10, "a": 1 }, doc! { "b": 2 }],
        ).unwrap()
    };

    assert_eq!(ids[0], Bson::I32(10));
    match ids[1] {
        Bson::ObjectId(_) => (),
        ref other => panic!("Expected a generated ObjectId, got {:?}", other),
    }

    let observed = server.finish();
    assert_eq!(observed.len(), 1);
    match observed[0] {
        Request::Insert { ref namespace, ref documents, .. } => {
            assert_eq!(namespace, "test.t");
            assert_eq!(documents.len(), 2);
            // Present ids are preserved; missing ones get the id the caller
            // was handed back.
            assert_eq!(documents[0].get("_id"), Some(&Bson::I32(10)));
            assert_eq!(documents[1].get("_id"), Some(&ids[1]));
            assert_eq!(documents[1].get("b"), Some(&Bson::I32(2)));
        }
        ref other => panic!("Expected one insert notice, observed {:?}", other),
    }
}

#[test]
fn safe_writes_confirm_in_the_same_batch() {
    let server = support::start(|request| match *request {
        Request::Query { .. } => Some(Reply::docs(vec![doc! { "n": 1, "ok": 1.0 }])),
        _ => None,
    });

    {
        let ctx = server.context("test");
        ctx.insert_one("t", doc! { "x": 1 }).unwrap();
    }

    let observed = server.finish();
    assert_eq!(observed.len(), 2);
    match observed[0] {
        Request::Insert { .. } => (),
        ref other => panic!("Expected the insert notice first, observed {:?}", other),
    }
    match observed[1] {
        Request::Query { ref namespace, ref query, .. } => {
            assert_eq!(namespace, "test.$cmd");
            assert!(query.contains_key("getlasterror"));
        }
        ref other => panic!("Expected a getlasterror query, observed {:?}", other),
    }
}

#[test]
fn safe_write_failures_carry_code_and_message() {
    let server = support::start(|request| match *request {
        Request::Query { .. } => {
            Some(Reply::docs(vec![doc! {
                "err": "E11000 duplicate key error index: test.t.$_id_",
                "code": 11000,
                "n": 0,
                "ok": 1.0
            }]))
        }
        _ => None,
    });

    {
        let ctx = server.context("test");
        match ctx.insert_one("t", doc! { "_id": 1 }) {
            Err(Error::WriteFailure(code, ref msg)) => {
                assert_eq!(code, 11000);
                assert!(msg.starts_with("E11000"));
            }
            other => panic!("Expected WriteFailure, got {:?}", other),
        }
    }

    server.finish();
}

#[test]
fn unsafe_writes_send_no_confirmation() {
    let server = support::start(|_| None);

    {
        let ctx = server.context("test").with_write_mode(WriteMode::Unsafe);
        ctx.insert_one("t", doc! { "x": 1 }).unwrap();
        ctx.delete(select(doc! {}, "t")).unwrap();
    }

    let observed = server.finish();
    assert_eq!(observed.len(), 2);
    match observed[0] {
        Request::Insert { .. } => (),
        ref other => panic!("Expected only the insert notice, observed {:?}", other),
    }
    match observed[1] {
        Request::Delete { .. } => (),
        ref other => panic!("Expected only the delete notice, observed {:?}", other),
    }
}

#[test]
fn update_and_delete_flavors_set_their_wire_flags() {
    let server = support::start(|_| None);

    {
        let ctx = server.context("test").with_write_mode(WriteMode::Unsafe);
        ctx.replace(select(doc! { "a": 1 }, "t"), doc! { "a": 1, "b": 2 })
            .unwrap();
        ctx.repsert(select(doc! { "a": 2 }, "t"), doc! { "a": 2 }).unwrap();
        ctx.modify(select(doc! {}, "t"), doc! { "$set": { "b": 3 } })
            .unwrap();
        ctx.delete_one(select(doc! { "a": 3 }, "t")).unwrap();
        ctx.delete(select(doc! {}, "t")).unwrap();
    }

    let observed = server.finish();
    let flags: Vec<i32> = observed
        .iter()
        .map(|request| match *request {
            Request::Update { flags, .. } |
            Request::Delete { flags, .. } => flags,
            ref other => panic!("Unexpected request {:?}", other),
        })
        .collect();

    // replace: none; repsert: Upsert; modify: MultiUpdate; deleteOne:
    // SingleRemove; delete: none.
    assert_eq!(flags, [0, 1, 2, 1, 0]);
}

#[test]
fn save_upserts_keyed_documents_and_inserts_fresh_ones() {
    let server = support::start(|_| None);

    {
        let ctx = server.context("test").with_write_mode(WriteMode::Unsafe);
        ctx.save("t", doc! { "_id": 5, "x": 1 }).unwrap();
        ctx.save("t", doc! { "y": 2 }).unwrap();
    }

    let observed = server.finish();
    assert_eq!(observed.len(), 2);
    match observed[0] {
        Request::Update { flags, ref selector, .. } => {
            assert_eq!(flags, 1); // Upsert
            assert_eq!(*selector, doc! { "_id": 5 });
        }
        ref other => panic!("Expected an upsert for the keyed save, observed {:?}", other),
    }
    match observed[1] {
        Request::Insert { ref documents, .. } => {
            assert_eq!(documents[0].get("y"), Some(&Bson::I32(2)));
            assert!(documents[0].get("_id").is_some());
        }
        ref other => panic!("Expected an insert for the fresh save, observed {:?}", other),
    }
}
