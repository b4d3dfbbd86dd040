//! Digest computation for the driver's authentication handshake.
use hex;
use md5::{Digest, Md5};

// The server stores the hash of "<user>:mongo:<password>".
fn pw_hash(user: &str, password: &str) -> String {
    let mut digest = Md5::new();
    digest.input(user.as_bytes());
    digest.input(b":mongo:");
    digest.input(password.as_bytes());
    hex::encode(digest.result())
}

/// Computes the proof-of-possession digest sent to the server in an
/// `authenticate` command: the password hash folded together with the
/// server-issued nonce.
pub fn pw_key(nonce: &str, user: &str, password: &str) -> String {
    let mut digest = Md5::new();
    digest.input(nonce.as_bytes());
    digest.input(user.as_bytes());
    digest.input(pw_hash(user, password).as_bytes());
    hex::encode(digest.result())
}
