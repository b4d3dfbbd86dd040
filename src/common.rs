//! Library-wide ambient settings.

/// Indicates whether reads may be served by a secondary replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadMode {
    /// Reads must go to the master.
    Master,
    /// Reads may be served by a slave; sets the SlaveOk wire flag on queries.
    SlaveOk,
}

impl ReadMode {
    /// Returns `true` if reads from a secondary are tolerated.
    pub fn is_slave_ok(&self) -> bool {
        match *self {
            ReadMode::Master => false,
            ReadMode::SlaveOk => true,
        }
    }
}

/// Describes the guarantee requested for write operations.
///
/// `Unsafe` writes are fire-and-forget notices; the server reports nothing
/// back. `Safe` writes follow every notice with a `getlasterror` command on
/// the same connection and surface server-side write errors as
/// `Error::WriteFailure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteMode {
    Unsafe,
    Safe,
}
