//! Bit vectors of options for wire protocol messages.

use common::ReadMode;
use query::QueryOption;

bitflags! {
    /// Option flags for OP_QUERY messages.
    pub struct OpQueryFlags: i32 {
        const TAILABLE_CURSOR   = 0b0000_0010;
        const SLAVE_OK          = 0b0000_0100;
        const OPLOG_REPLAY      = 0b0000_1000;
        const NO_CURSOR_TIMEOUT = 0b0001_0000;
        const AWAIT_DATA        = 0b0010_0000;
        const EXHAUST           = 0b0100_0000;
        const PARTIAL           = 0b1000_0000;
    }
}

bitflags! {
    /// Option flags set by the server on OP_REPLY messages.
    pub struct OpReplyFlags: i32 {
        const CURSOR_NOT_FOUND   = 0b0000_0001;
        const QUERY_FAILURE      = 0b0000_0010;
        const SHARD_CONFIG_STALE = 0b0000_0100;
        const AWAIT_CAPABLE      = 0b0000_1000;
    }
}

bitflags! {
    /// Option flags for OP_INSERT messages.
    pub struct OpInsertFlags: i32 {
        const CONTINUE_ON_ERROR = 0b0000_0001;
    }
}

bitflags! {
    /// Option flags for OP_UPDATE messages.
    pub struct OpUpdateFlags: i32 {
        const UPSERT       = 0b0000_0001;
        const MULTI_UPDATE = 0b0000_0010;
    }
}

bitflags! {
    /// Option flags for OP_DELETE messages.
    pub struct OpDeleteFlags: i32 {
        const SINGLE_REMOVE = 0b0000_0001;
    }
}

impl OpQueryFlags {
    /// Folds the per-query options and the ambient read mode into the wire
    /// flag vector for an OP_QUERY message.
    pub fn with_context(options: &[QueryOption], mode: ReadMode) -> OpQueryFlags {
        let mut flags = if mode.is_slave_ok() {
            OpQueryFlags::SLAVE_OK
        } else {
            OpQueryFlags::empty()
        };

        for option in options {
            flags.insert(match *option {
                QueryOption::TailableCursor => OpQueryFlags::TAILABLE_CURSOR,
                QueryOption::NoCursorTimeout => OpQueryFlags::NO_CURSOR_TIMEOUT,
                QueryOption::AwaitData => OpQueryFlags::AWAIT_DATA,
            });
        }

        flags
    }
}
