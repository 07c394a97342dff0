//! Operation flags.

bitflags! {
    /// Represents the bit vector of options for an OP_REPLY message.
    pub struct OpReplyFlags: i32 {
        const CURSOR_NOT_FOUND  = 0b00000001;
        const QUERY_FAILURE     = 0b00000010;
        const AWAIT_CAPABLE     = 0b00001000;
    }
}

bitflags! {
    /// Represents the bit vector of flags for an OP_QUERY message.
    ///
    /// Commands carry their cursor options (tailable, awaitData, and so on)
    /// inside the command document, so the only flag a command exchange ever
    /// sets is `SLAVE_OK`.
    pub struct OpQueryFlags: i32 {
        const SLAVE_OK = 0b00000100;
    }
}

impl OpQueryFlags {
    /// Returns the flags for a command exchange routed by a read preference.
    pub fn with_slave_ok(slave_ok: bool) -> OpQueryFlags {
        if slave_ok {
            OpQueryFlags::SLAVE_OK
        } else {
            OpQueryFlags::empty()
        }
    }
}
