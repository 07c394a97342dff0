//! Command classifications used for event reporting.

/// Describes the type of command being sent, so monitoring hooks can label
/// events and sensitive commands can be suppressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandType {
    Command,
    Find,
    GetMore,
    KillCursors,
    Update,
    IsMaster,
    /// Commands whose payloads must never reach monitoring hooks, such as
    /// authentication handshakes.
    Suppressed,
}

impl CommandType {
    pub fn to_str(&self) -> &'static str {
        match *self {
            CommandType::Command => "command",
            CommandType::Find => "find",
            CommandType::GetMore => "get_more",
            CommandType::KillCursors => "kill_cursors",
            CommandType::Update => "update",
            CommandType::IsMaster => "is_master",
            CommandType::Suppressed => "suppressed",
        }
    }

    pub fn is_suppressed(&self) -> bool {
        *self == CommandType::Suppressed
    }
}
