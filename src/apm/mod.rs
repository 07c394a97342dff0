//! Command Monitoring
//!
//! This module provides an interface for observing the commands a cluster
//! executes. All non-suppressed command exchanges trigger start and completion
//! hooks registered on the cluster's listener. Authentication handshakes are
//! suppressed so credentials never reach a hook.
mod event;
mod listener;

pub use self::event::{CommandResult, CommandStarted};
pub use self::listener::{CompletionHook, Listener, StartHook};
