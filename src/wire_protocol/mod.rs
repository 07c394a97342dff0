//! Binary wire-protocol messages used for command exchanges.
pub mod flags;
pub mod header;
pub mod operations;

use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_REQUEST_ID: AtomicUsize = AtomicUsize::new(1);

/// Returns a process-wide monotonic request id.
pub fn next_request_id() -> i32 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::SeqCst) as i32
}
