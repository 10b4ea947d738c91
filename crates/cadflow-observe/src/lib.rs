//! Logging for cadflow processes.
//!
//! - [`logger_init`] installs the global `tracing` subscriber (text, json or journald).
//! - [`LogBroadcaster`] renders batch lifecycle actions as structured log lines.

mod logger;
pub use logger::*;

mod broadcaster;
pub use broadcaster::{LogBroadcaster, log_event, message_for};
