//! Concrete bus devices.

/// Diagnostic device that logs all traffic and claims nothing.
pub mod console_log;
/// Word-addressed volatile memory.
pub mod ram32;
/// Word-addressed preloaded memory, optionally write-protected.
pub mod rom32;

pub use console_log::ConsoleLog;
pub use ram32::Ram32;
pub use rom32::Rom32;
