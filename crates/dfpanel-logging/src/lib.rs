#![deny(unsafe_op_in_unsafe_fn)]
//! Logging setup shared by the panel binaries: stdout, a rolling component
//! log and one file per hardware subsystem target.

pub mod config;
pub mod fs;
pub mod init;
pub mod retention;
pub mod targets;

pub use config::LoggingConfig;
pub use init::{init, LoggingGuards};
pub use retention::{run_retention, RetentionReport};
