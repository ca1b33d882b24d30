//! Tracing targets routed to their own log files.

pub const T_TOUCH: &str = "touch";
pub const T_SERIAL: &str = "serial";
pub const T_DISPLAY: &str = "display";
