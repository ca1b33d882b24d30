#![deny(unsafe_op_in_unsafe_fn)]
// Library interface for the panel so the core can be tested without hardware.

#[cfg(not(target_os = "linux"))]
compile_error!(
    "dfpanel-ui drives Linux evdev, framebuffer and serial devices and only builds for Linux targets."
);

pub mod app;
pub mod calibration;
pub mod catalog;
pub mod compositor;
pub mod config;
pub mod error;
pub mod playback;
pub mod protocol;
pub mod touch;
pub mod ui;
