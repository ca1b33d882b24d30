use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PanelError {
    /// The panel cannot work without absolute X/Y input.
    #[error("touch device {path} ({name}) does not report absolute X/Y axes")]
    MissingAbsoluteAxes { path: PathBuf, name: String },

    #[error("no input event devices found")]
    NoInputDevices,

    #[error("invalid touch calibration: {0}")]
    InvalidCalibration(String),

    /// Recoverable: the calibration attempt is dropped and the previous range stays.
    #[error("calibration target {target} timed out")]
    CalibrationTimeout { target: usize },

    #[error("invalid track catalog: {0}")]
    InvalidCatalog(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_axes_message_names_the_device() {
        let err = PanelError::MissingAbsoluteAxes {
            path: PathBuf::from("/dev/input/event0"),
            name: "gpio-keys".into(),
        };
        assert_eq!(
            err.to_string(),
            "touch device /dev/input/event0 (gpio-keys) does not report absolute X/Y axes"
        );
    }
}
