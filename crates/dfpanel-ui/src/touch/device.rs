use std::{
    collections::VecDeque,
    io,
    os::fd::{AsRawFd, BorrowedFd},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use dfpanel_logging::targets::T_TOUCH;
use evdev::{AbsoluteAxisType, Device, InputEventKind, Key};
use nix::{
    errno::Errno,
    poll::{poll, PollFd, PollFlags, PollTimeout},
};

use crate::calibration::CalibrationRange;
use crate::error::PanelError;
use crate::touch::{Axis, NextEvent, TouchEvent, TouchSource};

const TOUCHSCREEN_LINK: &str = "/dev/input/touchscreen";
const KNOWN_CONTROLLERS: [&str; 2] = ["ads7846", "xpt2046"];

pub struct EvdevTouch {
    device: Device,
    path: PathBuf,
    range: CalibrationRange,
    pending: VecDeque<TouchEvent>,
}

impl EvdevTouch {
    /// Opens `path` and reads its axis limits. A device without absolute X/Y
    /// is rejected with [`PanelError::MissingAbsoluteAxes`].
    pub fn open(path: &Path) -> Result<Self> {
        let device =
            Device::open(path).with_context(|| format!("opening touch device {}", path.display()))?;
        Self::from_device(path.to_path_buf(), device)
    }

    fn from_device(path: PathBuf, device: Device) -> Result<Self> {
        let name = device.name().unwrap_or("unnamed").to_string();
        if !has_xy(&device) {
            return Err(PanelError::MissingAbsoluteAxes { path, name }.into());
        }
        let abs = device
            .get_abs_state()
            .with_context(|| format!("reading axis limits of {}", path.display()))?;
        let x = abs[AbsoluteAxisType::ABS_X.0 as usize];
        let y = abs[AbsoluteAxisType::ABS_Y.0 as usize];
        let range = CalibrationRange::new(x.minimum, x.maximum, y.minimum, y.maximum);
        tracing::info!(
            target: T_TOUCH,
            path = %path.display(),
            name = %name,
            range = %range,
            "touch device open"
        );
        Ok(Self {
            device,
            path,
            range,
            pending: VecDeque::new(),
        })
    }

    fn wait_readable(&self, timeout: Option<Duration>) -> Result<bool> {
        // SAFETY: the descriptor belongs to `self.device`, which outlives this borrow.
        let fd = unsafe { BorrowedFd::borrow_raw(self.device.as_raw_fd()) };
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
        let timeout = match timeout {
            None => PollTimeout::NONE,
            Some(t) => PollTimeout::from(u16::try_from(t.as_millis()).unwrap_or(u16::MAX)),
        };
        match poll(&mut fds, timeout) {
            Ok(n) => Ok(n > 0),
            Err(Errno::EINTR) => Ok(false),
            Err(err) => Err(err).with_context(|| format!("polling {}", self.path.display())),
        }
    }

    /// Queues whatever the kernel has buffered. `false` once the device is gone.
    fn fill(&mut self) -> Result<bool> {
        let events = match self.device.fetch_events() {
            Ok(events) => events,
            Err(err) if is_device_gone(&err) => {
                tracing::warn!(target: T_TOUCH, path = %self.path.display(), "touch device removed");
                return Ok(false);
            }
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", self.path.display()));
            }
        };
        for event in events {
            let decoded = match event.kind() {
                InputEventKind::AbsAxis(AbsoluteAxisType::ABS_X) => {
                    Some(TouchEvent::Axis(Axis::X, event.value()))
                }
                InputEventKind::AbsAxis(AbsoluteAxisType::ABS_Y) => {
                    Some(TouchEvent::Axis(Axis::Y, event.value()))
                }
                InputEventKind::Key(Key::BTN_TOUCH) => Some(TouchEvent::Contact(event.value() != 0)),
                _ => None,
            };
            self.pending.extend(decoded);
        }
        Ok(true)
    }
}

impl TouchSource for EvdevTouch {
    fn device_range(&self) -> CalibrationRange {
        self.range
    }

    fn next_event(&mut self, timeout: Option<Duration>) -> Result<NextEvent> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(NextEvent::Event(event));
            }
            let left = match deadline {
                None => None,
                Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                    Some(left) if !left.is_zero() => Some(left),
                    _ => return Ok(NextEvent::TimedOut),
                },
            };
            if self.wait_readable(left)? && !self.fill()? {
                return Ok(NextEvent::Closed);
            }
        }
    }
}

fn is_device_gone(err: &io::Error) -> bool {
    err.raw_os_error() == Some(Errno::ENODEV as i32)
}

fn has_xy(device: &Device) -> bool {
    device.supported_absolute_axes().map_or(false, |axes| {
        axes.contains(AbsoluteAxisType::ABS_X) && axes.contains(AbsoluteAxisType::ABS_Y)
    })
}

fn is_known_controller(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    KNOWN_CONTROLLERS.iter().any(|known| lower.contains(known))
}

/// Finds the touch device: the configured node, the `touchscreen` udev link,
/// a known resistive controller by name, then any device with absolute X/Y.
pub fn open_touch(configured: Option<&Path>) -> Result<EvdevTouch> {
    if let Some(path) = configured {
        return EvdevTouch::open(path);
    }
    let link = Path::new(TOUCHSCREEN_LINK);
    if link.exists() {
        return EvdevTouch::open(link);
    }

    let mut devices: Vec<(PathBuf, Device)> = evdev::enumerate().collect();
    if devices.is_empty() {
        return Err(PanelError::NoInputDevices.into());
    }
    devices.sort_by(|a, b| a.0.cmp(&b.0));

    if let Some(idx) = devices
        .iter()
        .position(|(_, dev)| dev.name().map_or(false, is_known_controller))
    {
        let (path, device) = devices.swap_remove(idx);
        return EvdevTouch::from_device(path, device);
    }
    if let Some(idx) = devices.iter().position(|(_, dev)| has_xy(dev)) {
        let (path, device) = devices.swap_remove(idx);
        return EvdevTouch::from_device(path, device);
    }

    // Nothing looks like a touchscreen; the first device produces the fatal
    // capability error with its name in it.
    let (path, device) = devices.swap_remove(0);
    EvdevTouch::from_device(path, device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_names_match_case_insensitively() {
        assert!(is_known_controller("ADS7846 Touchscreen"));
        assert!(is_known_controller("xpt2046"));
        assert!(!is_known_controller("gpio-keys"));
    }

    #[test]
    fn unplugged_device_is_recognised_by_errno() {
        assert!(is_device_gone(&io::Error::from_raw_os_error(Errno::ENODEV as i32)));
        assert!(!is_device_gone(&io::Error::from_raw_os_error(Errno::EIO as i32)));
        assert!(!is_device_gone(&io::Error::new(io::ErrorKind::Other, "short read")));
    }
}
