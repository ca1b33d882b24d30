#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use embedded_graphics::prelude::{Point, Size};

use dfpanel_ui::calibration::{CalibrationRange, Orientation};
use dfpanel_ui::catalog::{Catalog, Track};
use dfpanel_ui::compositor::DisplaySink;
use dfpanel_ui::config::PanelConfig;
use dfpanel_ui::touch::{Axis, NextEvent, TouchEvent, TouchSource};

/// Touch source replaying a fixed script, then reporting end of input.
pub struct ScriptedTouch {
    range: CalibrationRange,
    script: VecDeque<NextEvent>,
    pub timeouts: Vec<Option<Duration>>,
}

impl ScriptedTouch {
    pub fn new(range: CalibrationRange) -> Self {
        Self {
            range,
            script: VecDeque::new(),
            timeouts: Vec::new(),
        }
    }

    pub fn event(&mut self, event: TouchEvent) -> &mut Self {
        self.script.push_back(NextEvent::Event(event));
        self
    }

    pub fn timed_out(&mut self) -> &mut Self {
        self.script.push_back(NextEvent::TimedOut);
        self
    }

    /// Press, `samples` steady readings per axis, release.
    pub fn hold(&mut self, x: i32, y: i32, samples: usize) -> &mut Self {
        self.event(TouchEvent::Contact(true));
        for _ in 0..samples {
            self.event(TouchEvent::Axis(Axis::X, x));
            self.event(TouchEvent::Axis(Axis::Y, y));
        }
        self.event(TouchEvent::Contact(false))
    }

    pub fn tap(&mut self, at: Point) -> &mut Self {
        self.hold(at.x, at.y, 6)
    }

    /// Press at `from`, slide to `to`, release there.
    pub fn drag(&mut self, from: Point, to: Point) -> &mut Self {
        self.event(TouchEvent::Contact(true));
        for _ in 0..4 {
            self.event(TouchEvent::Axis(Axis::X, from.x));
            self.event(TouchEvent::Axis(Axis::Y, from.y));
        }
        for _ in 0..6 {
            self.event(TouchEvent::Axis(Axis::X, to.x));
            self.event(TouchEvent::Axis(Axis::Y, to.y));
        }
        self.event(TouchEvent::Contact(false))
    }
}

impl TouchSource for ScriptedTouch {
    fn device_range(&self) -> CalibrationRange {
        self.range
    }

    fn next_event(&mut self, timeout: Option<Duration>) -> Result<NextEvent> {
        self.timeouts.push(timeout);
        Ok(self.script.pop_front().unwrap_or(NextEvent::Closed))
    }
}

pub struct MemoryDisplay {
    size: Size,
    pub frames: Vec<Vec<u8>>,
}

impl MemoryDisplay {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: Size::new(width, height),
            frames: Vec::new(),
        }
    }
}

impl DisplaySink for MemoryDisplay {
    fn size(&self) -> Size {
        self.size
    }

    fn write_pixels(&mut self, pixels: &[u8]) -> Result<()> {
        self.frames.push(pixels.to_vec());
        Ok(())
    }
}

/// Serial sink whose every write fails, like an unplugged adapter.
pub struct BrokenLink;

impl Write for BrokenLink {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "serial adapter gone"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Raw range that maps 1:1 onto a panel of the given size with no rotation.
pub fn identity_range(width: u32, height: u32) -> CalibrationRange {
    CalibrationRange::new(0, width as i32 - 1, 0, height as i32 - 1)
}

pub fn write_config(root: &Path, orientation: Orientation, catalog: Option<&str>) -> PanelConfig {
    let mut config = PanelConfig::default();
    config.touch.orientation = orientation;
    config.playback.catalog = catalog.map(Into::into);
    config.save(&PanelConfig::path(root)).unwrap();
    PanelConfig::load(root).unwrap()
}

pub fn write_catalog(root: &Path, tracks: u16) -> Catalog {
    let tracks: Vec<Track> = (1..=tracks)
        .map(|number| Track {
            number,
            title: format!("Track {number}"),
        })
        .collect();
    let path = root.join("tracks.json");
    fs::write(&path, serde_json::to_string(&tracks).unwrap()).unwrap();
    Catalog::load(&path).unwrap()
}

/// Splits a serial byte stream into 10-byte frames.
pub fn frames(bytes: &[u8]) -> Vec<[u8; 10]> {
    bytes
        .chunks(10)
        .map(|chunk| chunk.try_into().unwrap())
        .collect()
}
