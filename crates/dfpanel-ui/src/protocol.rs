//! Frames are `7E FF 06 <cmd> 00 <p1> <p2> <csum hi> <csum lo> EF`.

use std::{io::Write, path::Path, time::Duration};

use anyhow::{Context, Result};
use dfpanel_logging::targets::T_SERIAL;

pub const FRAME_LEN: usize = 10;
pub const MAX_VOLUME: u8 = 30;

const START: u8 = 0x7E;
const VERSION: u8 = 0xFF;
const BODY_LEN: u8 = 0x06;
const NO_FEEDBACK: u8 = 0x00;
const END: u8 = 0xEF;

pub type Frame = [u8; FRAME_LEN];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Next = 0x01,
    Previous = 0x02,
    PlayTrack = 0x03,
    SetVolume = 0x06,
    Play = 0x0D,
    Pause = 0x0E,
    Stop = 0x16,
}

impl Command {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::Previous => "previous",
            Self::PlayTrack => "play-track",
            Self::SetVolume => "set-volume",
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Stop => "stop",
        }
    }
}

/// Two's complement of the 16-bit sum of `body`.
///
/// `body` is the six bytes between the start marker and the checksum
/// (version, length, command, feedback flag, param1, param2).
pub fn checksum(body: &[u8]) -> u16 {
    body.iter()
        .fold(0u16, |acc, byte| acc.wrapping_add(u16::from(*byte)))
        .wrapping_neg()
}

pub fn encode_frame(command: Command, param1: u8, param2: u8) -> Frame {
    let mut frame = [
        START,
        VERSION,
        BODY_LEN,
        command.code(),
        NO_FEEDBACK,
        param1,
        param2,
        0x00,
        0x00,
        END,
    ];
    let [hi, lo] = checksum(&frame[1..7]).to_be_bytes();
    frame[7] = hi;
    frame[8] = lo;
    frame
}

/// Out-of-range volume is clamped, never rejected.
pub fn clamp_volume(volume: i32) -> u8 {
    volume.clamp(0, i32::from(MAX_VOLUME)) as u8
}

pub fn volume_frame(volume: i32) -> Frame {
    encode_frame(Command::SetVolume, 0x00, clamp_volume(volume))
}

/// `number` is the module's 1-based track number.
pub fn track_frame(number: u16) -> Frame {
    let [hi, lo] = number.to_be_bytes();
    encode_frame(Command::PlayTrack, hi, lo)
}

/// Fire-and-forget writer for command frames. Nothing is ever read back.
pub struct ControlLink<W: Write> {
    sink: W,
}

impl<W: Write> ControlLink<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    pub fn send(&mut self, command: Command, param1: u8, param2: u8) -> Result<()> {
        let frame = encode_frame(command, param1, param2);
        tracing::debug!(
            target: T_SERIAL,
            command = command.label(),
            param1,
            param2,
            frame = ?frame,
            "sending frame"
        );
        self.sink
            .write_all(&frame)
            .with_context(|| format!("writing {} frame", command.label()))?;
        self.sink
            .flush()
            .with_context(|| format!("flushing {} frame", command.label()))?;
        Ok(())
    }

    pub fn play(&mut self) -> Result<()> {
        self.send(Command::Play, 0, 0)
    }

    pub fn pause(&mut self) -> Result<()> {
        self.send(Command::Pause, 0, 0)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.send(Command::Stop, 0, 0)
    }

    pub fn previous(&mut self) -> Result<()> {
        self.send(Command::Previous, 0, 0)
    }

    pub fn next(&mut self) -> Result<()> {
        self.send(Command::Next, 0, 0)
    }

    /// Returns the volume that was actually encoded.
    pub fn set_volume(&mut self, volume: i32) -> Result<u8> {
        let clamped = clamp_volume(volume);
        self.send(Command::SetVolume, 0, clamped)?;
        Ok(clamped)
    }

    pub fn play_track(&mut self, number: u16) -> Result<()> {
        let [hi, lo] = number.to_be_bytes();
        self.send(Command::PlayTrack, hi, lo)
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }
}

pub fn open_serial(path: &Path, baud: u32) -> Result<ControlLink<Box<dyn serialport::SerialPort>>> {
    let name = path.to_string_lossy();
    let port = serialport::new(name.as_ref(), baud)
        .timeout(Duration::from_millis(100))
        .open()
        .with_context(|| format!("opening serial link {} at {} baud", path.display(), baud))?;
    tracing::info!(target: T_SERIAL, path = %path.display(), baud, "serial link open");
    Ok(ControlLink::new(port))
}
