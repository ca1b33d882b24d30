use std::io::Write;

use anyhow::Result;

use crate::catalog::Catalog;
use crate::protocol::{clamp_volume, ControlLink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackIntent {
    TogglePlay,
    Previous,
    Next,
    Stop,
    SetVolume(i32),
    /// Catalog index, not track number.
    SelectTrack(usize),
}

/// Track references are catalog indices; `None` when playing without a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing(Option<usize>),
    Paused(Option<usize>),
}

impl PlaybackState {
    pub fn track(self) -> Option<usize> {
        match self {
            Self::Idle => None,
            Self::Playing(track) | Self::Paused(track) => track,
        }
    }

    pub fn is_playing(self) -> bool {
        matches!(self, Self::Playing(_))
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Stopped",
            Self::Playing(_) => "Playing",
            Self::Paused(_) => "Paused",
        }
    }
}

/// Outcome of one intent. Each one is followed by exactly one redraw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: PlaybackState,
    pub note: Option<String>,
}

pub struct PlaybackController<W: Write> {
    link: ControlLink<W>,
    state: PlaybackState,
    volume: u8,
    /// Track started by play from idle.
    cursor: usize,
    catalog: Option<Catalog>,
}

impl<W: Write> PlaybackController<W> {
    pub fn new(link: ControlLink<W>, catalog: Option<Catalog>, initial_volume: i32) -> Self {
        Self {
            link,
            state: PlaybackState::Idle,
            volume: clamp_volume(initial_volume),
            cursor: 0,
            catalog: catalog.filter(|c| !c.is_empty()),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn catalog(&self) -> Option<&Catalog> {
        self.catalog.as_ref()
    }

    pub fn track_count(&self) -> usize {
        self.catalog.as_ref().map_or(0, Catalog::len)
    }

    pub fn link(&self) -> &ControlLink<W> {
        &self.link
    }

    /// Pushes the current volume to the module so both sides agree at startup.
    pub fn sync_volume(&mut self) -> Result<()> {
        self.volume = self.link.set_volume(i32::from(self.volume))?;
        Ok(())
    }

    pub fn handle(&mut self, intent: PlaybackIntent) -> Result<Transition> {
        let note = match intent {
            PlaybackIntent::TogglePlay => self.toggle_play()?,
            PlaybackIntent::Previous => self.step(-1)?,
            PlaybackIntent::Next => self.step(1)?,
            PlaybackIntent::Stop => {
                self.link.stop()?;
                self.state = PlaybackState::Idle;
                Some("Stopped".to_string())
            }
            PlaybackIntent::SetVolume(volume) => {
                self.volume = self.link.set_volume(volume)?;
                None
            }
            PlaybackIntent::SelectTrack(index) => self.select(index)?,
        };
        tracing::info!(?intent, state = ?self.state, volume = self.volume, "playback transition");
        Ok(Transition {
            state: self.state,
            note,
        })
    }

    fn toggle_play(&mut self) -> Result<Option<String>> {
        match self.state {
            PlaybackState::Playing(track) => {
                self.link.pause()?;
                self.state = PlaybackState::Paused(track);
                Ok(Some("Paused".to_string()))
            }
            PlaybackState::Paused(track) => {
                self.link.play()?;
                self.state = PlaybackState::Playing(track);
                Ok(Some("Resumed".to_string()))
            }
            PlaybackState::Idle => {
                if self.catalog.is_some() {
                    self.select(self.cursor)
                } else {
                    self.link.play()?;
                    self.state = PlaybackState::Playing(None);
                    Ok(Some("Playing".to_string()))
                }
            }
        }
    }

    /// Moves within the catalog without wrapping. With no catalog the module's
    /// own previous/next commands are used.
    fn step(&mut self, delta: i32) -> Result<Option<String>> {
        let Some(len) = self.catalog.as_ref().map(Catalog::len) else {
            if delta < 0 {
                self.link.previous()?;
            } else {
                self.link.next()?;
            }
            self.state = PlaybackState::Playing(None);
            return Ok(None);
        };

        let current = self.state.track().unwrap_or(self.cursor);
        let target = if delta < 0 {
            current.saturating_sub(1)
        } else {
            (current + 1).min(len - 1)
        };
        let edge = if target != current {
            None
        } else if delta < 0 {
            Some("First track")
        } else {
            Some("Last track")
        };
        let note = self.select(target)?;
        Ok(edge.map(str::to_string).or(note))
    }

    fn select(&mut self, index: usize) -> Result<Option<String>> {
        let Some(catalog) = self.catalog.as_ref() else {
            return Ok(Some("No track list".to_string()));
        };
        let index = index.min(catalog.len() - 1);
        let Some(track) = catalog.get(index) else {
            return Ok(None);
        };
        let (number, title) = (track.number, track.title.clone());
        self.link.play_track(number)?;
        self.cursor = index;
        self.state = PlaybackState::Playing(Some(index));
        Ok(Some(format!("Playing {title}")))
    }
}
