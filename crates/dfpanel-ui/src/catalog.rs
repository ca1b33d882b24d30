use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::PanelError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// 1-based track number on the playback module's storage.
    pub number: u16,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    tracks: Vec<Track>,
}

impl Catalog {
    /// Drops entries numbered 0, which the module cannot address.
    pub fn from_tracks(tracks: Vec<Track>) -> Self {
        let tracks = tracks.into_iter().filter(|t| t.number > 0).collect();
        Self { tracks }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let tracks: Vec<Track> = serde_json::from_str(&contents)
            .map_err(|err| PanelError::InvalidCatalog(err.to_string()))
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Self::from_tracks(tracks))
    }

    /// `None` for a missing, unreadable or empty catalog; the panel then runs
    /// without a list.
    pub fn load_optional(path: Option<&Path>) -> Option<Self> {
        let path = path?;
        match Self::load(path) {
            Ok(catalog) if !catalog.is_empty() => {
                tracing::info!(path = %path.display(), tracks = catalog.len(), "Track catalog loaded");
                Some(catalog)
            }
            Ok(_) => {
                tracing::warn!(path = %path.display(), "Track catalog is empty");
                None
            }
            Err(err) => {
                tracing::warn!("Track catalog unavailable: {err:#}");
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }
}
