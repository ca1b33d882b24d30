//! Ranges are stored in raw-axis units, never panel order, so changing the
//! orientation does not invalidate a stored calibration.

use std::{
    fmt, fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::PanelError;

/// A pair of raw readings, one per sensor axis (or per panel axis once oriented).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawPoint {
    pub x: i32,
    pub y: i32,
}

impl RawPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Inclusive raw range of one axis. `max > min` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRange {
    min: i32,
    max: i32,
}

impl AxisRange {
    /// Orders the bounds and widens a zero-width range by one unit, downwards
    /// when the range already sits at `i32::MAX`.
    pub fn new(a: i32, b: i32) -> Self {
        let (min, max) = if a <= b { (a, b) } else { (b, a) };
        match min.checked_add(1) {
            _ if min < max => Self { min, max },
            Some(max) => Self { min, max },
            None => Self {
                min: i32::MAX - 1,
                max: i32::MAX,
            },
        }
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn span(&self) -> i64 {
        i64::from(self.max) - i64::from(self.min)
    }

    /// Mirror image of `value` about the midpoint of the range.
    pub fn reflect(&self, value: i32) -> i32 {
        (i64::from(self.min) + i64::from(self.max) - i64::from(value))
            .clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }

    /// Linear rescale onto `0..=extent-1`, truncating. Values outside the
    /// range land on the nearest edge.
    pub fn scale(&self, value: i32, extent: u32) -> u32 {
        let last = i128::from(extent.max(1) - 1);
        let offset = i128::from(value.clamp(self.min, self.max)) - i128::from(self.min);
        (offset * last / i128::from(self.span())) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationRange {
    pub x: AxisRange,
    pub y: AxisRange,
}

impl CalibrationRange {
    pub fn new(min_x: i32, max_x: i32, min_y: i32, max_y: i32) -> Self {
        Self {
            x: AxisRange::new(min_x, max_x),
            y: AxisRange::new(min_y, max_y),
        }
    }

    /// Persisted form: `minX maxX minY maxY` on one line.
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {}",
            self.x.min, self.x.max, self.y.min, self.y.max
        )
    }

    pub fn parse(line: &str) -> Result<Self, PanelError> {
        let values = line
            .split_whitespace()
            .map(|token| token.parse::<i32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| PanelError::InvalidCalibration(err.to_string()))?;
        match values.as_slice() {
            [min_x, max_x, min_y, max_y] => Ok(Self::new(*min_x, *max_x, *min_y, *max_y)),
            other => Err(PanelError::InvalidCalibration(format!(
                "expected 4 values, found {}",
                other.len()
            ))),
        }
    }
}

impl fmt::Display for CalibrationRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "x[{}..{}] y[{}..{}]",
            self.x.min, self.x.max, self.y.min, self.y.max
        )
    }
}

/// Axis swap and per-axis reflection needed for a given mounting rotation.
///
/// Flips name the panel axis they act on, so `SwapFlipY` first exchanges the
/// sensor axes and then mirrors the resulting vertical axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    Identity,
    FlipX,
    FlipY,
    FlipXY,
    Swap,
    SwapFlipX,
    #[default]
    SwapFlipY,
    SwapFlipXY,
}

impl Orientation {
    pub const ALL: [Self; 8] = [
        Self::Identity,
        Self::FlipX,
        Self::FlipY,
        Self::FlipXY,
        Self::Swap,
        Self::SwapFlipX,
        Self::SwapFlipY,
        Self::SwapFlipXY,
    ];

    pub fn swaps_axes(self) -> bool {
        matches!(
            self,
            Self::Swap | Self::SwapFlipX | Self::SwapFlipY | Self::SwapFlipXY
        )
    }

    pub fn flips_x(self) -> bool {
        matches!(
            self,
            Self::FlipX | Self::FlipXY | Self::SwapFlipX | Self::SwapFlipXY
        )
    }

    pub fn flips_y(self) -> bool {
        matches!(
            self,
            Self::FlipY | Self::FlipXY | Self::SwapFlipY | Self::SwapFlipXY
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Identity => "normal",
            Self::FlipX => "flip-x",
            Self::FlipY => "flip-y",
            Self::FlipXY => "flip-xy",
            Self::Swap => "swap",
            Self::SwapFlipX => "swap+flip-x",
            Self::SwapFlipY => "swap+flip-y",
            Self::SwapFlipXY => "swap+flip-xy",
        }
    }

    /// Next orientation in cycle order, wrapping around.
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|o| *o == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    /// Raw ranges in panel order: the range feeding panel X, then panel Y.
    pub fn panel_ranges(self, range: &CalibrationRange) -> (AxisRange, AxisRange) {
        if self.swaps_axes() {
            (range.y, range.x)
        } else {
            (range.x, range.y)
        }
    }

    /// Swap, then reflect each panel axis about the midpoint of its raw range.
    pub fn forward(self, range: &CalibrationRange, raw: RawPoint) -> RawPoint {
        let (a, b) = if self.swaps_axes() {
            (raw.y, raw.x)
        } else {
            (raw.x, raw.y)
        };
        let (range_a, range_b) = self.panel_ranges(range);
        let a = if self.flips_x() { range_a.reflect(a) } else { a };
        let b = if self.flips_y() { range_b.reflect(b) } else { b };
        RawPoint::new(a, b)
    }

    /// Undo the reflections, then undo the swap.
    pub fn inverse(self, range: &CalibrationRange, oriented: RawPoint) -> RawPoint {
        let (range_a, range_b) = self.panel_ranges(range);
        let a = if self.flips_x() {
            range_a.reflect(oriented.x)
        } else {
            oriented.x
        };
        let b = if self.flips_y() {
            range_b.reflect(oriented.y)
        } else {
            oriented.y
        };
        if self.swaps_axes() {
            RawPoint::new(b, a)
        } else {
            RawPoint::new(a, b)
        }
    }
}

/// Builds a raw-axis range from four panel-order tap medians.
///
/// The oriented points are taken back to raw space first; on each raw axis
/// the lower bound is the mean of the two smallest readings and the upper
/// bound the mean of the two largest, whichever targets produced them.
pub fn solve_range(
    orientation: Orientation,
    current: &CalibrationRange,
    oriented: &[RawPoint; 4],
) -> CalibrationRange {
    let raw: Vec<RawPoint> = oriented
        .iter()
        .map(|p| orientation.inverse(current, *p))
        .collect();
    let mut xs: Vec<i32> = raw.iter().map(|p| p.x).collect();
    let mut ys: Vec<i32> = raw.iter().map(|p| p.y).collect();
    xs.sort_unstable();
    ys.sort_unstable();
    CalibrationRange::new(
        midpoint(xs[0], xs[1]),
        midpoint(xs[2], xs[3]),
        midpoint(ys[0], ys[1]),
        midpoint(ys[2], ys[3]),
    )
}

fn midpoint(a: i32, b: i32) -> i32 {
    ((i64::from(a) + i64::from(b)) / 2) as i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationSource {
    Persisted,
    Device,
    Calibrated,
}

impl CalibrationSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Persisted => "persisted",
            Self::Device => "device",
            Self::Calibrated => "calibrated",
        }
    }
}

/// Sole owner of the active calibration. Readers borrow it per mapping call.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    range: CalibrationRange,
    orientation: Orientation,
    source: CalibrationSource,
    path: PathBuf,
}

impl CalibrationStore {
    /// Never fails: a missing or corrupt file means "use the device range".
    pub fn load(path: &Path, device_range: CalibrationRange, orientation: Orientation) -> Self {
        let (range, source) = match read_range(path) {
            Ok(Some(range)) => (range, CalibrationSource::Persisted),
            Ok(None) => (device_range, CalibrationSource::Device),
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    "Ignoring unreadable touch calibration: {err:#}"
                );
                (device_range, CalibrationSource::Device)
            }
        };
        tracing::info!(
            range = %range,
            orientation = orientation.label(),
            source = source.as_str(),
            "Touch calibration loaded"
        );
        Self {
            range,
            orientation,
            source,
            path: path.to_path_buf(),
        }
    }

    pub fn range(&self) -> &CalibrationRange {
        &self.range
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn source(&self) -> CalibrationSource {
        self.source
    }

    pub fn set_orientation(&mut self, orientation: Orientation) {
        self.orientation = orientation;
    }

    /// Adopts a freshly measured range and persists it.
    ///
    /// The in-memory range is replaced even if the write fails; the error is
    /// returned so the caller can report that the result will not survive a
    /// restart.
    pub fn replace(&mut self, range: CalibrationRange) -> Result<()> {
        self.range = range;
        self.source = CalibrationSource::Calibrated;
        write_range_atomic(&self.path, &range)
    }
}

fn read_range(path: &Path) -> Result<Option<CalibrationRange>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("reading {}", path.display()));
        }
    };
    let line = contents.lines().next().unwrap_or_default();
    let range = CalibrationRange::parse(line).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(range))
}

fn write_range_atomic(path: &Path, range: &CalibrationRange) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating calibration directory {}", parent.display()))?;
    }
    let tmp = path.with_extension("tmp");
    let mut file =
        fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    writeln!(file, "{}", range.to_line()).with_context(|| format!("writing {}", tmp.display()))?;
    file.sync_all()
        .with_context(|| format!("syncing {}", tmp.display()))?;
    drop(file);
    fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}
