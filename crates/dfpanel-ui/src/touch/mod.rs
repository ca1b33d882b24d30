pub mod calibrate;
pub mod device;

use std::{collections::VecDeque, time::Duration};

use anyhow::Result;
use embedded_graphics::prelude::{Point, Size};

use crate::calibration::{CalibrationRange, CalibrationStore, Orientation, RawPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// One decoded input event. X and Y updates arrive independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchEvent {
    Axis(Axis, i32),
    Contact(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextEvent {
    Event(TouchEvent),
    TimedOut,
    Closed,
}

pub trait TouchSource {
    /// Axis limits reported by the driver, queried once at open time.
    fn device_range(&self) -> CalibrationRange;

    /// Blocks until an event arrives, `timeout` elapses, or the source ends.
    /// `None` waits indefinitely.
    fn next_event(&mut self, timeout: Option<Duration>) -> Result<NextEvent>;
}

/// Tuning knobs for jitter suppression. The defaults were found empirically on
/// resistive panels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterTuning {
    /// Samples per axis needed after touch-down before a point is trusted.
    pub stable_samples: usize,
    /// Trailing samples per axis fed into the median.
    pub median_window: usize,
}

impl Default for FilterTuning {
    fn default() -> Self {
        Self {
            stable_samples: 4,
            median_window: 6,
        }
    }
}

/// Median of `values`; the mean of the two middle values for even counts.
pub fn median(values: &[i32]) -> Option<i32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some(((i64::from(sorted[mid - 1]) + i64::from(sorted[mid])) / 2) as i32)
    }
}

#[derive(Debug, Clone)]
struct SampleWindow {
    samples: VecDeque<i32>,
    capacity: usize,
    seen: usize,
}

impl SampleWindow {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            seen: 0,
        }
    }

    fn push(&mut self, value: i32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
        self.seen += 1;
    }

    fn clear(&mut self) {
        self.samples.clear();
        self.seen = 0;
    }

    fn median(&self) -> Option<i32> {
        let (a, b) = self.samples.as_slices();
        let mut all = Vec::with_capacity(self.samples.len());
        all.extend_from_slice(a);
        all.extend_from_slice(b);
        median(&all)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Up,
    Down,
}

/// Output of the filter for one event, generic over the coordinate space so
/// the same value can be carried from raw units into panel pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchUpdate<P> {
    /// First stable point since touch-down.
    Pressed(P),
    /// Later stable points while still down.
    Moved(P),
    /// Contact lifted; carries the last stable point if one was reached.
    Released(Option<P>),
}

impl<P> TouchUpdate<P> {
    pub fn map<Q>(self, f: impl FnOnce(P) -> Q) -> TouchUpdate<Q> {
        match self {
            Self::Pressed(p) => TouchUpdate::Pressed(f(p)),
            Self::Moved(p) => TouchUpdate::Moved(f(p)),
            Self::Released(p) => TouchUpdate::Released(p.map(f)),
        }
    }
}

/// Single-point gesture tracker with per-axis median filtering.
#[derive(Debug, Clone)]
pub struct TouchFilter {
    tuning: FilterTuning,
    phase: GesturePhase,
    xs: SampleWindow,
    ys: SampleWindow,
    last_stable: Option<RawPoint>,
}

impl TouchFilter {
    pub fn new(tuning: FilterTuning) -> Self {
        Self {
            tuning,
            phase: GesturePhase::Up,
            xs: SampleWindow::new(tuning.median_window),
            ys: SampleWindow::new(tuning.median_window),
            last_stable: None,
        }
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    /// Forget the current gesture without reporting a release.
    pub fn reset(&mut self) {
        self.phase = GesturePhase::Up;
        self.xs.clear();
        self.ys.clear();
        self.last_stable = None;
    }

    fn is_stable(&self) -> bool {
        self.xs.seen >= self.tuning.stable_samples && self.ys.seen >= self.tuning.stable_samples
    }

    pub fn feed(&mut self, event: TouchEvent) -> Option<TouchUpdate<RawPoint>> {
        match event {
            TouchEvent::Contact(true) => {
                if self.phase == GesturePhase::Up {
                    self.reset();
                    self.phase = GesturePhase::Down;
                }
                None
            }
            TouchEvent::Contact(false) => {
                if self.phase == GesturePhase::Up {
                    return None;
                }
                let last = self.last_stable;
                self.reset();
                Some(TouchUpdate::Released(last))
            }
            TouchEvent::Axis(axis, value) => {
                // Samples outside a contact are hover noise on most controllers.
                if self.phase == GesturePhase::Up {
                    return None;
                }
                match axis {
                    Axis::X => self.xs.push(value),
                    Axis::Y => self.ys.push(value),
                }
                if !self.is_stable() {
                    return None;
                }
                let point = RawPoint::new(self.xs.median()?, self.ys.median()?);
                let first = self.last_stable.is_none();
                self.last_stable = Some(point);
                if first {
                    Some(TouchUpdate::Pressed(point))
                } else {
                    Some(TouchUpdate::Moved(point))
                }
            }
        }
    }
}

/// Orient, rescale and clamp a raw reading into panel pixels.
pub fn map_with(
    range: &CalibrationRange,
    orientation: Orientation,
    panel: Size,
    raw: RawPoint,
) -> Point {
    let oriented = orientation.forward(range, raw);
    let (range_a, range_b) = orientation.panel_ranges(range);
    Point::new(
        range_a.scale(oriented.x, panel.width) as i32,
        range_b.scale(oriented.y, panel.height) as i32,
    )
}

pub fn map_to_panel(store: &CalibrationStore, panel: Size, raw: RawPoint) -> Point {
    map_with(store.range(), store.orientation(), panel, raw)
}
