use std::time::{Duration, Instant};

use embedded_graphics::prelude::{Point, Size};

use crate::calibration::{solve_range, CalibrationRange, CalibrationStore, Orientation, RawPoint};
use crate::touch::{median, Axis, TouchEvent};

pub const TARGET_COUNT: usize = 4;

/// Distance of each crosshair from its corner, in pixels.
pub const TARGET_INSET_PX: i32 = 12;

/// Crosshair positions in panel order: top-left, top-right, bottom-right,
/// bottom-left.
pub fn calibration_targets(panel: Size) -> [Point; TARGET_COUNT] {
    let right = panel.width as i32 - 1 - TARGET_INSET_PX;
    let bottom = panel.height as i32 - 1 - TARGET_INSET_PX;
    [
        Point::new(TARGET_INSET_PX, TARGET_INSET_PX),
        Point::new(right, TARGET_INSET_PX),
        Point::new(right, bottom),
        Point::new(TARGET_INSET_PX, bottom),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationTuning {
    /// Consecutive samples per axis, while held down, that make a tap.
    pub samples: usize,
    pub timeout: Duration,
}

impl Default for CalibrationTuning {
    fn default() -> Self {
        Self {
            samples: 18,
            timeout: Duration::from_secs(8),
        }
    }
}

const MAX_HELD_SAMPLES: usize = 256;

/// Collects one held tap. Samples only count after a touch-down seen by this
/// collector, so a finger still resting from the previous target is ignored.
#[derive(Debug, Clone, Default)]
struct TapCollector {
    down: bool,
    xs: Vec<i32>,
    ys: Vec<i32>,
}

impl TapCollector {
    fn feed(&mut self, event: TouchEvent, required: usize) -> Option<RawPoint> {
        match event {
            TouchEvent::Contact(down) => {
                self.down = down;
                self.xs.clear();
                self.ys.clear();
                None
            }
            TouchEvent::Axis(axis, value) => {
                if !self.down {
                    return None;
                }
                let samples = match axis {
                    Axis::X => &mut self.xs,
                    Axis::Y => &mut self.ys,
                };
                if samples.len() < MAX_HELD_SAMPLES {
                    samples.push(value);
                }
                if self.xs.len() >= required && self.ys.len() >= required {
                    Some(RawPoint::new(median(&self.xs)?, median(&self.ys)?))
                } else {
                    None
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStep {
    /// Still waiting on the current target.
    Waiting,
    /// A target was captured; `next` is the index now being shown.
    Advanced { captured: usize, next: usize },
    /// All targets captured. The session must not be fed again.
    Complete(CalibrationRange),
    /// The current target's deadline passed.
    TimedOut { target: usize },
}

#[derive(Debug, Clone)]
pub struct CalibrationSession {
    targets: [Point; TARGET_COUNT],
    orientation: Orientation,
    current: CalibrationRange,
    tuning: CalibrationTuning,
    index: usize,
    collector: TapCollector,
    captured: Vec<RawPoint>,
    deadline: Instant,
}

impl CalibrationSession {
    /// Snapshots the active calibration; the store itself is not touched.
    pub fn new(
        store: &CalibrationStore,
        panel: Size,
        tuning: CalibrationTuning,
        now: Instant,
    ) -> Self {
        Self {
            targets: calibration_targets(panel),
            orientation: store.orientation(),
            current: *store.range(),
            tuning,
            index: 0,
            collector: TapCollector::default(),
            captured: Vec::with_capacity(TARGET_COUNT),
            deadline: now + tuning.timeout,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn target(&self) -> Point {
        self.targets[self.index.min(TARGET_COUNT - 1)]
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Time left for the current target, `None` once it has expired.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .checked_duration_since(now)
            .filter(|left| !left.is_zero())
    }

    pub fn expire(&self) -> SessionStep {
        SessionStep::TimedOut { target: self.index }
    }

    pub fn feed(&mut self, event: TouchEvent, now: Instant) -> SessionStep {
        if self.remaining(now).is_none() {
            return self.expire();
        }
        let Some(raw) = self.collector.feed(event, self.tuning.samples) else {
            return SessionStep::Waiting;
        };

        self.captured.push(self.orientation.forward(&self.current, raw));
        tracing::debug!(
            target: dfpanel_logging::targets::T_TOUCH,
            index = self.index,
            raw_x = raw.x,
            raw_y = raw.y,
            "calibration target captured"
        );

        let captured = self.index;
        self.index += 1;
        self.collector = TapCollector::default();
        self.deadline = now + self.tuning.timeout;

        if self.captured.len() < TARGET_COUNT {
            return SessionStep::Advanced {
                captured,
                next: self.index,
            };
        }

        let points = [
            self.captured[0],
            self.captured[1],
            self.captured[2],
            self.captured[3],
        ];
        SessionStep::Complete(solve_range(self.orientation, &self.current, &points))
    }
}
