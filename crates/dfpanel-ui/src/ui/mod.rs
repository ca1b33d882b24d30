pub mod layout;

use std::time::{Duration, Instant};

use embedded_graphics::prelude::Point;
use embedded_graphics::primitives::{ContainsPoint, Rectangle};

use crate::playback::PlaybackIntent;
use crate::protocol::MAX_VOLUME;
use crate::touch::TouchUpdate;

pub use layout::{ListLayout, PanelLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Playback(PlaybackIntent),
    /// Move the list window by this many rows.
    Scroll(i32),
    Calibrate,
    CycleOrientation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Orientation,
    Calibrate,
    ScrollUp,
    ScrollDown,
    TrackList,
    PlayPause,
    Previous,
    Next,
    Stop,
    Volume,
}

impl Role {
    /// Evaluation order for hit-testing. Earlier roles win on overlap.
    pub const PRIORITY: [Self; 10] = [
        Self::Orientation,
        Self::Calibrate,
        Self::ScrollUp,
        Self::ScrollDown,
        Self::TrackList,
        Self::PlayPause,
        Self::Previous,
        Self::Next,
        Self::Stop,
        Self::Volume,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Orientation => "Rot",
            Self::Calibrate => "Cal",
            Self::ScrollUp => "Up",
            Self::ScrollDown => "Down",
            Self::TrackList => "Tracks",
            Self::PlayPause => "Play/Pause",
            Self::Previous => "Prev",
            Self::Next => "Next",
            Self::Stop => "Stop",
            Self::Volume => "Volume",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct VolumeDrag {
    last_sent: u8,
    sent_at: Instant,
}

#[derive(Debug, Clone)]
pub struct UiModel {
    layout: PanelLayout,
    regions: Vec<(Role, Rectangle)>,
    track_count: usize,
    scroll: usize,
    selected: Option<usize>,
    drag: Option<VolumeDrag>,
    drag_interval: Duration,
}

impl UiModel {
    pub fn new(layout: PanelLayout, track_count: usize, drag_interval: Duration) -> Self {
        let regions = region_table(&layout);
        let mut model = Self {
            layout,
            regions,
            track_count,
            scroll: 0,
            selected: None,
            drag: None,
            drag_interval,
        };
        model.clamp_scroll();
        model
    }

    pub fn layout(&self) -> &PanelLayout {
        &self.layout
    }

    pub fn scroll(&self) -> usize {
        self.scroll
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn track_count(&self) -> usize {
        self.track_count
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// First role in priority order whose region contains `point`.
    pub fn hit_test(&self, point: Point) -> Option<Role> {
        self.regions
            .iter()
            .find(|(_, region)| region.contains(point))
            .map(|(role, _)| *role)
    }

    /// Routes one filtered touch update.
    pub fn handle(&mut self, update: TouchUpdate<Point>, now: Instant) -> Option<Intent> {
        match update {
            TouchUpdate::Pressed(point) => self.press(point, now),
            TouchUpdate::Moved(point) => self.motion(point, now),
            TouchUpdate::Released(point) => self.release(point),
        }
    }

    /// First stable coordinate of a gesture. Discrete controls fire here, once.
    pub fn press(&mut self, point: Point, now: Instant) -> Option<Intent> {
        self.drag = None;
        let role = self.hit_test(point)?;
        let intent = match role {
            Role::Orientation => Intent::CycleOrientation,
            Role::Calibrate => Intent::Calibrate,
            Role::ScrollUp => Intent::Scroll(-1),
            Role::ScrollDown => Intent::Scroll(1),
            Role::TrackList => {
                let list = self.layout.list?;
                let index = self.scroll + list.row_at(point.y)?;
                if index >= self.track_count {
                    return None;
                }
                Intent::Playback(PlaybackIntent::SelectTrack(index))
            }
            Role::PlayPause => Intent::Playback(PlaybackIntent::TogglePlay),
            Role::Previous => Intent::Playback(PlaybackIntent::Previous),
            Role::Next => Intent::Playback(PlaybackIntent::Next),
            Role::Stop => Intent::Playback(PlaybackIntent::Stop),
            Role::Volume => {
                let level = self.volume_at(point.x);
                self.drag = Some(VolumeDrag {
                    last_sent: level,
                    sent_at: now,
                });
                Intent::Playback(PlaybackIntent::SetVolume(i32::from(level)))
            }
        };
        tracing::debug!(role = role.label(), x = point.x, y = point.y, "tap");
        Some(intent)
    }

    /// Further movement while down. Only a volume drag reacts, at most once
    /// per drag interval and only when the level changed.
    pub fn motion(&mut self, point: Point, now: Instant) -> Option<Intent> {
        let level = self.volume_at(point.x);
        let drag = self.drag.as_mut()?;
        if level == drag.last_sent || now.duration_since(drag.sent_at) < self.drag_interval {
            return None;
        }
        drag.last_sent = level;
        drag.sent_at = now;
        Some(Intent::Playback(PlaybackIntent::SetVolume(i32::from(level))))
    }

    /// End of gesture. A drag settles on its final level even if the last
    /// move was rate limited.
    pub fn release(&mut self, point: Option<Point>) -> Option<Intent> {
        let drag = self.drag.take()?;
        let level = self.volume_at(point?.x);
        (level != drag.last_sent)
            .then_some(Intent::Playback(PlaybackIntent::SetVolume(i32::from(level))))
    }

    /// Volume level for a horizontal position, clamped to the slider.
    pub fn volume_at(&self, x: i32) -> u8 {
        let slider = self.layout.volume;
        let span = i64::from(slider.size.width.saturating_sub(1).max(1));
        let offset = i64::from(x - slider.top_left.x).clamp(0, span);
        (offset * i64::from(MAX_VOLUME) / span) as u8
    }

    pub fn scroll_by(&mut self, delta: i32) {
        let target = self.scroll as i64 + i64::from(delta);
        self.scroll = target.max(0) as usize;
        self.clamp_scroll_offset();
    }

    /// Marks a catalog index as selected and scrolls it into view if it changed.
    pub fn set_selected(&mut self, selected: Option<usize>) {
        let selected = selected.filter(|index| *index < self.track_count);
        if selected != self.selected {
            self.selected = selected;
            self.clamp_scroll();
        }
    }

    pub fn set_track_count(&mut self, track_count: usize) {
        self.track_count = track_count;
        self.selected = self.selected.filter(|index| *index < track_count);
        self.clamp_scroll();
    }

    /// Keeps the selected row visible, then bounds the offset to
    /// `[0, track_count - visible_rows]`.
    pub fn clamp_scroll(&mut self) {
        let visible = self.layout.visible_rows();
        if let Some(selected) = self.selected {
            if visible > 0 {
                if selected < self.scroll {
                    self.scroll = selected;
                } else if selected >= self.scroll + visible {
                    self.scroll = selected + 1 - visible;
                }
            }
        }
        self.clamp_scroll_offset();
    }

    fn clamp_scroll_offset(&mut self) {
        let max_offset = self
            .track_count
            .saturating_sub(self.layout.visible_rows());
        self.scroll = self.scroll.min(max_offset);
    }
}

fn region_table(layout: &PanelLayout) -> Vec<(Role, Rectangle)> {
    Role::PRIORITY
        .iter()
        .filter_map(|role| {
            let region = match role {
                Role::Orientation => layout.orientation,
                Role::Calibrate => layout.calibrate,
                Role::ScrollUp => layout.list?.scroll_up,
                Role::ScrollDown => layout.list?.scroll_down,
                Role::TrackList => layout.list?.rows,
                Role::PlayPause => layout.play_pause,
                Role::Previous => layout.previous,
                Role::Next => layout.next,
                Role::Stop => layout.stop,
                Role::Volume => layout.volume,
            };
            Some((*role, region))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn center(r: Rectangle) -> Point {
        r.center()
    }

    fn model(tracks: usize) -> UiModel {
        UiModel::new(
            PanelLayout::from_dimensions(480, 320, tracks > 0),
            tracks,
            Duration::from_millis(20),
        )
    }

    #[test]
    fn taps_map_to_transport_intents() {
        let mut ui = model(0);
        let now = Instant::now();
        let layout = ui.layout().clone();
        assert_eq!(
            ui.press(center(layout.play_pause), now),
            Some(Intent::Playback(PlaybackIntent::TogglePlay))
        );
        assert_eq!(
            ui.press(center(layout.stop), now),
            Some(Intent::Playback(PlaybackIntent::Stop))
        );
        assert_eq!(ui.press(center(layout.calibrate), now), Some(Intent::Calibrate));
        assert_eq!(
            ui.press(center(layout.orientation), now),
            Some(Intent::CycleOrientation)
        );
        assert_eq!(ui.press(Point::new(2, 2), now), None);
    }

    #[test]
    fn priority_order_resolves_overlap() {
        let mut layout = PanelLayout::from_dimensions(480, 320, false);
        layout.calibrate = layout.volume;
        let ui = UiModel::new(layout.clone(), 0, Duration::from_millis(20));
        assert_eq!(ui.hit_test(center(layout.volume)), Some(Role::Calibrate));
    }

    #[test]
    fn volume_slider_spans_zero_to_max() {
        let ui = model(0);
        let slider = ui.layout().volume;
        assert_eq!(ui.volume_at(slider.top_left.x - 20), 0);
        assert_eq!(ui.volume_at(slider.top_left.x), 0);
        let right = slider.top_left.x + slider.size.width as i32 - 1;
        assert_eq!(ui.volume_at(right), 30);
        assert_eq!(ui.volume_at(right + 50), 30);
    }

    #[test]
    fn volume_drag_is_rate_limited() {
        let mut ui = model(0);
        let slider = ui.layout().volume;
        let y = center(slider).y;
        let t0 = Instant::now();
        let start = Point::new(slider.top_left.x, y);
        assert_eq!(
            ui.press(start, t0),
            Some(Intent::Playback(PlaybackIntent::SetVolume(0)))
        );
        let far = Point::new(slider.top_left.x + slider.size.width as i32 - 1, y);
        assert_eq!(ui.motion(far, t0 + Duration::from_millis(5)), None);
        assert_eq!(
            ui.motion(far, t0 + Duration::from_millis(25)),
            Some(Intent::Playback(PlaybackIntent::SetVolume(30)))
        );
        assert_eq!(ui.motion(far, t0 + Duration::from_millis(60)), None);
        assert_eq!(ui.release(Some(far)), None);
        assert!(!ui.is_dragging());
    }

    #[test]
    fn release_settles_on_final_drag_level() {
        let mut ui = model(0);
        let slider = ui.layout().volume;
        let y = center(slider).y;
        let t0 = Instant::now();
        ui.press(Point::new(slider.top_left.x, y), t0);
        let mid = center(slider);
        assert_eq!(ui.motion(mid, t0), None);
        let level = i32::from(ui.volume_at(mid.x));
        assert_eq!(
            ui.release(Some(mid)),
            Some(Intent::Playback(PlaybackIntent::SetVolume(level)))
        );
    }

    #[test]
    fn motion_without_drag_is_ignored() {
        let mut ui = model(0);
        let now = Instant::now();
        ui.press(center(ui.layout().play_pause), now);
        assert_eq!(ui.motion(center(ui.layout().volume), now + Duration::from_secs(1)), None);
    }

    #[test]
    fn list_row_selects_scrolled_index() {
        let mut ui = model(20);
        let list = ui.layout().list.unwrap();
        ui.scroll_by(3);
        assert_eq!(
            ui.press(center(list.row_rect(2)), Instant::now()),
            Some(Intent::Playback(PlaybackIntent::SelectTrack(5)))
        );
    }

    #[test]
    fn empty_rows_below_catalog_do_nothing() {
        let mut ui = model(3);
        let list = ui.layout().list.unwrap();
        assert_eq!(ui.press(center(list.row_rect(5)), Instant::now()), None);
    }

    #[test]
    fn scroll_is_clamped_to_window() {
        let mut ui = model(3);
        ui.scroll_by(1);
        assert_eq!(ui.scroll(), 0);

        let mut ui = model(10);
        ui.scroll_by(-1);
        assert_eq!(ui.scroll(), 0);
        for _ in 0..10 {
            ui.scroll_by(1);
        }
        assert_eq!(ui.scroll(), 3);
    }

    #[test]
    fn selection_is_scrolled_into_view() {
        let mut ui = model(20);
        ui.set_selected(Some(12));
        assert_eq!(ui.scroll(), 6);
        ui.set_selected(Some(2));
        assert_eq!(ui.scroll(), 2);
        ui.set_selected(Some(19));
        assert_eq!(ui.scroll(), 13);
    }

    #[test]
    fn shrinking_catalog_reclamps_scroll() {
        let mut ui = model(20);
        ui.set_selected(Some(19));
        ui.set_track_count(8);
        assert_eq!(ui.selected(), None);
        assert_eq!(ui.scroll(), 1);
    }
}
