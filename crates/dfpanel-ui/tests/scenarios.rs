mod common;

use std::fs;

use dfpanel_ui::app::App;
use dfpanel_ui::calibration::{CalibrationRange, CalibrationSource, Orientation};
use dfpanel_ui::catalog::Catalog;
use dfpanel_ui::config::PanelConfig;
use dfpanel_ui::playback::PlaybackState;
use dfpanel_ui::protocol::{encode_frame, track_frame, volume_frame, Command, ControlLink};
use dfpanel_ui::ui::PanelLayout;
use embedded_graphics::prelude::Point;

use common::{
    frames, identity_range, write_catalog, write_config, BrokenLink, MemoryDisplay, ScriptedTouch,
};

type TestApp = App<ScriptedTouch, Vec<u8>, MemoryDisplay>;

fn build(
    root: &std::path::Path,
    touch: ScriptedTouch,
    display: MemoryDisplay,
    catalog: Option<Catalog>,
) -> TestApp {
    let config = PanelConfig::load(root).unwrap();
    App::new(root, config, touch, ControlLink::new(Vec::new()), display, catalog)
}

fn sent(app: &TestApp) -> Vec<[u8; 10]> {
    frames(app.playback().link().get_ref())
}

#[test]
fn calibration_round_trip_recovers_raw_corners() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), Orientation::SwapFlipY, None);

    let mut touch = ScriptedTouch::new(CalibrationRange::new(200, 3800, 300, 3700));
    for (x, y) in [(210, 3690), (3790, 3690), (3790, 320), (210, 320)] {
        touch.hold(x, y, 18);
    }

    let mut app = build(dir.path(), touch, MemoryDisplay::new(480, 320), None);
    app.start(true).unwrap();
    assert!(app.is_calibrating());
    app.run().unwrap();

    assert!(!app.is_calibrating());
    let expected = CalibrationRange::new(210, 3790, 320, 3690);
    assert_eq!(*app.store().range(), expected);
    assert_eq!(app.store().source(), CalibrationSource::Calibrated);
    assert_eq!(app.note(), Some("Calibrated"));

    let persisted = fs::read_to_string(dir.path().join("touch_calibration.txt")).unwrap();
    assert_eq!(persisted.trim(), "210 3790 320 3690");
    // Startup, first target, three advances, then the main screen again.
    assert_eq!(app.display().frames.len(), 6);
}

#[test]
fn calibration_timeout_keeps_previous_range() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), Orientation::SwapFlipY, None);
    let calibration_file = dir.path().join("touch_calibration.txt");
    fs::write(&calibration_file, "250 3750 350 3650\n").unwrap();

    let mut touch = ScriptedTouch::new(CalibrationRange::new(200, 3800, 300, 3700));
    touch.hold(210, 3690, 18).timed_out();

    let mut app = build(dir.path(), touch, MemoryDisplay::new(480, 320), None);
    app.start(true).unwrap();
    app.run().unwrap();

    assert!(!app.is_calibrating());
    assert_eq!(
        *app.store().range(),
        CalibrationRange::new(250, 3750, 350, 3650)
    );
    assert_eq!(app.store().source(), CalibrationSource::Persisted);
    assert_eq!(app.note(), Some("Calibration timed out"));
    assert_eq!(
        fs::read_to_string(&calibration_file).unwrap(),
        "250 3750 350 3650\n"
    );
}

#[test]
fn previous_at_first_track_does_not_wrap() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), Orientation::Identity, Some("tracks.json"));
    let catalog = write_catalog(dir.path(), 5);
    let layout = PanelLayout::from_dimensions(480, 320, true);

    let mut touch = ScriptedTouch::new(identity_range(480, 320));
    touch.tap(layout.previous.center());

    let mut app = build(dir.path(), touch, MemoryDisplay::new(480, 320), Some(catalog));
    app.start(false).unwrap();
    app.run().unwrap();

    assert_eq!(app.playback().state(), PlaybackState::Playing(Some(0)));
    assert_eq!(app.ui().selected(), Some(0));
    assert_eq!(sent(&app), vec![volume_frame(18), track_frame(1)]);
}

#[test]
fn play_pause_toggle_from_idle() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), Orientation::Identity, Some("tracks.json"));
    let catalog = write_catalog(dir.path(), 5);
    let layout = PanelLayout::from_dimensions(480, 320, true);

    let mut touch = ScriptedTouch::new(identity_range(480, 320));
    touch
        .tap(layout.play_pause.center())
        .tap(layout.play_pause.center());

    let mut app = build(dir.path(), touch, MemoryDisplay::new(480, 320), Some(catalog));
    app.start(false).unwrap();
    app.run().unwrap();

    assert_eq!(app.playback().state(), PlaybackState::Paused(Some(0)));
    assert_eq!(
        sent(&app),
        vec![
            volume_frame(18),
            track_frame(1),
            encode_frame(Command::Pause, 0, 0)
        ]
    );
    // One paint at startup plus one per transition.
    assert_eq!(app.frames(), 3);
    assert_eq!(app.display().frames.len(), 3);
    assert_eq!(app.display().frames[0].len(), 480 * 320 * 2);
}

#[test]
fn scroll_down_with_short_catalog_stays_at_top() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), Orientation::Identity, Some("tracks.json"));
    let catalog = write_catalog(dir.path(), 3);
    let layout = PanelLayout::from_dimensions(480, 256, true);
    assert_eq!(layout.visible_rows(), 5);
    let list = layout.list.unwrap();

    let mut touch = ScriptedTouch::new(identity_range(480, 256));
    touch
        .tap(list.scroll_down.center())
        .tap(list.scroll_down.center());

    let mut app = build(dir.path(), touch, MemoryDisplay::new(480, 256), Some(catalog));
    app.start(false).unwrap();
    app.run().unwrap();

    assert_eq!(app.ui().scroll(), 0);
    assert_eq!(sent(&app), vec![volume_frame(18)]);
}

#[test]
fn next_scrolls_playing_row_into_view() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), Orientation::Identity, Some("tracks.json"));
    let catalog = write_catalog(dir.path(), 12);
    let layout = PanelLayout::from_dimensions(480, 320, true);
    let row = layout.list.unwrap().row_rect(6);

    let mut touch = ScriptedTouch::new(identity_range(480, 320));
    touch.tap(row.center()).tap(layout.next.center());

    let mut app = build(dir.path(), touch, MemoryDisplay::new(480, 320), Some(catalog));
    app.start(false).unwrap();
    app.run().unwrap();

    assert_eq!(app.playback().state(), PlaybackState::Playing(Some(7)));
    assert_eq!(app.ui().scroll(), 1);
    assert_eq!(
        sent(&app),
        vec![volume_frame(18), track_frame(7), track_frame(8)]
    );
}

#[test]
fn volume_drag_settles_on_release_position() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), Orientation::Identity, None);
    let layout = PanelLayout::from_dimensions(480, 320, false);
    let slider = layout.volume;
    let y = slider.center().y;
    let left = Point::new(slider.top_left.x, y);
    let past_right = Point::new(479, y);

    let mut touch = ScriptedTouch::new(identity_range(480, 320));
    touch.drag(left, past_right);

    let mut app = build(dir.path(), touch, MemoryDisplay::new(480, 320), None);
    app.start(false).unwrap();
    app.run().unwrap();

    assert_eq!(app.playback().volume(), 30);
    let sent = sent(&app);
    assert_eq!(sent.first(), Some(&volume_frame(18)));
    assert_eq!(sent.get(1), Some(&volume_frame(0)));
    assert_eq!(sent.last(), Some(&volume_frame(30)));
    assert_eq!(app.playback().state(), PlaybackState::Idle);
}

#[test]
fn orientation_cycle_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), Orientation::Identity, None);
    let layout = PanelLayout::from_dimensions(480, 320, false);

    let mut touch = ScriptedTouch::new(identity_range(480, 320));
    touch.tap(layout.orientation.center());

    let mut app = build(dir.path(), touch, MemoryDisplay::new(480, 320), None);
    app.start(false).unwrap();
    app.run().unwrap();

    assert_eq!(app.store().orientation(), Orientation::FlipX);
    assert_eq!(app.note(), Some("Rotation: flip-x"));
    let reloaded = PanelConfig::load(dir.path()).unwrap();
    assert_eq!(reloaded.touch.orientation, Orientation::FlipX);
}

#[test]
fn calibrate_button_enters_calibration() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), Orientation::Identity, None);
    let layout = PanelLayout::from_dimensions(480, 320, false);

    let mut touch = ScriptedTouch::new(identity_range(480, 320));
    touch.tap(layout.calibrate.center());

    let mut app = build(dir.path(), touch, MemoryDisplay::new(480, 320), None);
    app.start(false).unwrap();
    app.run().unwrap();

    assert!(app.is_calibrating());
    assert_eq!(sent(&app), vec![volume_frame(18)]);
}

#[test]
fn serial_write_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), Orientation::Identity, None);
    let touch = ScriptedTouch::new(identity_range(480, 320));
    let mut app = App::new(
        dir.path(),
        config,
        touch,
        ControlLink::new(BrokenLink),
        MemoryDisplay::new(480, 320),
        None,
    );
    let err = app.start(false).unwrap_err();
    assert!(format!("{err:#}").contains("set-volume"));
}
