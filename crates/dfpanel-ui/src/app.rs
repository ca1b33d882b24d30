use std::{
    io::Write,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::Result;
use dfpanel_logging::targets::T_TOUCH;
use embedded_graphics::prelude::Size;

use crate::calibration::{CalibrationRange, CalibrationStore};
use crate::catalog::Catalog;
use crate::compositor::{CalibrationView, Compositor, DisplaySink, MainView};
use crate::config::PanelConfig;
use crate::error::PanelError;
use crate::playback::PlaybackController;
use crate::protocol::ControlLink;
use crate::touch::calibrate::{CalibrationSession, SessionStep};
use crate::touch::{map_to_panel, NextEvent, TouchEvent, TouchFilter, TouchSource};
use crate::ui::{Intent, PanelLayout, UiModel};

pub enum Mode {
    Normal,
    Calibrating(CalibrationSession),
}

pub struct App<T, W, D>
where
    T: TouchSource,
    W: Write,
    D: DisplaySink,
{
    root: PathBuf,
    config: PanelConfig,
    touch: T,
    display: D,
    compositor: Compositor,
    filter: TouchFilter,
    store: CalibrationStore,
    ui: UiModel,
    playback: PlaybackController<W>,
    mode: Mode,
    note: Option<String>,
    panel: Size,
    frames: u64,
}

impl<T, W, D> App<T, W, D>
where
    T: TouchSource,
    W: Write,
    D: DisplaySink,
{
    pub fn new(
        root: &Path,
        config: PanelConfig,
        touch: T,
        link: ControlLink<W>,
        display: D,
        catalog: Option<Catalog>,
    ) -> Self {
        let panel = display.size();
        let store = CalibrationStore::load(
            &config.calibration_path(root),
            touch.device_range(),
            config.touch.orientation,
        );
        let playback = PlaybackController::new(link, catalog, config.playback.initial_volume);
        let layout = PanelLayout::from_dimensions(
            panel.width,
            panel.height,
            playback.catalog().is_some(),
        );
        let ui = UiModel::new(layout, playback.track_count(), config.touch.drag_interval());
        Self {
            root: root.to_path_buf(),
            compositor: Compositor::new(&config.colors, panel),
            filter: TouchFilter::new(config.touch.filter_tuning()),
            config,
            touch,
            display,
            store,
            ui,
            playback,
            mode: Mode::Normal,
            note: None,
            panel,
            frames: 0,
        }
    }

    pub fn ui(&self) -> &UiModel {
        &self.ui
    }

    pub fn playback(&self) -> &PlaybackController<W> {
        &self.playback
    }

    pub fn store(&self) -> &CalibrationStore {
        &self.store
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn is_calibrating(&self) -> bool {
        matches!(self.mode, Mode::Calibrating(_))
    }

    /// Frames presented so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// First paint, then align the module's volume with the UI.
    pub fn start(&mut self, calibrate: bool) -> Result<()> {
        self.redraw()?;
        self.playback.sync_volume()?;
        if calibrate {
            self.begin_calibration(Instant::now())?;
        }
        Ok(())
    }

    pub fn run(&mut self) -> Result<()> {
        while self.step()? {}
        tracing::info!(target: T_TOUCH, "touch source closed, leaving event loop");
        Ok(())
    }

    /// Handles one read from the touch source. Returns `false` once the source
    /// has ended.
    pub fn step(&mut self) -> Result<bool> {
        let timeout = match &self.mode {
            Mode::Normal => None,
            Mode::Calibrating(session) => {
                Some(session.remaining(Instant::now()).unwrap_or(Duration::ZERO))
            }
        };
        match self.touch.next_event(timeout)? {
            NextEvent::Event(event) => self.on_event(event, Instant::now())?,
            NextEvent::TimedOut => self.on_timeout()?,
            NextEvent::Closed => return Ok(false),
        }
        Ok(true)
    }

    fn on_event(&mut self, event: TouchEvent, now: Instant) -> Result<()> {
        if let Mode::Calibrating(session) = &mut self.mode {
            let step = session.feed(event, now);
            return self.on_calibration_step(step);
        }

        let Some(update) = self.filter.feed(event) else {
            return Ok(());
        };
        let (store, panel) = (&self.store, self.panel);
        let update = update.map(|raw| map_to_panel(store, panel, raw));
        let was_dragging = self.ui.is_dragging();
        match self.ui.handle(update, now) {
            Some(intent) => self.dispatch(intent, now),
            // drop the slider outline
            None if was_dragging && !self.ui.is_dragging() => self.redraw(),
            None => Ok(()),
        }
    }

    fn on_timeout(&mut self) -> Result<()> {
        let step = match &self.mode {
            Mode::Calibrating(session) => session.expire(),
            Mode::Normal => return Ok(()),
        };
        self.on_calibration_step(step)
    }

    pub fn dispatch(&mut self, intent: Intent, now: Instant) -> Result<()> {
        match intent {
            Intent::Playback(intent) => {
                let transition = self.playback.handle(intent)?;
                self.ui.set_selected(transition.state.track());
                self.note = transition.note;
            }
            Intent::Scroll(delta) => self.ui.scroll_by(delta),
            Intent::Calibrate => return self.begin_calibration(now),
            Intent::CycleOrientation => self.cycle_orientation(),
        }
        self.redraw()
    }

    pub fn begin_calibration(&mut self, now: Instant) -> Result<()> {
        let session = CalibrationSession::new(
            &self.store,
            self.panel,
            self.config.touch.calibration_tuning(),
            now,
        );
        tracing::info!(
            target: T_TOUCH,
            orientation = self.store.orientation().label(),
            range = %self.store.range(),
            "calibration started"
        );
        self.filter.reset();
        self.mode = Mode::Calibrating(session);
        self.redraw()
    }

    fn on_calibration_step(&mut self, step: SessionStep) -> Result<()> {
        match step {
            SessionStep::Waiting => Ok(()),
            SessionStep::Advanced { .. } => self.redraw(),
            SessionStep::Complete(range) => {
                self.finish_calibration(range);
                self.redraw()
            }
            SessionStep::TimedOut { target } => {
                let err = PanelError::CalibrationTimeout { target };
                tracing::warn!(target: T_TOUCH, "{err}; keeping {}", self.store.range());
                self.leave_calibration(Some("Calibration timed out".to_string()));
                self.redraw()
            }
        }
    }

    fn finish_calibration(&mut self, range: CalibrationRange) {
        let note = match self.store.replace(range) {
            Ok(()) => {
                tracing::info!(target: T_TOUCH, range = %range, "calibration saved");
                "Calibrated"
            }
            Err(err) => {
                tracing::warn!(target: T_TOUCH, "Calibration applied but not saved: {err:#}");
                "Calibrated (not saved)"
            }
        };
        self.leave_calibration(Some(note.to_string()));
    }

    fn leave_calibration(&mut self, note: Option<String>) {
        self.mode = Mode::Normal;
        self.filter.reset();
        self.note = note;
    }

    fn cycle_orientation(&mut self) {
        let orientation = self.store.orientation().next();
        self.store.set_orientation(orientation);
        self.config.touch.orientation = orientation;
        if let Err(err) = self.config.save(&PanelConfig::path(&self.root)) {
            tracing::warn!("Orientation not persisted: {err:#}");
        }
        tracing::info!(target: T_TOUCH, orientation = orientation.label(), "orientation changed");
        self.note = Some(format!("Rotation: {}", orientation.label()));
    }

    /// Full repaint of whatever the current mode shows.
    fn redraw(&mut self) -> Result<()> {
        let image = match &self.mode {
            Mode::Calibrating(session) => self.compositor.render_calibration(&CalibrationView {
                target: session.target(),
                index: session.index(),
                orientation: session.orientation(),
            }),
            Mode::Normal => self.compositor.render_main(&MainView {
                ui: &self.ui,
                state: self.playback.state(),
                volume: self.playback.volume(),
                catalog: self.playback.catalog(),
                orientation: self.store.orientation(),
                note: self.note.as_deref(),
            }),
        };
        self.compositor.present(&mut self.display, image)?;
        self.frames += 1;
        Ok(())
    }
}
