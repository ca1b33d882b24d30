use std::{
    env, fs,
    io::Write,
    path::{Path, PathBuf},
    process,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::calibration::Orientation;
use crate::protocol::MAX_VOLUME;
use crate::touch::calibrate::CalibrationTuning;
use crate::touch::FilterTuning;

pub const CONFIG_FILE: &str = "gui_conf.json";
pub const ROOT_ENV: &str = "DFPANEL_ROOT";
const DEFAULT_ROOT: &str = "/var/lib/dfpanel";

/// State directory: the CLI value, `DFPANEL_ROOT`, `/var/lib/dfpanel` when it
/// exists, else the working directory.
pub fn resolve_root(input: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = input {
        return Ok(path);
    }

    if let Ok(env_path) = env::var(ROOT_ENV) {
        return Ok(PathBuf::from(env_path));
    }

    let default = PathBuf::from(DEFAULT_ROOT);
    if default.exists() {
        return Ok(default);
    }

    env::current_dir().context("determining current directory")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanelConfig {
    #[serde(default)]
    pub devices: DeviceConfig,
    #[serde(default)]
    pub touch: TouchConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub colors: ColorScheme,
}

impl PanelConfig {
    pub fn path(root: &Path) -> PathBuf {
        root.join(CONFIG_FILE)
    }

    /// Loads `<root>/gui_conf.json`, writing defaults when absent and
    /// persisting any values that normalisation had to repair.
    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::path(root);
        if !path.exists() {
            let default = PanelConfig::default();
            default.save(&path)?;
            return Ok(default);
        }

        let contents =
            fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let mut config: PanelConfig = serde_json::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;

        let mut changed = false;
        changed |= config.touch.normalize();
        changed |= config.playback.normalize();
        changed |= config.colors.normalize();
        if changed {
            tracing::warn!(path = %path.display(), "Repaired out-of-range settings");
            config.save(&path)?;
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let mut tmp = path.to_path_buf();
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(CONFIG_FILE);
        let now_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|dur| dur.as_nanos())
            .unwrap_or(0);
        tmp.set_file_name(format!(".{filename}.tmp.{}.{}", process::id(), now_ns));

        let mut file = fs::File::create(&tmp)
            .with_context(|| format!("creating temp config {}", tmp.display()))?;
        file.write_all(json.as_bytes())
            .with_context(|| format!("writing temp config {}", tmp.display()))?;
        file.write_all(b"\n")
            .with_context(|| format!("writing newline to temp config {}", tmp.display()))?;
        file.sync_all()
            .with_context(|| format!("syncing temp config {}", tmp.display()))?;
        drop(file);

        fs::rename(&tmp, path).with_context(|| {
            format!(
                "renaming temp config {} -> {}",
                tmp.display(),
                path.display()
            )
        })?;
        Ok(())
    }

    /// Calibration file location; relative paths live under `root`.
    pub fn calibration_path(&self, root: &Path) -> PathBuf {
        resolve_under(root, &self.touch.calibration_file)
    }

    pub fn catalog_path(&self, root: &Path) -> Option<PathBuf> {
        self.playback
            .catalog
            .as_deref()
            .map(|path| resolve_under(root, path))
    }
}

fn resolve_under(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "DeviceConfig::default_framebuffer")]
    pub framebuffer: PathBuf,
    /// Explicit event node; discovered when unset.
    #[serde(default)]
    pub touch: Option<PathBuf>,
    #[serde(default = "DeviceConfig::default_serial")]
    pub serial: PathBuf,
    #[serde(default = "DeviceConfig::default_baud")]
    pub baud: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            framebuffer: Self::default_framebuffer(),
            touch: None,
            serial: Self::default_serial(),
            baud: Self::default_baud(),
        }
    }
}

impl DeviceConfig {
    fn default_framebuffer() -> PathBuf {
        PathBuf::from("/dev/fb1")
    }

    fn default_serial() -> PathBuf {
        PathBuf::from("/dev/serial0")
    }

    fn default_baud() -> u32 {
        9600
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TouchConfig {
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default = "TouchConfig::default_stable_samples")]
    pub stable_samples: usize,
    #[serde(default = "TouchConfig::default_median_window")]
    pub median_window: usize,
    #[serde(default = "TouchConfig::default_calibration_samples")]
    pub calibration_samples: usize,
    #[serde(default = "TouchConfig::default_calibration_timeout_ms")]
    pub calibration_timeout_ms: u64,
    #[serde(default = "TouchConfig::default_drag_interval_ms")]
    pub drag_interval_ms: u64,
    #[serde(default = "TouchConfig::default_calibration_file")]
    pub calibration_file: PathBuf,
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self {
            orientation: Orientation::default(),
            stable_samples: Self::default_stable_samples(),
            median_window: Self::default_median_window(),
            calibration_samples: Self::default_calibration_samples(),
            calibration_timeout_ms: Self::default_calibration_timeout_ms(),
            drag_interval_ms: Self::default_drag_interval_ms(),
            calibration_file: Self::default_calibration_file(),
        }
    }
}

impl TouchConfig {
    const MIN_MEDIAN_WINDOW: usize = 6;
    const MIN_TIMEOUT_MS: u64 = 1000;

    fn default_stable_samples() -> usize {
        4
    }

    fn default_median_window() -> usize {
        6
    }

    fn default_calibration_samples() -> usize {
        18
    }

    fn default_calibration_timeout_ms() -> u64 {
        8000
    }

    fn default_drag_interval_ms() -> u64 {
        20
    }

    fn default_calibration_file() -> PathBuf {
        PathBuf::from("touch_calibration.txt")
    }

    pub fn normalize(&mut self) -> bool {
        let before = (
            self.stable_samples,
            self.median_window,
            self.calibration_samples,
            self.calibration_timeout_ms,
            self.drag_interval_ms,
        );
        self.median_window = self.median_window.max(Self::MIN_MEDIAN_WINDOW);
        self.stable_samples = self.stable_samples.clamp(1, self.median_window);
        self.calibration_samples = self.calibration_samples.max(1);
        self.calibration_timeout_ms = self.calibration_timeout_ms.max(Self::MIN_TIMEOUT_MS);
        self.drag_interval_ms = self.drag_interval_ms.max(1);
        before
            != (
                self.stable_samples,
                self.median_window,
                self.calibration_samples,
                self.calibration_timeout_ms,
                self.drag_interval_ms,
            )
    }

    pub fn filter_tuning(&self) -> FilterTuning {
        FilterTuning {
            stable_samples: self.stable_samples,
            median_window: self.median_window,
        }
    }

    pub fn calibration_tuning(&self) -> CalibrationTuning {
        CalibrationTuning {
            samples: self.calibration_samples,
            timeout: Duration::from_millis(self.calibration_timeout_ms),
        }
    }

    pub fn drag_interval(&self) -> Duration {
        Duration::from_millis(self.drag_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "PlaybackConfig::default_initial_volume")]
    pub initial_volume: i32,
    /// JSON track list; relative paths live under the root directory.
    #[serde(default)]
    pub catalog: Option<PathBuf>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            initial_volume: Self::default_initial_volume(),
            catalog: None,
        }
    }
}

impl PlaybackConfig {
    fn default_initial_volume() -> i32 {
        18
    }

    pub fn normalize(&mut self) -> bool {
        let clamped = self.initial_volume.clamp(0, i32::from(MAX_VOLUME));
        let changed = clamped != self.initial_volume;
        self.initial_volume = clamped;
        changed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorScheme {
    #[serde(default = "ColorScheme::default_background")]
    pub background: String,
    #[serde(default = "ColorScheme::default_button")]
    pub button: String,
    #[serde(default = "ColorScheme::default_button_text")]
    pub button_text: String,
    #[serde(default = "ColorScheme::default_accent")]
    pub accent: String,
    #[serde(default = "ColorScheme::default_slider_track")]
    pub slider_track: String,
    #[serde(default = "ColorScheme::default_slider_fill")]
    pub slider_fill: String,
    #[serde(default = "ColorScheme::default_text")]
    pub text: String,
    #[serde(default = "ColorScheme::default_list_selected")]
    pub list_selected: String,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            background: Self::default_background(),
            button: Self::default_button(),
            button_text: Self::default_button_text(),
            accent: Self::default_accent(),
            slider_track: Self::default_slider_track(),
            slider_fill: Self::default_slider_fill(),
            text: Self::default_text(),
            list_selected: Self::default_list_selected(),
        }
    }
}

impl ColorScheme {
    pub const DEFAULT_BACKGROUND: &'static str = "#101418";
    pub const DEFAULT_BUTTON: &'static str = "#2A3440";
    pub const DEFAULT_BUTTON_TEXT: &'static str = "#F0F0F0";
    pub const DEFAULT_ACCENT: &'static str = "#F0A020";
    pub const DEFAULT_SLIDER_TRACK: &'static str = "#3A4450";
    pub const DEFAULT_SLIDER_FILL: &'static str = "#30B060";
    pub const DEFAULT_TEXT: &'static str = "#D0D8E0";
    pub const DEFAULT_LIST_SELECTED: &'static str = "#204A80";

    fn default_background() -> String {
        Self::DEFAULT_BACKGROUND.to_string()
    }

    fn default_button() -> String {
        Self::DEFAULT_BUTTON.to_string()
    }

    fn default_button_text() -> String {
        Self::DEFAULT_BUTTON_TEXT.to_string()
    }

    fn default_accent() -> String {
        Self::DEFAULT_ACCENT.to_string()
    }

    fn default_slider_track() -> String {
        Self::DEFAULT_SLIDER_TRACK.to_string()
    }

    fn default_slider_fill() -> String {
        Self::DEFAULT_SLIDER_FILL.to_string()
    }

    fn default_text() -> String {
        Self::DEFAULT_TEXT.to_string()
    }

    fn default_list_selected() -> String {
        Self::DEFAULT_LIST_SELECTED.to_string()
    }

    pub fn normalize(&mut self) -> bool {
        let mut changed = false;
        changed |= normalize_hex_field(&mut self.background, Self::DEFAULT_BACKGROUND);
        changed |= normalize_hex_field(&mut self.button, Self::DEFAULT_BUTTON);
        changed |= normalize_hex_field(&mut self.button_text, Self::DEFAULT_BUTTON_TEXT);
        changed |= normalize_hex_field(&mut self.accent, Self::DEFAULT_ACCENT);
        changed |= normalize_hex_field(&mut self.slider_track, Self::DEFAULT_SLIDER_TRACK);
        changed |= normalize_hex_field(&mut self.slider_fill, Self::DEFAULT_SLIDER_FILL);
        changed |= normalize_hex_field(&mut self.text, Self::DEFAULT_TEXT);
        changed |= normalize_hex_field(&mut self.list_selected, Self::DEFAULT_LIST_SELECTED);
        changed
    }
}

pub fn parse_hex_rgb(input: &str) -> Option<(u8, u8, u8)> {
    let normalized = normalize_hex(input)?;
    let hex = normalized.trim_start_matches('#');
    let value = u32::from_str_radix(hex, 16).ok()?;
    let r = ((value >> 16) & 0xFF) as u8;
    let g = ((value >> 8) & 0xFF) as u8;
    let b = (value & 0xFF) as u8;
    Some((r, g, b))
}

fn normalize_hex_field(field: &mut String, fallback: &str) -> bool {
    let normalized = normalize_hex(field).unwrap_or_else(|| fallback.to_string());
    if *field != normalized {
        *field = normalized;
        true
    } else {
        false
    }
}

fn normalize_hex(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("#{}", hex.to_ascii_uppercase()))
}
