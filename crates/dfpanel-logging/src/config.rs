use serde::{Deserialize, Serialize};

/// Contents of `<root>/config/logging.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_enabled")]
    pub enabled: bool,
    /// `EnvFilter` directive, e.g. `info` or `info,touch=debug`.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    #[serde(default = "LoggingConfig::default_keep_days")]
    pub keep_days: u64,
    /// Cap for all panel logs together, in MiB.
    #[serde(default = "LoggingConfig::default_max_total_mb")]
    pub max_total_mb: u64,
}

impl LoggingConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_level() -> String {
        "info".to_string()
    }

    fn default_keep_days() -> u64 {
        7
    }

    fn default_max_total_mb() -> u64 {
        32
    }

    pub fn max_total_bytes(&self) -> u64 {
        self.max_total_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            level: Self::default_level(),
            keep_days: Self::default_keep_days(),
            max_total_mb: Self::default_max_total_mb(),
        }
    }
}
