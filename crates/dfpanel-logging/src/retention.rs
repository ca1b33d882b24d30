use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};

use crate::config::LoggingConfig;
use crate::targets::{T_DISPLAY, T_SERIAL, T_TOUCH};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
struct LogFile {
    path: PathBuf,
    modified: SystemTime,
    size: u64,
}

/// What one retention pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub expired: usize,
    pub trimmed: usize,
    pub remaining_bytes: u64,
}

/// Removes panel logs older than `keep_days`, then the oldest remaining ones
/// until the total fits `max_total_mb`. Files the panel did not write are
/// never touched.
pub fn run_retention(root: &Path, cfg: &LoggingConfig) -> Result<RetentionReport> {
    let files = panel_logs(&root.join("logs"))?;
    let cutoff = SystemTime::now()
        .checked_sub(DAY.saturating_mul(cfg.keep_days.min(u64::from(u32::MAX)) as u32))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let (expired, mut kept): (Vec<_>, Vec<_>) =
        files.into_iter().partition(|file| file.modified < cutoff);
    let mut report = RetentionReport::default();
    for file in expired {
        if remove(&file) {
            report.expired += 1;
        } else {
            kept.push(file);
        }
    }

    kept.sort_by_key(|file| file.modified);
    let mut total: u64 = kept.iter().map(|file| file.size).sum();
    let cap = cfg.max_total_bytes();
    for file in &kept {
        if total <= cap {
            break;
        }
        if remove(file) {
            total = total.saturating_sub(file.size);
            report.trimmed += 1;
        }
    }
    report.remaining_bytes = total;
    Ok(report)
}

fn remove(file: &LogFile) -> bool {
    match fs::remove_file(&file.path) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!("Failed to remove log {}: {}", file.path.display(), err);
            false
        }
    }
}

fn panel_logs(dir: &Path) -> Result<Vec<LogFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let entry = entry.with_context(|| format!("iterating {}", dir.display()))?;
        let path = entry.path();
        let is_ours = path
            .file_name()
            .and_then(|name| name.to_str())
            .map_or(false, is_panel_log);
        if !is_ours || !path.is_file() {
            continue;
        }
        let metadata = entry
            .metadata()
            .with_context(|| format!("stat {}", path.display()))?;
        files.push(LogFile {
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            size: metadata.len(),
            path,
        });
    }
    Ok(files)
}

/// The component log and the per-target logs, including rolled (`.YYYY-MM-DD`) copies.
fn is_panel_log(name: &str) -> bool {
    let Some(stem) = name.split('.').next() else {
        return false;
    };
    let known = stem == "dfpanel" || [T_TOUCH, T_SERIAL, T_DISPLAY].contains(&stem);
    known && name[stem.len()..].starts_with(".log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_panel_logs_only() {
        assert!(is_panel_log("dfpanel.log.2026-10-19"));
        assert!(is_panel_log("touch.log"));
        assert!(is_panel_log("serial.log.2026-10-18"));
        assert!(!is_panel_log("touchy.log"));
        assert!(!is_panel_log("gui_conf.json"));
        assert!(!is_panel_log("dfpanel"));
    }

    #[test]
    fn missing_log_dir_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let report = run_retention(dir.path(), &LoggingConfig::default()).unwrap();
        assert_eq!(report, RetentionReport::default());
    }

    #[test]
    fn size_cap_trims_but_keeps_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        fs::create_dir_all(&logs).unwrap();
        fs::write(logs.join("notes.txt"), "keep").unwrap();
        fs::write(logs.join("serial.log.2026-10-18"), vec![b'x'; 2048]).unwrap();
        let cfg = LoggingConfig {
            max_total_mb: 0,
            ..LoggingConfig::default()
        };
        let report = run_retention(dir.path(), &cfg).unwrap();
        assert_eq!(report.trimmed, 1);
        assert_eq!(report.remaining_bytes, 0);
        assert!(logs.join("notes.txt").exists());
        assert!(!logs.join("serial.log.2026-10-18").exists());
    }
}
