use std::fs;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::LoggingConfig;

pub fn config_path(root: &Path) -> PathBuf {
    root.join("config").join("logging.json")
}

/// Logging settings for `root`. Runs before any subscriber exists, so problems
/// are reported on stderr and never stop startup.
///
/// A missing file is created with defaults; a corrupt one is left in place for
/// inspection and defaults are used.
pub fn read_config(root: &Path) -> LoggingConfig {
    let path = config_path(root);
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            let cfg = LoggingConfig::default();
            if let Err(err) = write_config_atomic(root, &cfg) {
                eprintln!("dfpanel: cannot write default logging config: {err:#}");
            }
            return cfg;
        }
        Err(err) => {
            eprintln!("dfpanel: cannot read {}: {err}", path.display());
            return LoggingConfig::default();
        }
    };
    serde_json::from_str(&contents).unwrap_or_else(|err| {
        eprintln!("dfpanel: ignoring corrupt {}: {err}", path.display());
        LoggingConfig::default()
    })
}

pub fn write_config_atomic(root: &Path, cfg: &LoggingConfig) -> Result<()> {
    let path = config_path(root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating logging config dir {}", parent.display()))?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(cfg).context("serializing logging config")?;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o644)
        .open(&tmp_path)
        .with_context(|| format!("opening {}", tmp_path.display()))?;
    file.write_all(&data)
        .with_context(|| format!("writing {}", tmp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("syncing {}", tmp_path.display()))?;
    drop(file);

    fs::rename(&tmp_path, &path)
        .with_context(|| format!("renaming {} -> {}", tmp_path.display(), path.display()))?;
    Ok(())
}
