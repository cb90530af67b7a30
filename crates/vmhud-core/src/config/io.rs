//! YAML config file I/O
//!
//! Loading never fails: a missing file means defaults, and a broken one is
//! reported and replaced by defaults so the HUD still comes up. Saving is
//! fallible and reports the path it choked on.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::Path;

/// Read and parse `path`; `Ok(None)` if the file doesn't exist
fn read_config<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
    };
    let config = serde_yaml::from_str(&contents)
        .with_context(|| format!("Invalid YAML in {:?}", path))?;
    Ok(Some(config))
}

/// Load a config, falling back to `T::default()` when the file is missing or
/// unusable
///
/// ```ignore
/// let config: HudConfig = load_config(&default_config_path());
/// ```
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    match read_config(path) {
        Ok(Some(config)) => {
            log::info!("Config: Loaded {:?}", path);
            config
        }
        Ok(None) => {
            log::info!("Config: {:?} not found, using defaults", path);
            T::default()
        }
        Err(e) => {
            log::warn!("Config: {:#}, using defaults", e);
            T::default()
        }
    }
}

/// Like [`load_config`], but writes the defaults out when no file exists yet
/// so there is something to edit. A broken file is left untouched.
pub fn load_or_create_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Serialize + Default,
{
    match read_config(path) {
        Ok(Some(config)) => {
            log::info!("Config: Loaded {:?}", path);
            config
        }
        Ok(None) => {
            let config = T::default();
            match save_config(&config, path) {
                Ok(()) => log::info!("Config: Wrote defaults to {:?}", path),
                Err(e) => log::warn!("Config: Could not write defaults: {:#}", e),
            }
            config
        }
        Err(e) => {
            log::warn!("Config: {:#}, using defaults", e);
            T::default()
        }
    }
}

/// Write `config` as YAML, creating parent directories as needed
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write {:?}", path))?;

    log::debug!("Config: Saved {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Sample {
        interval_ms: u64,
        label: String,
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config: Sample = load_config(&dir.path().join("absent.yaml"));
        assert_eq!(config, Sample::default());
    }

    #[test]
    fn test_invalid_yaml_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "interval_ms: [not, a, number").unwrap();

        let config: Sample = load_config(&path);
        assert_eq!(config, Sample::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.yaml");
        std::fs::write(&path, "label: hud\n").unwrap();

        let config: Sample = load_config(&path);
        assert_eq!(config.label, "hud");
        assert_eq!(config.interval_ms, 0);
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("config.yaml");
        let config = Sample {
            interval_ms: 42,
            label: "overlay".to_string(),
        };

        save_config(&config, &path).unwrap();
        let loaded: Sample = load_config(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_create_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vmhud").join("config.yaml");

        let first: Sample = load_or_create_config(&path);
        assert_eq!(first, Sample::default());
        assert!(path.exists());

        std::fs::write(&path, "interval_ms: 7\n").unwrap();
        let second: Sample = load_or_create_config(&path);
        assert_eq!(second.interval_ms, 7);
    }

    #[test]
    fn test_load_or_create_leaves_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "interval_ms: {").unwrap();

        let config: Sample = load_or_create_config(&path);
        assert_eq!(config, Sample::default());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "interval_ms: {");
    }
}
