//! On-disk rule file
//!
//! Owns the path of the JSON document and the last modification time the
//! main loop has seen. Writes replace the whole file through a temporary file
//! and a rename so the editor and the loop never observe a half-written rule
//! set from this side.

use super::{rule_errors, Config};
use crate::error::ConfigError;
use log::{debug, info};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Loads, saves and watches a single JSON rule file
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    last_mtime: Option<SystemTime>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_mtime: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load and validate the rule file, creating a default one if missing
    pub fn load(&self) -> Result<Config, ConfigError> {
        if !self.exists() {
            let config = Config::default();
            self.save(&config)?;
            info!("Created default configuration at {}", self.path.display());
            return Ok(config);
        }

        let content = self.read()?;
        let value: Value =
            serde_json::from_str(&content).map_err(|e| ConfigError::parse(&self.path, e))?;
        Config::from_value(value)
    }

    /// Load the document without any typed validation
    pub fn load_raw(&self) -> Result<Value, ConfigError> {
        if !self.exists() {
            self.save(&Config::default())?;
        }

        let content = self.read()?;
        serde_json::from_str(&content).map_err(|e| ConfigError::parse(&self.path, e))
    }

    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        self.write_json(config)
    }

    pub fn save_raw(&self, value: &Value) -> Result<(), ConfigError> {
        self.write_json(value)
    }

    /// Copy the rule file to `<stem>_backup_<YYYYMMDD_HHMMSS><.ext>` beside it.
    ///
    /// Returns `None` when there is nothing to back up.
    pub fn backup(&self) -> Result<Option<PathBuf>, ConfigError> {
        if !self.exists() {
            return Ok(None);
        }

        let backup_path = backup_path_for(&self.path, chrono::Local::now());
        fs::copy(&self.path, &backup_path).map_err(|e| ConfigError::io(&backup_path, e))?;

        Ok(Some(backup_path))
    }

    /// Reload when the file's modification time differs from the last one seen.
    ///
    /// The timestamp is only remembered after a successful load so a broken
    /// file is retried on every call until it is fixed.
    pub fn reload_if_changed(
        &mut self,
        previous: Option<Config>,
    ) -> Result<(Config, bool), ConfigError> {
        if !self.exists() {
            self.save(&Config::default())?;
        }

        let mtime = self.modified()?;
        let changed = self.last_mtime != Some(mtime);

        match previous {
            Some(config) if !changed => Ok((config, false)),
            _ => {
                let config = self.load()?;
                self.last_mtime = Some(mtime);
                debug!("Loaded configuration from {}", self.path.display());
                Ok((config, true))
            }
        }
    }

    /// Every rule that fails typed validation, described for the user
    pub fn rule_errors(&self) -> Vec<String> {
        match self.load_raw() {
            Ok(raw) => rule_errors(&raw),
            Err(_) => Vec::new(),
        }
    }

    /// The "rules have errors" state shown to the user
    pub fn rules_have_errors(&self) -> bool {
        !self.rule_errors().is_empty()
    }

    fn read(&self) -> Result<String, ConfigError> {
        fs::read_to_string(&self.path).map_err(|e| ConfigError::io(&self.path, e))
    }

    fn modified(&self) -> Result<SystemTime, ConfigError> {
        fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .map_err(|e| ConfigError::io(&self.path, e))
    }

    fn write_json<T: Serialize>(&self, value: &T) -> Result<(), ConfigError> {
        let mut buffer = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        value
            .serialize(&mut serializer)
            .map_err(|e| ConfigError::parse(&self.path, e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;
        }

        let temp_path = temp_path_for(&self.path);
        fs::write(&temp_path, &buffer).map_err(|e| ConfigError::io(&temp_path, e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| ConfigError::io(&self.path, e))
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Backup file name for `path` taken at `when`
pub fn backup_path_for<Tz>(path: &Path, when: chrono::DateTime<Tz>) -> PathBuf
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    path.with_file_name(format!(
        "{}_backup_{}{}",
        stem,
        when.format("%Y%m%d_%H%M%S"),
        ext
    ))
}
