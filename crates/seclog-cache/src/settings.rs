//! Runtime settings changed through `configure`, persisted as JSON.
//!
//! The settings file overrides the limits from the TOML config once it
//! exists. Writes are atomic (temp file, then rename).

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use seclog_core::{
    CacheLimits, ConfigureOptionError, ConfigureOptions, LogLevel, SeclogError, SeclogResult,
};

/// Persisted cache settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub limits: CacheLimits,
    pub min_level: LogLevel,
}

impl Settings {
    /// Check every value against its admissible range.
    pub fn validate(&self) -> SeclogResult<()> {
        let mut scratch = *self;
        scratch.set_max_file_size(self.limits.max_file_size_bytes as i64)?;
        scratch.set_max_total_cache_size(self.limits.max_total_cache_size_bytes as i64)?;
        scratch.set_max_file_count(self.limits.max_file_count as i64)?;
        Ok(())
    }

    fn set_max_file_size(&mut self, value: i64) -> SeclogResult<()> {
        self.limits.max_file_size_bytes =
            checked_range("maxFileSizeBytes", value, CacheLimits::FILE_SIZE_RANGE)?;
        Ok(())
    }

    fn set_max_total_cache_size(&mut self, value: i64) -> SeclogResult<()> {
        self.limits.max_total_cache_size_bytes =
            checked_range("maxTotalCacheSizeBytes", value, CacheLimits::TOTAL_SIZE_RANGE)?;
        Ok(())
    }

    fn set_max_file_count(&mut self, value: i64) -> SeclogResult<()> {
        self.limits.max_file_count =
            checked_range("maxFileCount", value, CacheLimits::FILE_COUNT_RANGE)?;
        Ok(())
    }
}

fn checked_range(option: &str, value: i64, range: RangeInclusive<u64>) -> SeclogResult<u64> {
    match u64::try_from(value) {
        Ok(v) if range.contains(&v) => Ok(v),
        _ => Err(SeclogError::invalid_option(
            option,
            format!(
                "{value} is out of range (expected {}..={})",
                range.start(),
                range.end()
            ),
        )),
    }
}

/// Settings plus the file they persist to.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    /// `None` keeps settings in memory only
    path: Option<PathBuf>,
    settings: Settings,
    dirty: bool,
}

impl ConfigStore {
    /// Load settings from `path`. A missing file yields `defaults`; an
    /// unreadable or invalid one yields `defaults` with a warning.
    pub fn load(path: impl Into<PathBuf>, defaults: Settings) -> Self {
        let path = path.into();
        let settings = match read_settings(&path) {
            Ok(Some(settings)) => settings,
            Ok(None) => defaults,
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring saved settings: {e}");
                defaults
            }
        };

        Self {
            path: Some(path),
            settings,
            dirty: false,
        }
    }

    pub fn in_memory(settings: Settings) -> Self {
        Self {
            path: None,
            settings,
            dirty: false,
        }
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn limits(&self) -> CacheLimits {
        self.settings.limits
    }

    pub fn min_level(&self) -> LogLevel {
        self.settings.min_level
    }

    pub fn try_update_max_file_size(&mut self, value: i64) -> SeclogResult<()> {
        self.settings.set_max_file_size(value)?;
        self.dirty = true;
        Ok(())
    }

    pub fn try_update_max_total_cache_size(&mut self, value: i64) -> SeclogResult<()> {
        self.settings.set_max_total_cache_size(value)?;
        self.dirty = true;
        Ok(())
    }

    pub fn try_update_max_file_count(&mut self, value: i64) -> SeclogResult<()> {
        self.settings.set_max_file_count(value)?;
        self.dirty = true;
        Ok(())
    }

    pub fn try_update_min_level(&mut self, value: i64) -> SeclogResult<()> {
        self.settings.min_level = LogLevel::try_from(value)
            .map_err(|reason| SeclogError::invalid_option("minLevel", reason))?;
        self.dirty = true;
        Ok(())
    }

    /// Apply every present option independently. Valid options take effect
    /// even when their siblings are rejected.
    pub fn apply(&mut self, options: &ConfigureOptions) -> Vec<ConfigureOptionError> {
        let updates: [(Option<i64>, fn(&mut Self, i64) -> SeclogResult<()>); 4] = [
            (options.min_level, Self::try_update_min_level),
            (options.max_file_size_bytes, Self::try_update_max_file_size),
            (
                options.max_total_cache_size_bytes,
                Self::try_update_max_total_cache_size,
            ),
            (options.max_file_count, Self::try_update_max_file_count),
        ];

        let mut errors = Vec::new();
        for (value, update) in updates {
            let Some(value) = value else { continue };
            if let Err(e) = update(self, value) {
                errors.push(option_error(e));
            }
        }
        errors
    }

    /// Write pending changes to disk (atomic temp + rename).
    pub fn persist(&mut self) -> SeclogResult<()> {
        let Some(path) = &self.path else {
            self.dirty = false;
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)
            .map_err(|e| SeclogError::Config(format!("serializing settings: {e}")))?;

        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;

        self.dirty = false;
        tracing::debug!(path = %path.display(), "saved cache settings");
        Ok(())
    }
}

fn read_settings(path: &Path) -> SeclogResult<Option<Settings>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)
        .map_err(|e| SeclogError::Config(format!("parsing {}: {e}", path.display())))?;
    settings.validate()?;
    Ok(Some(settings))
}

fn option_error(err: SeclogError) -> ConfigureOptionError {
    match err {
        SeclogError::InvalidOption { option, reason } => ConfigureOptionError {
            option,
            error: reason,
        },
        other => ConfigureOptionError {
            option: String::new(),
            error: other.to_string(),
        },
    }
}
