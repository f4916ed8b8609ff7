use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use crate::error::{SeclogError, SeclogResult};
use crate::types::{CacheLimits, LogLevel};

/// Top-level configuration (loaded from seclog.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeclogConfig {
    pub cache: CacheConfig,
    pub secrets: SecretsConfig,
    pub crypto: CryptoConfig,
    pub logging: LoggingConfig,
}

impl SeclogConfig {
    /// Load configuration from `path`, falling back to defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> SeclogResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| SeclogError::Config(format!("parsing {}: {e}", path.display())))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding the encrypted chunk files (owned exclusively)
    pub dir: PathBuf,
    /// JSON file persisting runtime `configure` changes
    pub settings_file: PathBuf,
    /// Initial limits, overridden by `settings_file` once it exists
    pub max_file_size_bytes: u64,
    pub max_total_cache_size_bytes: u64,
    pub max_file_count: u64,
    /// Events below this level are dropped (2 = VERBOSE ... 7 = FATAL)
    pub min_level: LogLevel,
}

impl CacheConfig {
    /// Limits from the file. A value outside its admissible range is
    /// replaced by the default for that field.
    pub fn limits(&self) -> CacheLimits {
        let defaults = CacheLimits::default();
        CacheLimits {
            max_file_size_bytes: in_range_or(
                "max_file_size_bytes",
                self.max_file_size_bytes,
                CacheLimits::FILE_SIZE_RANGE,
                defaults.max_file_size_bytes,
            ),
            max_total_cache_size_bytes: in_range_or(
                "max_total_cache_size_bytes",
                self.max_total_cache_size_bytes,
                CacheLimits::TOTAL_SIZE_RANGE,
                defaults.max_total_cache_size_bytes,
            ),
            max_file_count: in_range_or(
                "max_file_count",
                self.max_file_count,
                CacheLimits::FILE_COUNT_RANGE,
                defaults.max_file_count,
            ),
        }
    }
}

fn in_range_or(key: &str, value: u64, range: RangeInclusive<u64>, default: u64) -> u64 {
    if range.contains(&value) {
        return value;
    }
    tracing::warn!(
        "[cache] {key} = {value} is outside {}..={}, using {default}",
        range.start(),
        range.end()
    );
    default
}

impl Default for CacheConfig {
    fn default() -> Self {
        let limits = CacheLimits::default();
        Self {
            dir: PathBuf::from("~/.cache/seclog/logs"),
            settings_file: PathBuf::from("~/.config/seclog/settings.json"),
            max_file_size_bytes: limits.max_file_size_bytes,
            max_total_cache_size_bytes: limits.max_total_cache_size_bytes,
            max_file_count: limits.max_file_count,
            min_level: LogLevel::Verbose,
        }
    }
}

/// Where the per-install secret lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretBackend {
    /// Platform keychain (Keychain Services, Secret Service, Credential Manager)
    Keychain,
    /// A 0600 file next to the config
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    pub backend: SecretBackend,
    /// Keychain service name
    pub service: String,
    /// Secret file path (file backend)
    pub secret_file: PathBuf,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            backend: SecretBackend::Keychain,
            service: "seclog".into(),
            secret_file: PathBuf::from("~/.config/seclog/install-secret"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// HKDF salt mixed into every chunk key
    pub kdf_salt: String,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            kdf_salt: "seclog-chunk-salt-v1".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_format: "text".into(),
        }
    }
}

/// Expand a leading `~/` against `$HOME`.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/")) {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        return PathBuf::from(home).join(rest);
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[cache]
dir = "/var/cache/app/logs"
settings_file = "/var/lib/app/settings.json"
max_file_size_bytes = 500000
max_total_cache_size_bytes = 4000000
max_file_count = 8
min_level = 4

[secrets]
backend = "file"
secret_file = "/var/lib/app/secret"

[crypto]
kdf_salt = "custom-salt"

[logging]
log_level = "debug"
log_format = "json"
"#;
        let config: SeclogConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.cache.dir, PathBuf::from("/var/cache/app/logs"));
        assert_eq!(config.cache.max_file_count, 8);
        assert_eq!(config.cache.min_level, LogLevel::Info);
        assert_eq!(config.cache.limits().max_file_size_bytes, 500000);
        assert_eq!(config.secrets.backend, SecretBackend::File);
        assert_eq!(config.secrets.service, "seclog");
        assert_eq!(config.crypto.kdf_salt, "custom-salt");
        assert_eq!(config.logging.log_format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config: SeclogConfig = toml::from_str("").unwrap();

        assert_eq!(config.cache.limits(), CacheLimits::default());
        assert_eq!(config.cache.min_level, LogLevel::Verbose);
        assert_eq!(config.secrets.backend, SecretBackend::Keychain);
        assert_eq!(config.crypto.kdf_salt, "seclog-chunk-salt-v1");
        assert_eq!(config.logging.log_level, "info");
    }

    #[test]
    fn test_out_of_range_limits_fall_back_per_field() {
        let toml_str = r#"
[cache]
max_file_size_bytes = 1
max_total_cache_size_bytes = 999999999999
max_file_count = 0
"#;
        let config: SeclogConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.cache.limits(), CacheLimits::default());

        let config: SeclogConfig =
            toml::from_str("[cache]\nmax_file_count = 101\nmax_file_size_bytes = 1000\n").unwrap();
        let limits = config.cache.limits();
        assert_eq!(limits.max_file_count, CacheLimits::default().max_file_count);
        assert_eq!(limits.max_file_size_bytes, 1_000);
    }

    #[test]
    fn test_invalid_level_rejected() {
        let result: Result<SeclogConfig, _> = toml::from_str("[cache]\nmin_level = 9\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = SeclogConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: SeclogConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.cache.dir, parsed.cache.dir);
        assert_eq!(config.cache.limits(), parsed.cache.limits());
        assert_eq!(config.secrets.backend, parsed.secrets.backend);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SeclogConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.cache.limits(), CacheLimits::default());
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde(Path::new("~/.cache/seclog"));
        assert!(!expanded.to_str().unwrap().starts_with("~/"));
        assert_eq!(expand_tilde(Path::new("/abs")), PathBuf::from("/abs"));
    }
}
