//! Application configuration: load from `config.toml`, or write defaults.
//!
//! Uses the `directories` crate for OS-conventional paths and `toml` for the
//! file format, writing out a commented default file on first run. The
//! `[sync]` table holds the staleness TTL, retry budget, and API base URL.

use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

const APP_NAME: &str = "localsync";
const DEFAULT_BASE_URL: &str = "https://api.todoist.com/api/v1";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String, // "DEBUG", "INFO", "WARN", "ERROR"
    #[serde(default = "default_log_to_console")]
    pub log_to_console: bool,
}

fn default_log_to_console() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            log_to_console: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Per-scope staleness threshold, in seconds.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: i64,
    /// Retries for a queued mutation before it's marked conflicted.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_ttl_seconds() -> i64 {
    120
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            max_attempts: default_max_attempts(),
            base_url: default_base_url(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

/// Get the config directory path, creating it if needed.
pub fn get_config_dir() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "localsync", APP_NAME) {
        let config_dir = proj_dirs.config_dir().to_path_buf();
        fs::create_dir_all(&config_dir).ok();
        config_dir
    } else {
        // Fallback to current directory
        PathBuf::from(".")
    }
}

/// Get the cache directory path (holds `cache.db`), creating it with
/// restricted (0700) permissions if needed.
pub fn get_cache_dir() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "localsync", APP_NAME) {
        let cache_dir = proj_dirs.cache_dir().to_path_buf();
        fs::create_dir_all(&cache_dir).ok();
        restrict_dir_permissions(&cache_dir);
        cache_dir
    } else {
        let dir = std::env::temp_dir().join(format!("{APP_NAME}_cache"));
        fs::create_dir_all(&dir).ok();
        dir
    }
}

#[cfg(unix)]
fn restrict_dir_permissions(dir: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = fs::metadata(dir) {
        let mut perms = meta.permissions();
        perms.set_mode(0o700);
        fs::set_permissions(dir, perms).ok();
    }
}

#[cfg(not(unix))]
fn restrict_dir_permissions(_dir: &std::path::Path) {}

pub fn get_cache_db_path() -> PathBuf {
    get_cache_dir().join("cache.db")
}

/// Get the config file path
pub fn get_config_path() -> PathBuf {
    get_config_dir().join("config.toml")
}

/// Get the logs directory path
pub fn get_logs_dir() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "localsync", APP_NAME) {
        let logs_dir = proj_dirs.data_dir().join("logs");
        fs::create_dir_all(&logs_dir).ok();
        logs_dir
    } else {
        // Fallback to temp directory
        let logs_dir = std::env::temp_dir().join(format!("{APP_NAME}_logs"));
        fs::create_dir_all(&logs_dir).ok();
        logs_dir
    }
}

/// Generate a timestamped log file path for this session
pub fn get_log_file_path() -> PathBuf {
    let logs_dir = get_logs_dir();
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    logs_dir.join(format!("{APP_NAME}_{}.log", timestamp))
}

/// Load configuration from file, or create default if not exists
pub fn load_config() -> AppConfig {
    let config_path = get_config_path();

    if config_path.exists() {
        if let Ok(content) = fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<AppConfig>(&content) {
                return config;
            }
        }
    }

    // Create default config file if it doesn't exist
    let default_config = AppConfig::default();
    let toml_content = format!(
        r#"# {APP_NAME} configuration

[logging]
# Log level: "DEBUG", "INFO", "WARN", "ERROR"
# DEBUG includes raw HTTP request/response data
# INFO shows API calls and results (recommended for normal use)
level = "INFO"

# Whether to also log to console (useful for development)
log_to_console = true

[sync]
# Seconds a cached scope may go without refresh before it's treated as stale.
ttl_seconds = {ttl}
# Retries for a queued mutation before it is marked conflicted.
max_attempts = {attempts}
base_url = "{base_url}"
"#,
        ttl = default_config.sync.ttl_seconds,
        attempts = default_config.sync.max_attempts,
        base_url = default_config.sync.base_url,
    );

    fs::write(&config_path, toml_content).ok();
    default_config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sync_config_matches_spec() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.ttl_seconds, 120);
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
    }
}
