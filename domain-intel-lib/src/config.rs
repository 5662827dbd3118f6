//! Configuration file parsing and management.
//!
//! This module handles loading configuration from TOML files and `DI_*`
//! environment variables, and merging them with proper precedence rules:
//! CLI flags > environment > config files > defaults.

use crate::error::AnalysisError;
use crate::types::AnalyzerConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Address the HTTP server listens on when nothing overrides it.
pub const DEFAULT_BIND: &str = "0.0.0.0:3000";

/// Configuration loaded from TOML files.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FileConfig {
    /// HTTP server settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    /// Result cache settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,

    /// WHOIS and website lookup settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookup: Option<LookupConfig>,

    /// Batch analysis settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ServerConfig {
    /// Listen address, e.g. "127.0.0.1:8080"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CacheConfig {
    /// Entry lifetime (as string, e.g., "1h", "30m")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,

    /// Interval between expired-entry sweeps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep_interval: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LookupConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whois_timeout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_timeout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub whois_server: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_body_bytes: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BatchConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
}

impl FileConfig {
    /// The configured listen address, if any.
    pub fn bind(&self) -> Option<&str> {
        self.server.as_ref().and_then(|s| s.bind.as_deref())
    }

    /// Overlay the values present in this file onto `config`.
    ///
    /// Values are expected to have passed validation; unparsable durations
    /// are skipped.
    pub fn apply_to(&self, mut config: AnalyzerConfig) -> AnalyzerConfig {
        if let Some(cache) = &self.cache {
            if let Some(ttl) = cache.ttl.as_deref().and_then(parse_duration_string) {
                config = config.with_cache_ttl(ttl);
            }
            if let Some(interval) = cache.sweep_interval.as_deref().and_then(parse_duration_string) {
                config = config.with_sweep_interval(interval);
            }
        }

        if let Some(lookup) = &self.lookup {
            if let Some(t) = lookup.whois_timeout.as_deref().and_then(parse_duration_string) {
                config = config.with_whois_timeout(t);
            }
            if let Some(t) = lookup.website_timeout.as_deref().and_then(parse_duration_string) {
                config = config.with_website_timeout(t);
            }
            if let Some(server) = &lookup.whois_server {
                config = config.with_whois_server(server.clone());
            }
            if let Some(agent) = &lookup.user_agent {
                config = config.with_user_agent(agent.clone());
            }
            if let Some(bytes) = lookup.max_body_bytes {
                config = config.with_max_body_bytes(bytes);
            }
        }

        if let Some(concurrency) = self.batch.as_ref().and_then(|b| b.concurrency) {
            config = config.with_concurrency(concurrency);
        }

        config
    }
}

/// Configuration discovery and loading functionality.
pub struct ConfigManager {
    /// Whether to log which files were loaded
    pub verbose: bool,
}

impl ConfigManager {
    /// Create a new configuration manager.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError` if the file is missing, unreadable, not valid
    /// TOML, or fails validation.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, AnalysisError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(AnalysisError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            AnalysisError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content)
            .map_err(|e| AnalysisError::config(format!("Failed to parse TOML configuration: {}", e)))?;

        self.validate_config(&config)?;

        Ok(config)
    }

    /// Discover and load configuration files in precedence order.
    ///
    /// XDG config is lowest, then the home directory, then the current
    /// directory. Files that fail to load are skipped with a warning.
    pub fn discover_and_load(&self) -> Result<FileConfig, AnalysisError> {
        let mut merged_config = FileConfig::default();
        let mut loaded_files = Vec::new();

        let candidates = [
            self.get_xdg_config_path(),
            self.get_global_config_path(),
            self.get_local_config_path(),
        ];

        for path in candidates.into_iter().flatten() {
            match self.load_file(&path) {
                Ok(config) => {
                    merged_config = self.merge_configs(merged_config, config);
                    loaded_files.push(path);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping config file"),
            }
        }

        if self.verbose {
            for path in &loaded_files {
                info!(path = %path.display(), "loaded config file");
            }
        }

        Ok(merged_config)
    }

    /// Look for configuration files in the current directory.
    fn get_local_config_path(&self) -> Option<PathBuf> {
        ["./domain-intel.toml", "./.domain-intel.toml"]
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Path::to_path_buf)
    }

    /// Look for configuration files in the user's home directory.
    fn get_global_config_path(&self) -> Option<PathBuf> {
        let home = env::var_os("HOME")?;
        let path = Path::new(&home).join(".domain-intel.toml");
        path.exists().then_some(path)
    }

    /// Follows the XDG Base Directory Specification.
    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;

        let path = config_dir.join("domain-intel").join("config.toml");
        path.exists().then_some(path)
    }

    /// Merge two configurations. Values from `higher` win field by field.
    pub fn merge_configs(&self, lower: FileConfig, higher: FileConfig) -> FileConfig {
        FileConfig {
            server: match (lower.server, higher.server) {
                (Some(lower), Some(higher)) => Some(ServerConfig {
                    bind: higher.bind.or(lower.bind),
                }),
                (lower, higher) => higher.or(lower),
            },
            cache: match (lower.cache, higher.cache) {
                (Some(lower), Some(higher)) => Some(CacheConfig {
                    ttl: higher.ttl.or(lower.ttl),
                    sweep_interval: higher.sweep_interval.or(lower.sweep_interval),
                }),
                (lower, higher) => higher.or(lower),
            },
            lookup: match (lower.lookup, higher.lookup) {
                (Some(lower), Some(higher)) => Some(LookupConfig {
                    whois_timeout: higher.whois_timeout.or(lower.whois_timeout),
                    website_timeout: higher.website_timeout.or(lower.website_timeout),
                    whois_server: higher.whois_server.or(lower.whois_server),
                    user_agent: higher.user_agent.or(lower.user_agent),
                    max_body_bytes: higher.max_body_bytes.or(lower.max_body_bytes),
                }),
                (lower, higher) => higher.or(lower),
            },
            batch: match (lower.batch, higher.batch) {
                (Some(lower), Some(higher)) => Some(BatchConfig {
                    concurrency: higher.concurrency.or(lower.concurrency),
                }),
                (lower, higher) => higher.or(lower),
            },
        }
    }

    /// Validate a configuration for common issues.
    fn validate_config(&self, config: &FileConfig) -> Result<(), AnalysisError> {
        if let Some(bind) = config.bind() {
            validate_bind(bind)?;
        }

        if let Some(cache) = &config.cache {
            validate_duration("cache.ttl", cache.ttl.as_deref())?;
            validate_duration("cache.sweep_interval", cache.sweep_interval.as_deref())?;
        }

        if let Some(lookup) = &config.lookup {
            validate_duration("lookup.whois_timeout", lookup.whois_timeout.as_deref())?;
            validate_duration("lookup.website_timeout", lookup.website_timeout.as_deref())?;

            if let Some(server) = &lookup.whois_server {
                if server.trim().is_empty() {
                    return Err(AnalysisError::config("lookup.whois_server cannot be empty"));
                }
            }
            if lookup.max_body_bytes == Some(0) {
                return Err(AnalysisError::config("lookup.max_body_bytes must be positive"));
            }
        }

        if let Some(concurrency) = config.batch.as_ref().and_then(|b| b.concurrency) {
            if concurrency == 0 || concurrency > 100 {
                return Err(AnalysisError::config(
                    "Concurrency must be between 1 and 100",
                ));
            }
        }

        Ok(())
    }
}

fn validate_duration(field: &str, value: Option<&str>) -> Result<(), AnalysisError> {
    match value {
        Some(raw) if parse_duration_string(raw).is_none() => Err(AnalysisError::config(format!(
            "Invalid duration '{}' for {}. Use format like '5s', '2m', '1h'",
            raw, field
        ))),
        _ => Ok(()),
    }
}

/// Check that `bind` is a socket address such as "0.0.0.0:3000".
pub fn validate_bind(bind: &str) -> Result<(), AnalysisError> {
    bind.parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| AnalysisError::config(format!("Invalid bind address '{}'", bind)))
}

/// Environment variable configuration that mirrors CLI options.
///
/// This represents configuration values that can be set via DI_* environment variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub bind: Option<String>,
    pub cache_ttl: Option<Duration>,
    pub sweep_interval: Option<Duration>,
    pub whois_timeout: Option<Duration>,
    pub website_timeout: Option<Duration>,
    pub whois_server: Option<String>,
    pub user_agent: Option<String>,
    pub concurrency: Option<usize>,
    pub config: Option<String>,
}

impl EnvConfig {
    /// Build from an arbitrary variable source. Invalid values are ignored
    /// with a warning.
    pub fn from_source<F>(get: F, verbose: bool) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env_config = EnvConfig::default();

        let var = |name: &str| {
            let value = get(name).filter(|v| !v.trim().is_empty())?;
            if verbose {
                info!("Using {}={}", name, value);
            }
            Some(value)
        };

        let duration = |name: &str| {
            let raw = var(name)?;
            let parsed = parse_duration_string(&raw);
            if parsed.is_none() {
                warn!("Invalid {}='{}', use format like '5s', '2m', '1h'", name, raw);
            }
            parsed
        };

        // DI_BIND wins over PORT
        if let Some(bind) = var("DI_BIND") {
            match validate_bind(&bind) {
                Ok(()) => env_config.bind = Some(bind),
                Err(_) => warn!("Invalid DI_BIND='{}', expected host:port", bind),
            }
        } else if let Some(port) = var("PORT") {
            match port.trim().parse::<u16>() {
                Ok(port) => env_config.bind = Some(format!("0.0.0.0:{}", port)),
                Err(_) => warn!("Invalid PORT='{}'", port),
            }
        }

        env_config.cache_ttl = duration("DI_CACHE_TTL");
        env_config.sweep_interval = duration("DI_SWEEP_INTERVAL");
        env_config.whois_timeout = duration("DI_WHOIS_TIMEOUT");
        env_config.website_timeout = duration("DI_WEBSITE_TIMEOUT");
        env_config.whois_server = var("DI_WHOIS_SERVER");
        env_config.user_agent = var("DI_USER_AGENT");
        env_config.config = var("DI_CONFIG");

        if let Some(val) = var("DI_CONCURRENCY") {
            match val.trim().parse::<usize>() {
                Ok(concurrency) if (1..=100).contains(&concurrency) => {
                    env_config.concurrency = Some(concurrency);
                }
                _ => warn!("Invalid DI_CONCURRENCY='{}', must be 1-100", val),
            }
        }

        env_config
    }

    /// Overlay the values present in the environment onto `config`.
    pub fn apply_to(&self, mut config: AnalyzerConfig) -> AnalyzerConfig {
        if let Some(ttl) = self.cache_ttl {
            config = config.with_cache_ttl(ttl);
        }
        if let Some(interval) = self.sweep_interval {
            config = config.with_sweep_interval(interval);
        }
        if let Some(t) = self.whois_timeout {
            config = config.with_whois_timeout(t);
        }
        if let Some(t) = self.website_timeout {
            config = config.with_website_timeout(t);
        }
        if let Some(server) = &self.whois_server {
            config = config.with_whois_server(server.clone());
        }
        if let Some(agent) = &self.user_agent {
            config = config.with_user_agent(agent.clone());
        }
        if let Some(concurrency) = self.concurrency {
            config = config.with_concurrency(concurrency);
        }
        config
    }
}

/// Load configuration from the process environment.
pub fn load_env_config(verbose: bool) -> EnvConfig {
    EnvConfig::from_source(|name| env::var(name).ok(), verbose)
}

/// Parse a duration string like "5s", "2m", "1h" (bare numbers are seconds).
///
/// Returns `None` for malformed or zero durations.
pub fn parse_duration_string(duration_str: &str) -> Option<Duration> {
    let duration_str = duration_str.trim().to_lowercase();

    let (digits, multiplier) = if let Some(s) = duration_str.strip_suffix('s') {
        (s, 1)
    } else if let Some(m) = duration_str.strip_suffix('m') {
        (m, 60)
    } else if let Some(h) = duration_str.strip_suffix('h') {
        (h, 3600)
    } else {
        (duration_str.as_str(), 1)
    };

    let value = digits.trim().parse::<u64>().ok()?;
    if value == 0 {
        return None;
    }
    value.checked_mul(multiplier).map(Duration::from_secs)
}
