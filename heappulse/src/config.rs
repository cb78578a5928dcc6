use serde::Deserialize;
use shared::errors::ConfigError;
use std::{env, fs, path::Path, path::PathBuf};

/// Full engine configuration, loaded once from TOML at bootstrap.
///
/// Unlike a long-running agent, an instrumented process's config cannot
/// usefully change mid-run (the measurement interval and enabled tests
/// shape state that's already been allocated), so this is loaded once and
/// handed to [`crate::bootstrap::init`] rather than watched for changes.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Measurement interval, in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Whether to clear soft-dirty bits (`/proc/<pid>/clear_refs`) at the
    /// end of every interval.
    #[serde(default)]
    pub clear_soft_dirty: bool,
    /// Directory CSV reports are written into.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Path to the engine's own log file.
    #[serde(default = "default_log_file")]
    pub log_file: String,
    /// Which measurement tests are active.
    #[serde(default)]
    pub tests: TestsConfig,
    /// Compression codecs to initialize, by name (`zlib`, `lz4`, `zstd`,
    /// `snappy`). An unknown name is a validation error, not a silent skip,
    /// since a mistyped codec name in the config almost certainly means a
    /// report the user expects will silently be empty otherwise.
    #[serde(default = "default_codecs")]
    pub codecs: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TestsConfig {
    #[serde(default)]
    pub access_pattern: bool,
    #[serde(default)]
    pub access_compression: bool,
    #[serde(default)]
    pub generational: bool,
    #[serde(default)]
    pub page_tracking: bool,
    #[serde(default)]
    pub object_liveness: bool,
}

fn default_interval_ms() -> u64 {
    shared::constants::DEFAULT_INTERVAL_MS
}
fn default_output_dir() -> String {
    ".".to_owned()
}
fn default_log_file() -> String {
    "heappulse.log".to_owned()
}
fn default_codecs() -> Vec<String> {
    vec!["zstd".to_owned()]
}

const KNOWN_CODECS: &[&str] = &["zlib", "lz4", "zstd", "snappy"];

impl Config {
    /// Load, parse, and validate a `Config` from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let cfg: Config = toml::from_str(&s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::Validation(
                "interval_ms must be > 0".into(),
            ));
        }
        for codec in &self.codecs {
            if !KNOWN_CODECS.contains(&codec.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "unknown codec `{codec}`, expected one of {KNOWN_CODECS:?}"
                )));
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn from_str(toml: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(toml)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Resolve the config file path: an environment override first, then a
/// file named `heappulse.toml` next to the current executable.
pub fn find_config_file() -> PathBuf {
    if let Some(cfg) = env::var_os("HEAPPULSE_CONFIG") {
        return PathBuf::from(cfg);
    }
    let mut exe_path = env::current_exe().unwrap_or_else(|_| PathBuf::from("."));
    exe_path.pop();
    exe_path.push("heappulse.toml");
    exe_path
}
