//! Hot-reload configuration
//!
//! [`HotReloadConfig`] can be built in code or loaded from YAML, TOML or JSON
//! with `${VAR}` / `$VAR` environment substitution.

use crate::registry::DuplicateMode;
use config::{Config as Cfg, File, FileFormat};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

/// Manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotReloadConfig {
    /// Two writes closer together than this are treated as one change
    #[serde(rename = "min_reload_interval_ms", with = "duration_ms")]
    pub min_reload_interval: Duration,
    /// Pause before reloading so the writer can finish
    #[serde(rename = "settle_delay_ms", with = "duration_ms")]
    pub settle_delay: Duration,
    /// Act on change notifications
    pub monitor_files: bool,
    /// Registry duplicate policy
    pub duplicate_mode: DuplicateMode,
    /// Context variable the manager handle is injected under
    pub manager_variable: String,
    /// Only react to files with these extensions; empty means every file
    pub extensions: Vec<String>,
}

impl Default for HotReloadConfig {
    fn default() -> Self {
        Self {
            min_reload_interval: Duration::from_millis(200),
            settle_delay: Duration::from_millis(100),
            monitor_files: true,
            duplicate_mode: DuplicateMode::Replace,
            manager_variable: "manager".to_string(),
            extensions: Vec::new(),
        }
    }
}

impl HotReloadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_reload_interval(mut self, interval: Duration) -> Self {
        self.min_reload_interval = interval;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_monitor_files(mut self, enabled: bool) -> Self {
        self.monitor_files = enabled;
        self
    }

    pub fn with_duplicate_mode(mut self, mode: DuplicateMode) -> Self {
        self.duplicate_mode = mode;
        self
    }

    pub fn with_manager_variable(mut self, name: impl Into<String>) -> Self {
        self.manager_variable = name.into();
        self
    }

    pub fn with_extension(mut self, ext: &str) -> Self {
        self.extensions.push(ext.trim_start_matches('.').to_string());
        self
    }

    /// Whether a change to `path` should be considered at all.
    pub fn should_watch(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        self.extensions.iter().any(|e| e == ext)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Format from the file extension: `.yaml`/`.yml`, `.toml` or `.json`.
pub fn detect_format(path: &Path) -> ConfigResult<FileFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Replace `${VAR}` and `$VAR` with environment values; unknown variables are left as written.
pub fn substitute_env_vars(content: &str) -> String {
    static BRACED: OnceLock<Regex> = OnceLock::new();
    static SIMPLE: OnceLock<Regex> = OnceLock::new();
    let braced = BRACED.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("braced env pattern is valid")
    });
    let simple = SIMPLE.get_or_init(|| {
        Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").expect("simple env pattern is valid")
    });

    let result = braced.replace_all(content, env_value);
    simple.replace_all(&result, env_value).into_owned()
}

fn env_value(caps: &regex::Captures<'_>) -> String {
    std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
}

/// Parse `content` in the given format after environment substitution.
pub fn from_str<T: DeserializeOwned>(content: &str, format: FileFormat) -> ConfigResult<T> {
    let substituted = substitute_env_vars(content);
    Cfg::builder()
        .add_source(File::from_str(&substituted, format))
        .build()
        .and_then(|cfg| cfg.try_deserialize())
        .map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Load a configuration file, detecting its format from the extension.
pub fn load_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> ConfigResult<T> {
    let path = path.as_ref();
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    from_str(&content, format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HotReloadConfig::default();
        assert_eq!(config.duplicate_mode, DuplicateMode::Replace);
        assert_eq!(config.manager_variable, "manager");
        assert!(config.monitor_files);
        assert!(config.should_watch(Path::new("anything.txt")));
    }

    #[test]
    fn test_extension_filter() {
        let config = HotReloadConfig::new().with_extension(".rhai");
        assert!(config.should_watch(Path::new("/tmp/a.rhai")));
        assert!(!config.should_watch(Path::new("/tmp/a.swp")));
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(Path::new("a.yml")).unwrap(), FileFormat::Yaml);
        assert_eq!(detect_format(Path::new("a.TOML")).unwrap(), FileFormat::Toml);
        assert!(matches!(
            detect_format(Path::new("a.ini")),
            Err(ConfigError::UnsupportedFormat(_))
        ));
        assert!(detect_format(Path::new("noext")).is_err());
    }

    #[test]
    fn test_yaml_with_env_substitution() {
        // SAFETY: test-local variable name, no other thread reads it.
        unsafe { std::env::set_var("KILN_TEST_MANAGER_VAR", "host") };
        let yaml = r#"
min_reload_interval_ms: 50
settle_delay_ms: 10
duplicate_mode: disallow
manager_variable: ${KILN_TEST_MANAGER_VAR}
extensions: [rhai]
"#;
        let config: HotReloadConfig = from_str(yaml, FileFormat::Yaml).unwrap();
        assert_eq!(config.min_reload_interval, Duration::from_millis(50));
        assert_eq!(config.settle_delay, Duration::from_millis(10));
        assert_eq!(config.duplicate_mode, DuplicateMode::Disallow);
        assert_eq!(config.manager_variable, "host");
        assert_eq!(config.extensions, vec!["rhai"]);
        assert!(config.monitor_files);
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(HotReloadConfig::default()).unwrap();
        assert_eq!(json["min_reload_interval_ms"], 200);
        assert_eq!(json["settle_delay_ms"], 100);
        assert_eq!(json["duplicate_mode"], "replace");
    }

    #[test]
    fn test_unknown_env_left_as_written() {
        assert_eq!(
            substitute_env_vars("x: ${KILN_SURELY_UNSET_VAR}"),
            "x: ${KILN_SURELY_UNSET_VAR}"
        );
    }

    #[test]
    fn test_load_config_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiln.toml");
        std::fs::write(&path, "monitor_files = false\nsettle_delay_ms = 5\n").unwrap();

        let config: HotReloadConfig = load_config(&path).unwrap();
        assert!(!config.monitor_files);
        assert_eq!(config.settle_delay, Duration::from_millis(5));
        assert_eq!(config.min_reload_interval, Duration::from_millis(200));
    }
}
