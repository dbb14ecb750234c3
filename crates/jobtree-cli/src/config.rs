//! Configuration – reads/writes `~/.jobtree/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Compact => write!(f, "compact"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Persisted user configuration stored in `~/.jobtree/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Format of the tracing output on stderr.
    #[serde(default)]
    pub log_format: LogFormat,

    /// Colourise the rendered tree.
    #[serde(default = "default_color")]
    pub color: bool,

    /// Scenario to load when none is given on the command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<PathBuf>,

    /// Show each job's effective importance and rank position.
    #[serde(default = "default_show_importance")]
    pub show_importance: bool,
}

fn default_color() -> bool {
    true
}
fn default_show_importance() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            color: default_color(),
            scenario: None,
            show_importance: default_show_importance(),
        }
    }
}

/// Return the path to `~/.jobtree/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".jobtree").join("config.toml")
}

/// Load the config from disk and apply environment overrides.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Defaults with environment overrides applied, for when no file exists.
pub fn from_env() -> Config {
    let mut cfg = Config::default();
    apply_env_overrides(&mut cfg);
    cfg
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `JOBTREE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `JOBTREE_LOG_FORMAT` | `log_format` (`compact` or `json`) |
/// | `JOBTREE_SCENARIO` | `scenario` |
/// | `JOBTREE_COLOR` | `color` (`true`/`false`/`1`/`0`) |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("JOBTREE_LOG_FORMAT") {
        match v.as_str() {
            "json" => cfg.log_format = LogFormat::Json,
            "compact" => cfg.log_format = LogFormat::Compact,
            _ => {}
        }
    }
    if let Ok(v) = std::env::var("JOBTREE_SCENARIO")
        && !v.is_empty()
    {
        cfg.scenario = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("JOBTREE_COLOR") {
        match v.as_str() {
            "1" | "true" => cfg.color = true,
            "0" | "false" => cfg.color = false,
            _ => {}
        }
    }
}

/// Save the config to disk, creating `~/.jobtree/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.scenario = Some(PathBuf::from("/srv/boot.toml"));
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.scenario, Some(PathBuf::from("/srv/boot.toml")));
        assert!(loaded.show_importance);
        assert_eq!(loaded.log_format, LogFormat::Compact);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "log_format = \"json\"\n").unwrap();

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.log_format, LogFormat::Json);
        assert!(loaded.color);
        assert!(loaded.scenario.is_none());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "color = \"maybe\"\n").unwrap();
        assert!(load_from(&path).unwrap_err().contains("Failed to parse config"));
    }

    #[cfg(unix)]
    #[test]
    fn config_dir_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let dir_meta = std::fs::metadata(path.parent().unwrap()).expect("dir metadata");
        assert_eq!(dir_meta.permissions().mode() & 0o777, 0o700);
    }

    #[test]
    fn config_path_points_to_jobtree_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".jobtree"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn apply_env_overrides_reads_every_variable() {
        // SAFETY: only this test touches JOBTREE_* variables.
        unsafe {
            std::env::set_var("JOBTREE_LOG_FORMAT", "json");
            std::env::set_var("JOBTREE_SCENARIO", "/tmp/demo.toml");
            std::env::set_var("JOBTREE_COLOR", "0");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.scenario, Some(PathBuf::from("/tmp/demo.toml")));
        assert!(!cfg.color);

        unsafe { std::env::set_var("JOBTREE_COLOR", "sometimes") };
        apply_env_overrides(&mut cfg);
        assert!(!cfg.color, "invalid values are ignored");

        unsafe {
            std::env::remove_var("JOBTREE_LOG_FORMAT");
            std::env::remove_var("JOBTREE_SCENARIO");
            std::env::remove_var("JOBTREE_COLOR");
        }
    }
}
