//! Optional `parley.toml` configuration.
//!
//! Looked up at `--config <path>` if given, otherwise `parley.toml` in the
//! working directory. Every key is optional; a missing file means defaults.
//!
//! # Example
//!
//! ```toml
//! [mime]
//! detector = "extension"   # or "file-command" (default)
//!
//! [log]
//! level = "parley=debug"
//! json = false
//! ```

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Config file looked up in the working directory when `--config` is absent.
pub(crate) const DEFAULT_CONFIG_FILE: &str = "parley.toml";

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Config {
    pub mime: MimeSettings,
    pub log: LogSettings,
}

/// `[mime]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct MimeSettings {
    pub detector: MimeDetector,
}

/// How file MIME types are detected. The extension table is always the
/// fallback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum MimeDetector {
    /// Ask the system `file` utility.
    #[default]
    FileCommand,
    /// Use the file extension only.
    Extension,
}

/// `[log]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct LogSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit log lines as JSON.
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            level: "warn".to_string(),
            json: false,
        }
    }
}

// ── Functions ─────────────────────────────────────────────────────────────────

/// Read and parse a config file from `path`.
///
/// Returns a human-readable error string on failure.
pub(crate) fn read_config(path: &Path) -> Result<Config, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;

    toml::from_str(&content).map_err(|e| format!("could not parse '{}': {}", path.display(), e))
}

/// Load the explicit config, or the default file if present, or defaults.
pub(crate) fn load(explicit: Option<&Path>) -> Result<Config, String> {
    match explicit {
        Some(path) => read_config(path),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
            if fallback.is_file() {
                read_config(&fallback)
            } else {
                Ok(Config::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.mime.detector, MimeDetector::FileCommand);
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn parses_all_sections() {
        let config: Config = toml::from_str(
            r#"
[mime]
detector = "extension"

[log]
level = "parley=debug"
json = true
"#,
        )
        .unwrap();
        assert_eq!(config.mime.detector, MimeDetector::Extension);
        assert_eq!(config.log.level, "parley=debug");
        assert!(config.log.json);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("[mime]\ndetecter = \"extension\"\n").is_err());
    }

    #[test]
    fn read_config_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.toml");
        std::fs::write(&path, "[log]\njson = \"yes\"\n").unwrap();
        let err = read_config(&path).unwrap_err();
        assert!(err.contains("could not parse"));
        assert!(err.contains("parley.toml"));

        let missing = read_config(&dir.path().join("absent.toml")).unwrap_err();
        assert!(missing.contains("could not read"));
    }
}
