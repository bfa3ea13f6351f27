//! Tracker connection settings for the CLI.
//!
//! Environment variables (`FIXPARITY_URL`, `FIXPARITY_USER`,
//! `FIXPARITY_TOKEN`) provide the baseline; an optional TOML file overrides
//! them field by field. The token never reaches the logs.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use fixparity_core::TrackerConfig;

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    url: Option<String>,
    user: Option<String>,
    token: Option<String>,
}

/// Merge tracker settings from the environment and the optional TOML file.
pub fn load(config_path: Option<&Path>) -> Result<TrackerConfig> {
    let mut cfg = TrackerConfig::from_env();
    if let Some(path) = config_path {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let file: SettingsFile = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        if let Some(url) = file.url {
            cfg.base_url = url;
        }
        if let Some(user) = file.user {
            cfg.user = Some(user);
        }
        if let Some(token) = file.token {
            cfg.token = Some(token);
        }
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_config_file_overrides_environment() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "url = \"https://tracker.example.com\"\nuser = \"bot\"\ntoken = \"t0ken\""
        )
        .expect("write");

        let cfg = load(Some(file.path())).expect("load");
        assert_eq!(cfg.base_url, "https://tracker.example.com");
        assert_eq!(cfg.user.as_deref(), Some("bot"));
        assert_eq!(cfg.token.as_deref(), Some("t0ken"));
    }

    #[test]
    fn test_partial_config_file_keeps_other_fields() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "url = \"https://tracker.example.com\"").expect("write");

        let cfg = load(Some(file.path())).expect("load");
        assert_eq!(cfg.base_url, "https://tracker.example.com");
    }

    #[test]
    fn test_missing_config_file_fails_with_context() {
        let err = load(Some(Path::new("/nonexistent/fixparity.toml"))).expect_err("missing file");
        assert!(err.to_string().contains("fixparity.toml"));
    }

    #[test]
    fn test_malformed_config_file_fails() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "url = [not toml").expect("write");
        assert!(load(Some(file.path())).is_err());
    }
}
