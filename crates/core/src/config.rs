use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{APP_NAME, Error, Result};

pub const DEFAULT_CHUNK_BYTES: usize = 256 * 1024;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploaderConfig {
    /// Granularity of upload progress ticks.
    #[serde(default = "default_chunk_bytes")]
    pub chunk_bytes: usize,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Whole-request deadline. Unset by default so large payloads are not cut off.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_chunk_bytes() -> usize {
    DEFAULT_CHUNK_BYTES
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_user_agent() -> String {
    format!("{APP_NAME}/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: default_chunk_bytes(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: None,
            user_agent: default_user_agent(),
        }
    }
}

impl UploaderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_bytes == 0 {
            return Err(Error::InvalidConfig {
                message: "chunk_bytes must be > 0".to_string(),
            });
        }
        if self.connect_timeout_secs == 0 {
            return Err(Error::InvalidConfig {
                message: "connect_timeout_secs must be > 0".to_string(),
            });
        }
        if self.request_timeout_secs == Some(0) {
            return Err(Error::InvalidConfig {
                message: "request_timeout_secs must be > 0 when set".to_string(),
            });
        }
        if self.user_agent.trim().is_empty() {
            return Err(Error::InvalidConfig {
                message: "user_agent must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

pub fn config_path(config_dir: &Path) -> PathBuf {
    config_dir.join("config.toml")
}

pub fn parse_config(text: &str) -> Result<UploaderConfig> {
    let config: UploaderConfig = toml::from_str(text).map_err(|e| Error::InvalidConfig {
        message: format!("config invalid: {e}"),
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads the config at `path`, falling back to defaults when the file does
/// not exist.
pub fn load_config(path: &Path) -> Result<UploaderConfig> {
    if !path.exists() {
        return Ok(UploaderConfig::default());
    }

    let text = std::fs::read_to_string(path).map_err(|e| Error::InvalidConfig {
        message: format!("config read failed: {e}"),
    })?;
    parse_config(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let config = load_config(&config_path(temp.path())).unwrap();
        assert_eq!(config, UploaderConfig::default());
        assert_eq!(config.chunk_bytes, 256 * 1024);
        assert!(config.user_agent.starts_with("gemini-uploader/"));
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let config = parse_config(
            r#"
chunk_bytes = 4096
request_timeout_secs = 600
"#,
        )
        .unwrap();

        assert_eq!(config.chunk_bytes, 4096);
        assert_eq!(config.request_timeout_secs, Some(600));
        assert_eq!(config.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = parse_config("chunk_bytes = 0").unwrap_err();
        assert!(err.to_string().contains("chunk_bytes"));

        let err = parse_config("request_timeout_secs = 0").unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));

        let err = parse_config("user_agent = \" \"").unwrap_err();
        assert!(err.to_string().contains("user_agent"));

        let err = parse_config("chunk_bytes = \"big\"").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn unreadable_file_is_invalid_config() {
        let temp = tempfile::tempdir().unwrap();
        let path = config_path(temp.path());
        std::fs::create_dir_all(&path).unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("config read failed"));
    }
}
