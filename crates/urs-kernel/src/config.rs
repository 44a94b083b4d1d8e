//! Service configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config:
//!
//! ```toml
//! default_scheme = "vfs://"
//! link_buffer_len = 128
//! max_link_depth = 8
//! remote_timeout_ms = 2000   # omit to block forever
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Namespace used for paths that start with `/`.
pub const DEFAULT_SCHEME: &str = "vfs://";

/// Inline buffer a provider may fill with a link target during lookup.
pub const DEFAULT_LINK_BUFFER_LEN: usize = 128;

/// Symlink hops allowed within one resolution.
pub const DEFAULT_MAX_LINK_DEPTH: usize = 8;

/// Config loading error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// URS configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrsConfig {
    /// Prefix substituted for a leading `/`. Must end with `://`.
    pub default_scheme: String,
    /// Capacity of the link-target buffer offered to `lookup`.
    pub link_buffer_len: usize,
    /// Maximum symlink hops before resolution gives up.
    pub max_link_depth: usize,
    /// Deadline for remote replies. `None` blocks until the provider answers.
    pub remote_timeout_ms: Option<u64>,
}

impl Default for UrsConfig {
    fn default() -> Self {
        Self {
            default_scheme: DEFAULT_SCHEME.to_string(),
            link_buffer_len: DEFAULT_LINK_BUFFER_LEN,
            max_link_depth: DEFAULT_MAX_LINK_DEPTH,
            remote_timeout_ms: None,
        }
    }
}

impl UrsConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: UrsConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Remote reply deadline, if any.
    pub fn remote_timeout(&self) -> Option<Duration> {
        self.remote_timeout_ms.map(Duration::from_millis)
    }

    /// Set the remote reply deadline.
    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let scheme = self.default_scheme.as_str();
        if scheme.len() <= 3 || !scheme.ends_with("://") || scheme[..scheme.len() - 3].contains('/')
        {
            return Err(ConfigError::Invalid(format!(
                "default_scheme must look like \"name://\", got {scheme:?}"
            )));
        }
        if self.link_buffer_len == 0 {
            return Err(ConfigError::Invalid("link_buffer_len must be nonzero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_is_default() {
        let config = UrsConfig::from_toml_str("").unwrap();
        assert_eq!(config, UrsConfig::default());
        assert_eq!(config.default_scheme, "vfs://");
        assert_eq!(config.link_buffer_len, 128);
        assert!(config.remote_timeout().is_none());
    }

    #[test]
    fn test_overrides() {
        let config = UrsConfig::from_toml_str(
            r#"
            default_scheme = "urs://"
            max_link_depth = 2
            remote_timeout_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.default_scheme, "urs://");
        assert_eq!(config.max_link_depth, 2);
        assert_eq!(config.link_buffer_len, DEFAULT_LINK_BUFFER_LEN);
        assert_eq!(config.remote_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_rejects_bad_scheme() {
        let err = UrsConfig::from_toml_str(r#"default_scheme = "vfs""#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = UrsConfig::from_toml_str(r#"default_scheme = "a/b://""#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = UrsConfig::from_toml_str("max_link_depth = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "link_buffer_len = 64").unwrap();

        let config = UrsConfig::load(file.path()).unwrap();
        assert_eq!(config.link_buffer_len, 64);

        let missing = UrsConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }
}
