//! Configuration loaded from `sqles.toml`.
//!
//! ```toml
//! [backend]
//! url = "http://localhost:9200"
//! timeout_secs = 30
//!
//! [compile]
//! negation = "must_not"        # or "require_field"
//! text_equality = "match_phrase"  # or "match"
//!
//! [fields]
//! gender = "exact"
//! age = "numeric"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{SqlesError, SqlesResult};
use crate::schema::Schema;
use crate::transpiler::CompileOptions;

pub const DEFAULT_URL: &str = "http://localhost:9200";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const LOCAL_FILE: &str = "sqles.toml";

/// Search backend connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub compile: CompileOptions,
    /// Field types for the resolver.
    pub fields: Schema,
}

impl Config {
    pub fn from_toml(content: &str) -> SqlesResult<Self> {
        toml::from_str(content).map_err(|e| SqlesError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> SqlesResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SqlesError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&content)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load from `path`, else `./sqles.toml`, else the user config dir,
    /// else defaults. An explicit path must exist.
    pub fn load(path: Option<&Path>) -> SqlesResult<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        for candidate in Self::search_paths() {
            if candidate.exists() {
                return Self::from_file(&candidate);
            }
        }

        Ok(Self::default())
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("sqles").join("config.toml"));
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, FieldTypeResolver};
    use crate::transpiler::{NegationMode, TextEquality};

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.backend.url, DEFAULT_URL);
        assert_eq!(config.backend.timeout_secs, 30);
        assert_eq!(config.compile, CompileOptions::default());
        assert!(config.fields.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(
            r#"
            [backend]
            url = "http://search:9200"

            [compile]
            negation = "require_field"
            text_equality = "match"

            [fields]
            gender = "exact"
            age = "numeric"
            insert_time = "date"
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.url, "http://search:9200");
        assert_eq!(config.backend.timeout_secs, 30);
        assert_eq!(config.compile.negation, NegationMode::RequireField);
        assert_eq!(config.compile.text_equality, TextEquality::Match);
        assert_eq!(config.fields.resolve("gender").unwrap(), FieldType::Exact);
        assert_eq!(config.fields.resolve("age").unwrap(), FieldType::Numeric);
        assert_eq!(config.fields.resolve("other").unwrap(), FieldType::AnalyzedText);
    }

    #[test]
    fn test_bad_field_type_is_config_error() {
        let err = Config::from_toml("[fields]\nage = \"integer\"").unwrap_err();
        assert!(matches!(err, SqlesError::Config(_)));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = Config::load(Some(Path::new("/nonexistent/sqles.toml"))).unwrap_err();
        assert!(matches!(err, SqlesError::Config(_)));
    }
}
