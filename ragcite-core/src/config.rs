//! Configuration system for ragcite.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from the platform config dir (`config.toml`) and/or
//! `.ragcite/config.toml` in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::embeddings::EmbeddingConfig;
use crate::error::ConfigError;
use crate::nlp::NlpConfig;

/// Default similarity threshold for accepting a citation.
pub const DEFAULT_THRESHOLD: f32 = 0.88;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationConfig {
    /// Minimum cosine similarity for a citation to be accepted.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub nlp: NlpConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

impl Default for CitationConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            embedding: EmbeddingConfig::default(),
            nlp: NlpConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

/// Input normalization applied once when an answer context is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Strip leading list ordinals (`1. `) from the answer and every document.
    #[serde(default = "default_true")]
    pub strip_ordinal_prefixes: bool,
}

fn default_true() -> bool {
    true
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            strip_ordinal_prefixes: true,
        }
    }
}

/// Reject a threshold outside `[0, 1]`.
pub fn validate_threshold(threshold: f32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ConfigError::Invalid {
            message: format!("threshold must lie in [0, 1], got {threshold}"),
        });
    }
    Ok(())
}

impl CitationConfig {
    /// Hard errors that make the configuration unusable.
    pub fn check(&self) -> Result<(), ConfigError> {
        validate_threshold(self.threshold)
    }

    /// Validate configuration values and return warnings for suspicious settings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.threshold < 0.5 && (0.0..=1.0).contains(&self.threshold) {
            warnings.push(format!(
                "threshold {} is low; loosely related sentences will be cited",
                self.threshold
            ));
        }

        if self.embedding.batch_size == 0 {
            warnings.push("embedding.batch_size is 0; batches of 1 will be used".to_string());
        }

        if self.nlp.min_noun_len == 0 {
            warnings.push("nlp.min_noun_len is 0; single letters will become focus words".into());
        }

        warnings
    }
}

const QUALIFIER: &str = "dev";
const ORGANIZATION: &str = "ragcite";
const APPLICATION: &str = "ragcite";

/// Path of the user-level configuration file, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Directory for log files, if a home directory is known.
pub fn log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
        .map(|dirs| dirs.data_dir().join("logs"))
}

/// Path of the workspace-level configuration file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".ragcite").join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `RAGCITE_`)
/// 3. Workspace-local config (`.ragcite/config.toml`)
/// 4. User config (platform config dir)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&CitationConfig>,
) -> Result<CitationConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(CitationConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // RAGCITE_THRESHOLD, RAGCITE_EMBEDDING__PROVIDER, ...
    figment = figment.merge(Env::prefixed("RAGCITE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: CitationConfig = figment.extract().map_err(Box::new)?;
    config.check()?;
    Ok(config)
}

/// Load configuration from a single explicit file layered over the defaults.
pub fn load_config_file(path: &Path) -> Result<CitationConfig, ConfigError> {
    let config: CitationConfig = Figment::from(Serialized::defaults(CitationConfig::default()))
        .merge(Toml::file(path))
        .extract()
        .map_err(Box::new)?;
    config.check()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CitationConfig::default();
        assert!((config.threshold - 0.88).abs() < f32::EPSILON);
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.nlp.engine, "rules");
        assert!(config.ingest.strip_ordinal_prefixes);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_validate_threshold_bounds() {
        assert!(validate_threshold(0.0).is_ok());
        assert!(validate_threshold(1.0).is_ok());
        assert!(validate_threshold(1.5).is_err());
        assert!(validate_threshold(-0.1).is_err());
        assert!(validate_threshold(f32::NAN).is_err());
    }

    #[test]
    fn test_validate_warnings() {
        let mut config = CitationConfig {
            threshold: 0.3,
            ..Default::default()
        };
        config.embedding.batch_size = 0;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("threshold"));
        assert!(warnings[1].contains("batch_size"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: CitationConfig = toml::from_str("threshold = 0.9\n").unwrap();
        assert!((config.threshold - 0.9).abs() < f32::EPSILON);
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.nlp.min_noun_len, 3);
    }

    #[test]
    fn test_load_config_with_overrides() {
        let mut overrides = CitationConfig {
            threshold: 0.75,
            ..Default::default()
        };
        overrides.embedding.dimensions = 256;

        let config = load_config(None, Some(&overrides)).unwrap();
        assert!((config.threshold - 0.75).abs() < f32::EPSILON);
        assert_eq!(config.embedding.dimensions, 256);
    }

    #[test]
    fn test_load_config_rejects_bad_threshold() {
        let overrides = CitationConfig {
            threshold: 2.0,
            ..Default::default()
        };
        let err = load_config(None, Some(&overrides)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_load_config_from_workspace() {
        figment::Jail::expect_with(|jail| {
            std::fs::create_dir_all(jail.directory().join(".ragcite")).map_err(|e| e.to_string())?;
            jail.create_file(
                ".ragcite/config.toml",
                r#"
threshold = 0.8

[embedding]
provider = "local"
dimensions = 64

[nlp]
abbreviations = ["Ref"]

[ingest]
strip_ordinal_prefixes = false
"#,
            )?;

            let config =
                load_config(Some(jail.directory()), None).map_err(|e| e.to_string())?;
            assert!((config.threshold - 0.8).abs() < f32::EPSILON);
            assert_eq!(config.embedding.dimensions, 64);
            assert_eq!(config.nlp.abbreviations, vec!["Ref".to_string()]);
            assert!(!config.ingest.strip_ordinal_prefixes);
            Ok(())
        });
    }

    #[test]
    fn test_load_config_file_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "threshold = \"high\"\n").unwrap();
        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn test_env_layer_overrides_file() {
        figment::Jail::expect_with(|jail| {
            std::fs::create_dir_all(jail.directory().join(".ragcite")).map_err(|e| e.to_string())?;
            jail.create_file(".ragcite/config.toml", "threshold = 0.8\n")?;
            jail.set_env("RAGCITE_THRESHOLD", "0.95");
            jail.set_env("RAGCITE_EMBEDDING__BATCH_SIZE", "8");

            let config =
                load_config(Some(jail.directory()), None).map_err(|e| e.to_string())?;
            assert!((config.threshold - 0.95).abs() < f32::EPSILON);
            assert_eq!(config.embedding.batch_size, 8);
            Ok(())
        });
    }
}
