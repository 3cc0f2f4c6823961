//! CLI subcommand handlers.

use crate::{Commands, ConfigAction};
use anyhow::Context;
use ragcite_core::config::{load_config_file, validate_threshold, workspace_config_path};
use ragcite_core::focus::classify_focus_words;
use ragcite_core::types::parse_passages;
use ragcite_core::{AnswerContext, CitationConfig, CitationPipeline, ModelRegistry};
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;

/// Input document for `ragcite check`.
#[derive(Debug, Deserialize)]
struct CheckInput {
    answer: String,
    context: Vec<serde_json::Value>,
}

/// Handle a CLI subcommand, returning what should be printed to stdout.
pub fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<String> {
    match command {
        Commands::Check {
            input,
            threshold,
            pretty,
            trace,
        } => {
            let mut config = resolve_config(workspace, config_path)?;
            if let Some(threshold) = threshold {
                validate_threshold(threshold)?;
                config.threshold = threshold;
            }
            handle_check(&input, &config, pretty, trace)
        }
        Commands::Focus { text } => {
            let config = resolve_config(workspace, config_path)?;
            handle_focus(&text, &config)
        }
        Commands::Config { action } => handle_config(action, workspace, config_path),
    }
}

fn resolve_config(workspace: &Path, config_path: Option<&Path>) -> anyhow::Result<CitationConfig> {
    let config = match config_path {
        Some(path) => load_config_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ragcite_core::load_config(Some(workspace), None)
            .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?,
    };
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }
    Ok(config)
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

fn handle_check(
    input: &Path,
    config: &CitationConfig,
    pretty: bool,
    trace: bool,
) -> anyhow::Result<String> {
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read input {}", input.display()))?;
    let input: CheckInput = serde_json::from_str(&raw).context("Input is not a check document")?;

    let passages = parse_passages(&input.context)?;
    let context = AnswerContext::with_normalization(
        input.answer,
        passages,
        config.ingest.strip_ordinal_prefixes,
    )?;
    let pipeline = CitationPipeline::from_config(config, ModelRegistry::global())?;

    if trace {
        let (_, trace) = pipeline.run_with_trace(&context)?;
        to_json(&trace, pretty)
    } else {
        let report = pipeline.run_context(&context)?;
        to_json(&report, pretty)
    }
}

fn handle_focus(text: &str, config: &CitationConfig) -> anyhow::Result<String> {
    let nlp = ModelRegistry::global().nlp(&config.nlp)?;
    let focus = classify_focus_words(nlp.as_ref(), text)?;
    to_json(&focus, true)
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<String> {
    match action {
        ConfigAction::Show => {
            let config = resolve_config(workspace, config_path)?;
            Ok(toml::to_string_pretty(&config)?)
        }
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                return Ok(format!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                ));
            }
            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let toml_str = toml::to_string_pretty(&CitationConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            Ok(format!(
                "Created default configuration at: {}",
                config_path.display()
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("ragcite.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn write_input(dir: &Path, value: serde_json::Value) -> PathBuf {
        let path = dir.join("input.json");
        std::fs::write(&path, value.to_string()).unwrap();
        path
    }

    #[test]
    fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace, None).unwrap();

        let config_path = workspace.join(".ragcite").join("config.toml");
        assert!(config_path.exists());

        let content = std::fs::read_to_string(&config_path).unwrap();
        let parsed: CitationConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed, CitationConfig::default());
    }

    #[test]
    fn test_config_init_idempotent() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();
        let config_path = workspace_config_path(workspace);
        std::fs::create_dir_all(config_path.parent().unwrap()).unwrap();
        std::fs::write(&config_path, "threshold = 0.5\n").unwrap();

        let message = handle_command(
            Commands::Config {
                action: ConfigAction::Init,
            },
            workspace,
            None,
        )
        .unwrap();

        assert!(message.contains("already exists"));
        assert_eq!(
            std::fs::read_to_string(&config_path).unwrap(),
            "threshold = 0.5\n"
        );
    }

    #[test]
    fn test_config_show_uses_explicit_file() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), "threshold = 0.75\n");

        let shown = handle_command(
            Commands::Config {
                action: ConfigAction::Show,
            },
            dir.path(),
            Some(&config),
        )
        .unwrap();

        let parsed: CitationConfig = toml::from_str(&shown).unwrap();
        assert_eq!(parsed.threshold, 0.75);
    }

    #[test]
    fn test_check_prints_report() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), "[embedding]\nprovider = \"local\"\n");
        let input = write_input(
            dir.path(),
            json!({
                "answer": "Apple earned $5 million in 2020. The launch happened in March 2021.",
                "context": [{
                    "document": "In 2020, Apple reported revenue of $5 million.",
                    "source_id": "annual-report"
                }]
            }),
        );

        let output = handle_command(
            Commands::Check {
                input,
                threshold: None,
                pretty: false,
                trace: false,
            },
            dir.path(),
            Some(&config),
        )
        .unwrap();

        let report: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(report["hallucination"], json!(true));
        assert_eq!(report["missing_words"], json!(["March 2021"]));
        assert_eq!(
            report["citations"][0]["cited_passages"][0]["source_id"],
            json!("annual-report")
        );
    }

    #[test]
    fn test_check_trace_output() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), "");
        let input = write_input(
            dir.path(),
            json!({
                "answer": "Apple earned $5 million in 2020.",
                "context": [{"document": "In 2020, Apple reported revenue of $5 million."}]
            }),
        );

        let output = handle_command(
            Commands::Check {
                input,
                threshold: Some(0.5),
                pretty: true,
                trace: true,
            },
            dir.path(),
            Some(&config),
        )
        .unwrap();

        let trace: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(trace["threshold"], json!(0.5));
        assert!(trace["records"].as_array().is_some_and(|r| !r.is_empty()));
    }

    #[test]
    fn test_check_rejects_out_of_range_threshold() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), "");
        let input = write_input(
            dir.path(),
            json!({"answer": "Apple.", "context": [{"document": "Apple."}]}),
        );

        let result = handle_command(
            Commands::Check {
                input,
                threshold: Some(1.5),
                pretty: false,
                trace: false,
            },
            dir.path(),
            Some(&config),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_check_rejects_passage_without_document() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), "");
        let input = write_input(
            dir.path(),
            json!({"answer": "Apple earned $5 million.", "context": [{"source_id": "doc1"}]}),
        );

        let err = handle_command(
            Commands::Check {
                input,
                threshold: None,
                pretty: false,
                trace: false,
            },
            dir.path(),
            Some(&config),
        )
        .unwrap_err();

        let citation_err = err.downcast_ref::<ragcite_core::CitationError>().unwrap();
        assert!(citation_err.is_invalid_input());
    }

    #[test]
    fn test_focus_lists_entities() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), "");

        let output = handle_command(
            Commands::Focus {
                text: "Apple earned $5 million in 2020.".to_string(),
            },
            dir.path(),
            Some(&config),
        )
        .unwrap();

        let focus: serde_json::Value = serde_json::from_str(&output).unwrap();
        let words: Vec<&str> = focus["entities"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|e| e["word"].as_str())
            .collect();
        assert!(words.contains(&"$5 million"));
        assert!(words.contains(&"2020"));
    }
}
