//! Command-line front end for [`stt_corrector`].

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::debug;

use stt_corrector::{
    AddCorrectionResponse, BatchCorrectionResponse, CorrectorConfig, NewCorrection,
    PlainCorrectionResponse, SttCorrector,
};

/// Correct speech-to-text phrases against a knowledge base of known mistakes.
#[derive(Debug, Parser)]
#[command(name = "stt-corrector", version)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// Seed knowledge base, overriding the configured one.
    #[arg(long, global = true, value_name = "JSON")]
    pub knowledge_base: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Correct one or more phrases.
    Correct {
        #[arg(required = true, value_name = "TEXT")]
        texts: Vec<String>,

        /// Replace every matching span and print only the corrected text.
        #[arg(long)]
        plain: bool,
    },

    /// Add a correction to the knowledge base.
    Add {
        #[arg(long)]
        phrase: String,

        #[arg(long = "mistake", required = true)]
        mistakes: Vec<String>,

        #[arg(long)]
        context: Option<String>,

        #[arg(long)]
        category: Option<String>,
    },

    /// Print knowledge base statistics.
    Stats,
}

/// `$CONFIG_DIR/stt-corrector/config.toml`, used when `--config` is absent.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("stt-corrector").join("config.toml"))
}

/// Resolve the configuration for `cli`.
pub fn load_config(cli: &Cli) -> Result<CorrectorConfig> {
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => default_config_path().filter(|path| path.is_file()),
    };

    let mut config = match path {
        Some(path) => {
            debug!("loading config from {}", path.display());
            CorrectorConfig::from_file(&path)
                .with_context(|| format!("failed to load config {}", path.display()))?
        }
        None => CorrectorConfig::default(),
    };
    if let Some(knowledge_base) = &cli.knowledge_base {
        config = config.with_knowledge_base(knowledge_base.clone());
    }
    Ok(config)
}

/// Run `cli` and return the JSON document to print.
pub async fn run(cli: Cli) -> Result<Value> {
    let config = load_config(&cli)?;
    let corrector = SttCorrector::new(config)
        .await
        .context("failed to build corrector")?;
    execute(&corrector, cli.command).await
}

/// Run `command` against an existing corrector.
pub async fn execute(corrector: &SttCorrector, command: Command) -> Result<Value> {
    let value = match command {
        Command::Correct { texts, plain } => correct(corrector, &texts, plain).await?,
        Command::Add {
            phrase,
            mistakes,
            context,
            category,
        } => {
            let mut correction = NewCorrection::new(phrase, mistakes);
            if let Some(context) = context {
                correction = correction.with_context(context);
            }
            if let Some(category) = category {
                correction = correction.with_category(category);
            }
            let outcome = corrector
                .add_correction(correction)
                .await
                .context("failed to add correction")?;
            serde_json::to_value(AddCorrectionResponse::from(outcome))?
        }
        Command::Stats => serde_json::to_value(corrector.stats().await)?,
    };
    Ok(value)
}

async fn correct(corrector: &SttCorrector, texts: &[String], plain: bool) -> Result<Value> {
    if plain {
        let mut responses = Vec::with_capacity(texts.len());
        for text in texts {
            responses.push(PlainCorrectionResponse::from(
                corrector.correct_plain(text).await,
            ));
        }
        return Ok(match responses.as_slice() {
            [single] => serde_json::to_value(single)?,
            _ => serde_json::to_value(responses)?,
        });
    }

    let mut results = corrector.correct_batch(texts).await;
    if results.len() == 1 {
        if let Some(result) = results.pop() {
            return Ok(serde_json::to_value(result)?);
        }
    }
    Ok(serde_json::to_value(BatchCorrectionResponse { results })?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "stt-corrector",
            "correct",
            "start eating",
            "--plain",
            "--knowledge-base",
            "kb.json",
        ])
        .unwrap();

        assert_eq!(cli.knowledge_base, Some(PathBuf::from("kb.json")));
        match cli.command {
            Command::Correct { texts, plain } => {
                assert_eq!(texts, vec!["start eating"]);
                assert!(plain);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_add_requires_a_mistake() {
        let parsed = Cli::try_parse_from(["stt-corrector", "add", "--phrase", "start meeting"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_knowledge_base_flag_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            "knowledge_base = \"configured.json\"\n\n[fuzzy]\nmin_similarity = 0.6\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "stt-corrector",
            "--config",
            config_path.to_str().unwrap(),
            "--knowledge-base",
            "override.json",
            "stats",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();

        assert_eq!(config.knowledge_base, Some(PathBuf::from("override.json")));
        assert_eq!(config.fuzzy.min_similarity, 0.6);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = Cli::try_parse_from([
            "stt-corrector",
            "--config",
            "/nonexistent/stt-corrector.toml",
            "stats",
        ])
        .unwrap();
        let err = load_config(&cli).unwrap_err();
        assert!(format!("{err:#}").contains("failed to load config"));
    }
}
