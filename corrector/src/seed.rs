//! Knowledge base seed files.
//!
//! A seed is JSON, either a bare list of corrections or an object with a
//! `corrections` list:
//!
//! ```json
//! [
//!   {
//!     "correct_phrase": "start meeting",
//!     "common_mistakes": ["start eating", "start meting"],
//!     "context": "calendar commands",
//!     "category": "meetings"
//!   }
//! ]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CorrectorError, Result};
use crate::knowledge::NewCorrection;

#[derive(Deserialize)]
#[serde(untagged)]
enum SeedFile {
    List(Vec<NewCorrection>),
    Wrapped { corrections: Vec<NewCorrection> },
}

/// Parse seed JSON into corrections, in file order.
pub fn parse_seed(content: &str) -> Result<Vec<NewCorrection>> {
    let seed: SeedFile = serde_json::from_str(content).map_err(|e| {
        CorrectorError::Seed(format!(
            "expected a list of corrections or {{\"corrections\": [...]}}: {e}"
        ))
    })?;
    Ok(match seed {
        SeedFile::List(corrections) | SeedFile::Wrapped { corrections } => corrections,
    })
}

/// Read and parse a seed file.
pub async fn read_seed_file(path: &Path) -> Result<Vec<NewCorrection>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CorrectorError::Seed(format!("{}: {e}", path.display())))?;
    parse_seed(&content)
}

/// A seed record that could not be added.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeedFailure {
    /// Position in the seed file.
    pub index: usize,
    pub correct_phrase: String,
    pub error: String,
}

/// Outcome of loading a seed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeedReport {
    pub loaded: usize,
    pub failed: Vec<SeedFailure>,

    /// Loaded entries still waiting for their vectors.
    pub vector_pending: usize,
}

impl SeedReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}
