//! # STT Corrector
//!
//! Corrects short speech-to-text phrases against a curated knowledge base of
//! known mistakes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         SttCorrector                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   correct(text)                         add(correction)         │
//! │        │                                      │                 │
//! │        ▼                                      ▼                 │
//! │  ┌──────────────┐                    ┌──────────────────┐       │
//! │  │  Correction  │   snapshot (Arc)   │    Knowledge     │       │
//! │  │    Engine    │ ◄───────────────── │    Ingestor      │       │
//! │  └──────────────┘                    └──────────────────┘       │
//! │        │                                      │                 │
//! │        ▼                                      ▼                 │
//! │   Exact ──► Fuzzy ──► Vector          KnowledgeBase + vectors   │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stt_corrector::{NewCorrection, SttCorrector};
//!
//! let corrector = SttCorrector::builder().build().await?;
//! corrector
//!     .add_correction(NewCorrection::new("start meeting", ["start eating", "start meting"]))
//!     .await?;
//!
//! let result = corrector.correct("start eating").await;
//! assert_eq!(result.corrected_text, "start meeting");
//! ```

pub mod config;
pub mod corrector;
pub mod engine;
pub mod error;
pub mod exact;
pub mod fuzzy;
pub mod ingest;
pub mod knowledge;
pub mod normalize;
pub mod seed;
pub mod types;
pub mod vector;

pub use config::{
    CorrectorConfig, EmbeddingConfig, EmbeddingProviderType, FuzzyConfig, VectorConfig,
};
pub use corrector::{SttCorrector, SttCorrectorBuilder};
pub use engine::{CorrectionEngine, Matcher, StageMatch};
pub use error::{CorrectorError, Result};
pub use exact::{ExactIndex, ExactMatcher};
pub use fuzzy::FuzzyMatcher;
pub use ingest::{AddOutcome, KnowledgeIngestor, ReindexReport};
pub use knowledge::{EntryId, KnowledgeBase, KnowledgeEntry, KnowledgeSnapshot, NewCorrection};
pub use normalize::{Span, Utterance, normalize};
pub use seed::{SeedFailure, SeedReport};
pub use types::{
    AddCorrectionRequest, AddCorrectionResponse, BatchCorrectionRequest, BatchCorrectionResponse,
    CorrectionCandidate, CorrectionMethod, CorrectionRequest, CorrectionResult,
    PlainCorrectionResponse, StatsResponse,
};
pub use vector::{VectorMatcher, VectorRetriever};
