//! # Annual Report Consolidator
//!
//! A library for turning the financial statements of annual report PDFs into
//! one validated table per statement type, covering every fiscal year the
//! reports mention.
//!
//! ## Core Concepts
//!
//! - **Raw records**: Per-report `{year: {label: value}}` data read off each statement by an [`ExtractionOracle`]
//! - **Schema map**: Raw label variant to canonical label, discovered with a [`SchemaOracle`] and cached per ticker
//! - **Golden records**: One record per fiscal year, taken from the most recently published report so restatements win
//! - **Consolidated tables**: One row per year, sanitized columns, written as `unified_*.csv`
//! - **Self-correction**: Reports whose data fails validation are re-extracted, up to `max_retries` passes
//!
//! ## Example
//!
//! ```rust,ignore
//! use annual_report_consolidator::*;
//! use annual_report_consolidator::llm::{GeminiClient, GeminiExtractionOracle, WholeDocumentPages};
//!
//! let config = PipelineConfig {
//!     companies: vec![CompanyConfig {
//!         name: "Novo Nordisk".to_string(),
//!         ticker: "NVO".to_string(),
//!         investor_relations_url: None,
//!     }],
//!     ..PipelineConfig::default()
//! };
//!
//! let client = GeminiClient::new(api_key, "gemini-2.5-flash")?;
//! let extraction = GeminiExtractionOracle::new(client);
//! let reports = run_all(
//!     &config,
//!     Oracles {
//!         extraction: &extraction,
//!         pages: &WholeDocumentPages,
//!         schema: &SnakeCaseSchemaOracle,
//!     },
//! );
//! assert!(reports.iter().all(CompanyReport::succeeded));
//! ```

pub mod config;
pub mod consolidator;
pub mod error;
pub mod extraction;
pub mod golden;
pub mod inference;
pub mod normalizer;
pub mod pipeline;
pub mod retry;
pub mod schema;
pub mod store;
pub mod utils;
pub mod validator;

#[cfg(feature = "gemini")]
pub mod llm;

pub use config::{CompanyConfig, PipelineConfig, DEFAULT_YEAR_PATTERN};
pub use consolidator::{consolidate, write_csv, ConsolidatedTable, TableRow};
pub use error::{ConsolidationError, Result};
pub use extraction::{
    parse_extraction_response, ExtractionOracle, ExtractionSummary, Extractor, PageImage,
    PageSource,
};
pub use golden::{select_golden_records, GoldenSelection};
pub use inference::{
    critical_schema, SchemaInferenceEngine, SchemaOracle, SchemaProposal, SnakeCaseSchemaOracle,
};
pub use normalizer::{normalize, LabelConflict, Normalization};
pub use pipeline::{run_all, CompanyOutcome, CompanyPipeline, CompanyReport, Oracles};
pub use retry::{ExtractionScope, PipelineStages, RetryController, RetryOutcome, RetryState};
pub use schema::*;
pub use store::{StatementStore, StatusManifest};
pub use utils::YearMatcher;
pub use validator::{validate, validate_all, Verdict};
