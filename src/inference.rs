//! Discovers the canonical line-item schema for a company.
//!
//! Every raw label seen across the extracted records is sent to a
//! [`SchemaOracle`], whose reply is folded into a [`SchemaMap`] on top of a
//! fixed set of critical mappings that the validator depends on. The result
//! is cached in `unified_statements/schema_map.json` until invalidated.

use crate::error::{ConsolidationError, Result};
use crate::schema::{DocumentStatus, SchemaMap, StatementType};
use crate::store::StatementStore;
use crate::utils::{clean_json_output, normalize_label, sanitize_column_name};
use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;

pub const SALES: &str = "sales";
pub const NET_INCOME: &str = "net_income";
pub const TOTAL_ASSETS: &str = "total_assets";
pub const TOTAL_LIABILITIES: &str = "total_liabilities";
pub const TOTAL_EQUITY: &str = "total_equity";
pub const ENDING_CASH: &str = "cash_and_cash_equivalents_at_the_end_of_the_year";

/// Known synonyms for the fields the validator reads. These always take
/// precedence over oracle suggestions.
pub const CRITICAL_MAPPINGS: &[(&str, &str)] = &[
    ("sales", SALES),
    ("revenue", SALES),
    ("revenues", SALES),
    ("net sales", SALES),
    ("net income", NET_INCOME),
    ("net profit", NET_INCOME),
    ("net profit for the year", NET_INCOME),
    ("total assets", TOTAL_ASSETS),
    ("total asset", TOTAL_ASSETS),
    ("total liabilities", TOTAL_LIABILITIES),
    ("total equity", TOTAL_EQUITY),
    ("cash and cash equivalents at december 31", ENDING_CASH),
    ("cash and cash equivalents as at december 31", ENDING_CASH),
    ("cash and cash equivalents at the end of the year", ENDING_CASH),
    ("cash and cash equivalents", ENDING_CASH),
];

pub fn critical_schema() -> SchemaMap {
    CRITICAL_MAPPINGS
        .iter()
        .map(|(variant, canonical)| (variant.to_string(), canonical.to_string()))
        .collect()
}

/// Produces a raw-label normalization judgment. Implementations return the
/// reply text untouched; parsing happens in [`SchemaProposal::parse`].
pub trait SchemaOracle {
    fn propose_mapping(&self, labels: &[String]) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CanonicalGroup {
    #[schemars(description = "snake_case canonical name shared by every variation in this group")]
    pub canonical_name: String,

    #[schemars(description = "Line item labels, exactly as given, that mean the same thing")]
    pub variations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SchemaGroups {
    #[schemars(description = "One entry per canonical line item")]
    pub groups: Vec<CanonicalGroup>,
}

/// The reply shapes accepted from a schema oracle.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SchemaProposal {
    /// `{"groups": [{"canonical_name": .., "variations": [..]}]}`
    GroupList(SchemaGroups),
    /// `{"Net sales": "sales"}`
    VariantToCanonical(BTreeMap<String, String>),
    /// `{"sales": ["Net sales", "Revenue"]}`
    CanonicalToVariants(BTreeMap<String, Vec<String>>),
}

impl SchemaProposal {
    pub fn parse(raw: &str) -> Result<Self> {
        let cleaned = clean_json_output(raw);
        if cleaned.is_empty() {
            return Err(ConsolidationError::MalformedResponse(
                "schema oracle returned an empty response".to_string(),
            ));
        }
        serde_json::from_str(&cleaned).map_err(|e| {
            ConsolidationError::MalformedResponse(format!("unrecognized schema shape: {}", e))
        })
    }

    /// Flattens any shape into `(normalized variant, canonical)` pairs.
    pub fn into_pairs(self) -> Vec<(String, String)> {
        let grouped: Vec<(String, Vec<String>)> = match self {
            SchemaProposal::GroupList(list) => list
                .groups
                .into_iter()
                .map(|g| (g.canonical_name, g.variations))
                .collect(),
            SchemaProposal::CanonicalToVariants(map) => map.into_iter().collect(),
            SchemaProposal::VariantToCanonical(map) => map
                .into_iter()
                .map(|(variant, canonical)| (canonical, vec![variant]))
                .collect(),
        };

        let mut pairs = Vec::new();
        for (canonical, variations) in grouped {
            let canonical = normalize_label(&canonical);
            if canonical.is_empty() {
                continue;
            }
            for variation in variations {
                let key = normalize_label(&variation);
                if !key.is_empty() {
                    pairs.push((key, canonical.clone()));
                }
            }
        }
        pairs
    }
}

/// Merges an oracle proposal under the critical mappings. When the proposal
/// maps a variant twice, the first mapping is kept.
pub fn merge_with_critical(proposal: Option<SchemaProposal>) -> SchemaMap {
    let mut schema = critical_schema();

    if let Some(proposal) = proposal {
        for (variant, canonical) in proposal.into_pairs() {
            if !schema.insert_if_absent(&variant, canonical.clone()) {
                debug!("Keeping existing mapping for '{}' over '{}'", variant, canonical);
            }
        }
    }

    schema
}

/// Offline oracle: every label maps to its own snake_case form.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnakeCaseSchemaOracle;

impl SchemaOracle for SnakeCaseSchemaOracle {
    fn propose_mapping(&self, labels: &[String]) -> Result<String> {
        let mapping: BTreeMap<&str, String> = labels
            .iter()
            .map(|label| (label.as_str(), sanitize_column_name(label)))
            .filter(|(_, canonical)| !canonical.is_empty())
            .collect();
        Ok(serde_json::to_string(&mapping)?)
    }
}

pub struct SchemaInferenceEngine<'a> {
    oracle: &'a dyn SchemaOracle,
    label_limit: usize,
}

impl<'a> SchemaInferenceEngine<'a> {
    pub fn new(oracle: &'a dyn SchemaOracle, label_limit: usize) -> Self {
        Self {
            oracle,
            label_limit,
        }
    }

    pub fn get_or_build(&self, store: &StatementStore) -> Result<SchemaMap> {
        let cache_path = store.schema_cache_path();

        if cache_path.exists() {
            let text = fs::read_to_string(&cache_path)?;
            match serde_json::from_str::<SchemaMap>(&text) {
                Ok(schema) => {
                    debug!("Loaded cached schema map from {:?}", cache_path);
                    return Ok(schema);
                }
                Err(e) => warn!("Cached schema map is unreadable ({}), rebuilding", e),
            }
        }

        info!("Schema map not found. Generating a new one...");
        let labels = collect_unique_labels(store)?;
        if labels.is_empty() {
            return Err(ConsolidationError::SchemaGeneration(
                "no line items found to generate a schema from".to_string(),
            ));
        }

        let schema = self.build(&labels);
        if schema.is_empty() {
            return Err(ConsolidationError::SchemaGeneration(
                "schema map is empty".to_string(),
            ));
        }

        fs::create_dir_all(store.unified_dir())?;
        fs::write(&cache_path, serde_json::to_string_pretty(&schema)?)?;
        info!("New schema map saved to {:?}", cache_path);
        Ok(schema)
    }

    /// Asks the oracle about `labels` and merges the reply under the critical
    /// mappings. An oracle failure degrades to the critical mappings alone.
    pub fn build(&self, labels: &BTreeSet<String>) -> SchemaMap {
        let batch: Vec<String> = labels.iter().take(self.label_limit).cloned().collect();
        debug!(
            "{} critical mappings defined, sending {} of {} labels to the oracle",
            CRITICAL_MAPPINGS.len(),
            batch.len(),
            labels.len()
        );

        let proposal = self
            .oracle
            .propose_mapping(&batch)
            .and_then(|raw| SchemaProposal::parse(&raw));

        let schema = match proposal {
            Ok(proposal) => merge_with_critical(Some(proposal)),
            Err(e) => {
                warn!("Schema oracle failed ({}), using critical mappings only", e);
                merge_with_critical(None)
            }
        };

        debug!("Mapped {} total variations", schema.len());
        schema
    }

    /// Deletes the cached schema map. Returns whether a file was removed.
    pub fn invalidate(store: &StatementStore) -> Result<bool> {
        let path = store.schema_cache_path();
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        info!("Removed cached schema map at {:?}", path);
        Ok(true)
    }
}

/// Every raw label across all statement types, excluding records flagged
/// for re-extraction. Corrupt files are skipped.
pub fn collect_unique_labels(store: &StatementStore) -> Result<BTreeSet<String>> {
    let manifest = store.load_status()?;
    let mut labels = BTreeSet::new();

    for statement in StatementType::ALL {
        for file in store.list_record_files(statement)? {
            if let Some(year) = file.report_year {
                if store.status(&manifest, year, statement) == DocumentStatus::FailedValidation {
                    continue;
                }
            }
            match store.read_record(&file.path) {
                Ok((data, _)) => {
                    for items in data.values() {
                        labels.extend(items.keys().cloned());
                    }
                }
                Err(e) => warn!("Could not process file {}: {}", file.file_name, e),
            }
        }
    }

    Ok(labels)
}
