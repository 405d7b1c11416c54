use crate::schema::{GoldenRecord, LineItems, NormalizedRecord, SchemaMap};
use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet};

/// Two or more raw labels of one year that resolve to the same canonical label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelConflict {
    pub year: String,
    pub canonical: String,
    pub raw_labels: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Normalization {
    pub records: BTreeMap<String, NormalizedRecord>,
    /// Raw labels absent from the schema map, kept under their raw name.
    pub unmapped: BTreeSet<String>,
    pub conflicts: Vec<LabelConflict>,
}

/// Rewrites every year's line items through the schema map.
///
/// A year in which two raw labels share a canonical label is left out
/// entirely rather than keeping one of the values.
pub fn normalize(records: &BTreeMap<String, GoldenRecord>, schema: &SchemaMap) -> Normalization {
    let mut result = Normalization::default();

    for (year, golden) in records {
        let mut by_canonical: BTreeMap<String, Vec<(&String, f64)>> = BTreeMap::new();

        for (raw_label, value) in &golden.financial_data {
            let canonical = match schema.canonical_for(raw_label) {
                Some(canonical) => canonical.to_string(),
                None => {
                    result.unmapped.insert(raw_label.clone());
                    raw_label.clone()
                }
            };
            by_canonical
                .entry(canonical)
                .or_default()
                .push((raw_label, *value));
        }

        let mut year_conflicts = Vec::new();
        let mut normalized = LineItems::new();
        for (canonical, sources) in by_canonical {
            if sources.len() > 1 {
                year_conflicts.push(LabelConflict {
                    year: year.clone(),
                    canonical,
                    raw_labels: sources.iter().map(|(label, _)| (*label).clone()).collect(),
                });
            } else if let Some((_, value)) = sources.first() {
                normalized.insert(canonical, *value);
            }
        }

        if year_conflicts.is_empty() {
            result.records.insert(
                year.clone(),
                NormalizedRecord {
                    financial_data: normalized,
                    file_source: golden.file_source.clone(),
                },
            );
            continue;
        }

        for conflict in &year_conflicts {
            warn!(
                "{} - Duplicate canonical name '{}' from {:?}. Skipping year {}; review schema_map.json or re-extract {}.",
                conflict.year, conflict.canonical, conflict.raw_labels, conflict.year, golden.file_source
            );
        }
        result.conflicts.extend(year_conflicts);
    }

    if !result.unmapped.is_empty() {
        info!(
            "{} items were not in the schema map and were kept as new columns: {:?}",
            result.unmapped.len(),
            result.unmapped
        );
    }

    result
}
