use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::utils::normalize_label;

/// Raw line-item label (or canonical label, after normalization) to value.
pub type LineItems = BTreeMap<String, f64>;

/// Fiscal-year label (e.g. "2023") to that year's line items.
pub type YearData = BTreeMap<String, LineItems>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementType {
    Income,
    BalanceSheet,
    CashFlow,
}

impl StatementType {
    pub const ALL: [StatementType; 3] = [
        StatementType::Income,
        StatementType::BalanceSheet,
        StatementType::CashFlow,
    ];

    /// Directory holding the raw extracted records for this statement.
    pub fn dir_name(self) -> &'static str {
        match self {
            StatementType::Income => "income_statements",
            StatementType::BalanceSheet => "balance_sheets",
            StatementType::CashFlow => "cash_flow_statements",
        }
    }

    /// Stem of the unified CSV (`unified_{stem}.csv`).
    pub fn unified_stem(self) -> &'static str {
        match self {
            StatementType::Income => "income_statement",
            StatementType::BalanceSheet => "balance_sheet_statement",
            StatementType::CashFlow => "cash_flow_statement",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            StatementType::Income => "Income Statement",
            StatementType::BalanceSheet => "Balance Sheet",
            StatementType::CashFlow => "Cash Flow Statement",
        }
    }
}

impl std::fmt::Display for StatementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.title())
    }
}

/// An annual report found in the ticker's `annual_reports/` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDocument {
    /// File name of the report, also used as the `file_source` attribution.
    pub id: String,
    pub report_year: u16,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStatementRecord {
    pub source_document_id: String,
    pub year_to_line_items: YearData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenRecord {
    pub financial_data: LineItems,
    pub file_source: String,
}

/// A golden record whose keys went through the schema map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub financial_data: LineItems,
    pub file_source: String,
}

/// Normalized raw label to canonical label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaMap(BTreeMap<String, String>);

impl SchemaMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a mapping, normalizing the variant key.
    pub fn insert(&mut self, variant: &str, canonical: impl Into<String>) {
        self.0.insert(normalize_label(variant), canonical.into());
    }

    /// Inserts only if the normalized variant is not mapped yet.
    pub fn insert_if_absent(&mut self, variant: &str, canonical: impl Into<String>) -> bool {
        let key = normalize_label(variant);
        if self.0.contains_key(&key) {
            return false;
        }
        self.0.insert(key, canonical.into());
        true
    }

    pub fn canonical_for(&self, raw_label: &str) -> Option<&str> {
        self.0.get(&normalize_label(raw_label)).map(String::as_str)
    }

    pub fn contains(&self, raw_label: &str) -> bool {
        self.0.contains_key(&normalize_label(raw_label))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl FromIterator<(String, String)> for SchemaMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut map = SchemaMap::new();
        for (variant, canonical) in iter {
            map.insert(&variant, canonical);
        }
        map
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Not extracted yet, or cleared after a successful run.
    Pending,
    Extracted,
    /// Validation blamed this document; its record is ignored until re-extracted.
    FailedValidation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: DocumentStatus,
    pub updated_at: DateTime<Utc>,
}
