//! Per-ticker filesystem layout.
//!
//! ```text
//! {output_dir}/{ticker}/
//!   annual_reports/{ticker}_{year}_annual_report.pdf
//!   financial_statements/
//!     extraction_status.json
//!     income_statements/{ticker}_{year}_income_statements.json
//!     balance_sheets/{ticker}_{year}_balance_sheets.json
//!     cash_flow_statements/{ticker}_{year}_cash_flow_statements.json
//!   unified_statements/
//!     schema_map.json
//!     unified_{statement}.csv
//! ```

use crate::error::{ConsolidationError, Result};
use crate::schema::{
    DocumentStatus, LineItems, RawStatementRecord, ReportDocument, StatementType, StatusEntry,
    YearData,
};
use crate::utils::{parse_amount, YearMatcher};
use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

const STATUS_FILE: &str = "extraction_status.json";
const SCHEMA_FILE: &str = "schema_map.json";

/// Persisted extraction status per report document and statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusManifest {
    #[serde(default)]
    pub documents: BTreeMap<String, BTreeMap<StatementType, StatusEntry>>,
}

impl StatusManifest {
    pub fn get(&self, document_id: &str, statement: StatementType) -> Option<DocumentStatus> {
        self.documents
            .get(document_id)
            .and_then(|statuses| statuses.get(&statement))
            .map(|entry| entry.status)
    }

    pub fn set(&mut self, document_id: &str, statement: StatementType, status: DocumentStatus) {
        self.documents
            .entry(document_id.to_string())
            .or_default()
            .insert(
                statement,
                StatusEntry {
                    status,
                    updated_at: Utc::now(),
                },
            );
    }
}

/// A raw record file found in a statement directory.
#[derive(Debug, Clone)]
pub struct RecordFile {
    pub path: PathBuf,
    pub file_name: String,
    pub report_year: Option<u16>,
}

pub struct StatementStore {
    ticker: String,
    root: PathBuf,
    years: YearMatcher,
}

impl StatementStore {
    pub fn new(output_dir: &Path, ticker: &str, years: YearMatcher) -> Self {
        Self {
            ticker: ticker.to_string(),
            root: output_dir.join(ticker),
            years,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn years(&self) -> &YearMatcher {
        &self.years
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join("annual_reports")
    }

    pub fn statements_dir(&self) -> PathBuf {
        self.root.join("financial_statements")
    }

    pub fn unified_dir(&self) -> PathBuf {
        self.root.join("unified_statements")
    }

    pub fn statement_dir(&self, statement: StatementType) -> PathBuf {
        self.statements_dir().join(statement.dir_name())
    }

    pub fn schema_cache_path(&self) -> PathBuf {
        self.unified_dir().join(SCHEMA_FILE)
    }

    pub fn status_path(&self) -> PathBuf {
        self.statements_dir().join(STATUS_FILE)
    }

    pub fn unified_csv_path(&self, statement: StatementType) -> PathBuf {
        self.unified_dir()
            .join(format!("unified_{}.csv", statement.unified_stem()))
    }

    pub fn report_file_name(&self, year: u16) -> String {
        format!("{}_{}_annual_report.pdf", self.ticker, year)
    }

    pub fn record_path(&self, year: u16, statement: StatementType) -> PathBuf {
        self.statement_dir(statement).join(format!(
            "{}_{}_{}.json",
            self.ticker,
            year,
            statement.dir_name()
        ))
    }

    pub fn ensure_layout(&self) -> Result<()> {
        fs::create_dir_all(self.reports_dir())?;
        fs::create_dir_all(self.unified_dir())?;
        for statement in StatementType::ALL {
            fs::create_dir_all(self.statement_dir(statement))?;
        }
        Ok(())
    }

    /// Reports in `annual_reports/` whose year is in the configured range,
    /// oldest first.
    pub fn discover_reports(&self) -> Result<Vec<ReportDocument>> {
        let dir = self.reports_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut reports = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_pdf = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
            if !is_pdf {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match self.years.year_in_file_name(file_name) {
                Some(year) if self.years.accepts(year) => reports.push(ReportDocument {
                    id: file_name.to_string(),
                    report_year: year,
                    path: path.clone(),
                }),
                Some(year) => debug!("Skipping {} (year {} out of range)", file_name, year),
                None => warn!("Could not extract year from report file name: {}", file_name),
            }
        }

        reports.sort_by(|a, b| a.report_year.cmp(&b.report_year).then(a.id.cmp(&b.id)));
        // Records and status entries are keyed by year, so one report per year.
        reports.dedup_by(|later, kept| {
            let same_year = later.report_year == kept.report_year;
            if same_year {
                warn!(
                    "Reports {} and {} share year {}; ignoring {}",
                    kept.id, later.id, kept.report_year, later.id
                );
            }
            same_year
        });
        Ok(reports)
    }

    pub fn list_record_files(&self, statement: StatementType) -> Result<Vec<RecordFile>> {
        let dir = self.statement_dir(statement);
        if !dir.is_dir() {
            warn!("Statement directory not found, skipping: {:?}", dir);
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            files.push(RecordFile {
                report_year: self.years.year_in_file_name(file_name),
                file_name: file_name.to_string(),
                path: path.clone(),
            });
        }
        Ok(files)
    }

    /// Reads a raw record. Year entries that are not objects are dropped and
    /// reported in the returned warnings.
    pub fn read_record(&self, path: &Path) -> Result<(YearData, Vec<String>)> {
        let text = fs::read_to_string(path)?;
        let value: Value =
            serde_json::from_str(&text).map_err(|e| ConsolidationError::CorruptRecord {
                path: path.to_path_buf(),
                details: e.to_string(),
            })?;
        parse_year_data(&value).map_err(|e| ConsolidationError::CorruptRecord {
            path: path.to_path_buf(),
            details: e.to_string(),
        })
    }

    /// Persists only the year map; the source document is implied by the
    /// file name.
    pub fn write_record(
        &self,
        report_year: u16,
        statement: StatementType,
        record: &RawStatementRecord,
    ) -> Result<PathBuf> {
        let path = self.record_path(report_year, statement);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(&record.year_to_line_items)?)?;
        Ok(path)
    }

    pub fn load_status(&self) -> Result<StatusManifest> {
        let path = self.status_path();
        if !path.exists() {
            return Ok(StatusManifest::default());
        }
        let text = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save_status(&self, manifest: &StatusManifest) -> Result<()> {
        fs::create_dir_all(self.statements_dir())?;
        fs::write(self.status_path(), serde_json::to_string_pretty(manifest)?)?;
        Ok(())
    }

    /// Effective status: an explicit manifest entry wins, otherwise the
    /// presence of the record file decides.
    pub fn status(
        &self,
        manifest: &StatusManifest,
        report_year: u16,
        statement: StatementType,
    ) -> DocumentStatus {
        let exists = self.record_path(report_year, statement).exists();
        match manifest.get(&self.report_file_name(report_year), statement) {
            Some(DocumentStatus::Extracted) if !exists => DocumentStatus::Pending,
            Some(status) => status,
            None if exists => DocumentStatus::Extracted,
            None => DocumentStatus::Pending,
        }
    }

    /// Flags every statement of the given source documents for re-extraction.
    pub fn mark_failed(&self, failed_sources: &BTreeSet<String>) -> Result<usize> {
        let mut manifest = self.load_status()?;
        let mut marked = 0;

        for source in failed_sources {
            let year = match self.years.require_file_year(source) {
                Ok(year) => year,
                Err(e) => {
                    warn!("Cannot mark {} for re-extraction: {}", source, e);
                    continue;
                }
            };
            let document_id = self.report_file_name(year);
            for statement in StatementType::ALL {
                if self.record_path(year, statement).exists() {
                    debug!(
                        "Marking for re-extraction: {} ({})",
                        document_id,
                        statement.dir_name()
                    );
                    manifest.set(&document_id, statement, DocumentStatus::FailedValidation);
                    marked += 1;
                }
            }
        }

        self.save_status(&manifest)?;
        info!("Marked {} raw records for re-extraction", marked);
        Ok(marked)
    }

    /// Drops records still flagged as failed and resets them to pending so a
    /// later run extracts them again.
    /// Documents with at least one statement still marked `FailedValidation`.
    pub fn failed_documents(&self) -> Result<BTreeSet<String>> {
        let manifest = self.load_status()?;
        Ok(manifest
            .documents
            .iter()
            .filter(|(_, statuses)| {
                statuses
                    .values()
                    .any(|entry| entry.status == DocumentStatus::FailedValidation)
            })
            .map(|(document_id, _)| document_id.clone())
            .collect())
    }

    pub fn remove_unified_csv(&self, statement: StatementType) -> Result<bool> {
        let path = self.unified_csv_path(statement);
        if !path.exists() {
            return Ok(false);
        }
        debug!("Removing stale unified table: {:?}", path);
        fs::remove_file(&path)?;
        Ok(true)
    }

    pub fn clear_failed_markers(&self) -> Result<usize> {
        let mut manifest = self.load_status()?;
        let mut stale = Vec::new();

        for (document_id, statuses) in &manifest.documents {
            for (statement, entry) in statuses {
                if entry.status == DocumentStatus::FailedValidation {
                    stale.push((document_id.clone(), *statement));
                }
            }
        }

        for (document_id, statement) in &stale {
            if let Some(year) = self.years.year_in_file_name(document_id) {
                let path = self.record_path(year, *statement);
                if path.exists() {
                    debug!("Removing stale failed record: {:?}", path);
                    fs::remove_file(&path)?;
                }
            }
            manifest.set(document_id, *statement, DocumentStatus::Pending);
        }

        if !stale.is_empty() {
            self.save_status(&manifest)?;
            info!("Cleaned up {} failed extraction markers", stale.len());
        }
        Ok(stale.len())
    }
}

/// Interprets a `{year: {label: value}}` object. Numeric strings such as
/// `"1,234"` or `"(44)"` are accepted; other non-numeric values are dropped.
pub fn parse_year_data(value: &Value) -> Result<(YearData, Vec<String>)> {
    let years = value.as_object().ok_or_else(|| {
        ConsolidationError::MalformedResponse("expected a JSON object keyed by year".to_string())
    })?;

    let mut data = YearData::new();
    let mut warnings = Vec::new();

    for (year, items) in years {
        let Some(items) = items.as_object() else {
            warnings.push(format!("Corrupt data for year {}: not an object", year));
            continue;
        };

        let mut line_items = LineItems::new();
        for (label, raw) in items {
            let amount = match raw {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => parse_amount(s),
                _ => None,
            };
            match amount {
                Some(v) => {
                    line_items.insert(label.clone(), v);
                }
                None => debug!("Dropping non-numeric line item '{}' for {}", label, year),
            }
        }
        data.insert(year.clone(), line_items);
    }

    Ok((data, warnings))
}
