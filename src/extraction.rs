//! Turns annual reports into raw statement records.
//!
//! Page rendering and the table-reading model are external collaborators
//! behind [`PageSource`] and [`ExtractionOracle`]; this module owns the
//! local retry budget, reply parsing and the extraction status bookkeeping.

use crate::error::{ConsolidationError, Result};
use crate::schema::{DocumentStatus, RawStatementRecord, ReportDocument, StatementType, YearData};
use crate::store::{parse_year_data, StatementStore};
use crate::utils::clean_json_output;
use log::{debug, error, info, warn};
use serde_json::Value;
use std::thread::sleep;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Supplies the page images that show one statement of a report.
pub trait PageSource {
    fn pages_for(&self, report: &ReportDocument, statement: StatementType)
        -> Result<Vec<PageImage>>;
}

/// Reads a statement table off page images. Returns the reply text as-is.
pub trait ExtractionOracle {
    fn extract_statement(&self, pages: &[PageImage], statement: StatementType) -> Result<String>;
}

/// Accepts a reply only if it holds at least one year with line items.
pub fn parse_extraction_response(raw: &str) -> Result<YearData> {
    let cleaned = clean_json_output(raw);
    if cleaned.is_empty() {
        return Err(ConsolidationError::MalformedResponse(
            "empty extraction response".to_string(),
        ));
    }

    let value: Value = serde_json::from_str(&cleaned)
        .map_err(|e| ConsolidationError::MalformedResponse(format!("not JSON: {}", e)))?;
    let (mut data, warnings) = parse_year_data(&value)?;
    for message in warnings {
        warn!("{}", message);
    }

    data.retain(|_, items| !items.is_empty());
    if data.is_empty() {
        return Err(ConsolidationError::MalformedResponse(
            "response contains no line items".to_string(),
        ));
    }
    Ok(data)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub extracted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ExtractionSummary {
    pub fn absorb(&mut self, other: ExtractionSummary) {
        self.extracted += other.extracted;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

pub struct Extractor<'a> {
    oracle: &'a dyn ExtractionOracle,
    pages: &'a dyn PageSource,
    max_attempts: usize,
    retry_delay: Duration,
}

impl<'a> Extractor<'a> {
    pub fn new(
        oracle: &'a dyn ExtractionOracle,
        pages: &'a dyn PageSource,
        max_attempts: usize,
        retry_delay: Duration,
    ) -> Self {
        Self {
            oracle,
            pages,
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    /// Extracts every statement of `report` that is not already extracted.
    /// Statements the oracle cannot produce are left for the next pass.
    pub fn extract_report(
        &self,
        store: &StatementStore,
        report: &ReportDocument,
    ) -> Result<ExtractionSummary> {
        info!("--- Processing report for year: {} ---", report.report_year);
        let mut manifest = store.load_status()?;
        let document_id = store.report_file_name(report.report_year);
        let mut summary = ExtractionSummary::default();

        for statement in StatementType::ALL {
            if store.status(&manifest, report.report_year, statement) == DocumentStatus::Extracted
            {
                debug!(
                    "{} for {} already exists. Skipping.",
                    statement, report.report_year
                );
                summary.skipped += 1;
                continue;
            }

            let pages = match self.pages.pages_for(report, statement) {
                Ok(pages) if !pages.is_empty() => pages,
                Ok(_) => {
                    warn!("No pages found for {} in {}", statement, report.id);
                    summary.failed += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Could not load pages for {} in {}: {}", statement, report.id, e);
                    summary.failed += 1;
                    continue;
                }
            };

            match self.extract_with_retries(&pages, statement, report) {
                Some(data) => {
                    let record = RawStatementRecord {
                        source_document_id: report.id.clone(),
                        year_to_line_items: data,
                    };
                    let path = store.write_record(report.report_year, statement, &record)?;
                    manifest.set(&document_id, statement, DocumentStatus::Extracted);
                    store.save_status(&manifest)?;
                    info!("Saved {} to {:?}", statement, path);
                    summary.extracted += 1;
                }
                None => {
                    error!(
                        "Failed to extract {} for {} after {} attempts.",
                        statement, report.report_year, self.max_attempts
                    );
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    fn extract_with_retries(
        &self,
        pages: &[PageImage],
        statement: StatementType,
        report: &ReportDocument,
    ) -> Option<YearData> {
        for attempt in 1..=self.max_attempts {
            debug!("Requesting {} for {} (attempt {})", statement, report.id, attempt);
            let reply = self
                .oracle
                .extract_statement(pages, statement)
                .and_then(|raw| parse_extraction_response(&raw));

            match reply {
                Ok(data) => return Some(data),
                Err(e) => {
                    warn!(
                        "Failed to extract {} on attempt {}: {}",
                        statement, attempt, e
                    );
                    if attempt < self.max_attempts {
                        sleep(self.retry_delay);
                    }
                }
            }
        }
        None
    }
}
