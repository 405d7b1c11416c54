//! Wires every stage together for one company and runs the configured
//! companies one after another.

use crate::config::{CompanyConfig, PipelineConfig};
use crate::consolidator::{consolidate, write_csv, ConsolidatedTable};
use crate::error::Result;
use crate::extraction::{ExtractionOracle, ExtractionSummary, Extractor, PageSource};
use crate::golden::select_golden_records;
use crate::inference::{SchemaInferenceEngine, SchemaOracle};
use crate::normalizer::normalize;
use crate::retry::{ExtractionScope, PipelineStages, RetryController, RetryOutcome};
use crate::schema::{ReportDocument, StatementType};
use crate::store::StatementStore;
use crate::validator::validate_all;
use log::{error, info, warn};
use std::collections::{BTreeMap, BTreeSet};

/// The external collaborators shared by every company in a run.
#[derive(Clone, Copy)]
pub struct Oracles<'a> {
    pub extraction: &'a dyn ExtractionOracle,
    pub pages: &'a dyn PageSource,
    pub schema: &'a dyn SchemaOracle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanyOutcome {
    /// `annual_reports/` held no report in the configured year range.
    NoReports,
    Completed(RetryOutcome),
    /// The company was abandoned, e.g. no schema could be generated.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyReport {
    pub name: String,
    pub ticker: String,
    pub outcome: CompanyOutcome,
}

impl CompanyReport {
    pub fn succeeded(&self) -> bool {
        matches!(&self.outcome, CompanyOutcome::Completed(outcome) if outcome.succeeded())
    }
}

pub struct CompanyPipeline<'a> {
    config: &'a PipelineConfig,
    company: &'a CompanyConfig,
    store: StatementStore,
    oracles: Oracles<'a>,
    reports: Vec<ReportDocument>,
    tables: BTreeMap<StatementType, ConsolidatedTable>,
}

impl<'a> CompanyPipeline<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        company: &'a CompanyConfig,
        oracles: Oracles<'a>,
    ) -> Result<Self> {
        let store = StatementStore::new(&config.output_dir, &company.ticker, config.year_matcher()?);
        Ok(Self {
            config,
            company,
            store,
            oracles,
            reports: Vec::new(),
            tables: BTreeMap::new(),
        })
    }

    pub fn store(&self) -> &StatementStore {
        &self.store
    }

    /// Tables produced by the most recent validation pass.
    pub fn tables(&self) -> &BTreeMap<StatementType, ConsolidatedTable> {
        &self.tables
    }

    pub fn run(&mut self) -> Result<CompanyReport> {
        self.store.ensure_layout()?;
        self.reports = self.store.discover_reports()?;

        let outcome = if self.reports.is_empty() {
            warn!(
                "No annual reports found in {:?}. Skipping {}.",
                self.store.reports_dir(),
                self.company.name
            );
            CompanyOutcome::NoReports
        } else {
            info!(
                "Found {} annual reports for {}",
                self.reports.len(),
                self.company.ticker
            );
            CompanyOutcome::Completed(RetryController::new(self.config.max_retries).run(self)?)
        };

        Ok(CompanyReport {
            name: self.company.name.clone(),
            ticker: self.company.ticker.clone(),
            outcome,
        })
    }

    /// The discovered report behind a canonical source name.
    fn report_for_source(&self, source: &str) -> Option<&ReportDocument> {
        let year = self.store.years().year_in_file_name(source)?;
        self.reports.iter().find(|report| report.report_year == year)
    }

    fn reports_in_scope(&self, scope: &ExtractionScope) -> Vec<&ReportDocument> {
        match scope {
            ExtractionScope::All => self.reports.iter().collect(),
            ExtractionScope::Only(sources) => {
                let years: BTreeSet<u16> = sources
                    .iter()
                    .filter_map(|source| self.store.years().year_in_file_name(source))
                    .collect();
                self.reports
                    .iter()
                    .filter(|report| years.contains(&report.report_year))
                    .collect()
            }
        }
    }
}

impl PipelineStages for CompanyPipeline<'_> {
    fn extract(&mut self, scope: &ExtractionScope) -> Result<()> {
        let extractor = Extractor::new(
            self.oracles.extraction,
            self.oracles.pages,
            self.config.max_retries,
            self.config.retry_delay(),
        );

        let mut summary = ExtractionSummary::default();
        for report in self.reports_in_scope(scope) {
            summary.absorb(extractor.extract_report(&self.store, report)?);
        }

        info!(
            "Extraction finished: {} extracted, {} already present, {} failed",
            summary.extracted, summary.skipped, summary.failed
        );
        Ok(())
    }

    fn consolidate_and_validate(&mut self) -> Result<BTreeSet<String>> {
        let engine = SchemaInferenceEngine::new(self.oracles.schema, self.config.schema_label_limit);
        let schema = engine.get_or_build(&self.store)?;

        self.tables.clear();
        for statement in StatementType::ALL {
            info!("--- Consolidating {} ---", statement.title());
            let selection = select_golden_records(&self.store, statement)?;
            if selection.records.is_empty() {
                warn!("No data found for {}", statement.title());
                self.store.remove_unified_csv(statement)?;
                continue;
            }

            let normalization = normalize(&selection.records, &schema);
            let table = consolidate(&normalization.records);
            if table.is_empty() {
                warn!("No data to consolidate for {}", statement.title());
                self.store.remove_unified_csv(statement)?;
                continue;
            }

            let path = self.store.unified_csv_path(statement);
            write_csv(&table, &path)?;
            info!("Saved unified {} to {:?}", statement.title(), path);
            self.tables.insert(statement, table);
        }

        let mut failing = validate_all(&self.tables, self.config.tolerance);

        // Flagged records are kept out of the tables, so a report whose
        // re-extraction failed has to be reported here.
        for document in self.store.failed_documents()? {
            if self.report_for_source(&document).is_none() {
                continue;
            }
            if failing.insert(document.clone()) {
                warn!("  FAIL: {} could not be re-extracted", document);
            }
        }
        Ok(failing)
    }

    fn mark_for_retry(&mut self, failing: &BTreeSet<String>) -> Result<()> {
        self.store.mark_failed(failing)?;
        Ok(())
    }

    fn on_success(&mut self) -> Result<()> {
        self.store.clear_failed_markers()?;
        Ok(())
    }

    fn on_exhausted(&mut self, failing: &BTreeSet<String>) -> Result<()> {
        SchemaInferenceEngine::invalidate(&self.store)?;
        for source in failing {
            match self.report_for_source(source) {
                Some(report) => error!("  - {}", report.path.display()),
                None => error!("  - {}", source),
            }
        }
        Ok(())
    }
}

/// Runs every configured company. A company that fails is reported and the
/// run moves on to the next one.
pub fn run_all(config: &PipelineConfig, oracles: Oracles<'_>) -> Vec<CompanyReport> {
    let mut reports = Vec::with_capacity(config.companies.len());

    for company in &config.companies {
        info!("===== Processing: {} ({}) =====", company.name, company.ticker);
        let report = CompanyPipeline::new(config, company, oracles).and_then(|mut p| p.run());

        let report = match report {
            Ok(report) => report,
            Err(e) => {
                error!("Pipeline failed for {}: {}", company.ticker, e);
                CompanyReport {
                    name: company.name.clone(),
                    ticker: company.ticker.clone(),
                    outcome: CompanyOutcome::Failed(e.to_string()),
                }
            }
        };
        if report.succeeded() {
            info!("{} ({}) consolidated successfully", company.name, company.ticker);
        }
        reports.push(report);
    }

    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::PageImage;
    use crate::inference::SnakeCaseSchemaOracle;
    use std::fs;
    use tempfile::TempDir;

    struct NoPages;

    impl PageSource for NoPages {
        fn pages_for(&self, _: &ReportDocument, _: StatementType) -> Result<Vec<PageImage>> {
            Ok(Vec::new())
        }
    }

    struct Silent;

    impl ExtractionOracle for Silent {
        fn extract_statement(&self, _: &[PageImage], _: StatementType) -> Result<String> {
            Ok(String::new())
        }
    }

    fn company(ticker: &str) -> CompanyConfig {
        CompanyConfig {
            name: format!("{} Holdings", ticker),
            ticker: ticker.to_string(),
            investor_relations_url: None,
        }
    }

    #[test]
    fn test_scope_selects_reports_by_year() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig {
            output_dir: dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let company = company("TST");
        let oracles = Oracles {
            extraction: &Silent,
            pages: &NoPages,
            schema: &SnakeCaseSchemaOracle,
        };
        let mut pipeline = CompanyPipeline::new(&config, &company, oracles).unwrap();
        pipeline.store().ensure_layout().unwrap();
        for year in [2021, 2022, 2023] {
            let path = pipeline.store().reports_dir().join(pipeline.store().report_file_name(year));
            fs::write(path, b"%PDF").unwrap();
        }
        pipeline.reports = pipeline.store.discover_reports().unwrap();

        assert_eq!(pipeline.reports_in_scope(&ExtractionScope::All).len(), 3);
        let only = ExtractionScope::Only(BTreeSet::from(["TST_2022_annual_report.pdf".to_string()]));
        let selected: Vec<u16> = pipeline
            .reports_in_scope(&only)
            .iter()
            .map(|r| r.report_year)
            .collect();
        assert_eq!(selected, vec![2022]);
    }

    #[test]
    fn test_sources_resolve_to_discovered_report_paths() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig {
            output_dir: dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let company = company("TST");
        let oracles = Oracles {
            extraction: &Silent,
            pages: &NoPages,
            schema: &SnakeCaseSchemaOracle,
        };
        let mut pipeline = CompanyPipeline::new(&config, &company, oracles).unwrap();
        pipeline.store().ensure_layout().unwrap();
        let actual = pipeline.store().reports_dir().join("tst-annual-2023.pdf");
        fs::write(&actual, b"%PDF").unwrap();
        pipeline.reports = pipeline.store.discover_reports().unwrap();

        let report = pipeline
            .report_for_source("TST_2023_annual_report.pdf")
            .unwrap();
        assert_eq!(report.path, actual);
        assert!(pipeline.report_for_source("TST_2021_annual_report.pdf").is_none());
    }

    #[test]
    fn test_company_without_reports() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig {
            output_dir: dir.path().to_path_buf(),
            companies: vec![company("EMPTY")],
            ..PipelineConfig::default()
        };
        let oracles = Oracles {
            extraction: &Silent,
            pages: &NoPages,
            schema: &SnakeCaseSchemaOracle,
        };

        let reports = run_all(&config, oracles);

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].outcome, CompanyOutcome::NoReports);
        assert!(dir.path().join("EMPTY").join("annual_reports").is_dir());
    }

    #[test]
    fn test_nothing_extracted_fails_the_company() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig {
            output_dir: dir.path().to_path_buf(),
            retry_delay_secs: 0,
            companies: vec![company("TST")],
            ..PipelineConfig::default()
        };
        let reports_dir = dir.path().join("TST").join("annual_reports");
        fs::create_dir_all(&reports_dir).unwrap();
        fs::write(reports_dir.join("TST_2023_annual_report.pdf"), b"%PDF").unwrap();
        let oracles = Oracles {
            extraction: &Silent,
            pages: &NoPages,
            schema: &SnakeCaseSchemaOracle,
        };

        let reports = run_all(&config, oracles);

        assert!(matches!(reports[0].outcome, CompanyOutcome::Failed(_)));
        assert!(!reports[0].succeeded());
    }
}
