use annual_report_consolidator::*;
use serde_json::{json, Map, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Replies per (report, statement). The last queued reply repeats; reports
/// without a script get prose instead of JSON.
#[derive(Default)]
struct ScriptedReports {
    replies: RefCell<BTreeMap<(String, StatementType), VecDeque<String>>>,
    calls: RefCell<Vec<(String, StatementType)>>,
}

impl ScriptedReports {
    fn script(self, report_id: &str, statement: StatementType, replies: Vec<String>) -> Self {
        self.replies
            .borrow_mut()
            .insert((report_id.to_string(), statement), replies.into());
        self
    }

    fn calls_for(&self, report_id: &str, statement: StatementType) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|(id, s)| id == report_id && *s == statement)
            .count()
    }

    fn total_calls(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl ExtractionOracle for ScriptedReports {
    fn extract_statement(&self, pages: &[PageImage], statement: StatementType) -> Result<String> {
        let report_id = String::from_utf8_lossy(&pages[0].bytes).to_string();
        self.calls.borrow_mut().push((report_id.clone(), statement));

        let mut replies = self.replies.borrow_mut();
        match replies.get_mut(&(report_id, statement)) {
            Some(queue) if queue.len() > 1 => Ok(queue.pop_front().unwrap()),
            Some(queue) => queue
                .front()
                .cloned()
                .ok_or_else(|| ConsolidationError::Oracle("no reply scripted".to_string())),
            None => Ok("I could not find that table in the document.".to_string()),
        }
    }
}

/// Hands the report id to the oracle in place of page images.
struct ReportIdPages;

impl PageSource for ReportIdPages {
    fn pages_for(&self, report: &ReportDocument, _: StatementType) -> Result<Vec<PageImage>> {
        Ok(vec![PageImage {
            mime_type: "application/pdf".to_string(),
            bytes: report.id.clone().into_bytes(),
        }])
    }
}

/// Delegates to another schema oracle and counts the calls.
struct CountingSchemaOracle<'a> {
    inner: &'a dyn SchemaOracle,
    calls: RefCell<usize>,
}

impl<'a> CountingSchemaOracle<'a> {
    fn new(inner: &'a dyn SchemaOracle) -> Self {
        Self {
            inner,
            calls: RefCell::new(0),
        }
    }
}

impl SchemaOracle for CountingSchemaOracle<'_> {
    fn propose_mapping(&self, labels: &[String]) -> Result<String> {
        *self.calls.borrow_mut() += 1;
        self.inner.propose_mapping(labels)
    }
}

/// Maps the revenue label away from `sales`.
struct RenamingSchemaOracle;

impl SchemaOracle for RenamingSchemaOracle {
    fn propose_mapping(&self, _: &[String]) -> Result<String> {
        Ok(r#"{"turnover": ["Revenue"], "operating_costs": ["Operating expenses"]}"#.to_string())
    }
}

fn report_id(ticker: &str, year: u16) -> String {
    format!("{}_{}_annual_report.pdf", ticker, year)
}

fn by_year<F: Fn(&[f64]) -> Value>(entries: &[(u16, &[f64])], items: F) -> String {
    let mut map = Map::new();
    for &(year, values) in entries {
        map.insert(year.to_string(), items(values));
    }
    Value::Object(map).to_string()
}

/// (year, [revenue, net income])
fn income(entries: &[(u16, &[f64])]) -> String {
    by_year(entries, |v| json!({ "Revenue": v[0], "Net income": v[1] }))
}

/// (year, [assets, liabilities, equity])
fn balance(entries: &[(u16, &[f64])]) -> String {
    by_year(entries, |v| {
        json!({ "Total assets": v[0], "Total liabilities": v[1], "Total equity": v[2] })
    })
}

/// (year, [ending cash])
fn cash(entries: &[(u16, &[f64])]) -> String {
    by_year(entries, |v| {
        json!({ "Cash and cash equivalents at the end of the year": v[0] })
    })
}

/// A report with passing statements for its own year and the prior year.
fn passing_report(oracle: ScriptedReports, ticker: &str, year: u16) -> ScriptedReports {
    let id = report_id(ticker, year);
    let years = [(year, 0.0), (year - 1, 1.0)];
    let income_rows: Vec<(u16, [f64; 2])> =
        years.iter().map(|(y, d)| (*y, [500.0 - d, 40.0])).collect();
    let balance_rows: Vec<(u16, [f64; 3])> =
        years.iter().map(|(y, _)| (*y, [900.0, 500.0, 400.0])).collect();
    let cash_rows: Vec<(u16, [f64; 1])> = years.iter().map(|(y, _)| (*y, [75.0])).collect();

    oracle
        .script(
            &id,
            StatementType::Income,
            vec![income(&rows(&income_rows))],
        )
        .script(
            &id,
            StatementType::BalanceSheet,
            vec![balance(&rows(&balance_rows))],
        )
        .script(&id, StatementType::CashFlow, vec![cash(&rows(&cash_rows))])
}

fn rows<const N: usize>(owned: &[(u16, [f64; N])]) -> Vec<(u16, &[f64])> {
    owned.iter().map(|(y, v)| (*y, v.as_slice())).collect()
}

fn setup(dir: &TempDir, companies: &[(&str, &[u16])]) -> PipelineConfig {
    let mut config = PipelineConfig {
        output_dir: dir.path().to_path_buf(),
        retry_delay_secs: 0,
        ..PipelineConfig::default()
    };

    for (ticker, years) in companies {
        let reports_dir = dir.path().join(ticker).join("annual_reports");
        fs::create_dir_all(&reports_dir).unwrap();
        for year in *years {
            fs::write(reports_dir.join(report_id(ticker, *year)), b"%PDF-1.7").unwrap();
        }
        config.companies.push(CompanyConfig {
            name: format!("{} Holdings", ticker),
            ticker: ticker.to_string(),
            investor_relations_url: None,
        });
    }

    config
}

fn read_csv(path: &Path) -> (Vec<String>, Vec<BTreeMap<String, String>>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    let rows = reader
        .records()
        .map(|record| {
            let record = record.unwrap();
            header
                .iter()
                .cloned()
                .zip(record.iter().map(String::from))
                .collect()
        })
        .collect();
    (header, rows)
}

fn unified(dir: &TempDir, ticker: &str, statement: StatementType) -> std::path::PathBuf {
    dir.path()
        .join(ticker)
        .join("unified_statements")
        .join(format!("unified_{}.csv", statement.unified_stem()))
}

fn completed(report: &CompanyReport) -> &RetryOutcome {
    match &report.outcome {
        CompanyOutcome::Completed(outcome) => outcome,
        other => panic!("expected a completed run, got {:?}", other),
    }
}

#[test]
fn test_restated_figures_come_from_latest_report() {
    let dir = TempDir::new().unwrap();
    let config = setup(&dir, &[("TST", &[2022, 2023])]);

    let oracle = passing_report(ScriptedReports::default(), "TST", 2022)
        .script(
            &report_id("TST", 2022),
            StatementType::Income,
            vec![income(&[(2022, &[100.0, 10.0]), (2021, &[90.0, 9.0])])],
        )
        .script(
            &report_id("TST", 2023),
            StatementType::Income,
            vec![income(&[(2023, &[120.0, 12.0]), (2022, &[105.0, 11.0])])],
        )
        .script(
            &report_id("TST", 2023),
            StatementType::BalanceSheet,
            vec![balance(&[(2023, &[1000.0, 600.0, 400.0]), (2022, &[950.0, 550.0, 400.0])])],
        )
        .script(
            &report_id("TST", 2023),
            StatementType::CashFlow,
            vec![cash(&[(2023, &[80.0]), (2022, &[70.0])])],
        );

    let reports = run_all(
        &config,
        Oracles {
            extraction: &oracle,
            pages: &ReportIdPages,
            schema: &SnakeCaseSchemaOracle,
        },
    );

    assert!(reports[0].succeeded());
    assert_eq!(completed(&reports[0]).attempts, 1);

    let (header, rows) = read_csv(&unified(&dir, "TST", StatementType::Income));
    assert_eq!(header, vec!["year", "file_source", "net_income", "sales"]);
    let years: Vec<&str> = rows.iter().map(|r| r["year"].as_str()).collect();
    assert_eq!(years, vec!["2023", "2022", "2021"]);

    assert_eq!(rows[1]["sales"], "105");
    assert_eq!(rows[1]["file_source"], "TST_2023_annual_report.pdf");
    assert_eq!(rows[2]["sales"], "90");
    assert_eq!(rows[2]["file_source"], "TST_2022_annual_report.pdf");

    let (header, _) = read_csv(&unified(&dir, "TST", StatementType::CashFlow));
    assert!(header.contains(&"cash_and_cash_equivalents_at_the_end_of_the_year".to_string()));
    assert!(dir
        .path()
        .join("TST/unified_statements/schema_map.json")
        .exists());
}

#[test]
fn test_failed_validation_triggers_targeted_reextraction() {
    let dir = TempDir::new().unwrap();
    let config = setup(&dir, &[("TST", &[2022, 2023])]);
    let latest = report_id("TST", 2023);

    let oracle = passing_report(ScriptedReports::default(), "TST", 2022);
    let oracle = passing_report(oracle, "TST", 2023).script(
        &latest,
        StatementType::BalanceSheet,
        vec![
            balance(&[(2023, &[1000.0, 600.0, 410.0]), (2022, &[900.0, 500.0, 400.0])]),
            balance(&[(2023, &[1000.0, 600.0, 400.0]), (2022, &[900.0, 500.0, 400.0])]),
        ],
    );

    let mut pipeline = CompanyPipeline::new(
        &config,
        &config.companies[0],
        Oracles {
            extraction: &oracle,
            pages: &ReportIdPages,
            schema: &SnakeCaseSchemaOracle,
        },
    )
    .unwrap();
    let report = pipeline.run().unwrap();
    let outcome = completed(&report);

    assert!(outcome.succeeded());
    assert_eq!(outcome.attempts, 2);
    assert_eq!(
        outcome.trace,
        vec![
            RetryState::Extract,
            RetryState::ConsolidateAndValidate,
            RetryState::MarkForRetry,
            RetryState::Extract,
            RetryState::ConsolidateAndValidate,
            RetryState::Success,
        ]
    );

    // Only the failing report is extracted again, every statement of it.
    assert_eq!(oracle.calls_for(&latest, StatementType::BalanceSheet), 2);
    assert_eq!(oracle.calls_for(&latest, StatementType::Income), 2);
    let older = report_id("TST", 2022);
    for statement in StatementType::ALL {
        assert_eq!(oracle.calls_for(&older, statement), 1);
    }

    let balance_table = &pipeline.tables()[&StatementType::BalanceSheet];
    assert_eq!(balance_table.row("2023").unwrap().get("total_equity"), Some(400.0));

    let manifest = pipeline.store().load_status().unwrap();
    for statement in StatementType::ALL {
        assert_eq!(
            pipeline.store().status(&manifest, 2023, statement),
            DocumentStatus::Extracted
        );
    }
}

#[test]
fn test_persistent_failure_exhausts_and_drops_schema_cache() {
    let dir = TempDir::new().unwrap();
    let config = setup(&dir, &[("TST", &[2023])]);
    let id = report_id("TST", 2023);

    let oracle = passing_report(ScriptedReports::default(), "TST", 2023).script(
        &id,
        StatementType::BalanceSheet,
        vec![balance(&[(2023, &[1000.0, 600.0, 410.0]), (2022, &[1000.0, 600.0, 400.0])])],
    );

    let reports = run_all(
        &config,
        Oracles {
            extraction: &oracle,
            pages: &ReportIdPages,
            schema: &SnakeCaseSchemaOracle,
        },
    );
    let outcome = completed(&reports[0]);

    assert_eq!(outcome.state, RetryState::Exhausted);
    assert_eq!(outcome.attempts, config.max_retries);
    assert_eq!(outcome.failing_sources, BTreeSet::from([id.clone()]));
    assert_eq!(
        oracle.calls_for(&id, StatementType::BalanceSheet),
        config.max_retries
    );
    assert!(!dir
        .path()
        .join("TST/unified_statements/schema_map.json")
        .exists());
    assert!(unified(&dir, "TST", StatementType::BalanceSheet).exists());
}

#[test]
fn test_report_that_cannot_be_reextracted_stays_failing() {
    let dir = TempDir::new().unwrap();
    let config = PipelineConfig {
        max_retries: 3,
        ..setup(&dir, &[("TST", &[2023])])
    };
    let id = report_id("TST", 2023);

    // Negative ending cash first, then no usable table on every later call.
    let oracle = passing_report(ScriptedReports::default(), "TST", 2023).script(
        &id,
        StatementType::CashFlow,
        vec![
            cash(&[(2023, &[-5.0]), (2022, &[75.0])]),
            "The cash flow statement is not on these pages.".to_string(),
        ],
    );

    let reports = run_all(
        &config,
        Oracles {
            extraction: &oracle,
            pages: &ReportIdPages,
            schema: &SnakeCaseSchemaOracle,
        },
    );
    let outcome = completed(&reports[0]);

    assert_eq!(outcome.state, RetryState::Exhausted);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.failing_sources, BTreeSet::from([id.clone()]));

    // The rejected figures never survive in a unified table.
    assert!(!unified(&dir, "TST", StatementType::CashFlow).exists());
    assert!(unified(&dir, "TST", StatementType::Income).exists());

    // The flagged record is kept for manual review.
    let store = StatementStore::new(dir.path(), "TST", config.year_matcher().unwrap());
    assert!(store.record_path(2023, StatementType::CashFlow).exists());
    let manifest = store.load_status().unwrap();
    assert_eq!(
        store.status(&manifest, 2023, StatementType::CashFlow),
        DocumentStatus::FailedValidation
    );
}

#[test]
fn test_one_failing_company_does_not_stop_the_run() {
    let dir = TempDir::new().unwrap();
    let config = setup(
        &dir,
        &[("BAD", &[2023]), ("NONE", &[]), ("GOOD", &[2023])],
    );
    // BAD has no scripted replies, so nothing is ever extracted for it.
    let oracle = passing_report(ScriptedReports::default(), "GOOD", 2023);

    let reports = run_all(
        &config,
        Oracles {
            extraction: &oracle,
            pages: &ReportIdPages,
            schema: &SnakeCaseSchemaOracle,
        },
    );

    assert_eq!(reports.len(), 3);
    assert!(matches!(reports[0].outcome, CompanyOutcome::Failed(_)));
    assert_eq!(reports[1].outcome, CompanyOutcome::NoReports);
    assert_eq!(reports[2].ticker, "GOOD");
    assert!(reports[2].succeeded());

    // Local attempts are spent on every BAD statement before the schema step gives up.
    for statement in StatementType::ALL {
        assert_eq!(
            oracle.calls_for(&report_id("BAD", 2023), statement),
            config.max_retries
        );
    }
}

#[test]
fn test_second_run_reuses_records_and_schema() {
    let dir = TempDir::new().unwrap();
    let config = setup(&dir, &[("TST", &[2023])]);
    let oracle = passing_report(ScriptedReports::default(), "TST", 2023);
    let schema = CountingSchemaOracle::new(&SnakeCaseSchemaOracle);
    let oracles = Oracles {
        extraction: &oracle,
        pages: &ReportIdPages,
        schema: &schema,
    };

    assert!(run_all(&config, oracles)[0].succeeded());
    let first_run_calls = oracle.total_calls();
    let first_csv = fs::read_to_string(unified(&dir, "TST", StatementType::Income)).unwrap();

    assert!(run_all(&config, oracles)[0].succeeded());
    assert_eq!(oracle.total_calls(), first_run_calls);
    assert_eq!(*schema.calls.borrow(), 1);
    assert_eq!(
        fs::read_to_string(unified(&dir, "TST", StatementType::Income)).unwrap(),
        first_csv
    );
}

#[test]
fn test_critical_mappings_override_schema_oracle() {
    let dir = TempDir::new().unwrap();
    let config = setup(&dir, &[("TST", &[2023])]);
    let id = report_id("TST", 2023);
    let oracle = passing_report(ScriptedReports::default(), "TST", 2023).script(
        &id,
        StatementType::Income,
        vec![by_year(&[(2023, &[500.0]), (2022, &[450.0])], |v| {
            json!({ "Revenue": v[0], "Operating expenses": -300.0, "Net income": 40.0 })
        })],
    );

    let reports = run_all(
        &config,
        Oracles {
            extraction: &oracle,
            pages: &ReportIdPages,
            schema: &RenamingSchemaOracle,
        },
    );

    assert!(reports[0].succeeded());
    let (header, rows) = read_csv(&unified(&dir, "TST", StatementType::Income));
    assert_eq!(
        header,
        vec!["year", "file_source", "net_income", "operating_costs", "sales"]
    );
    assert_eq!(rows[0]["sales"], "500");
    assert_eq!(rows[0]["operating_costs"], "-300");
}
