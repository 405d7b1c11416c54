use crate::error::Result;
use crate::schema::{DocumentStatus, GoldenRecord, StatementType};
use crate::store::{RecordFile, StatementStore};
use log::{info, warn};
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Golden records per fiscal year for one statement type, plus the problems
/// met while reading the raw files.
#[derive(Debug, Clone, Default)]
pub struct GoldenSelection {
    pub records: BTreeMap<String, GoldenRecord>,
    pub warnings: Vec<String>,
}

impl GoldenSelection {
    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Picks one record per fiscal year, preferring the most recently published
/// report so restated figures override the originals.
///
/// Files are ordered by the report year parsed from their name (newest first,
/// file name as tie-break); the first file to report a year claims it.
pub fn select_golden_records(
    store: &StatementStore,
    statement: StatementType,
) -> Result<GoldenSelection> {
    let manifest = store.load_status()?;
    let mut selection = GoldenSelection::default();

    let mut files: Vec<(u16, RecordFile)> = Vec::new();
    for file in store.list_record_files(statement)? {
        match file.report_year {
            Some(year) => {
                if store.status(&manifest, year, statement) == DocumentStatus::FailedValidation {
                    continue;
                }
                files.push((year, file));
            }
            None => selection.warn(format!(
                "Could not extract year from file name: {}",
                file.file_name
            )),
        }
    }

    files.sort_by_key(|(year, file)| (Reverse(*year), Reverse(file.file_name.clone())));
    info!(
        "Processing {} files in '{}'...",
        files.len(),
        statement.dir_name()
    );

    for (report_year, file) in files {
        let (data, warnings) = match store.read_record(&file.path) {
            Ok(parsed) => parsed,
            Err(e) => {
                selection.warn(format!(
                    "Could not read or process corrupt file {}: {}",
                    file.file_name, e
                ));
                continue;
            }
        };
        for message in warnings {
            selection.warn(format!("{} in {}. Skipping.", message, file.file_name));
        }

        let file_source = store.report_file_name(report_year);
        for (year, items) in data {
            selection
                .records
                .entry(year)
                .or_insert_with(|| GoldenRecord {
                    financial_data: items,
                    file_source: file_source.clone(),
                });
        }
    }

    Ok(selection)
}
