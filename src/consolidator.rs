use crate::error::Result;
use crate::schema::{LineItems, NormalizedRecord};
use crate::utils::sanitize_column_name;
use log::warn;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

pub const YEAR_COLUMN: &str = "year";
pub const FILE_SOURCE_COLUMN: &str = "file_source";

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub year: String,
    pub file_source: String,
    pub values: LineItems,
}

impl TableRow {
    pub fn get(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied()
    }
}

/// One statement type across years. `columns` lists the value columns only;
/// `year` and `file_source` always lead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsolidatedTable {
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl ConsolidatedTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn header(&self) -> Vec<&str> {
        let mut header = vec![YEAR_COLUMN, FILE_SOURCE_COLUMN];
        header.extend(self.columns.iter().map(String::as_str));
        header
    }

    pub fn row(&self, year: &str) -> Option<&TableRow> {
        self.rows.iter().find(|row| row.year == year)
    }
}

/// Builds the table: sanitized column union, newest year first.
pub fn consolidate(records: &BTreeMap<String, NormalizedRecord>) -> ConsolidatedTable {
    let mut columns = BTreeSet::new();
    let mut rows = Vec::new();

    'years: for (year, record) in records {
        let mut values = LineItems::new();
        let mut origin: BTreeMap<String, &String> = BTreeMap::new();

        for (canonical, value) in &record.financial_data {
            let column = sanitize_column_name(canonical);
            if column.is_empty() || column == YEAR_COLUMN || column == FILE_SOURCE_COLUMN {
                warn!(
                    "{} - Line item '{}' has no usable column name, dropping it",
                    year, canonical
                );
                continue;
            }
            if let Some(previous) = origin.insert(column.clone(), canonical) {
                warn!(
                    "{} - '{}' and '{}' both become column '{}'. Skipping year {}.",
                    year, previous, canonical, column, year
                );
                continue 'years;
            }
            values.insert(column, *value);
        }

        columns.extend(values.keys().cloned());
        rows.push(TableRow {
            year: year.clone(),
            file_source: record.file_source.clone(),
            values,
        });
    }

    rows.sort_by_key(|row| Reverse(row.year.clone()));

    ConsolidatedTable {
        columns: columns.into_iter().collect(),
        rows,
    }
}

/// Writes the table as CSV with a header row; absent values are empty cells.
pub fn write_csv(table: &ConsolidatedTable, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.header())?;

    for row in &table.rows {
        let mut record = vec![row.year.clone(), row.file_source.clone()];
        record.extend(
            table
                .columns
                .iter()
                .map(|column| row.get(column).map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}
