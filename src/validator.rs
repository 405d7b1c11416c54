use crate::consolidator::{ConsolidatedTable, TableRow};
use crate::inference::{ENDING_CASH, NET_INCOME, SALES, TOTAL_ASSETS, TOTAL_EQUITY, TOTAL_LIABILITIES};
use crate::schema::StatementType;
use log::info;
use std::collections::{BTreeMap, BTreeSet};

pub const SALES_FALLBACKS: &[&str] = &["net_sales", "revenue", "revenues"];
pub const NET_INCOME_FALLBACKS: &[&str] = &["net_profit", "net_profit_for_the_year"];
pub const TOTAL_ASSETS_FALLBACKS: &[&str] = &["total_asset"];
pub const ENDING_CASH_FALLBACKS: &[&str] = &[
    "cash_and_cash_equivalents_at_december_31",
    "cash_and_cash_equivalents_as_at_december_31",
    "cash_and_cash_equivalents",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Pass,
    /// Passed the required-field checks, but the accounting equation could
    /// not be evaluated.
    Skipped(String),
    Fail(String),
}

impl Verdict {
    pub fn is_failure(&self) -> bool {
        matches!(self, Verdict::Fail(_))
    }
}

/// First usable value among `primary` and then `fallbacks`. A value is
/// usable when present, finite and non-zero; otherwise the field is missing.
pub fn get_value(row: &TableRow, primary: &str, fallbacks: &[&str]) -> Option<f64> {
    std::iter::once(primary)
        .chain(fallbacks.iter().copied())
        .filter_map(|column| row.get(column))
        .find(|value| value.is_finite() && *value != 0.0)
}

pub fn check_income_row(row: &TableRow) -> Verdict {
    let sales = match get_value(row, SALES, SALES_FALLBACKS) {
        Some(sales) if sales > 0.0 => sales,
        _ => return Verdict::Fail("Missing or invalid sales".to_string()),
    };
    // Net income may legitimately be zero, as long as it is reported.
    let net_income = get_value(row, NET_INCOME, NET_INCOME_FALLBACKS).or_else(|| {
        std::iter::once(NET_INCOME)
            .chain(NET_INCOME_FALLBACKS.iter().copied())
            .filter_map(|column| row.get(column))
            .find(|value| value.is_finite())
    });
    let Some(net_income) = net_income else {
        return Verdict::Fail("Missing net income".to_string());
    };
    info!(
        "  PASS: {} - Has sales ({:.0}) and net income ({:.0})",
        row.year, sales, net_income
    );
    Verdict::Pass
}

pub fn check_balance_sheet_row(row: &TableRow, tolerance: f64) -> Verdict {
    let assets = match get_value(row, TOTAL_ASSETS, TOTAL_ASSETS_FALLBACKS) {
        Some(assets) if assets > 0.0 => assets,
        _ => return Verdict::Fail("Missing or invalid total assets".to_string()),
    };

    let liabilities = get_value(row, TOTAL_LIABILITIES, &[]);
    let equity = get_value(row, TOTAL_EQUITY, &[]);
    let (Some(liabilities), Some(equity)) = (liabilities, equity) else {
        return Verdict::Skipped(
            "Missing liabilities or equity, cannot validate equation".to_string(),
        );
    };

    let difference = (assets - (liabilities + equity)).abs();
    if difference > tolerance {
        return Verdict::Fail(format!(
            "Assets ({:.0}) != Liabilities ({:.0}) + Equity ({:.0}) (diff: {:.1})",
            assets, liabilities, equity, difference
        ));
    }
    info!(
        "  PASS: {} - Balance sheet balances (Assets: {:.0})",
        row.year, assets
    );
    Verdict::Pass
}

pub fn check_cash_flow_row(row: &TableRow) -> Verdict {
    match get_value(row, ENDING_CASH, ENDING_CASH_FALLBACKS) {
        Some(cash) if cash > 0.0 => {
            info!("  PASS: {} - Has ending cash balance ({:.0})", row.year, cash);
            Verdict::Pass
        }
        _ => Verdict::Fail("Missing or invalid ending cash".to_string()),
    }
}

/// `file_source` of every year in `table` that fails a check for `statement`.
pub fn validate(
    statement: StatementType,
    table: &ConsolidatedTable,
    tolerance: f64,
) -> BTreeSet<String> {
    info!("--- Validating Unified {} ---", statement.title());
    let mut failed = BTreeSet::new();

    for row in &table.rows {
        let verdict = match statement {
            StatementType::Income => check_income_row(row),
            StatementType::BalanceSheet => check_balance_sheet_row(row, tolerance),
            StatementType::CashFlow => check_cash_flow_row(row),
        };
        match verdict {
            Verdict::Fail(reason) => {
                info!("  FAIL: {} - {}", row.year, reason);
                failed.insert(row.file_source.clone());
            }
            Verdict::Skipped(reason) => info!("  SKIP: {} - {}", row.year, reason),
            Verdict::Pass => {}
        }
    }

    if failed.is_empty() {
        info!("  All years passed validation.");
    }
    failed
}

/// Validates each statement independently and unions the failing sources.
pub fn validate_all(
    tables: &BTreeMap<StatementType, ConsolidatedTable>,
    tolerance: f64,
) -> BTreeSet<String> {
    tables
        .iter()
        .flat_map(|(statement, table)| validate(*statement, table, tolerance))
        .collect()
}
