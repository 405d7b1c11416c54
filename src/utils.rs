use crate::error::{ConsolidationError, Result};
use regex::Regex;

/// Lookup form of a line-item label: lowercased and trimmed.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Restricts a column name to `[a-z0-9_]`. Runs of any other characters
/// collapse to a single underscore; leading and trailing underscores are removed.
pub fn sanitize_column_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut in_run = false;

    for ch in lowered.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' {
            out.push(ch);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }

    out.trim_matches('_').to_string()
}

/// Cuts an oracle reply down to its outermost JSON object, dropping code
/// fences or prose the model wrapped around it.
pub fn clean_json_output(raw: &str) -> String {
    if let Some(start) = raw.find('{') {
        if let Some(end) = raw.rfind('}') {
            if end > start {
                return raw[start..=end].to_string();
            }
        }
    }
    raw.trim().to_string()
}

/// Parses a numeric cell the way annual reports print them: `1,234`,
/// `(44)` for negatives, or a plain number.
pub fn parse_amount(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (negative, body) = match trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };

    let digits: String = body.chars().filter(|c| *c != ',' && *c != ' ').collect();
    let value: f64 = digits.parse().ok()?;
    if !value.is_finite() {
        return None;
    }

    Some(if negative { -value } else { value })
}

/// Recognizes report years: the configured pattern decides which years are
/// in range, file names carry the year as their first standalone 4-digit run.
#[derive(Debug, Clone)]
pub struct YearMatcher {
    range: Regex,
    file_year: Regex,
}

impl YearMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            range: Regex::new(pattern)?,
            file_year: Regex::new(r"(?:^|\D)(\d{4})(?:\D|$)")?,
        })
    }

    pub fn accepts(&self, year: u16) -> bool {
        self.range.is_match(&year.to_string())
    }

    pub fn year_in_file_name(&self, file_name: &str) -> Option<u16> {
        self.file_year
            .captures(file_name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    pub fn require_file_year(&self, file_name: &str) -> Result<u16> {
        self.year_in_file_name(file_name)
            .ok_or_else(|| ConsolidationError::InvalidFileName(file_name.to_string()))
    }
}
