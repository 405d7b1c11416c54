// Prompts for statement extraction and line-item normalization

use crate::error::Result;
use crate::inference::{ENDING_CASH, NET_INCOME, SALES, TOTAL_ASSETS, TOTAL_EQUITY, TOTAL_LIABILITIES};
use crate::schema::StatementType;

pub const SYSTEM_PROMPT_EXTRACTION: &str = r#"
You are a precise data extraction tool for annual reports.
You read one financial statement table and return it as JSON. You never summarize,
never round and never invent values that are not printed in the document.
"#;

pub const SYSTEM_PROMPT_SCHEMA: &str = r#"
You are a financial data analyst who normalizes line item names.
You group labels that mean the same thing under one snake_case canonical name.
"#;

pub fn extraction_prompt(statement: StatementType) -> String {
    let name = statement.title();
    format!(
        r#"
Extract the **{name}** from the attached annual report.

**Step 1: Locate the Correct Table**
- Find the main table for the **{name}**.
- The statement may have another title, such as "Statement of Operations",
  "Statement of Financial Position" or "Statements of Cash Flows". Pick the best match.
- Use the consolidated statement when both consolidated and parent-company versions exist.

**Step 2: Identify Columns and Rows**
- The columns are the fiscal years (e.g. "2024", "2023").
- The rows are the line items (e.g. "Net sales", "Total assets").

**Step 3: Extract Data**
- For every line item, extract the value for each year column.

**Step 4: Format the Output**
- Return one JSON object whose top-level keys are the years as strings.
- Each year maps to an object of line item name to number.

**Formatting Rules:**
- Numbers only: no currency symbols, thousands separators or letters.
- Negative numbers use a minus sign (e.g. -44522), not parentheses.
- Use the line item names exactly as printed.

Example format for '{name}':
{{
  "2024": {{ "Net sales": 290403, "Cost of goods sold": -44522 }},
  "2023": {{ "Net sales": 232261, "Cost of goods sold": -35765 }}
}}
"#
    )
}

pub fn schema_prompt(labels: &[String]) -> Result<String> {
    let items = serde_json::to_string_pretty(labels)?;
    Ok(format!(
        r#"
Normalize these financial line items by grouping similar variations. Use snake_case canonical names.

If an item clearly matches one of these, map it there:
- {SALES} (for revenue items)
- {NET_INCOME} (for profit for the year)
- {TOTAL_ASSETS}, {TOTAL_LIABILITIES}, {TOTAL_EQUITY} (for balance sheet totals)
- {ENDING_CASH} (for ending cash only)

Otherwise create a new snake_case canonical name. Do not force unrelated items together.
Copy every variation exactly as it is given below.

Items to normalize:
{items}
"#
    ))
}
