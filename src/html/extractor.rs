use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::validation::{Code, ValidationResult};

/// One row extracted from the Amion HTML table, before any date/time
/// semantic validation — the extractor only checks presence, never format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawShift {
    pub date: String,
    pub shift_type: String,
    pub start_time: String,
    pub end_time: String,
    pub location: Option<String>,
    pub required_staffing: i64,
    pub row_index: usize,
}

/// CSS selectors for the six positional columns, overridable by callers
/// who need a different table layout.
#[derive(Clone)]
pub struct SelectorConfig {
    pub row: Selector,
    pub date_cell: Selector,
    pub shift_type_cell: Selector,
    pub start_time_cell: Selector,
    pub end_time_cell: Selector,
    pub location_cell: Selector,
    pub staffing_cell: Selector,
    pub header_row: Selector,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            row: Selector::parse("table tbody tr").unwrap(),
            date_cell: Selector::parse("td:nth-child(1)").unwrap(),
            shift_type_cell: Selector::parse("td:nth-child(2)").unwrap(),
            start_time_cell: Selector::parse("td:nth-child(3)").unwrap(),
            end_time_cell: Selector::parse("td:nth-child(4)").unwrap(),
            location_cell: Selector::parse("td:nth-child(5)").unwrap(),
            staffing_cell: Selector::parse("td:nth-child(6)").unwrap(),
            header_row: Selector::parse("thead tr, tr:has(th)").unwrap(),
        }
    }
}

pub struct ExtractionResult {
    pub raw_shifts: Vec<RawShift>,
    pub errors: ValidationResult,
}

fn cell_text(row: &ElementRef, selector: &Selector) -> Option<String> {
    row.select(selector)
        .next()
        .map(|el| el.text().collect::<String>())
}

/// Outside-value whitespace is trimmed; whitespace and unicode inside a
/// value are preserved verbatim.
fn trimmed(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string())
}

/// Walk the table body and extract shift rows per the positional column
/// contract. Rows that look like headers, or whose
/// concatenated text is empty, are skipped silently; rows missing a
/// required field are skipped with a row-indexed error but parsing
/// continues for the remaining rows.
pub fn extract(document: &Html, selectors: &SelectorConfig) -> ExtractionResult {
    let mut raw_shifts = Vec::new();
    let mut errors = ValidationResult::new();

    for (row_index, row) in document.select(&selectors.row).enumerate() {
        let is_header = selectors.header_row.matches(&row) || has_any_th(&row);
        if is_header {
            continue;
        }

        let full_text: String = row.text().collect();
        if full_text.trim().is_empty() {
            continue;
        }

        let date = trimmed(cell_text(&row, &selectors.date_cell));
        let shift_type = trimmed(cell_text(&row, &selectors.shift_type_cell));
        let start_time = trimmed(cell_text(&row, &selectors.start_time_cell));
        let end_time = trimmed(cell_text(&row, &selectors.end_time_cell));
        let location = trimmed(cell_text(&row, &selectors.location_cell)).filter(|s| !s.is_empty());
        let staffing_raw = trimmed(cell_text(&row, &selectors.staffing_cell));

        let mut missing = Vec::new();
        if date.as_deref().unwrap_or("").is_empty() {
            missing.push("date");
        }
        if shift_type.as_deref().unwrap_or("").is_empty() {
            missing.push("shift_type");
        }
        if start_time.as_deref().unwrap_or("").is_empty() {
            missing.push("start_time");
        }
        if end_time.as_deref().unwrap_or("").is_empty() {
            missing.push("end_time");
        }

        if let Some(first_missing) = missing.first() {
            errors.add_error_coded(
                format!("R{row_index}"),
                format!("row {row_index} missing required field '{first_missing}'"),
                Code::MissingRow,
            );
            continue;
        }

        let mut required_staffing = 0i64;
        if let Some(raw) = staffing_raw.filter(|s| !s.is_empty()) {
            match raw.parse::<i64>() {
                Ok(n) => required_staffing = n,
                Err(_) => {
                    errors.add_error_coded(
                        format!("R{row_index}C6"),
                        format!("row {row_index} has non-integer required_staffing '{raw}'"),
                        Code::InvalidValue,
                    );
                }
            }
        }

        raw_shifts.push(RawShift {
            date: date.unwrap(),
            shift_type: shift_type.unwrap(),
            start_time: start_time.unwrap(),
            end_time: end_time.unwrap(),
            location,
            required_staffing,
            row_index,
        });
    }

    ExtractionResult { raw_shifts, errors }
}

fn has_any_th(row: &ElementRef) -> bool {
    row.children()
        .filter_map(ElementRef::wrap)
        .any(|c| c.value().name() == "th")
}

/// Filter already-extracted rows to a single `YYYY-MM` month. This is a
/// thin post-filter, not a reimplementation of extraction — the extractor
/// itself never validates date semantics beyond presence.
pub fn filter_month(shifts: Vec<RawShift>, year_month: &str) -> Vec<RawShift> {
    shifts
        .into_iter()
        .filter(|s| s.date.starts_with(year_month))
        .collect()
}

pub fn parse_document(html: &str) -> Html {
    Html::parse_document(html)
}
