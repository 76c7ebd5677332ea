pub mod cell;
pub mod container;
pub mod xml_walk;

pub use cell::{Cell, CellType, OdsDocument, Row, Sheet};

use crate::error::PipelineError;
use crate::validation::ValidationResult;

/// Parse an ODS byte buffer into a document tree plus an accumulated
/// [`ValidationResult`]. Only container/part errors are fatal; every
/// cell-, row-, or sheet-level anomaly downgrades to a warning and parsing
/// continues.
pub fn read_ods(
    bytes: &[u8],
    max_bytes: usize,
    max_sheets: usize,
    max_rows_per_sheet: usize,
    max_cols_per_row: usize,
) -> Result<(OdsDocument, ValidationResult), PipelineError> {
    let xml = container::extract_content_xml(bytes, max_bytes)?;
    let (doc, result) = xml_walk::walk(&xml, max_sheets, max_rows_per_sheet, max_cols_per_row);
    Ok((doc, result))
}
