use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::ods::cell::{Cell, CellType, OdsDocument, Row, Sheet};
use crate::validation::{Code, ValidationResult};

/// Strips a namespace prefix (`table:table-row` -> `table-row`) so the
/// walker tolerates whatever prefix a given ODS producer chose, including
/// documents that omit prefixes entirely.
fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().position(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

fn attr_local_value(tag: &BytesStart, local: &[u8]) -> Option<String> {
    tag.attributes().flatten().find_map(|a| {
        if local_name(a.key.as_ref()) == local {
            a.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

fn repeat_count(tag: &BytesStart, local: &[u8]) -> usize {
    attr_local_value(tag, local)
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(1)
        .max(1)
}

struct Limits {
    max_sheets: usize,
    max_rows_per_sheet: usize,
    max_cols_per_row: usize,
}

/// Walk `content.xml`'s sheet/row/cell tree, normalizing namespace prefixes
/// and accumulating one warning per ceiling hit rather than failing fast.
/// Structural errors (truncated XML, no spreadsheet body found) are
/// recorded against the `table` field — they never abort parsing of
/// whatever was read so far.
pub fn walk(
    xml: &[u8],
    max_sheets: usize,
    max_rows_per_sheet: usize,
    max_cols_per_row: usize,
) -> (OdsDocument, ValidationResult) {
    let limits = Limits {
        max_sheets,
        max_rows_per_sheet,
        max_cols_per_row,
    };
    let mut result = ValidationResult::new();
    let mut doc = OdsDocument::default();

    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut current_sheet: Option<Sheet> = None;
    let mut sheet_truncated_warned = false;
    let mut current_row: Option<Row> = None;
    let mut row_truncated_warned = false;
    let mut col_truncated_warned = false;

    // cell-in-progress state while reading its inner text
    let mut pending_cell: Option<(CellType, usize, String)> = None;
    let mut paragraph_buf: Option<String> = None;

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(ref e)) => {
                let local = local_name(e.name().as_ref()).to_vec();
                match local.as_slice() {
                    b"table" => {
                        if doc.sheets.len() >= limits.max_sheets {
                            if !sheet_truncated_warned {
                                result.add_warning_coded(
                                    "table",
                                    format!("sheet count truncated at {}", limits.max_sheets),
                                    Code::Truncated,
                                );
                                sheet_truncated_warned = true;
                            }
                            current_sheet = None;
                        } else {
                            let name = attr_local_value(e, b"name").unwrap_or_default();
                            current_sheet = Some(Sheet { name, rows: Vec::new() });
                            row_truncated_warned = false;
                        }
                    }
                    b"table-row" => {
                        if let Some(sheet) = current_sheet.as_ref() {
                            if sheet.rows.len() >= limits.max_rows_per_sheet {
                                if !row_truncated_warned {
                                    result.add_warning_coded(
                                        "table",
                                        format!(
                                            "row count truncated at {} for sheet '{}'",
                                            limits.max_rows_per_sheet, sheet.name
                                        ),
                                        Code::Truncated,
                                    );
                                    row_truncated_warned = true;
                                }
                                current_row = None;
                            } else {
                                current_row = Some(Row::default());
                                col_truncated_warned = false;
                            }
                        }
                    }
                    b"table-cell" => {
                        let declared = attr_local_value(e, b"value-type").unwrap_or_default();
                        let cell_type = CellType::parse(&declared);
                        let repeats = repeat_count(e, b"number-columns-repeated");
                        pending_cell = Some((cell_type, repeats, String::new()));
                    }
                    b"p" => {
                        paragraph_buf = Some(String::new());
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                let local = local_name(e.name().as_ref()).to_vec();
                if local.as_slice() == b"table-cell" {
                    let declared = attr_local_value(e, b"value-type").unwrap_or_default();
                    let cell_type = CellType::parse(&declared);
                    let repeats = repeat_count(e, b"number-columns-repeated");
                    let value = attr_local_value(e, b"value")
                        .or_else(|| attr_local_value(e, b"date-value"))
                        .or_else(|| attr_local_value(e, b"boolean-value"))
                        .unwrap_or_default();
                    emit_cells(
                        &mut current_row,
                        &mut result,
                        &limits,
                        &mut col_truncated_warned,
                        cell_type,
                        repeats,
                        value,
                    );
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(buf) = paragraph_buf.as_mut() {
                    if let Ok(text) = e.unescape() {
                        buf.push_str(&text);
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                let local = local_name(e.name().as_ref()).to_vec();
                match local.as_slice() {
                    b"p" => {
                        if let (Some(mut para), Some((_, _, acc))) =
                            (paragraph_buf.take(), pending_cell.as_mut())
                        {
                            if !acc.is_empty() {
                                acc.push('\n');
                            }
                            acc.append(&mut para);
                        }
                    }
                    b"table-cell" => {
                        if let Some((cell_type, repeats, value)) = pending_cell.take() {
                            emit_cells(
                                &mut current_row,
                                &mut result,
                                &limits,
                                &mut col_truncated_warned,
                                cell_type,
                                repeats,
                                value,
                            );
                        }
                    }
                    b"table-row" => {
                        if let (Some(sheet), Some(mut row)) = (current_sheet.as_mut(), current_row.take()) {
                            let row_number = sheet.rows.len() + 1;
                            for cell in &mut row.cells {
                                cell.row = row_number;
                            }
                            sheet.rows.push(row);
                        }
                    }
                    b"table" => {
                        if let Some(sheet) = current_sheet.take() {
                            doc.sheets.push(sheet);
                        }
                    }
                    _ => {}
                }
            }
            Ok(_) => {}
            Err(e) => {
                result.add_error_coded(
                    "table",
                    format!("XML parse error at byte {}: {e}", reader.buffer_position()),
                    Code::InvalidValue,
                );
                break;
            }
        }
        buf.clear();
    }

    if doc.sheets.is_empty() {
        result.add_warning_coded("table", "no sheets found in document", Code::EmptyTable);
    }

    (doc, result)
}

#[allow(clippy::too_many_arguments)]
fn emit_cells(
    current_row: &mut Option<Row>,
    result: &mut ValidationResult,
    limits: &Limits,
    col_truncated_warned: &mut bool,
    cell_type: CellType,
    repeats: usize,
    value: String,
) {
    let Some(row) = current_row.as_mut() else {
        return;
    };
    for _ in 0..repeats {
        let col = row.cells.len();
        if col >= limits.max_cols_per_row {
            if !*col_truncated_warned {
                result.add_warning_coded(
                    "table",
                    format!("column count truncated at {}", limits.max_cols_per_row),
                    Code::Truncated,
                );
                *col_truncated_warned = true;
            }
            break;
        }
        row.cells.push(Cell {
            value: value.clone(),
            cell_type,
            col,
            // row number is assigned by the caller once the row is finalized;
            // 1-indexed, filled in at finalization below.
            row: 0,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_DOC: &str = r#"<?xml version="1.0"?>
<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0"
    xmlns:table="urn:oasis:names:tc:opendocument:xmlns:table:1.0"
    xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0">
  <office:body>
    <office:spreadsheet>
      <table:table table:name="Sheet1">
        <table:table-row>
          <table:table-cell office:value-type="string"><text:p>2025-11-01</text:p></table:table-cell>
          <table:table-cell office:value-type="string"><text:p>Technologist</text:p></table:table-cell>
          <table:table-cell/>
        </table:table-row>
      </table:table>
    </office:spreadsheet>
  </office:body>
</office:document-content>"#;

    #[test]
    fn parses_simple_sheet_with_empty_trailing_cell() {
        let (doc, result) = walk(SIMPLE_DOC.as_bytes(), 256, 100_000, 1024);
        assert!(result.is_valid());
        assert_eq!(doc.sheets.len(), 1);
        assert_eq!(doc.sheets[0].name, "Sheet1");
        assert_eq!(doc.sheets[0].rows.len(), 1);
        let cells = &doc.sheets[0].rows[0].cells;
        assert_eq!(cells.len(), 3);
        assert_eq!(cells[0].value, "2025-11-01");
        assert_eq!(cells[1].value, "Technologist");
        assert_eq!(cells[2].value, "");
    }

    #[test]
    fn tolerates_unprefixed_tags() {
        let doc_xml = r#"<document-content><body><spreadsheet>
            <table name="S"><table-row><table-cell value-type="string"><p>x</p></table-cell></table-row></table>
        </spreadsheet></body></document-content>"#;
        let (doc, result) = walk(doc_xml.as_bytes(), 256, 100_000, 1024);
        assert!(result.is_valid());
        assert_eq!(doc.sheets.len(), 1);
        assert_eq!(doc.sheets[0].rows[0].cells[0].value, "x");
    }

    #[test]
    fn truncates_sheets_beyond_ceiling_with_single_warning() {
        let mut xml = String::from("<document-content><body><spreadsheet>");
        for i in 0..5 {
            xml.push_str(&format!(
                "<table name=\"S{i}\"><table-row><table-cell value-type=\"string\"><p>v</p></table-cell></table-row></table>"
            ));
        }
        xml.push_str("</spreadsheet></body></document-content>");
        let (doc, result) = walk(xml.as_bytes(), 2, 100_000, 1024);
        assert_eq!(doc.sheets.len(), 2);
        let truncation_warnings = result
            .warnings
            .iter()
            .filter(|m| m.code == Some(Code::Truncated))
            .count();
        assert_eq!(truncation_warnings, 1);
    }

    #[test]
    fn empty_document_emits_empty_table_warning() {
        let (doc, result) = walk(b"<document-content><body><spreadsheet/></body></document-content>", 256, 100_000, 1024);
        assert!(doc.sheets.is_empty());
        assert!(result.warnings.iter().any(|m| m.code == Some(Code::EmptyTable)));
    }
}
