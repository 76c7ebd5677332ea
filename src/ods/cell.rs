use serde::{Deserialize, Serialize};

/// The declared ODS value type of a cell. Defaults to `Text` when the
/// producer omits `office:value-type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Text,
    Number,
    Date,
    Boolean,
    Percentage,
    Currency,
}

impl CellType {
    pub fn parse(declared: &str) -> Self {
        match declared {
            "float" | "number" => CellType::Number,
            "date" => CellType::Date,
            "boolean" => CellType::Boolean,
            "percentage" => CellType::Percentage,
            "currency" => CellType::Currency,
            _ => CellType::Text,
        }
    }
}

/// One physical cell. Each cell is independent — the reader does not model
/// merged-cell spans as anything other than the single top-left cell that
/// carries the value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub value: String,
    pub cell_type: CellType,
    /// 0-indexed.
    pub col: usize,
    /// 1-indexed.
    pub row: usize,
}

impl Cell {
    pub fn reference(&self) -> String {
        format!("R{}C{}", self.row, self.col)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Row {
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Row>,
}

/// The parsed document tree: a bounded list of sheets, each a bounded list
/// of rows, each a bounded list of cells. No formulas, no styles, no named
/// ranges, no first-class merged cells — see spec Non-goals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OdsDocument {
    pub sheets: Vec<Sheet>,
}
