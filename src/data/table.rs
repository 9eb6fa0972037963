use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use calamine::{open_workbook, Data, Reader, Xlsx};

use crate::error::{ImfcsError, Result};

// ---------------------------------------------------------------------------
// Cell – one spreadsheet cell, already decoded
// ---------------------------------------------------------------------------

/// A single cell of a materialized sheet.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
}

/// Shared empty cell for out-of-bounds reads.
static EMPTY_CELL: Cell = Cell::Empty;

impl Cell {
    /// Interpret the cell as a float. Text is accepted when it parses as a
    /// number; anything else is a [`ImfcsError::NumericParse`].
    pub fn to_f64(&self) -> Result<f64> {
        match self {
            Cell::Number(v) => Ok(*v),
            Cell::Text(s) => s.trim().parse::<f64>().map_err(|_| ImfcsError::NumericParse {
                value: s.clone(),
            }),
            Cell::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Cell::Empty => Err(ImfcsError::NumericParse {
                value: String::new(),
            }),
        }
    }

    /// Text form of the cell, as a column label or parameter name.
    pub fn to_text(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(v) => v.to_string(),
            Cell::Bool(b) => b.to_string(),
            Cell::Empty => String::new(),
        }
    }
}

fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::Bool(b) => Cell::Bool(*b),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) => Cell::Text(s.clone()),
        // Excel stores dates as day counts; keep the raw number.
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Text(format!("#ERROR: {e:?}")),
    }
}

// ---------------------------------------------------------------------------
// Table – one fully materialized sheet
// ---------------------------------------------------------------------------

/// A named sheet materialized into row/column addressable form.
///
/// Materializing the whole sheet up front is the dominant cost of a decode
/// call; the reshaping afterwards is cheap.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        Table {
            name: name.into(),
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Cell at `(row, col)`; positions outside the stored rectangle read as
    /// empty, the way a ragged sheet behaves.
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    /// Number of cells in one row (0 for a missing row).
    pub fn row_len(&self, row: usize) -> usize {
        self.rows.get(row).map_or(0, Vec::len)
    }

    /// Index of the first row whose column-0 text equals `label`.
    pub fn find_row_by_label(&self, label: &str) -> Option<usize> {
        self.rows
            .iter()
            .position(|r| matches!(r.first(), Some(Cell::Text(s)) if s == label))
    }
}

// ---------------------------------------------------------------------------
// TableSource – a handle to a parsed spreadsheet
// ---------------------------------------------------------------------------

/// Yields named tables from a decoded spreadsheet.
pub trait TableSource {
    /// Materialize the named sheet. Fails with [`ImfcsError::MissingTable`]
    /// when the sheet does not exist.
    fn table(&mut self, name: &str) -> Result<Table>;
}

/// Calamine-backed workbook on disk.
pub struct XlsxBook {
    workbook: Xlsx<BufReader<File>>,
    sheet_names: Vec<String>,
}

impl XlsxBook {
    pub fn open(path: &Path) -> Result<Self> {
        let workbook: Xlsx<BufReader<File>> = open_workbook(path)?;
        let sheet_names = workbook.sheet_names().to_vec();
        Ok(XlsxBook {
            workbook,
            sheet_names,
        })
    }
}

impl TableSource for XlsxBook {
    fn table(&mut self, name: &str) -> Result<Table> {
        if !self.sheet_names.iter().any(|s| s == name) {
            return Err(ImfcsError::MissingTable { name: name.into() });
        }
        let range = self.workbook.worksheet_range(name)?;

        // The range covers the used bounding box only; pad it back out so
        // cell addresses stay absolute.
        let (row_offset, col_offset) = range.start().map_or((0, 0), |(r, c)| {
            (r as usize, c as usize)
        });

        let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); row_offset];
        rows.extend(range.rows().map(|row| {
            let mut cells = vec![Cell::Empty; col_offset];
            cells.extend(row.iter().map(data_to_cell));
            cells
        }));
        Ok(Table::new(name, rows))
    }
}

/// In-memory workbook, used by tests and the sample generator to exercise
/// the decoders without touching the filesystem.
#[derive(Debug, Default, Clone)]
pub struct MemoryBook {
    tables: BTreeMap<String, Table>,
}

impl MemoryBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: Table) {
        self.tables.insert(table.name().to_string(), table);
    }
}

impl TableSource for MemoryBook {
    fn table(&mut self, name: &str) -> Result<Table> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| ImfcsError::MissingTable { name: name.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_to_f64_accepts_numeric_text() {
        assert_eq!(Cell::Text(" 2.5 ".into()).to_f64().unwrap(), 2.5);
        assert_eq!(Cell::Number(7.0).to_f64().unwrap(), 7.0);
        assert_eq!(Cell::Bool(true).to_f64().unwrap(), 1.0);
        assert!(matches!(
            Cell::Text("abc".into()).to_f64(),
            Err(ImfcsError::NumericParse { .. })
        ));
        assert!(Cell::Empty.to_f64().is_err());
    }

    #[test]
    fn table_reads_out_of_bounds_as_empty() {
        let t = Table::new("t", vec![vec![Cell::Number(1.0)]]);
        assert_eq!(t.cell(0, 0), &Cell::Number(1.0));
        assert_eq!(t.cell(0, 5), &Cell::Empty);
        assert_eq!(t.cell(9, 0), &Cell::Empty);
    }

    #[test]
    fn memory_book_reports_missing_table() {
        let mut book = MemoryBook::new();
        book.insert(Table::new("lagtime", Vec::new()));
        assert!(book.table("lagtime").is_ok());
        let err = book.table("ACF1").unwrap_err();
        assert!(matches!(err, ImfcsError::MissingTable { name } if name == "ACF1"));
    }
}
