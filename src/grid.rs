use std::collections::BTreeMap;

use camino::Utf8Path;
use umya_spreadsheet::{Spreadsheet, Worksheet};

use crate::error::SortlyError;

/// Read side of a rectangular sheet. Empty cells read as `""`.
pub trait SpreadsheetSource {
    fn cell(&self, column: u32, row: u32) -> Result<String, SortlyError>;
}

pub trait SpreadsheetSink {
    fn set_cell(&mut self, column: u32, row: u32, value: &str);
}

/// First worksheet of an `.xlsx` workbook.
pub struct Workbook {
    book: Spreadsheet,
}

impl Workbook {
    pub fn open(path: &Utf8Path) -> Result<Self, SortlyError> {
        let book = umya_spreadsheet::reader::xlsx::read(path.as_std_path()).map_err(|err| {
            SortlyError::InputOpen {
                path: path.to_string(),
                reason: err.to_string(),
            }
        })?;
        if book.get_sheet_collection_no_check().is_empty() {
            return Err(SortlyError::InputOpen {
                path: path.to_string(),
                reason: "workbook has no sheets".to_string(),
            });
        }
        Ok(Self { book })
    }

    pub fn from_spreadsheet(book: Spreadsheet) -> Self {
        Self { book }
    }

    pub fn save(&self, path: &Utf8Path) -> Result<(), SortlyError> {
        umya_spreadsheet::writer::xlsx::write(&self.book, path.as_std_path()).map_err(|err| {
            SortlyError::PersistFailure {
                path: path.to_string(),
                reason: err.to_string(),
            }
        })
    }

    fn sheet(&self) -> Option<&Worksheet> {
        self.book.get_sheet_collection_no_check().first()
    }
}

impl SpreadsheetSource for Workbook {
    fn cell(&self, column: u32, row: u32) -> Result<String, SortlyError> {
        let sheet = self.sheet().ok_or_else(|| SortlyError::MalformedRow {
            row,
            reason: "workbook has no sheets".to_string(),
        })?;
        Ok(sheet.get_value((column, row)))
    }
}

impl SpreadsheetSink for Workbook {
    fn set_cell(&mut self, column: u32, row: u32, value: &str) {
        if let Some(sheet) = self.book.get_sheet_collection_mut().first_mut() {
            sheet.get_cell_mut((column, row)).set_value(value.to_string());
        }
    }
}

/// Sparse in-memory grid keyed by `(column, row)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryGrid {
    cells: BTreeMap<(u32, u32), String>,
}

impl MemoryGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fills `row` from column 1 onwards; empty strings leave the cell blank.
    pub fn with_row(mut self, row: u32, values: &[&str]) -> Self {
        for (offset, value) in values.iter().enumerate() {
            if !value.is_empty() {
                self.cells
                    .insert((offset as u32 + 1, row), (*value).to_string());
            }
        }
        self
    }

    pub fn get(&self, column: u32, row: u32) -> Option<&str> {
        self.cells.get(&(column, row)).map(String::as_str)
    }
}

impl SpreadsheetSource for MemoryGrid {
    fn cell(&self, column: u32, row: u32) -> Result<String, SortlyError> {
        Ok(self.get(column, row).unwrap_or_default().to_string())
    }
}

impl SpreadsheetSink for MemoryGrid {
    fn set_cell(&mut self, column: u32, row: u32, value: &str) {
        self.cells.insert((column, row), value.to_string());
    }
}
