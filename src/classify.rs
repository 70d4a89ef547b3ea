use crate::domain::{
    ANCESTOR_COLUMNS, EntryKind, FIRST_DATA_ROW, KIND_COLUMN, NAME_COLUMN, PHOTO_COLUMNS, Row,
};
use crate::error::SortlyError;
use crate::grid::SpreadsheetSource;

/// Reads one data row. `Ok(None)` marks the end of the data region (empty name cell).
pub fn classify<G: SpreadsheetSource + ?Sized>(
    grid: &G,
    row_index: u32,
) -> Result<Option<Row>, SortlyError> {
    let entry_name = read(grid, NAME_COLUMN, row_index)?;
    if entry_name.is_empty() {
        return Ok(None);
    }

    let raw_kind = read(grid, KIND_COLUMN, row_index)?;
    let entry_kind = raw_kind
        .parse::<EntryKind>()
        .map_err(|reason| SortlyError::MalformedRow {
            row: row_index,
            reason,
        })?;

    Ok(Some(Row {
        entry_name,
        entry_kind,
        ancestor_path: read_span(grid, ANCESTOR_COLUMNS, row_index)?,
        photo_urls: read_span(grid, PHOTO_COLUMNS, row_index)?,
        row_index,
    }))
}

fn read<G: SpreadsheetSource + ?Sized>(
    grid: &G,
    column: u32,
    row: u32,
) -> Result<String, SortlyError> {
    grid.cell(column, row).map_err(|err| match err {
        SortlyError::MalformedRow { .. } => err,
        other => SortlyError::MalformedRow {
            row,
            reason: format!("column {column}: {other}"),
        },
    })
}

// Gaps are not supported: the first empty cell ends the span.
fn read_span<G: SpreadsheetSource + ?Sized>(
    grid: &G,
    columns: std::ops::RangeInclusive<u32>,
    row: u32,
) -> Result<Vec<String>, SortlyError> {
    let mut values = Vec::new();
    for column in columns {
        let value = read(grid, column, row)?;
        if value.is_empty() {
            break;
        }
        values.push(value);
    }
    Ok(values)
}

/// Lazily classifies rows from the first data row until the end of the data region.
///
/// The stream is fused on the first error: a malformed row makes every later row
/// position untrustworthy.
pub struct RowStream<'a, G: SpreadsheetSource + ?Sized> {
    grid: &'a G,
    next_row: u32,
    done: bool,
}

impl<'a, G: SpreadsheetSource + ?Sized> RowStream<'a, G> {
    pub fn new(grid: &'a G) -> Self {
        Self {
            grid,
            next_row: FIRST_DATA_ROW,
            done: false,
        }
    }
}

impl<G: SpreadsheetSource + ?Sized> Iterator for RowStream<'_, G> {
    type Item = Result<Row, SortlyError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = classify(self.grid, self.next_row);
        self.next_row += 1;
        match result {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
