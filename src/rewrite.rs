use crate::domain::MaterializationOutcome;
use crate::grid::SpreadsheetSink;

/// Writes the public link of every materialized slot into its cell.
/// Cells of failed slots keep their original value. Returns the number of cells written.
pub fn rewrite<S: SpreadsheetSink + ?Sized>(
    sink: &mut S,
    outcomes: &[MaterializationOutcome],
) -> usize {
    let mut written = 0;
    for outcome in outcomes
        .iter()
        .filter(|outcome| outcome.status.is_materialized())
    {
        sink.set_cell(outcome.cell.column, outcome.cell.row, &outcome.public_link);
        written += 1;
    }
    written
}
