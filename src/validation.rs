//! Bulk validation pass over a table's active rows.

use anyhow::{Context, Result};
use log::{debug, info};

use crate::{
    column_type::TypeValidator,
    model::{ImportStep, StepKind},
    storage::Storage,
    tasks::CancelFlag,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationSummary {
    /// Rows checked.
    pub rows: usize,
    /// Rows whose flags were written; rows edited mid-pass are skipped.
    pub saved: usize,
    pub cells: usize,
    pub invalid_cells: usize,
    /// Size of every non-empty block fetched, in order.
    pub blocks: Vec<usize>,
    /// Fetches issued, including the empty one that ends the pass.
    pub fetches: usize,
}

/// Checks every cell of every active row in blocks of `block_size` and
/// persists the `checked`/`valid` flags. Values are never rewritten here;
/// corrections only happen through cell edits.
pub fn validate_table<S>(
    store: &S,
    table_id: u64,
    block_size: usize,
    cancel: &CancelFlag,
) -> Result<ValidationSummary>
where
    S: Storage + ?Sized,
{
    let block_size = block_size.max(1);
    let mut step = ImportStep::started(table_id, StepKind::Validation);
    store.save_step(&step)?;

    let columns = store.get_columns_by_table(table_id)?;
    let validator = TypeValidator::new(store.column_types_for_table(table_id)?)
        .with_context(|| format!("Compiling column types of table {table_id}"))?;
    let total_rows = store.get_table(table_id)?.import.rows;
    info!(
        "Validating table {table_id}: {} column(s), block size {block_size}",
        columns.len()
    );

    let mut summary = ValidationSummary::default();
    let mut offset = 0usize;
    loop {
        cancel.check()?;
        let mut rows = store.get_validation(offset, block_size, table_id)?;
        summary.fetches += 1;
        if rows.is_empty() {
            break;
        }
        for row in rows.iter_mut() {
            let mut cells = row.cells(&columns);
            for (cell, column) in cells.iter_mut().zip(&columns) {
                let (column_type, compiled) = validator.resolve(column.column_type_id)?;
                let verdict = store
                    .validate(column_type, compiled, &cell.value)
                    .with_context(|| format!("Validating row {} column {}", row.id, column.name))?;
                cell.checked = true;
                cell.valid = verdict.valid;
                summary.cells += 1;
                if !verdict.valid {
                    summary.invalid_cells += 1;
                }
            }
            row.set_cells(&cells);
        }
        summary.saved += store.save_validation(&rows)?;
        summary.rows += rows.len();
        summary.blocks.push(rows.len());
        offset += rows.len();

        if total_rows > 0 {
            step.percentage = ((summary.rows * 100) / total_rows).min(99) as u8;
            store.save_step(&step)?;
        }
        debug!(
            "Validated block {} of table {table_id} ({} row(s) so far)",
            summary.blocks.len(),
            summary.rows
        );
    }

    step.complete();
    store.save_step(&step)?;
    info!(
        "Validated {} row(s) of table {table_id}: {} of {} cell(s) invalid",
        summary.rows, summary.invalid_cells, summary.cells
    );
    Ok(summary)
}
