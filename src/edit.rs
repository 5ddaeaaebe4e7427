//! Versioned single-cell edits.
//!
//! An edit never mutates history. The live row keeps its id and moves to the
//! next edition with the new cell value; a retired copy of the previous
//! edition is inserted alongside it with `active = false` and `original_id`
//! pointing back at the live row. Both writes happen in one
//! [`RowStore::update_row`](crate::storage::RowStore::update_row) call, which
//! rejects the edit if someone else moved the row on in the meantime.

use anyhow::{Result, bail};
use chrono::Utc;
use log::info;

use crate::{
    error::StorageError,
    model::{TableCell, TableRow},
    storage::Storage,
};

/// Sets one cell to `value`, validating it against the column's type.
///
/// The stored value is the type's corrected form when the value is valid and
/// the raw input otherwise; the cell is marked checked either way. Returns the
/// cell as stored.
pub fn edit_cell<S>(store: &S, row_id: u64, column_id: u64, value: &str) -> Result<TableCell>
where
    S: Storage + ?Sized,
{
    let row = store.get_row(row_id)?;
    if !row.active {
        return Err(StorageError::Inactive {
            entity: "Row",
            id: row_id,
        }
        .into());
    }
    let column = store.get_column(column_id)?;
    if column.customer_table_id != row.customer_table_id {
        bail!(
            "Column {column_id} does not belong to table {}",
            row.customer_table_id
        );
    }
    if !column.active {
        return Err(StorageError::Inactive {
            entity: "Column",
            id: column_id,
        }
        .into());
    }
    let columns = store.get_columns_by_table(row.customer_table_id)?;
    let column_type = store.get_column_type(column.column_type_id)?;
    let verdict = store.validate(&column_type, None, value)?;

    let mut cells = row.cells(&columns);
    let Some(cell) = cells.iter_mut().find(|cell| cell.column_id == column_id) else {
        bail!("Column {column_id} is not part of row {row_id}");
    };
    cell.value = if verdict.valid {
        verdict.corrected
    } else {
        value.to_string()
    };
    cell.checked = true;
    cell.valid = verdict.valid;
    let edited = cell.clone();

    let (next, retired) = next_edition(&row, &cells);
    store.update_row(next, retired)?;
    info!(
        "Row {row_id} column {column_id} set to {:?} (edition {}, valid: {})",
        edited.value,
        row.edition + 1,
        edited.valid
    );
    Ok(edited)
}

/// The live row's next edition carrying `cells`, and the retired copy of the
/// current one.
fn next_edition(current: &TableRow, cells: &[TableCell]) -> (TableRow, TableRow) {
    let mut next = current.clone();
    next.set_cells(cells);
    next.edition = current.edition + 1;
    next.active = true;
    next.created = Utc::now();

    let mut retired = current.clone();
    retired.id = 0;
    retired.active = false;
    retired.original_id = current.id;
    (next, retired)
}
