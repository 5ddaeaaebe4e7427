//! Table export through a versioned staging file.

use std::path::Path;

use anyhow::{Context, Result, bail};
use log::info;

use crate::{
    config::EngineConfig,
    format::Format,
    io_utils::{self, StagingFile},
    query::{FieldMap, RowQuery},
    storage::{BulkExport, Storage},
};

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub format: Format,
    pub with_header: bool,
    pub order: String,
    pub filter: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: Format::Csv,
            with_header: true,
            order: String::new(),
            filter: String::new(),
        }
    }
}

/// Writes every active row matching `options` to `destination` and records
/// the outcome in the table's export counters. Returns the row count.
pub fn export_table<S>(
    store: &S,
    config: &EngineConfig,
    table_id: u64,
    options: &ExportOptions,
    destination: &Path,
) -> Result<usize>
where
    S: Storage + ?Sized,
{
    if options.format == Format::Unknown {
        bail!("Export format must be txt, csv or ssv");
    }
    let mut table = store.get_table(table_id)?;
    let columns = store.get_columns_by_table(table_id)?;
    let fields = FieldMap::for_table_rows(&columns);
    let query = RowQuery::parse("", &options.order, &options.filter, &fields)?.unbounded();

    table.export = Default::default();
    store.update_table(&table)?;

    let version = io_utils::version_suffix();
    let staged = StagingFile::new(
        &config.staging_dir,
        &format!("export_{table_id}"),
        &version,
        options.format.extension(),
    )?;
    let exported = store
        .export_data(&BulkExport {
            file: staged.path(),
            table_id,
            format: options.format,
            with_header: options.with_header,
            columns: &columns,
            query: &query,
            version: &version,
        })
        .with_context(|| format!("Exporting table {table_id}"))
        .and_then(|rows| staged.persist(destination).map(|_| rows));

    match exported {
        Ok(rows) => {
            table.export.rows = rows;
            table.export.percentage = 100;
            store.update_table(&table)?;
            info!("Exported {rows} row(s) of table {table_id} to {destination:?}");
            Ok(rows)
        }
        Err(err) => {
            table.export.error = true;
            table.export.error_description = format!("{err:#}");
            store.update_table(&table)?;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::{
        column_type::builtin_catalog,
        model::{CustomerTable, StoredCell, TableKind, TableRow},
        schema::infer_schema,
        storage::{MemoryStore, TableStore},
    };

    #[test]
    fn export_filters_sorts_and_counts() {
        let dir = tempdir().unwrap();
        let config = EngineConfig {
            staging_dir: dir.path().join("staging"),
            ..Default::default()
        };
        let store = MemoryStore::with_column_types(builtin_catalog());
        let table = store
            .create_table(CustomerTable::staging(1, "items", TableKind::Default))
            .unwrap();
        let header = vec!["item".to_string(), "qty".to_string()];
        let columns = infer_schema(&header, true)
            .unwrap()
            .into_iter()
            .map(|d| d.into_table_column(table.id))
            .collect();
        store.import_data_structure(table.id, columns, true).unwrap();
        let rows = [("nut", "5"), ("bolt", "12"), ("gear", "1")]
            .iter()
            .enumerate()
            .map(|(position, (item, qty))| {
                let mut row = TableRow::new(table.id, position, false);
                row.cells.insert(1, StoredCell { value: item.to_string(), ..Default::default() });
                row.cells.insert(2, StoredCell { value: qty.to_string(), ..Default::default() });
                row
            })
            .collect();
        store.insert_rows(table.id, rows).unwrap();

        let destination = dir.path().join("items.ssv");
        let options = ExportOptions {
            format: Format::Ssv,
            order: "qty:desc".into(),
            filter: "item:ne:gear".into(),
            ..Default::default()
        };
        let exported = export_table(&store, &config, table.id, &options, &destination).unwrap();
        assert_eq!(exported, 2);
        assert_eq!(fs::read_to_string(&destination).unwrap(), "item;qty\nbolt;12\nnut;5\n");

        let table = store.get_table(table.id).unwrap();
        assert_eq!(table.export.rows, 2);
        assert_eq!(table.export.percentage, 100);
        assert_eq!(fs::read_dir(dir.path().join("staging")).unwrap().count(), 0);
    }
}
