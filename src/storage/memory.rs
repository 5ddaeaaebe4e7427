//! Mutex-guarded in-memory backend with JSON snapshots.

use std::{
    borrow::Cow,
    collections::{BTreeMap, HashMap},
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use anyhow::{Context, Result};
use encoding_rs::UTF_8;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::{StorageError, StorageResult},
    io_utils,
    model::{
        ColumnType, CustomerTable, ImportStep, StoredCell, TableColumn, TableRow, TableRowView,
    },
    query::{RowQuery, eval, fields::column_field},
    storage::{
        BulkExport, BulkLoad, ColumnStore, ColumnTypeStore, RowStore, StepStore, TableStore,
    },
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    next_id: u64,
    tables: BTreeMap<u64, CustomerTable>,
    columns: BTreeMap<u64, TableColumn>,
    rows: BTreeMap<u64, TableRow>,
    column_types: BTreeMap<u64, ColumnType>,
    steps: Vec<ImportStep>,
}

impl State {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn table(&self, id: u64) -> StorageResult<&CustomerTable> {
        self.tables
            .get(&id)
            .ok_or(StorageError::NotFound { entity: "Table", id })
    }

    fn active_columns(&self, table_id: u64) -> Vec<TableColumn> {
        let mut columns = self
            .columns
            .values()
            .filter(|c| c.customer_table_id == table_id && c.active)
            .cloned()
            .collect::<Vec<_>>();
        columns.sort_by_key(|c| (c.position, c.id));
        columns
    }

    fn active_rows(&self, table_id: u64) -> Vec<&TableRow> {
        let mut rows = self
            .rows
            .values()
            .filter(|r| r.customer_table_id == table_id && r.active)
            .collect::<Vec<_>>();
        rows.sort_by_key(|r| (r.position, r.id));
        rows
    }

    fn select(
        &self,
        query: &RowQuery,
        table_id: u64,
        columns: &[TableColumn],
    ) -> StorageResult<Vec<TableRowView>> {
        self.table(table_id)?;
        let slots = columns
            .iter()
            .map(|c| (column_field(c.field_num), c.field_num))
            .collect::<HashMap<_, _>>();
        let mut matched = self
            .active_rows(table_id)
            .into_iter()
            .map(|row| RowFields { row, slots: &slots })
            .filter(|fields| eval::matches_all(&query.filter, fields))
            .collect::<Vec<_>>();
        if !query.order.is_empty() {
            matched.sort_by(|a, b| eval::compare(&query.order, a, b));
        }
        let offset = usize::try_from(query.limit.offset).unwrap_or(usize::MAX);
        let count = query
            .limit
            .count
            .map(|c| usize::try_from(c).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .skip(offset)
            .take(count)
            .map(|fields| TableRowView::from_row(fields.row, columns))
            .collect())
    }
}

struct RowFields<'a> {
    row: &'a TableRow,
    slots: &'a HashMap<String, u8>,
}

impl eval::FieldSource for RowFields<'_> {
    fn field_value(&self, internal: &str) -> Option<Cow<'_, str>> {
        match internal {
            "id" => Some(Cow::Owned(self.row.id.to_string())),
            "position" => Some(Cow::Owned(self.row.position.to_string())),
            "wrong" => Some(Cow::Borrowed(if self.row.wrong { "true" } else { "false" })),
            "edition" => Some(Cow::Owned(self.row.edition.to_string())),
            slot => self
                .slots
                .get(slot)
                .map(|field_num| Cow::Borrowed(self.row.value(*field_num))),
        }
    }
}

/// Parses one normalized record: table fields, then position and wrong flag.
fn parse_loaded_row(
    record: &[String],
    table_id: u64,
    columns: &[TableColumn],
) -> StorageResult<TableRow> {
    let invalid = |what: &str| {
        StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Malformed bulk-load record: {what}"),
        ))
    };
    if record.len() != columns.len() + 2 {
        return Err(invalid("unexpected field count"));
    }
    let position = record[columns.len()]
        .parse::<usize>()
        .map_err(|_| invalid("bad position"))?;
    let wrong = match record[columns.len() + 1].as_str() {
        "1" => true,
        "0" => false,
        _ => return Err(invalid("bad wrong flag")),
    };
    let mut row = TableRow::new(table_id, position, wrong);
    for (column, value) in columns.iter().zip(record) {
        row.cells.insert(
            column.field_num,
            StoredCell {
                value: value.clone(),
                checked: false,
                valid: false,
            },
        );
    }
    Ok(row)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column_types<I>(types: I) -> Self
    where
        I: IntoIterator<Item = ColumnType>,
    {
        let store = Self::new();
        store.put_column_types(types);
        store
    }

    /// Adds or replaces column type definitions.
    pub fn put_column_types<I>(&self, types: I)
    where
        I: IntoIterator<Item = ColumnType>,
    {
        let mut state = self.lock();
        for column_type in types {
            state.column_types.insert(column_type.id, column_type);
        }
    }

    pub fn column_types(&self) -> Vec<ColumnType> {
        self.lock().column_types.values().cloned().collect()
    }

    pub fn tables(&self) -> Vec<CustomerTable> {
        self.lock().tables.values().cloned().collect()
    }

    /// Assigns a column type by superseding the column with a new edition.
    pub fn set_column_type(&self, column_id: u64, column_type_id: u64) -> StorageResult<TableColumn> {
        let mut state = self.lock();
        if !state.column_types.contains_key(&column_type_id) {
            return Err(StorageError::NotFound {
                entity: "Column type",
                id: column_type_id,
            });
        }
        let current = state.columns.get_mut(&column_id).ok_or(StorageError::NotFound {
            entity: "Column",
            id: column_id,
        })?;
        if !current.active {
            return Err(StorageError::Inactive {
                entity: "Column",
                id: column_id,
            });
        }
        current.active = false;
        let mut next = current.clone();
        next.id = state.allocate_id();
        next.column_type_id = column_type_id;
        next.edition += 1;
        next.original_id = column_id;
        next.active = true;
        next.created = chrono::Utc::now();
        state.columns.insert(next.id, next.clone());
        Ok(next)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening workspace {path:?}"))?;
        let state: State = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing workspace {path:?}"))?;
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// Loads `path` when it exists, otherwise starts empty.
    pub fn open(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating workspace {path:?}"))?;
        let state = self.lock();
        serde_json::to_writer(BufWriter::new(file), &*state)
            .with_context(|| format!("Writing workspace {path:?}"))
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TableStore for MemoryStore {
    fn create_table(&self, mut table: CustomerTable) -> StorageResult<CustomerTable> {
        let mut state = self.lock();
        table.id = state.allocate_id();
        state.tables.insert(table.id, table.clone());
        Ok(table)
    }

    fn get_table(&self, id: u64) -> StorageResult<CustomerTable> {
        self.lock().table(id).cloned()
    }

    fn update_table(&self, table: &CustomerTable) -> StorageResult<()> {
        let mut state = self.lock();
        let stored = state.tables.get_mut(&table.id).ok_or(StorageError::NotFound {
            entity: "Table",
            id: table.id,
        })?;
        *stored = table.clone();
        Ok(())
    }

    fn import_data_structure(
        &self,
        table_id: u64,
        columns: Vec<TableColumn>,
        replace_existing: bool,
    ) -> StorageResult<Vec<TableColumn>> {
        let mut state = self.lock();
        state.table(table_id)?;
        let mut superseded = HashMap::new();
        if replace_existing {
            for column in state.columns.values_mut() {
                if column.customer_table_id == table_id && column.active && !column.prebuilt {
                    column.active = false;
                    superseded.insert(column.field_num, (column.id, column.edition));
                }
            }
        }
        let mut stored = Vec::with_capacity(columns.len());
        for mut column in columns {
            column.id = state.allocate_id();
            column.customer_table_id = table_id;
            if let Some((original_id, edition)) = superseded.get(&column.field_num) {
                column.original_id = *original_id;
                column.edition = edition + 1;
            }
            state.columns.insert(column.id, column.clone());
            stored.push(column);
        }
        Ok(stored)
    }

    fn import_data(&self, load: &BulkLoad<'_>) -> StorageResult<usize> {
        let delimiter = load.format.delimiter().unwrap_or(b',');
        let mut reader =
            io_utils::open_csv_reader(File::open(load.file)?, delimiter, load.has_header, false);
        let mut rows = Vec::new();
        for record in reader.byte_records() {
            let decoded = io_utils::decode_record(&record?, UTF_8).map_err(|err| {
                StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    err.to_string(),
                ))
            })?;
            rows.push(parse_loaded_row(&decoded, load.table_id, load.columns)?);
        }

        let mut state = self.lock();
        state.table(load.table_id)?;
        for row in state.rows.values_mut() {
            if row.customer_table_id == load.table_id && row.active {
                row.active = false;
            }
        }
        let loaded = rows.len();
        for mut row in rows {
            row.id = state.allocate_id();
            state.rows.insert(row.id, row);
        }
        debug!(
            "Bulk-loaded {loaded} row(s) into table {} from version {}",
            load.table_id, load.version
        );
        Ok(loaded)
    }

    fn export_data(&self, export: &BulkExport<'_>) -> StorageResult<usize> {
        let rows = self
            .lock()
            .select(export.query, export.table_id, export.columns)?;
        let delimiter = export.format.delimiter().unwrap_or(b',');
        let mut writer = io_utils::csv_writer(BufWriter::new(File::create(export.file)?), delimiter);
        if export.with_header {
            writer.write_record(export.columns.iter().map(|c| c.name.as_str()))?;
        }
        for row in &rows {
            writer.write_record(row.cells.iter().map(|cell| cell.value.as_str()))?;
        }
        writer.flush()?;
        debug!(
            "Exported {} row(s) of table {} as version {}",
            rows.len(),
            export.table_id,
            export.version
        );
        Ok(rows.len())
    }
}

impl ColumnStore for MemoryStore {
    fn get_columns_by_table(&self, table_id: u64) -> StorageResult<Vec<TableColumn>> {
        let state = self.lock();
        state.table(table_id)?;
        Ok(state.active_columns(table_id))
    }

    fn get_column(&self, id: u64) -> StorageResult<TableColumn> {
        self.lock()
            .columns
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound { entity: "Column", id })
    }
}

impl RowStore for MemoryStore {
    fn get_row(&self, id: u64) -> StorageResult<TableRow> {
        self.lock()
            .rows
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound { entity: "Row", id })
    }

    fn update_row(&self, new_row: TableRow, mut old_row: TableRow) -> StorageResult<TableRow> {
        let mut state = self.lock();
        let stored = state.rows.get(&new_row.id).ok_or(StorageError::NotFound {
            entity: "Row",
            id: new_row.id,
        })?;
        if !stored.active || stored.edition != old_row.edition {
            return Err(StorageError::Conflict { row_id: new_row.id });
        }
        if old_row.id == 0 {
            old_row.id = state.allocate_id();
        }
        old_row.active = false;
        old_row.original_id = new_row.id;
        state.rows.insert(old_row.id, old_row);
        state.rows.insert(new_row.id, new_row.clone());
        Ok(new_row)
    }

    fn get_validation(
        &self,
        offset: usize,
        count: usize,
        table_id: u64,
    ) -> StorageResult<Vec<TableRow>> {
        let state = self.lock();
        state.table(table_id)?;
        Ok(state
            .active_rows(table_id)
            .into_iter()
            .skip(offset)
            .take(count)
            .cloned()
            .collect())
    }

    fn save_validation(&self, rows: &[TableRow]) -> StorageResult<usize> {
        let mut state = self.lock();
        let mut saved = 0usize;
        for row in rows {
            match state.rows.get_mut(&row.id) {
                Some(stored) if stored.active && stored.edition == row.edition => {
                    stored.cells = row.cells.clone();
                    saved += 1;
                }
                Some(_) => debug!("Skipping validation of row {} edited meanwhile", row.id),
                None => {
                    return Err(StorageError::NotFound {
                        entity: "Row",
                        id: row.id,
                    });
                }
            }
        }
        Ok(saved)
    }

    fn get_all(
        &self,
        query: &RowQuery,
        table_id: u64,
        columns: &[TableColumn],
    ) -> StorageResult<Vec<TableRowView>> {
        self.lock().select(query, table_id, columns)
    }

    fn lineage(&self, row_id: u64) -> StorageResult<Vec<TableRow>> {
        let state = self.lock();
        let live_id = match state.rows.get(&row_id) {
            Some(row) if row.original_id != 0 => row.original_id,
            Some(_) => row_id,
            None => {
                return Err(StorageError::NotFound {
                    entity: "Row",
                    id: row_id,
                });
            }
        };
        let mut rows = state
            .rows
            .values()
            .filter(|r| r.id == live_id || r.original_id == live_id)
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by_key(|r| r.edition);
        Ok(rows)
    }
}

impl ColumnTypeStore for MemoryStore {
    fn get_column_type(&self, id: u64) -> StorageResult<ColumnType> {
        self.lock()
            .column_types
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound {
                entity: "Column type",
                id,
            })
    }

    fn column_types_for_table(&self, table_id: u64) -> StorageResult<HashMap<u64, ColumnType>> {
        let state = self.lock();
        state.table(table_id)?;
        let mut types = HashMap::new();
        for column in state.active_columns(table_id) {
            let column_type = state.column_types.get(&column.column_type_id).ok_or(
                StorageError::NotFound {
                    entity: "Column type",
                    id: column.column_type_id,
                },
            )?;
            types.insert(column_type.id, column_type.clone());
        }
        Ok(types)
    }
}

impl StepStore for MemoryStore {
    fn save_step(&self, step: &ImportStep) -> StorageResult<()> {
        let mut state = self.lock();
        match state
            .steps
            .iter_mut()
            .find(|s| s.customer_table_id == step.customer_table_id && s.step == step.step)
        {
            Some(existing) => *existing = step.clone(),
            None => state.steps.push(step.clone()),
        }
        Ok(())
    }

    fn steps(&self, table_id: u64) -> StorageResult<Vec<ImportStep>> {
        let mut steps = self
            .lock()
            .steps
            .iter()
            .filter(|s| s.customer_table_id == table_id)
            .cloned()
            .collect::<Vec<_>>();
        steps.sort_by_key(|s| s.step);
        Ok(steps)
    }
}

/// Loads table rows straight from in-memory records; used by tests and
/// tooling that seed a store without going through the import pipeline.
impl MemoryStore {
    pub fn insert_rows(&self, table_id: u64, rows: Vec<TableRow>) -> StorageResult<Vec<u64>> {
        let mut state = self.lock();
        state.table(table_id)?;
        let mut ids = Vec::with_capacity(rows.len());
        for mut row in rows {
            row.id = state.allocate_id();
            row.customer_table_id = table_id;
            ids.push(row.id);
            state.rows.insert(row.id, row);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        column_type::builtin_catalog,
        model::TableKind,
        query::FieldMap,
        schema::infer_schema,
    };

    fn seeded() -> (MemoryStore, u64, Vec<TableColumn>) {
        let store = MemoryStore::with_column_types(builtin_catalog());
        let table = store
            .create_table(CustomerTable::staging(1, "people", TableKind::Default))
            .unwrap();
        let header = vec!["name".to_string(), "age".to_string()];
        let columns = infer_schema(&header, true)
            .unwrap()
            .into_iter()
            .map(|d| d.into_table_column(table.id))
            .collect();
        let columns = store.import_data_structure(table.id, columns, true).unwrap();
        (store, table.id, columns)
    }

    fn row(columns: &[TableColumn], position: usize, values: &[&str]) -> TableRow {
        let mut row = TableRow::new(0, position, false);
        for (column, value) in columns.iter().zip(values) {
            row.cells.insert(
                column.field_num,
                StoredCell {
                    value: value.to_string(),
                    ..Default::default()
                },
            );
        }
        row
    }

    #[test]
    fn replacing_structure_supersedes_columns() {
        let (store, table_id, first) = seeded();
        let header = vec!["name".to_string(), "age".to_string(), "city".to_string()];
        let columns = infer_schema(&header, true)
            .unwrap()
            .into_iter()
            .map(|d| d.into_table_column(table_id))
            .collect();
        let second = store.import_data_structure(table_id, columns, true).unwrap();
        let active = store.get_columns_by_table(table_id).unwrap();
        assert_eq!(active, second);
        assert_eq!(second[0].original_id, first[0].id);
        assert_eq!(second[0].edition, 2);
        assert_eq!(second[2].original_id, 0);
        assert!(!store.get_column(first[0].id).unwrap().active);
    }

    #[test]
    fn get_all_filters_sorts_and_pages() {
        let (store, table_id, columns) = seeded();
        store
            .insert_rows(
                table_id,
                vec![
                    row(&columns, 0, &["ann", "30"]),
                    row(&columns, 1, &["bob", "9"]),
                    row(&columns, 2, &["anna", "41"]),
                ],
            )
            .unwrap();
        let fields = FieldMap::for_table_rows(&columns);
        let query = RowQuery::parse("0:10", "age:desc", "name:lk:ann*", &fields).unwrap();
        let rows = store.get_all(&query, table_id, &columns).unwrap();
        let names = rows.iter().map(|r| r.cells[0].value.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["anna", "ann"]);

        let paged = RowQuery::parse("1:1", "position:asc", "", &fields).unwrap();
        let rows = store.get_all(&paged, table_id, &columns).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].position, 1);
    }

    #[test]
    fn stale_versioned_update_conflicts() {
        let (store, table_id, columns) = seeded();
        let ids = store
            .insert_rows(table_id, vec![row(&columns, 0, &["ann", "30"])])
            .unwrap();
        let base = store.get_row(ids[0]).unwrap();

        let mut first = base.clone();
        first.edition += 1;
        let mut retired = base.clone();
        retired.id = 0;
        store.update_row(first, retired.clone()).unwrap();

        let mut second = base.clone();
        second.edition += 1;
        assert!(matches!(
            store.update_row(second, retired),
            Err(StorageError::Conflict { .. })
        ));
        let lineage = store.lineage(ids[0]).unwrap();
        assert_eq!(lineage.len(), 2);
        assert_eq!(lineage.iter().filter(|r| r.active).count(), 1);
    }

    #[test]
    fn lineage_from_retired_copy_covers_every_edition() {
        let (store, table_id, columns) = seeded();
        let ids = store
            .insert_rows(table_id, vec![row(&columns, 0, &["ann", "30"])])
            .unwrap();
        for _ in 0..2 {
            let base = store.get_row(ids[0]).unwrap();
            let mut next = base.clone();
            next.edition += 1;
            let mut retired = base;
            retired.id = 0;
            store.update_row(next, retired).unwrap();
        }

        let retired_id = store
            .lineage(ids[0])
            .unwrap()
            .into_iter()
            .find(|r| !r.active)
            .unwrap()
            .id;
        let lineage = store.lineage(retired_id).unwrap();
        assert_eq!(lineage.len(), 3);
        assert_eq!(lineage.iter().map(|r| r.edition).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn snapshot_round_trips() {
        let (store, table_id, _) = seeded();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workspace.json");
        store.save(&path).unwrap();
        let restored = MemoryStore::load(&path).unwrap();
        assert_eq!(
            restored.get_columns_by_table(table_id).unwrap(),
            store.get_columns_by_table(table_id).unwrap()
        );
        assert_eq!(restored.column_types().len(), builtin_catalog().len());
    }
}
