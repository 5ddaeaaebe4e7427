//! Storage collaborator interfaces.
//!
//! The engine never talks to a database directly; it goes through these
//! traits. [`MemoryStore`] implements all of them and backs the CLI and the
//! tests.

pub mod memory;

use std::{collections::HashMap, path::Path};

use regex::Regex;

use crate::{
    column_type::{self, Verdict},
    error::{ConfigError, StorageResult},
    format::Format,
    model::{ColumnType, CustomerTable, ImportStep, TableColumn, TableRow, TableRowView},
    query::RowQuery,
};

pub use memory::MemoryStore;

/// A normalized, versioned data file ready for bulk loading. Each record holds
/// the table's fields followed by the `position` and `wrong` columns.
#[derive(Debug, Clone, Copy)]
pub struct BulkLoad<'a> {
    pub file: &'a Path,
    pub table_id: u64,
    pub format: Format,
    pub has_header: bool,
    pub columns: &'a [TableColumn],
    pub version: &'a str,
}

/// Destination of a bulk export.
#[derive(Debug, Clone, Copy)]
pub struct BulkExport<'a> {
    pub file: &'a Path,
    pub table_id: u64,
    pub format: Format,
    pub with_header: bool,
    pub columns: &'a [TableColumn],
    pub query: &'a RowQuery,
    pub version: &'a str,
}

pub trait TableStore: Send + Sync {
    fn create_table(&self, table: CustomerTable) -> StorageResult<CustomerTable>;
    fn get_table(&self, id: u64) -> StorageResult<CustomerTable>;
    fn update_table(&self, table: &CustomerTable) -> StorageResult<()>;

    /// Stores a new column set for a table. With `replace_existing`, every
    /// active non-prebuilt column is superseded in the same operation.
    fn import_data_structure(
        &self,
        table_id: u64,
        columns: Vec<TableColumn>,
        replace_existing: bool,
    ) -> StorageResult<Vec<TableColumn>>;

    /// Loads a normalized data file, retiring the table's previous rows.
    /// Returns the number of rows loaded.
    fn import_data(&self, load: &BulkLoad<'_>) -> StorageResult<usize>;

    /// Writes the table's matching rows to `export.file`. Returns the row count.
    fn export_data(&self, export: &BulkExport<'_>) -> StorageResult<usize>;
}

pub trait ColumnStore: Send + Sync {
    /// Active columns of a table ordered by position.
    fn get_columns_by_table(&self, table_id: u64) -> StorageResult<Vec<TableColumn>>;
    fn get_column(&self, id: u64) -> StorageResult<TableColumn>;
}

pub trait RowStore: Send + Sync {
    fn get_row(&self, id: u64) -> StorageResult<TableRow>;

    /// Replaces the live row with `new_row` and inserts `old_row` as its
    /// retired copy, atomically. Fails with a conflict when the stored row is
    /// no longer at `old_row`'s edition or is no longer active.
    fn update_row(&self, new_row: TableRow, old_row: TableRow) -> StorageResult<TableRow>;

    /// One block of active rows in position order.
    fn get_validation(&self, offset: usize, count: usize, table_id: u64)
    -> StorageResult<Vec<TableRow>>;

    /// Persists cell validity flags. Returns how many rows were written; rows
    /// edited since they were fetched are skipped.
    fn save_validation(&self, rows: &[TableRow]) -> StorageResult<usize>;

    fn get_all(
        &self,
        query: &RowQuery,
        table_id: u64,
        columns: &[TableColumn],
    ) -> StorageResult<Vec<TableRowView>>;

    /// Every edition of a row: the live record and its retired copies.
    fn lineage(&self, row_id: u64) -> StorageResult<Vec<TableRow>>;
}

pub trait ColumnTypeStore: Send + Sync {
    fn get_column_type(&self, id: u64) -> StorageResult<ColumnType>;

    /// Column types referenced by a table's active columns.
    fn column_types_for_table(&self, table_id: u64) -> StorageResult<HashMap<u64, ColumnType>>;

    fn validate(
        &self,
        column_type: &ColumnType,
        compiled: Option<&Regex>,
        value: &str,
    ) -> Result<Verdict, ConfigError> {
        column_type::validate(column_type, compiled, value)
    }
}

pub trait StepStore: Send + Sync {
    fn save_step(&self, step: &ImportStep) -> StorageResult<()>;
    fn steps(&self, table_id: u64) -> StorageResult<Vec<ImportStep>>;
}

/// Everything the engine needs from a backend.
pub trait Storage: TableStore + ColumnStore + RowStore + ColumnTypeStore + StepStore {}

impl<T> Storage for T where T: TableStore + ColumnStore + RowStore + ColumnTypeStore + StepStore {}
