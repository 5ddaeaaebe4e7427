//! Entities of the customer-table engine.
//!
//! A [`CustomerTable`] owns a versioned set of [`TableColumn`]s and
//! [`TableRow`]s. Rows keep their cells as a sparse map keyed by the column's
//! field slot (`field_num`), so a new column edition keeps addressing the same
//! data; [`TableCell`] is the materialized view of one of those entries against
//! the table's current column set. Both columns and rows are versioned with an
//! edition counter and an `original_id` back-reference, and readers only ever
//! look at records whose `active` flag is set.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Id of the unconstrained column type assigned to freshly imported columns.
pub const DEFAULT_COLUMN_TYPE_ID: u64 = 1;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

/// Domain-specific parser applied after the regex check.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValueParser {
    #[default]
    None,
    Phone,
    Price,
    Range,
}

/// A reusable validation rule assignable to table columns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnType {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub regexp: String,
    #[serde(default)]
    pub align_head: Alignment,
    #[serde(default)]
    pub align_body: Alignment,
    #[serde(default)]
    pub parser: ValueParser,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl ColumnType {
    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_COLUMN_TYPE_ID
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableColumn {
    pub id: u64,
    pub customer_table_id: u64,
    pub name: String,
    pub column_type_id: u64,
    pub position: usize,
    pub field_num: u8,
    pub prebuilt: bool,
    pub edition: u32,
    pub original_id: u64,
    pub active: bool,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    #[default]
    Default,
    PriceList,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportProgress {
    pub percentage: u8,
    pub columns: usize,
    pub rows: usize,
    pub wrong_rows: usize,
    pub error: bool,
    pub error_description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportProgress {
    pub percentage: u8,
    pub rows: usize,
    pub error: bool,
    pub error_description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerTable {
    pub id: u64,
    pub unit_id: u64,
    pub name: String,
    pub kind: TableKind,
    pub permanent: bool,
    pub active: bool,
    pub created: DateTime<Utc>,
    pub import: ImportProgress,
    pub export: ExportProgress,
}

impl CustomerTable {
    /// A staging table: not permanent until its import completes.
    pub fn staging(unit_id: u64, name: impl Into<String>, kind: TableKind) -> Self {
        Self {
            id: 0,
            unit_id,
            name: name.into(),
            kind,
            permanent: false,
            active: true,
            created: Utc::now(),
            import: ImportProgress::default(),
            export: ExportProgress::default(),
        }
    }

    pub fn fail_import(&mut self, description: impl Into<String>) {
        self.import.error = true;
        self.import.error_description = description.into();
    }
}

/// Stored state of one cell inside a row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredCell {
    pub value: String,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableRow {
    pub id: u64,
    pub customer_table_id: u64,
    pub position: usize,
    pub wrong: bool,
    pub edition: u32,
    pub original_id: u64,
    pub active: bool,
    pub created: DateTime<Utc>,
    pub cells: BTreeMap<u8, StoredCell>,
}

impl TableRow {
    pub fn new(customer_table_id: u64, position: usize, wrong: bool) -> Self {
        Self {
            id: 0,
            customer_table_id,
            position,
            wrong,
            edition: 1,
            original_id: 0,
            active: true,
            created: Utc::now(),
            cells: BTreeMap::new(),
        }
    }

    pub fn value(&self, field_num: u8) -> &str {
        self.cells
            .get(&field_num)
            .map(|cell| cell.value.as_str())
            .unwrap_or("")
    }

    /// Materializes one cell per column, in column order. Columns the row has
    /// never stored a value for come back empty and unchecked.
    pub fn cells(&self, columns: &[TableColumn]) -> Vec<TableCell> {
        columns
            .iter()
            .map(|column| {
                let stored = self.cells.get(&column.field_num).cloned().unwrap_or_default();
                TableCell {
                    column_id: column.id,
                    field_num: column.field_num,
                    value: stored.value,
                    checked: stored.checked,
                    valid: stored.valid,
                }
            })
            .collect()
    }

    pub fn set_cells(&mut self, cells: &[TableCell]) {
        for cell in cells {
            self.cells.insert(
                cell.field_num,
                StoredCell {
                    value: cell.value.clone(),
                    checked: cell.checked,
                    valid: cell.valid,
                },
            );
        }
    }
}

/// A row cell materialized against its column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableCell {
    pub column_id: u64,
    pub field_num: u8,
    pub value: String,
    pub checked: bool,
    pub valid: bool,
}

/// Row projection returned by list queries: metadata plus one value per column.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TableRowView {
    pub id: u64,
    pub position: usize,
    pub wrong: bool,
    pub edition: u32,
    pub cells: Vec<TableCell>,
}

impl TableRowView {
    pub fn from_row(row: &TableRow, columns: &[TableColumn]) -> Self {
        Self {
            id: row.id,
            position: row.position,
            wrong: row.wrong,
            edition: row.edition,
            cells: row.cells(columns),
        }
    }

    pub fn values(&self) -> Vec<String> {
        self.cells.iter().map(|cell| cell.value.clone()).collect()
    }
}

/// Numbered stages of the import/validation pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Analysis,
    WriteBack,
    Validation,
}

impl StepKind {
    pub fn number(self) -> u8 {
        match self {
            StepKind::Analysis => 2,
            StepKind::WriteBack => 3,
            StepKind::Validation => 5,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            StepKind::Analysis => "structure analysis",
            StepKind::WriteBack => "data write-back",
            StepKind::Validation => "cell validation",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({})", self.number(), self.describe())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportStep {
    pub customer_table_id: u64,
    pub step: StepKind,
    pub ready: bool,
    pub percentage: u8,
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
}

impl ImportStep {
    pub fn started(customer_table_id: u64, step: StepKind) -> Self {
        Self {
            customer_table_id,
            step,
            ready: false,
            percentage: 0,
            started: Some(Utc::now()),
            completed: None,
        }
    }

    pub fn complete(&mut self) {
        self.ready = true;
        self.percentage = 100;
        self.completed = Some(Utc::now());
    }
}
