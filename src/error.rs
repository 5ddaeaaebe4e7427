//! Typed error kinds raised by the tabular engine.
//!
//! Orchestration code (import pipeline, validation pass, cell edits, CLI) wraps
//! these in `anyhow::Error` with context; callers that need to distinguish a
//! client fault from a configuration or storage fault can `downcast_ref` back
//! to the concrete kind.

use thiserror::Error;

/// Schema configuration problems. Fatal to whatever operation hit them.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Column type {id} ('{name}') has an invalid regular expression: {source}")]
    InvalidRegex {
        id: u64,
        name: String,
        #[source]
        source: regex::Error,
    },
    #[error("Column type {0} is not defined")]
    UnknownColumnType(u64),
}

/// Structural failures of an import run.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Import source contains no data")]
    NoData,
    #[error("Import source has {found} column(s); at most {max} are supported")]
    TooManyColumns { found: usize, max: usize },
    #[error("Import cancelled")]
    Cancelled,
}

/// Rejections from the limit/order/filter parsers. All of them are client faults.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Invalid limit '{0}', expected 'offset:count'")]
    InvalidLimit(String),
    #[error("Invalid sort token '{0}', expected 'field:direction'")]
    InvalidSort(String),
    #[error("Invalid sort direction '{0}'")]
    InvalidDirection(String),
    #[error("Sort not found")]
    SortNotFound,
    #[error("Unknown field '{0}'")]
    UnknownField(String),
    #[error("Invalid filter token '{0}', expected 'field:operator:value'")]
    InvalidFilter(String),
    #[error("Unknown filter operator '{0}'")]
    InvalidOperator(String),
    #[error("Value '{value}' is not a valid {kind} for field '{field}'")]
    InvalidValue {
        field: String,
        kind: &'static str,
        value: String,
    },
    #[error("Wildcard filter value must not contain a single quote")]
    QuoteInWildcard,
}

/// Failures reported by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("Row {row_id} was changed by another writer")]
    Conflict { row_id: u64 },
    #[error("{entity} {id} is not active")]
    Inactive { entity: &'static str, id: u64 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
