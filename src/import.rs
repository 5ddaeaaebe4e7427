//! Bulk import pipeline.
//!
//! An import runs two numbered steps against a staging [`CustomerTable`]:
//!
//! 1. **Structure analysis** (step 2): detect the separator from the first
//!    line, parse every record, infer the column set and store it in place of
//!    the table's previous non-prebuilt columns. Import percentage becomes 50.
//! 2. **Data write-back** (step 3): normalize every data row to the detected
//!    width, tag it with its position and a `wrong` flag for rows whose field
//!    count differed, write the result to a versioned staging file and hand
//!    that file to the store's bulk load. Import percentage becomes 75.
//!
//! A failing step leaves its [`ImportStep`] un-ready and records the error on
//! the table; nothing already committed is rolled back. The staging file is
//! removed on every exit path.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use encoding_rs::{Encoding, UTF_8};
use log::{debug, info, warn};

use crate::{
    config::EngineConfig,
    error::{ImportError, StorageError},
    format::{self, Format},
    io_utils::{self, StagingFile},
    model::{ImportStep, StepKind, TableColumn},
    schema::infer_schema,
    storage::{BulkLoad, Storage},
    tasks::CancelFlag,
};

pub const POSITION_COLUMN: &str = "position";
pub const WRONG_COLUMN: &str = "wrong";

#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub table_id: u64,
    pub source: PathBuf,
    pub has_header: bool,
    pub encoding: &'static Encoding,
}

impl ImportRequest {
    pub fn new(table_id: u64, source: impl Into<PathBuf>, has_header: bool) -> Self {
        Self {
            table_id,
            source: source.into(),
            has_header,
            encoding: UTF_8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub format: Format,
    pub columns: usize,
    pub rows: usize,
    pub wrong_rows: usize,
    pub version: String,
}

/// Records normalized to the table width, with position and wrong flag appended.
#[derive(Debug, Default)]
struct NormalizedRows {
    records: Vec<Vec<String>>,
    wrong: usize,
}

fn normalize_rows(data: &[Vec<String>], width: usize, block_size: usize) -> NormalizedRows {
    let mut normalized = NormalizedRows {
        records: Vec::with_capacity(data.len()),
        wrong: 0,
    };
    for (position, record) in data.iter().enumerate() {
        let wrong = record.len() != width;
        if wrong {
            normalized.wrong += 1;
        }
        let mut fields = record.clone();
        fields.resize(width, String::new());
        fields.push(position.to_string());
        fields.push(if wrong { "1" } else { "0" }.to_string());
        normalized.records.push(fields);
        if (position + 1) % block_size == 0 {
            debug!("Normalized {} of {} row(s)", position + 1, data.len());
        }
    }
    normalized
}

pub struct ImportPipeline<'a, S: ?Sized> {
    store: &'a S,
    staging_dir: &'a Path,
    block_size: usize,
    cancel: CancelFlag,
}

impl<'a, S> ImportPipeline<'a, S>
where
    S: Storage + ?Sized,
{
    pub fn new(store: &'a S, config: &'a EngineConfig) -> Self {
        Self {
            store,
            staging_dir: &config.staging_dir,
            block_size: config.block_size.max(1),
            cancel: CancelFlag::default(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Runs both steps. On failure the error is also recorded on the table.
    pub fn run(&self, request: &ImportRequest) -> Result<ImportSummary> {
        self.execute(request).inspect_err(|err| {
            crate::tasks::record_import_failure(self.store, request.table_id, err);
        })
    }

    fn execute(&self, request: &ImportRequest) -> Result<ImportSummary> {
        let table_id = request.table_id;
        let mut table = self.store.get_table(table_id)?;
        if !table.active {
            return Err(StorageError::Inactive {
                entity: "Table",
                id: table_id,
            }
            .into());
        }
        table.import = Default::default();
        self.store.update_table(&table)?;

        let mut analysis = ImportStep::started(table_id, StepKind::Analysis);
        self.store.save_step(&analysis)?;
        info!(
            "Analyzing {:?} for table {} ({})",
            request.source, table_id, table.name
        );

        let detected = format::detect_file(&request.source, request.encoding)?;
        let (format, delimiter) = match detected.delimiter() {
            Some(delimiter) => (detected, delimiter),
            None => {
                warn!(
                    "No separator found in the first line of {:?}; reading it as a single column",
                    request.source
                );
                (Format::Csv, b',')
            }
        };
        let records = io_utils::read_records(&request.source, delimiter, request.encoding)
            .with_context(|| format!("Parsing import source {:?}", request.source))?;
        let header = records.first().ok_or(ImportError::NoData)?;
        let width = header.len();
        let definitions = infer_schema(header, request.has_header)?;
        let data = &records[usize::from(request.has_header).min(records.len())..];
        debug!(
            "Detected {format} with {width} column(s) and {} data row(s)",
            data.len()
        );

        self.cancel.check()?;
        let columns = definitions
            .into_iter()
            .map(|definition| definition.into_table_column(table_id))
            .collect::<Vec<TableColumn>>();
        let columns = self
            .store
            .import_data_structure(table_id, columns, true)
            .context("Storing imported table structure")?;
        table.import.columns = columns.len();
        table.import.percentage = 50;
        self.store.update_table(&table)?;
        analysis.complete();
        self.store.save_step(&analysis)?;
        info!("Stored {} column(s) for table {table_id}", columns.len());

        self.cancel.check()?;
        let mut write_back = ImportStep::started(table_id, StepKind::WriteBack);
        self.store.save_step(&write_back)?;
        let normalized = normalize_rows(data, width, self.block_size);

        let version = io_utils::version_suffix();
        let loaded = {
            let staged = StagingFile::new(
                self.staging_dir,
                &format!("table_{table_id}"),
                &version,
                format.extension(),
            )?;
            let mut writer = io_utils::open_csv_writer(staged.path(), delimiter)?;
            if request.has_header {
                let mut header_record = columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>();
                header_record.push(POSITION_COLUMN.to_string());
                header_record.push(WRONG_COLUMN.to_string());
                writer
                    .write_record(&header_record)
                    .context("Writing normalized header")?;
            }
            for (idx, record) in normalized.records.iter().enumerate() {
                writer
                    .write_record(record)
                    .with_context(|| format!("Writing normalized row {idx}"))?;
            }
            writer.flush().context("Flushing normalized data")?;
            drop(writer);

            self.store
                .import_data(&BulkLoad {
                    file: staged.path(),
                    table_id,
                    format,
                    has_header: request.has_header,
                    columns: &columns,
                    version: &version,
                })
                .with_context(|| format!("Bulk-loading version {version} of table {table_id}"))?
        };

        table.import.rows = loaded;
        table.import.wrong_rows = normalized.wrong;
        table.import.percentage = 75;
        self.store.update_table(&table)?;
        write_back.complete();
        self.store.save_step(&write_back)?;
        info!(
            "Loaded {loaded} row(s) into table {table_id} ({} with a mismatched field count)",
            normalized.wrong
        );

        Ok(ImportSummary {
            format,
            columns: columns.len(),
            rows: loaded,
            wrong_rows: normalized.wrong,
            version,
        })
    }
}
