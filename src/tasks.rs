//! Background execution of imports and validation passes.
//!
//! Jobs run on a fixed-size worker pool. Each submission hands back a
//! [`CancelFlag`] that the job polls between steps and between validation
//! blocks; a cancelled job stops at the next poll with
//! [`ImportError::Cancelled`] and leaves its current step un-ready.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use anyhow::Result;
use log::{info, warn};
use workerpool::{
    Pool,
    thunk::{Thunk, ThunkWorker},
};

use crate::{
    config::EngineConfig,
    error::ImportError,
    import::{ImportPipeline, ImportRequest, ImportSummary},
    storage::Storage,
    validation::{ValidationSummary, validate_table},
};

#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), ImportError> {
        if self.is_cancelled() {
            Err(ImportError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Marks the table's import as failed. Storage trouble while doing so is
/// only logged; the original error is what the caller reports.
pub fn record_import_failure<S>(store: &S, table_id: u64, err: &anyhow::Error)
where
    S: Storage + ?Sized,
{
    let recorded = store.get_table(table_id).and_then(|mut table| {
        table.fail_import(format!("{err:#}"));
        store.update_table(&table)
    });
    if let Err(store_err) = recorded {
        warn!("Unable to record import failure on table {table_id}: {store_err}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub import: ImportSummary,
    pub validation: ValidationSummary,
}

/// Imports, validates and finally promotes the table to permanent.
pub fn run_import_job<S>(
    store: &S,
    config: &EngineConfig,
    request: &ImportRequest,
    cancel: &CancelFlag,
) -> Result<ImportOutcome>
where
    S: Storage + ?Sized,
{
    let import = ImportPipeline::new(store, config)
        .with_cancel(cancel.clone())
        .run(request)?;
    let validation = validate_table(store, request.table_id, config.block_size, cancel)
        .inspect_err(|err| record_import_failure(store, request.table_id, err))?;

    let mut table = store.get_table(request.table_id)?;
    table.permanent = true;
    table.import.percentage = 100;
    store.update_table(&table)?;
    info!("Table {} is ready", request.table_id);
    Ok(ImportOutcome { import, validation })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Import,
    Validation,
}

#[derive(Debug, Clone)]
pub struct TaskReport {
    pub table_id: u64,
    pub kind: TaskKind,
    pub error: Option<String>,
}

pub struct TaskRunner<S: ?Sized> {
    store: Arc<S>,
    config: Arc<EngineConfig>,
    pool: Pool<ThunkWorker<()>>,
    reports: Arc<Mutex<Vec<TaskReport>>>,
}

impl<S> TaskRunner<S>
where
    S: Storage + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        let pool = Pool::<ThunkWorker<()>>::new(config.workers.max(1));
        Self {
            store,
            config: Arc::new(config),
            pool,
            reports: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn submit_import(&self, request: ImportRequest) -> CancelFlag {
        let cancel = CancelFlag::new();
        let (store, config, reports, flag) = (
            self.store.clone(),
            self.config.clone(),
            self.reports.clone(),
            cancel.clone(),
        );
        self.pool.execute(Thunk::of(move || {
            let result = run_import_job(&*store, &config, &request, &flag).map(|_| ());
            push_report(&reports, request.table_id, TaskKind::Import, result);
        }));
        cancel
    }

    pub fn submit_validation(&self, table_id: u64) -> CancelFlag {
        let cancel = CancelFlag::new();
        let (store, block_size, reports, flag) = (
            self.store.clone(),
            self.config.block_size,
            self.reports.clone(),
            cancel.clone(),
        );
        self.pool.execute(Thunk::of(move || {
            let result = validate_table(&*store, table_id, block_size, &flag).map(|_| ());
            push_report(&reports, table_id, TaskKind::Validation, result);
        }));
        cancel
    }

    /// Waits for every submitted job and drains their reports.
    pub fn join(&self) -> Vec<TaskReport> {
        self.pool.join();
        std::mem::take(&mut *self.reports.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

fn push_report(reports: &Mutex<Vec<TaskReport>>, table_id: u64, kind: TaskKind, result: Result<()>) {
    let error = result.err().map(|err| {
        warn!("{kind:?} of table {table_id} failed: {err:#}");
        format!("{err:#}")
    });
    reports
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(TaskReport {
            table_id,
            kind,
            error,
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let worker_view = flag.clone();
        assert!(worker_view.check().is_ok());
        flag.cancel();
        assert!(worker_view.is_cancelled());
        assert!(matches!(worker_view.check(), Err(ImportError::Cancelled)));
    }
}
