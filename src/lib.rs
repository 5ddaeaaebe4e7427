pub mod cli;
pub mod column_type;
pub mod config;
pub mod edit;
pub mod error;
pub mod export;
pub mod format;
pub mod import;
pub mod io_utils;
pub mod model;
pub mod query;
pub mod schema;
pub mod storage;
pub mod table;
pub mod tasks;
pub mod validation;

use std::{
    env,
    path::Path,
    sync::{Arc, OnceLock},
};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands, WorkspaceArgs},
    config::EngineConfig,
    export::ExportOptions,
    import::ImportRequest,
    model::{Alignment, CustomerTable},
    query::{FieldMap, RowQuery},
    storage::{ColumnStore, ColumnTypeStore, MemoryStore, RowStore, StepStore, TableStore},
    table::{ColumnLayout, print_table},
    tasks::{TaskReport, TaskRunner},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("table_engine", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Detect(args) => handle_detect(&args),
        Commands::Import(args) => handle_import(&args),
        Commands::Validate(args) => handle_validate(&args),
        Commands::Edit(args) => handle_edit(&args),
        Commands::SetType(args) => handle_set_type(&args),
        Commands::List(args) => handle_list(&args),
        Commands::Export(args) => handle_export(&args),
        Commands::Status(args) => handle_status(&args),
        Commands::History(args) => handle_history(&args),
        Commands::Types(args) => handle_types(&args),
    }
}

/// A loaded workspace snapshot and the configuration it runs under.
struct Workspace {
    store: Arc<MemoryStore>,
    config: EngineConfig,
}

impl Workspace {
    fn open(args: &WorkspaceArgs) -> Result<Self> {
        let config = EngineConfig::load_or_default(args.config.as_deref())?;
        let store = MemoryStore::open(&args.workspace)
            .with_context(|| format!("Opening workspace {:?}", args.workspace))?;
        store.put_column_types(config.catalog());
        debug!(
            "Workspace {:?} opened with {} table(s)",
            args.workspace,
            store.tables().len()
        );
        Ok(Self {
            store: Arc::new(store),
            config,
        })
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.store
            .save(path)
            .with_context(|| format!("Saving workspace {path:?}"))
    }
}

fn first_failure(reports: Vec<TaskReport>) -> Result<()> {
    match reports.into_iter().find_map(|report| report.error) {
        Some(error) => Err(anyhow!(error)),
        None => Ok(()),
    }
}

fn handle_detect(args: &cli::DetectArgs) -> Result<()> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let format = format::detect_file(&args.input, encoding)?;
    info!("Detected format of {:?}: {format}", args.input);
    println!("{format}");
    Ok(())
}

fn handle_import(args: &cli::ImportArgs) -> Result<()> {
    let workspace = Workspace::open(&args.workspace)?;
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let table_id = match args.table {
        Some(id) => id,
        None => {
            let name = args.name.clone().unwrap_or_else(|| {
                args.input
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "table".to_string())
            });
            let table = workspace
                .store
                .create_table(CustomerTable::staging(args.unit, name, args.kind.into()))?;
            info!("Created staging table {} ({})", table.id, table.name);
            table.id
        }
    };

    let runner = TaskRunner::new(workspace.store.clone(), workspace.config.clone());
    runner.submit_import(ImportRequest {
        table_id,
        source: args.input.clone(),
        has_header: !args.no_header,
        encoding,
    });
    let outcome = first_failure(runner.join());
    workspace.save(&args.workspace.workspace)?;
    outcome.with_context(|| format!("Importing {:?} into table {table_id}", args.input))?;

    let table = workspace.store.get_table(table_id)?;
    println!(
        "Table {table_id} imported: {} column(s), {} row(s), {} wrong row(s)",
        table.import.columns, table.import.rows, table.import.wrong_rows
    );
    Ok(())
}

fn handle_validate(args: &cli::ValidateArgs) -> Result<()> {
    let workspace = Workspace::open(&args.workspace)?;
    let runner = TaskRunner::new(workspace.store.clone(), workspace.config.clone());
    runner.submit_validation(args.table);
    let outcome = first_failure(runner.join());
    workspace.save(&args.workspace.workspace)?;
    outcome.with_context(|| format!("Validating table {}", args.table))?;
    println!("Table {} validated", args.table);
    Ok(())
}

fn handle_edit(args: &cli::EditArgs) -> Result<()> {
    let workspace = Workspace::open(&args.workspace)?;
    let cell = edit::edit_cell(&*workspace.store, args.row, args.column, &args.value)?;
    workspace.save(&args.workspace.workspace)?;
    println!(
        "{}\t{}",
        cell.value,
        if cell.valid { "valid" } else { "invalid" }
    );
    Ok(())
}

fn handle_set_type(args: &cli::SetTypeArgs) -> Result<()> {
    let workspace = Workspace::open(&args.workspace)?;
    let column = workspace
        .store
        .set_column_type(args.column, args.column_type)?;
    workspace.save(&args.workspace.workspace)?;
    info!(
        "Column {} superseded by column {} (edition {})",
        args.column, column.id, column.edition
    );
    println!("{}", column.id);
    Ok(())
}

fn handle_list(args: &cli::ListArgs) -> Result<()> {
    let workspace = Workspace::open(&args.workspace)?;
    let store = &workspace.store;
    let columns = store.get_columns_by_table(args.table)?;
    let fields = FieldMap::for_table_rows(&columns);
    let query = RowQuery {
        limit: query::parse_limit_or(&args.limit, workspace.config.default_limit)?,
        order: query::parse_order(&args.order, &fields)?,
        filter: query::parse_filter(&args.filter, &fields)?,
    };
    let rows = store.get_all(&query, args.table, &columns)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let types = store.column_types_for_table(args.table)?;
    let mut headers = vec!["id".to_string(), "position".to_string(), "wrong".to_string()];
    headers.extend(columns.iter().map(|c| c.name.clone()));
    let mut layouts = vec![
        ColumnLayout::both(Alignment::Right),
        ColumnLayout::both(Alignment::Right),
        ColumnLayout::default(),
    ];
    layouts.extend(columns.iter().map(|c| {
        types
            .get(&c.column_type_id)
            .map(ColumnLayout::from)
            .unwrap_or_default()
    }));
    let body = rows
        .iter()
        .map(|row| {
            let mut line = vec![
                row.id.to_string(),
                row.position.to_string(),
                row.wrong.to_string(),
            ];
            line.extend(row.values());
            line
        })
        .collect::<Vec<_>>();
    print_table(&headers, &body, &layouts);
    Ok(())
}

fn handle_export(args: &cli::ExportArgs) -> Result<()> {
    let workspace = Workspace::open(&args.workspace)?;
    let options = ExportOptions {
        format: args.format,
        with_header: !args.no_header,
        order: args.order.clone(),
        filter: args.filter.clone(),
    };
    let exported = export::export_table(
        &*workspace.store,
        &workspace.config,
        args.table,
        &options,
        &args.output,
    );
    workspace.save(&args.workspace.workspace)?;
    let rows = exported?;
    println!("Exported {rows} row(s) to {}", args.output.display());
    Ok(())
}

fn handle_status(args: &cli::StatusArgs) -> Result<()> {
    let workspace = Workspace::open(&args.workspace)?;
    let table = workspace.store.get_table(args.table)?;
    println!("table: {} ({})", table.id, table.name);
    println!("kind: {:?}", table.kind);
    println!("permanent: {}", table.permanent);
    println!(
        "import: {}% columns={} rows={} wrong={}",
        table.import.percentage, table.import.columns, table.import.rows, table.import.wrong_rows
    );
    if table.import.error {
        println!("import error: {}", table.import.error_description);
    }
    println!(
        "export: {}% rows={}",
        table.export.percentage, table.export.rows
    );
    if table.export.error {
        println!("export error: {}", table.export.error_description);
    }
    for step in workspace.store.steps(args.table)? {
        println!(
            "{}: {}",
            step.step,
            if step.ready {
                "ready".to_string()
            } else {
                format!("{}%", step.percentage)
            }
        );
    }
    Ok(())
}

fn handle_history(args: &cli::HistoryArgs) -> Result<()> {
    let workspace = Workspace::open(&args.workspace)?;
    let store = &workspace.store;
    let lineage = store.lineage(args.row)?;
    let table_id = lineage
        .first()
        .map(|row| row.customer_table_id)
        .ok_or_else(|| anyhow!("Row {} has no editions", args.row))?;
    let columns = store.get_columns_by_table(table_id)?;
    let mut headers = vec![
        "id".to_string(),
        "edition".to_string(),
        "active".to_string(),
    ];
    headers.extend(columns.iter().map(|c| c.name.clone()));
    let body = lineage
        .iter()
        .map(|row| {
            let mut line = vec![
                row.id.to_string(),
                row.edition.to_string(),
                row.active.to_string(),
            ];
            line.extend(row.cells(&columns).into_iter().map(|cell| cell.value));
            line
        })
        .collect::<Vec<_>>();
    print_table(&headers, &body, &[]);
    Ok(())
}

fn handle_types(args: &WorkspaceArgs) -> Result<()> {
    let workspace = Workspace::open(args)?;
    let headers = ["id", "name", "required", "regexp", "parser"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let body = workspace
        .store
        .column_types()
        .into_iter()
        .map(|t| {
            vec![
                t.id.to_string(),
                t.name,
                t.required.to_string(),
                t.regexp,
                format!("{:?}", t.parser).to_lowercase(),
            ]
        })
        .collect::<Vec<_>>();
    print_table(&headers, &body, &[ColumnLayout::both(Alignment::Right)]);
    Ok(())
}
