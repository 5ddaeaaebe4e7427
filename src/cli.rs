use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{format::Format, model::TableKind};

#[derive(Debug, Parser)]
#[command(author, version, about = "Import, validate and edit customer tables", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Report the separator format of a delimited file
    Detect(DetectArgs),
    /// Import a delimited file into a new or existing table, then validate it
    Import(ImportArgs),
    /// Re-run cell validation over every active row of a table
    Validate(ValidateArgs),
    /// Set a single cell, keeping the previous row edition
    Edit(EditArgs),
    /// Assign a column type to a table column
    SetType(SetTypeArgs),
    /// List table rows with paging, sorting and filtering
    List(ListArgs),
    /// Export table rows to a delimited file
    Export(ExportArgs),
    /// Show import/export counters and pipeline steps of a table
    Status(StatusArgs),
    /// Show every edition of a row
    History(HistoryArgs),
    /// List the available column types
    Types(WorkspaceArgs),
}

#[derive(Debug, Args)]
pub struct WorkspaceArgs {
    /// Workspace snapshot (created on first write)
    #[arg(short = 'w', long = "workspace")]
    pub workspace: PathBuf,
    /// Engine configuration file (YAML)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DetectArgs {
    /// File to inspect
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum KindArg {
    Default,
    PriceList,
}

impl From<KindArg> for TableKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Default => TableKind::Default,
            KindArg::PriceList => TableKind::PriceList,
        }
    }
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,
    /// Delimited file to import
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Re-import into this existing table instead of creating one
    #[arg(short = 't', long = "table")]
    pub table: Option<u64>,
    /// Name of the table to create (defaults to the file stem)
    #[arg(short = 'n', long = "name")]
    pub name: Option<String>,
    /// Owning unit of the table to create
    #[arg(long = "unit", default_value_t = 1)]
    pub unit: u64,
    /// Kind of the table to create
    #[arg(long = "kind", value_enum, default_value = "default")]
    pub kind: KindArg,
    /// Treat the first line as data instead of column names
    #[arg(long = "no-header")]
    pub no_header: bool,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,
    /// Table to validate
    #[arg(short = 't', long = "table")]
    pub table: u64,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,
    /// Row id
    #[arg(short = 'r', long = "row")]
    pub row: u64,
    /// Column id
    #[arg(short = 'C', long = "column")]
    pub column: u64,
    /// New cell value
    #[arg(long = "value", allow_hyphen_values = true)]
    pub value: String,
}

#[derive(Debug, Args)]
pub struct SetTypeArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,
    /// Column id
    #[arg(short = 'C', long = "column")]
    pub column: u64,
    /// Column type id
    #[arg(long = "type")]
    pub column_type: u64,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,
    /// Table to list
    #[arg(short = 't', long = "table")]
    pub table: u64,
    /// Page as `offset:count` (count 0 means no limit)
    #[arg(long = "limit", default_value = "")]
    pub limit: String,
    /// Sort directives such as `name:asc,position:desc`
    #[arg(long = "order", default_value = "")]
    pub order: String,
    /// Filters such as `city:eq:Paris,*:lk:ann*`
    #[arg(long = "filter", default_value = "")]
    pub filter: String,
    /// Emit JSON instead of a formatted table
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,
    /// Table to export
    #[arg(short = 't', long = "table")]
    pub table: u64,
    /// Destination file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    /// Output format: txt, csv or ssv
    #[arg(long = "format", value_parser = parse_format, default_value = "csv")]
    pub format: Format,
    /// Omit the header line
    #[arg(long = "no-header")]
    pub no_header: bool,
    /// Sort directives such as `name:asc`
    #[arg(long = "order", default_value = "")]
    pub order: String,
    /// Filters such as `wrong:eq:false`
    #[arg(long = "filter", default_value = "")]
    pub filter: String,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,
    /// Table to report on
    #[arg(short = 't', long = "table")]
    pub table: u64,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,
    /// Row id
    #[arg(short = 'r', long = "row")]
    pub row: u64,
}

pub fn parse_format(value: &str) -> Result<Format, String> {
    value.parse::<Format>().map_err(|err| err.to_string())
}
