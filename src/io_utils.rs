//! I/O helpers for delimited files and staging files.
//!
//! - **Encoding**: input decoding via `encoding_rs`, defaulting to UTF-8.
//! - **Reader/writer construction** for tab, comma and semicolon separated data.
//! - **Staging files**: versioned files under the staging directory that are
//!   deleted when their guard drops unless explicitly persisted.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};
use log::debug;
use uuid::Uuid;

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8, has_headers: bool, flexible: bool) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(has_headers)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(flexible);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(
    path: &Path,
    delimiter: u8,
    has_headers: bool,
    flexible: bool,
) -> Result<csv::Reader<BufReader<File>>> {
    let reader =
        BufReader::new(File::open(path).with_context(|| format!("Opening input file {path:?}"))?);
    Ok(open_csv_reader(reader, delimiter, has_headers, flexible))
}

pub fn open_csv_writer(path: &Path, delimiter: u8) -> Result<csv::Writer<BufWriter<File>>> {
    let file = File::create(path).with_context(|| format!("Creating output file {path:?}"))?;
    Ok(csv_writer(BufWriter::new(file), delimiter))
}

pub fn csv_writer<W: Write>(writer: W, delimiter: u8) -> csv::Writer<W> {
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true)
        .flexible(false);
    builder.from_writer(writer)
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Reads every record of a delimited file, tolerating ragged rows.
pub fn read_records(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<Vec<Vec<String>>> {
    let mut reader = open_csv_reader_from_path(path, delimiter, false, true)?;
    let mut record = csv::ByteRecord::new();
    let mut rows = Vec::new();
    while reader
        .read_byte_record(&mut record)
        .with_context(|| format!("Reading record {} of {path:?}", rows.len() + 1))?
    {
        let mut decoded = decode_record(&record, encoding)
            .with_context(|| format!("Decoding record {} of {path:?}", rows.len() + 1))?;
        if rows.is_empty()
            && let Some(first) = decoded.first_mut()
            && let Some(stripped) = first.strip_prefix('\u{feff}')
        {
            *first = stripped.to_string();
        }
        rows.push(decoded);
    }
    Ok(rows)
}

/// Unique, roughly monotonic token used to version staging files.
pub fn version_suffix() -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("{}_{}", Utc::now().format("%Y%m%d%H%M%S%3f"), &token[..8])
}

/// A versioned file in the staging directory, removed on drop unless persisted.
#[derive(Debug)]
pub struct StagingFile {
    path: PathBuf,
    keep: bool,
}

impl StagingFile {
    pub fn new(dir: &Path, stem: &str, version: &str, extension: &str) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("Creating staging directory {dir:?}"))?;
        Ok(Self {
            path: dir.join(format!("{stem}_{version}.{extension}")),
            keep: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Moves the staged file to `destination`.
    pub fn persist(mut self, destination: &Path) -> Result<()> {
        if fs::rename(&self.path, destination).is_err() {
            fs::copy(&self.path, destination)
                .with_context(|| format!("Copying {:?} to {destination:?}", self.path))?;
            let _ = fs::remove_file(&self.path);
        }
        self.keep = true;
        Ok(())
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if self.keep || !self.path.exists() {
            return;
        }
        if let Err(err) = fs::remove_file(&self.path) {
            debug!("Failed to remove staging file {:?}: {err}", self.path);
        }
    }
}
