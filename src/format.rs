//! Delimited-text format detection.
//!
//! Detection looks at the first line only and tries separators in a fixed
//! order: tab, comma, semicolon. The first separator that splits the line into
//! more than one field wins. Quoting is not taken into account, so a comma
//! inside a quoted value on a tab-less line classifies the line as CSV.

use std::{
    fmt,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    str::FromStr,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::io_utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Tab separated.
    Txt,
    /// Comma separated.
    Csv,
    /// Semicolon separated.
    Ssv,
    Unknown,
}

impl Format {
    pub fn delimiter(self) -> Option<u8> {
        match self {
            Format::Txt => Some(b'\t'),
            Format::Csv => Some(b','),
            Format::Ssv => Some(b';'),
            Format::Unknown => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Format::Txt => "txt",
            Format::Csv => "csv",
            Format::Ssv => "ssv",
            Format::Unknown => "dat",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Format::Txt => "txt",
            Format::Csv => "csv",
            Format::Ssv => "ssv",
            Format::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "txt" | "tsv" | "tab" => Ok(Format::Txt),
            "csv" | "comma" => Ok(Format::Csv),
            "ssv" | "semicolon" => Ok(Format::Ssv),
            other => Err(anyhow!(
                "Unknown format '{other}'. Supported formats: txt, csv, ssv"
            )),
        }
    }
}

pub fn detect(first_line: &str) -> Format {
    for (separator, format) in [('\t', Format::Txt), (',', Format::Csv), (';', Format::Ssv)] {
        if first_line.split(separator).count() > 1 {
            return format;
        }
    }
    Format::Unknown
}

/// Detects the format of a file from its first line, decoded with `encoding`.
pub fn detect_file(path: &Path, encoding: &'static Encoding) -> Result<Format> {
    let file = File::open(path).with_context(|| format!("Opening import source {path:?}"))?;
    let mut bytes = Vec::new();
    BufReader::new(file)
        .read_until(b'\n', &mut bytes)
        .with_context(|| format!("Reading first line of {path:?}"))?;
    let first_line = io_utils::decode_bytes(&bytes, encoding)
        .with_context(|| format!("Decoding first line of {path:?}"))?;
    let trimmed = first_line.trim_end_matches(['\r', '\n']);
    Ok(detect(trimmed.strip_prefix('\u{feff}').unwrap_or(trimmed)))
}
