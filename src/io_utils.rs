//! Delimited-file I/O for quote and order logs and for the report tables.
//!
//! All file access flows through this module:
//!
//! - **Delimiter resolution**: `.tsv` → tab, everything else comma, with an
//!   explicit override.
//! - **Encoding**: input decoding via `encoding_rs`, defaulting to UTF-8.
//!   Output is always UTF-8.
//! - **Loading**: whole-file reads into a [`Table`]; ragged rows are padded.
//! - **Writing**: one CSV file per [`NamedTable`], text cells that a
//!   spreadsheet would evaluate as a formula are prefixed with `'`.
//!   Report tables left behind by an earlier run are removed; other CSV files
//!   in the output directory are never touched.

use std::{
    collections::HashSet,
    fs::{self, File},
    io::{BufReader, BufWriter, Read},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};

use crate::{
    data::{Table, Value},
    report::{self, NamedTable},
};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

const FORMULA_PREFIXES: &[char] = &['=', '+', '-', '@'];

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn open_csv_reader<R: Read>(reader: R, delimiter: u8) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true)
        .from_reader(reader)
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| {
            let (text, _, had_errors) = encoding.decode(field);
            if had_errors {
                Err(anyhow!(
                    "Failed to decode text with encoding {}",
                    encoding.name()
                ))
            } else {
                Ok(text.into_owned())
            }
        })
        .collect()
}

/// Reads a whole delimited file into memory.
pub fn load_table(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<Table> {
    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    let mut reader = open_csv_reader(BufReader::new(file), delimiter);
    let header_record = reader
        .byte_headers()
        .with_context(|| format!("Reading headers from {path:?}"))?
        .clone();
    let headers = decode_record(&header_record, encoding)
        .with_context(|| format!("Decoding headers of {path:?}"))?;
    for (idx, header) in headers.iter().enumerate() {
        if headers[..idx].contains(header) {
            warn!("{path:?}: duplicate column '{header}'; the right-most one wins");
        }
    }

    let mut records = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {} of {path:?}", row_idx + 2))?;
        let decoded = decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {} of {path:?}", row_idx + 2))?;
        records.push(decoded.iter().map(|cell| Value::from_raw(cell)).collect::<Vec<_>>());
    }
    debug!(
        "Loaded {} row(s) x {} column(s) from {path:?}",
        records.len(),
        headers.len()
    );
    Ok(Table::from_records(headers, records))
}

/// Text a spreadsheet would not evaluate as a formula.
pub fn guard_cell(value: &Value) -> String {
    match value {
        Value::Text(text) if text.starts_with(FORMULA_PREFIXES) => format!("'{text}"),
        other => other.as_display(),
    }
}

pub fn table_path(dir: &Path, table: &NamedTable) -> PathBuf {
    dir.join(format!("{}.csv", table.name))
}

pub fn write_table(dir: &Path, table: &NamedTable) -> Result<PathBuf> {
    let path = table_path(dir, table);
    let file = File::create(&path).with_context(|| format!("Creating output file {path:?}"))?;
    let mut writer = csv::WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .double_quote(true)
        .from_writer(BufWriter::new(file));
    writer
        .write_record(&table.headers)
        .with_context(|| format!("Writing headers to {path:?}"))?;
    for row in &table.rows {
        writer
            .write_record(row.iter().map(guard_cell))
            .with_context(|| format!("Writing row to {path:?}"))?;
    }
    writer
        .flush()
        .with_context(|| format!("Flushing {path:?}"))?;
    Ok(path)
}

fn written_by_us(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut reader = open_csv_reader(BufReader::new(file), DEFAULT_CSV_DELIMITER);
    let Ok(headers) = reader.byte_headers() else {
        return false;
    };
    let headers = headers
        .iter()
        .map(|h| String::from_utf8_lossy(h).into_owned())
        .collect::<Vec<_>>();
    report::is_report_layout(&headers)
}

/// Deletes report tables in `dir` that are not listed in `keep`. CSV files with
/// any other header layout stay, as does everything listed in `keep`.
pub fn remove_stale_tables(dir: &Path, keep: &[&Path]) -> Result<Vec<PathBuf>> {
    let keep = keep
        .iter()
        .filter_map(|path| fs::canonicalize(path).ok())
        .collect::<HashSet<_>>();
    let mut removed = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Listing output directory {dir:?}"))? {
        let path = entry
            .with_context(|| format!("Listing output directory {dir:?}"))?
            .path();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if !is_csv || !path.is_file() {
            continue;
        }
        if fs::canonicalize(&path).is_ok_and(|canonical| keep.contains(&canonical)) {
            continue;
        }
        if !written_by_us(&path) {
            debug!("Leaving {path:?} in place: not a report table");
            continue;
        }
        fs::remove_file(&path).with_context(|| format!("Removing stale table {path:?}"))?;
        info!("Removed stale table {path:?}");
        removed.push(path);
    }
    removed.sort();
    Ok(removed)
}

pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Creating output directory {dir:?}"))
}

/// Hex SHA-256 of a file's bytes, recorded in run metadata for auditing.
pub fn fingerprint(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Reading {path:?} for fingerprint"))?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}
