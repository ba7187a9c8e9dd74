//! Input table discovery, loading and normalization.
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::SyncError;
use crate::model::ContactRecord;

pub const COL_EMAIL: &str = "email";
pub const COL_EMAIL_BLACKLISTED: &str = "emailBlacklisted";
pub const COL_SMS_BLACKLISTED: &str = "smsBlacklisted";
pub const COL_TRANSACTIONAL: &str = "transactionalContact";

const REQUIRED_COLUMNS: [&str; 4] = [
    COL_EMAIL,
    COL_EMAIL_BLACKLISTED,
    COL_SMS_BLACKLISTED,
    COL_TRANSACTIONAL,
];

/// A CSV table found in the input folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputTable {
    pub name: String,
    pub path: PathBuf,
}

/// Rows of a loaded table, every cell kept as text.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// List the CSV tables under `dir`, sorted by name. Manifests and other
/// files are skipped; a missing folder yields no tables.
pub fn list_input_tables(dir: &Path) -> Result<Vec<InputTable>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut tables = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("failed to list input tables in {}", dir.display()))?
    {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if !path.is_file() || !is_csv {
            continue;
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        tables.push(InputTable { name, path });
    }
    tables.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(tables)
}

/// Pick the sole configured input table.
pub fn single_table(mut tables: Vec<InputTable>) -> Result<InputTable, SyncError> {
    match tables.len() {
        0 => Err(SyncError::NoInputTable),
        1 => Ok(tables.remove(0)),
        n => Err(SyncError::TooManyInputTables(n)),
    }
}

/// Load all rows of `table` as strings.
pub fn read_table(table: &InputTable) -> Result<RawTable> {
    info!("Processing input table: {}", table.name);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(&table.path)
        .with_context(|| format!("failed to open input table {}", table.path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("failed to read header of {}", table.name))?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("malformed row in {}", table.name))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    if rows.is_empty() {
        info!("Input table {} is empty!", table.name);
    }

    Ok(RawTable {
        name: table.name.clone(),
        headers,
        rows,
    })
}

/// `true` only for a case-insensitive `"true"`.
pub fn parse_flag(value: &str) -> bool {
    value.to_lowercase() == "true"
}

/// Project the table onto the four contact columns and coerce the flags.
pub fn normalize(table: &RawTable) -> Result<Vec<ContactRecord>, SyncError> {
    let mut idx = [0usize; 4];
    for (slot, column) in idx.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = table
            .headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| SyncError::MissingColumn {
                table: table.name.clone(),
                column: column.to_string(),
            })?;
    }

    Ok(table
        .rows
        .iter()
        .map(|row| ContactRecord {
            email: cell(row, idx[0]).to_string(),
            email_blacklisted: parse_flag(cell(row, idx[1])),
            sms_blacklisted: parse_flag(cell(row, idx[2])),
            transactional_contact: parse_flag(cell(row, idx[3])),
        })
        .collect())
}

/// Cells past the end of a short row read as empty.
fn cell(row: &[String], i: usize) -> &str {
    row.get(i).map(String::as_str).unwrap_or("")
}

/// Locate, read and normalize the single input table under `dir`.
pub fn load_contacts(dir: &Path) -> Result<Vec<ContactRecord>> {
    let table = single_table(list_input_tables(dir)?)?;
    let raw = read_table(&table)?;
    Ok(normalize(&raw)?)
}
