//! Output tables: definitions, manifests and the per-call audit writer.
use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::model::{AuditRow, Outcome};

pub const OUTPUT_TABLE: &str = "output.csv";
pub const STATS_TABLE: &str = "stats.csv";
pub const OUTPUT_COLUMNS: [&str; 4] = ["id", "timestamp", "email", "status"];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Output table declaration; serialized as its `.manifest` sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDefinition {
    #[serde(skip)]
    pub name: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub incremental: bool,
    pub primary_key: Vec<String>,
}

impl TableDefinition {
    pub fn new(dir: &Path, name: &str, primary_key: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            path: dir.join(name),
            incremental: true,
            primary_key: primary_key.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        let mut os = self.path.clone().into_os_string();
        os.push(".manifest");
        PathBuf::from(os)
    }

    pub fn write_manifest(&self) -> Result<()> {
        let json = serde_json::to_string(self)?;
        fs::write(self.manifest_path(), json)
            .with_context(|| format!("failed to write manifest for {}", self.name))
    }
}

/// Both output tables of a run. Only `output` is ever written.
#[derive(Debug, Clone)]
pub struct OutputTables {
    pub output: TableDefinition,
    pub stats: TableDefinition,
}

impl OutputTables {
    pub fn new(out_dir: &Path) -> Self {
        Self {
            output: TableDefinition::new(out_dir, OUTPUT_TABLE, &["id"]),
            stats: TableDefinition::new(out_dir, STATS_TABLE, &["timestamp"]),
        }
    }
}

/// Wall-clock time at second precision, `YYYY-MM-DD HH:MM:SS`.
pub fn timestamp_now() -> String {
    format_timestamp(&Local::now())
}

pub fn format_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Row id: hex SHA-256 of the email followed by the timestamp.
pub fn row_id(email: &str, timestamp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update(timestamp.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn audit_row(email: &str, timestamp: String, outcome: &Outcome) -> AuditRow {
    AuditRow {
        id: row_id(email, &timestamp),
        email: email.to_string(),
        status: outcome.audit_status(),
        timestamp,
    }
}

/// Appends audit rows to the output table. Every row is flushed as soon as
/// it is written so a failed run keeps what it already recorded.
pub struct AuditWriter<W: Write = File> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl AuditWriter<File> {
    /// Create the table file (truncating), its manifest and the header row.
    pub fn create(table: &TableDefinition) -> Result<Self> {
        if let Some(parent) = table.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = File::create(&table.path)
            .with_context(|| format!("failed to open output table {}", table.path.display()))?;
        table.write_manifest()?;
        Self::from_writer(file)
    }
}

impl<W: Write> AuditWriter<W> {
    pub fn from_writer(inner: W) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::CRLF)
            .from_writer(inner);
        writer.write_record(OUTPUT_COLUMNS)?;
        writer.flush()?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn write_row(&mut self, row: &AuditRow) -> Result<()> {
        self.writer.write_record([
            row.id.as_str(),
            row.timestamp.as_str(),
            row.email.as_str(),
            row.status.as_str(),
        ])?;
        self.writer.flush().context("failed to flush output table")?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> usize {
        self.rows
    }

    /// Flush and release the underlying handle.
    pub fn close(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|err| anyhow::anyhow!("failed to close output table: {}", err.error()))
    }
}
