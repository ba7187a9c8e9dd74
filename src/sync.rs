use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::audit::{audit_row, timestamp_now, AuditWriter, OutputTables};
use crate::batch::batches;
use crate::brevo::ContactsService;
use crate::input;
use crate::model::ContactRecord;

/// Data folder layout: `in/tables` holds the input, `out/tables` the results.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn input_tables(&self) -> PathBuf {
        self.root.join("in").join("tables")
    }

    pub fn output_tables(&self) -> PathBuf {
        self.root.join("out").join("tables")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub batches: usize,
    pub upserts: usize,
    pub deletions: usize,
    pub rows: usize,
}

/// Run one full sync over the data folder.
///
/// The output table is opened before the input is read and is closed on
/// every exit path; rows written before a failure stay on disk.
#[instrument(skip_all, fields(data_dir = %data_dir.root.display()))]
pub async fn run(
    data_dir: &DataDir,
    batch_size: usize,
    service: &dyn ContactsService,
) -> Result<SyncSummary> {
    let tables = OutputTables::new(&data_dir.output_tables());
    let mut writer = AuditWriter::create(&tables.output)?;

    let result = sync_input(&data_dir.input_tables(), batch_size, service, &mut writer).await;
    let closed = writer.close();

    let summary = result?;
    closed?;
    info!(
        batches = summary.batches,
        upserts = summary.upserts,
        deletions = summary.deletions,
        rows = summary.rows,
        "contact sync finished"
    );
    Ok(summary)
}

async fn sync_input<W: Write>(
    input_dir: &Path,
    batch_size: usize,
    service: &dyn ContactsService,
    writer: &mut AuditWriter<W>,
) -> Result<SyncSummary> {
    let contacts = input::load_contacts(input_dir)?;
    sync_contacts(&contacts, batch_size, service, writer).await
}

/// Upsert `contacts` batch by batch and record one audit row per call.
/// Stops at the first fatal API error.
///
/// Row ids hash the email with a second-precision timestamp, so the upsert
/// and delete rows of a transactional contact share an id when both calls
/// finish within the same second.
pub async fn sync_contacts<W: Write>(
    contacts: &[ContactRecord],
    batch_size: usize,
    service: &dyn ContactsService,
    writer: &mut AuditWriter<W>,
) -> Result<SyncSummary> {
    let mut summary = SyncSummary::default();

    for batch in batches(contacts, batch_size) {
        let upserted = service
            .upsert_batch(batch)
            .await
            .with_context(|| format!("upsert of batch {} failed", summary.batches + 1))?;
        summary.batches += 1;
        summary.upserts += 1;

        for record in batch {
            writer.write_row(&audit_row(&record.email, timestamp_now(), &upserted))?;

            if record.transactional_contact {
                let deleted = service
                    .delete_blocked_contact(&record.email)
                    .await
                    .with_context(|| format!("unblocking {} failed", record.email))?;
                summary.deletions += 1;
                writer.write_row(&audit_row(&record.email, timestamp_now(), &deleted))?;
            }
        }
    }

    summary.rows = writer.rows_written();
    Ok(summary)
}
