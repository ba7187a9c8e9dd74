use anyhow::{anyhow, Result};
use serde_json::json;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use tokio::sync::Mutex;

use brevo_contact_sync::brevo::{ContactsService, UPSERT_CONTACTS};
use brevo_contact_sync::error::{exit_code, SyncError};
use brevo_contact_sync::model::{ContactRecord, Outcome, EMAIL_UPDATED, TRANSACTIONAL_UNBLOCKED};
use brevo_contact_sync::sync::{self, DataDir, SyncSummary};

const HEADER: &str = "email,emailBlacklisted,smsBlacklisted,transactionalContact,firstName";

#[derive(Clone, Default)]
struct RecordingContacts {
    upsert_responses: Arc<Mutex<VecDeque<Result<Outcome>>>>,
    upsert_calls: Arc<Mutex<Vec<Vec<ContactRecord>>>>,
    delete_calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingContacts {
    fn with_upserts(responses: Vec<Result<Outcome>>) -> Self {
        Self {
            upsert_responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    async fn upsert_calls(&self) -> Vec<Vec<ContactRecord>> {
        self.upsert_calls.lock().await.clone()
    }

    async fn delete_calls(&self) -> Vec<String> {
        self.delete_calls.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl ContactsService for RecordingContacts {
    async fn upsert_batch(&self, contacts: &[ContactRecord]) -> Result<Outcome> {
        self.upsert_calls.lock().await.push(contacts.to_vec());
        let mut guard = self.upsert_responses.lock().await;
        guard
            .pop_front()
            .unwrap_or_else(|| Ok(Outcome::Sentinel(EMAIL_UPDATED)))
    }

    async fn delete_blocked_contact(&self, email: &str) -> Result<Outcome> {
        self.delete_calls.lock().await.push(email.to_string());
        Ok(Outcome::Sentinel(TRANSACTIONAL_UNBLOCKED))
    }
}

fn data_dir_with_input(rows: &[&str]) -> TempDir {
    let td = tempdir().unwrap();
    let input = td.path().join("in/tables");
    fs::create_dir_all(&input).unwrap();
    let mut content = format!("{HEADER}\n");
    for row in rows {
        content.push_str(row);
        content.push('\n');
    }
    fs::write(input.join("contacts.csv"), content).unwrap();
    td
}

fn output_rows(root: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::Reader::from_path(root.join("out/tables/output.csv")).unwrap();
    assert_eq!(
        reader.headers().unwrap().iter().collect::<Vec<_>>(),
        vec!["id", "timestamp", "email", "status"]
    );
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

#[tokio::test]
async fn transactional_contacts_get_two_rows() {
    let td = data_dir_with_input(&[
        "a@example.com,true,FALSE,TRUE,Ann",
        "b@example.com,xyz,True,false,Bob",
        "c@example.com,,,,Cid",
    ]);
    let service = RecordingContacts::default();

    let summary = sync::run(&DataDir::new(td.path()), 1, &service).await.unwrap();

    assert_eq!(summary.batches, 3);
    assert_eq!(summary.deletions, 1);
    assert_eq!(summary.rows, 4);

    let upserts = service.upsert_calls().await;
    assert_eq!(upserts.len(), 3);
    assert_eq!(
        upserts[0],
        vec![ContactRecord {
            email: "a@example.com".into(),
            email_blacklisted: true,
            sms_blacklisted: false,
            transactional_contact: true,
        }]
    );
    assert!(upserts[1][0].sms_blacklisted && !upserts[1][0].email_blacklisted);
    assert_eq!(service.delete_calls().await, vec!["a@example.com"]);

    let rows = output_rows(td.path());
    let summary_view: Vec<(&str, &str)> = rows
        .iter()
        .map(|r| (r[2].as_str(), r[3].as_str()))
        .collect();
    assert_eq!(
        summary_view,
        vec![
            ("a@example.com", "Email updated (Sms,Email)"),
            ("a@example.com", "Unblock or resubscribe a transactional Email"),
            ("b@example.com", "Email updated (Sms,Email)"),
            ("c@example.com", "Email updated (Sms,Email)"),
        ]
    );
    for row in &rows {
        assert_eq!(row[0].len(), 64);
        assert_eq!(row[1].len(), 19);
    }
}

#[tokio::test]
async fn structured_and_not_found_outcomes_are_recorded() {
    let td = data_dir_with_input(&["a@example.com,false,false,false,Ann", "b@example.com,false,false,false,Bob"]);
    let service = RecordingContacts::with_upserts(vec![
        UPSERT_CONTACTS.resolve(200, r#"{"status":"queued"}"#),
        UPSERT_CONTACTS.resolve(404, r#"{"code":"document_not_found"}"#),
    ]);

    sync::run(&DataDir::new(td.path()), 1, &service).await.unwrap();

    let statuses: Vec<String> = output_rows(td.path()).into_iter().map(|r| r[3].clone()).collect();
    assert_eq!(statuses, vec!["queued", "Email not found"]);
}

#[tokio::test]
async fn larger_batches_share_one_upsert_outcome() {
    let td = data_dir_with_input(&[
        "a@example.com,false,false,false,Ann",
        "b@example.com,false,false,false,Bob",
        "c@example.com,false,false,false,Cid",
    ]);
    let service = RecordingContacts::with_upserts(vec![Ok(Outcome::Structured(json!({ "id": 1 })))]);

    let summary = sync::run(&DataDir::new(td.path()), 2, &service).await.unwrap();

    assert_eq!(summary.batches, 2);
    let sizes: Vec<usize> = service.upsert_calls().await.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 1]);
    let statuses: Vec<String> = output_rows(td.path()).into_iter().map(|r| r[3].clone()).collect();
    assert_eq!(statuses, vec!["Error", "Error", "Email updated (Sms,Email)"]);
}

#[tokio::test]
async fn fatal_api_error_stops_the_run_and_keeps_written_rows() {
    let td = data_dir_with_input(&[
        "a@example.com,false,false,false,Ann",
        "b@example.com,false,false,false,Bob",
        "c@example.com,false,false,false,Cid",
    ]);
    let service = RecordingContacts::with_upserts(vec![
        Ok(Outcome::Sentinel(EMAIL_UPDATED)),
        UPSERT_CONTACTS.resolve(500, "upstream exploded"),
    ]);

    let err = sync::run(&DataDir::new(td.path()), 1, &service)
        .await
        .unwrap_err();

    assert_eq!(exit_code(&err), 1);
    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::Api { status: 500, .. })
    ));
    assert_eq!(service.upsert_calls().await.len(), 2);

    // The output table was closed and flushed despite the failure.
    let rows = output_rows(td.path());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][2], "a@example.com");
}

#[tokio::test]
async fn unexpected_service_error_exits_with_two() {
    let td = data_dir_with_input(&["a@example.com,false,false,false,Ann"]);
    let service = RecordingContacts::with_upserts(vec![Err(anyhow!("connection reset"))]);

    let err = sync::run(&DataDir::new(td.path()), 1, &service)
        .await
        .unwrap_err();

    assert_eq!(exit_code(&err), 2);
    assert!(output_rows(td.path()).is_empty());
}

#[tokio::test]
async fn empty_table_makes_no_calls() {
    let td = data_dir_with_input(&[]);
    let service = RecordingContacts::default();

    let summary = sync::run(&DataDir::new(td.path()), 1, &service).await.unwrap();

    assert_eq!(summary, SyncSummary::default());
    assert!(service.upsert_calls().await.is_empty());
    assert_eq!(
        fs::read_to_string(td.path().join("out/tables/output.csv")).unwrap(),
        "id,timestamp,email,status\r\n"
    );
    assert!(td.path().join("out/tables/output.csv.manifest").exists());
}

#[tokio::test]
async fn input_table_count_is_validated() {
    let service = RecordingContacts::default();

    let td = tempdir().unwrap();
    let err = sync::run(&DataDir::new(td.path()), 1, &service)
        .await
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<SyncError>(), Some(SyncError::NoInputTable)));
    assert_eq!(exit_code(&err), 1);
    // Output is opened before the input is inspected.
    assert!(output_rows(td.path()).is_empty());

    let td = data_dir_with_input(&[]);
    fs::write(td.path().join("in/tables/other.csv"), format!("{HEADER}\n")).unwrap();
    let err = sync::run(&DataDir::new(td.path()), 1, &service)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::TooManyInputTables(2))
    ));
    assert!(service.upsert_calls().await.is_empty());
}

#[tokio::test]
async fn missing_column_is_a_user_error() {
    let td = tempdir().unwrap();
    let input = td.path().join("in/tables");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("contacts.csv"), "email,emailBlacklisted\na@example.com,true\n").unwrap();
    let service = RecordingContacts::default();

    let err = sync::run(&DataDir::new(td.path()), 1, &service)
        .await
        .unwrap_err();

    match err.downcast_ref::<SyncError>() {
        Some(SyncError::MissingColumn { column, .. }) => assert_eq!(column, "smsBlacklisted"),
        other => panic!("wrong error: {other:?}"),
    }
    assert_eq!(exit_code(&err), 1);
}
