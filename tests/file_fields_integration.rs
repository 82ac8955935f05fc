//! Integration tests for File custom fields and attachment slots

mod common;

use anyhow::Result;
use common::Harness;
use crm_form_actions::api::models::value_as_id;
use crm_form_actions::api::operations::Operation;
use crm_form_actions::files::FileStore;
use crm_form_actions::form::{ActionInstance, FileFieldOptions, Form, Submission};
use serde_json::{Value, json};

/// Contact 5 holds CRM file 40 in its File field `custom_3`, stored as `documents.cv`
fn seed_contact_with_file(harness: &Harness) -> Result<()> {
    harness.gateway.seed(
        "CustomGroup",
        json!({"id": 2, "name": "documents", "title": "Documents", "extends": "Individual", "is_active": true}),
    );
    harness.gateway.seed(
        "CustomField",
        json!({"id": 3, "custom_group_id": 2, "name": "cv", "label": "CV", "data_type": "File", "html_type": "File"}),
    );
    harness
        .gateway
        .seed("Contact", json!({"id": 5, "contact_type": "Individual", "first_name": "Jo", "documents.cv": 40}));
    harness
        .gateway
        .seed("Attachment", json!({"id": 40, "name": "old.pdf", "entity_table": "civicrm_contact", "entity_id": 5}));

    let staged = harness.stage("old", "old.pdf", b"old")?;
    harness.files.store(40, &staged.path, &staged.name)?;
    Ok(())
}

fn update_contact(options: FileFieldOptions) -> Form {
    Form::new("CF_CV").with_action(
        ActionInstance::new("cwps_contact", "me")
            .with_field("custom_3", "%cv%")
            .with_file_options("custom_3", options)
            .with_settings(json!({"contact": {"id": 5}})),
    )
}

/// Submitting a File field empty removes the file everywhere
#[tokio::test]
async fn test_empty_file_field_clears_stored_file() -> Result<()> {
    let harness = Harness::new()?;
    seed_contact_with_file(&harness)?;
    let local = harness.files.local_path(40).expect("stored copy");

    let report = harness
        .submit(&update_contact(FileFieldOptions::default()), &Submission::new().with_value("cv", ""))
        .await?;

    assert!(!local.exists());
    assert!(harness.files.local_path(40).is_none());
    assert!(harness.gateway.record("Attachment", 40).is_none());
    let contact = harness.gateway.record("Contact", 5).expect("contact");
    assert_eq!(contact.get("documents.cv"), Some(&Value::Null));

    let published = report.results.get_result("me").expect("published result");
    assert_eq!(published.nested("cleared_files"), Some(&json!(["custom_3"])));
    Ok(())
}

/// Fields kept only in the CRM are never cleared locally
#[tokio::test]
async fn test_crm_only_field_keeps_file() -> Result<()> {
    let harness = Harness::new()?;
    seed_contact_with_file(&harness)?;
    let local = harness.files.local_path(40).expect("stored copy");

    let report = harness
        .submit(&update_contact(FileFieldOptions { crm_only: true }), &Submission::new().with_value("cv", ""))
        .await?;

    assert!(local.exists());
    assert!(harness.gateway.record("Attachment", 40).is_some());
    let contact = harness.gateway.record("Contact", 5).expect("contact");
    assert_eq!(contact.get("documents.cv").and_then(value_as_id), Some(40));
    let published = report.results.get_result("me").expect("published result");
    assert!(published.nested("cleared_files").is_none());
    Ok(())
}

/// A new upload becomes a CRM attachment and a local copy under its id
#[tokio::test]
async fn test_upload_is_attached_and_stored() -> Result<()> {
    let harness = Harness::new()?;
    seed_contact_with_file(&harness)?;
    let upload = harness.stage("cv", "cv.pdf", b"curriculum")?;
    let staged = upload.path.clone();
    let submission = Submission::new().with_value("cv", "cv.pdf").with_upload(upload);

    harness.submit(&update_contact(FileFieldOptions::default()), &submission).await?;

    let contact = harness.gateway.record("Contact", 5).expect("contact");
    let file_id = contact.get("documents.cv").and_then(value_as_id).expect("new file id");
    assert_eq!(file_id, 41);
    let stored = harness.files.local_path(file_id).expect("stored copy");
    assert_eq!(std::fs::read(stored)?, b"curriculum");
    assert!(staged.exists());
    assert!(harness.gateway.operations().operations().iter().any(|operation| matches!(
        operation,
        Operation::Attach { entity_table, entity_id: 5, file_name } if entity_table == "civicrm_contact" && file_name == "cv.pdf"
    )));
    Ok(())
}

/// CRM-only uploads are attached and the staged file is dropped
#[tokio::test]
async fn test_crm_only_upload_is_not_kept() -> Result<()> {
    let harness = Harness::new()?;
    seed_contact_with_file(&harness)?;
    let upload = harness.stage("cv", "cv.pdf", b"curriculum")?;
    let staged = upload.path.clone();
    let submission = Submission::new().with_value("cv", "cv.pdf").with_upload(upload);

    harness.submit(&update_contact(FileFieldOptions { crm_only: true }), &submission).await?;

    assert!(!staged.exists());
    assert!(harness.files.local_path(41).is_none());
    assert!(harness.gateway.record("Attachment", 41).is_some());
    Ok(())
}

/// Generic attachment slots attach to the new entity with their description
#[tokio::test]
async fn test_attachment_slots() -> Result<()> {
    let harness = Harness::new()?;
    let upload = harness.stage("letter", "letter.pdf", b"letter")?;
    let form = Form::new("CF1").with_action(
        ActionInstance::new("cwps_contact", "new_contact")
            .with_field("first_name", "Jo")
            .with_field("attachment_1", "%letter%")
            .with_field("attachment_1.description", "Referral letter"),
    );
    let submission = Submission::new().with_value("letter", "letter.pdf").with_upload(upload);

    let report = harness.submit(&form, &submission).await?;

    let published = report.results.get_result("new_contact").expect("published result");
    let attachments = published.nested("attachments").and_then(Value::as_array).expect("attachments");
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0]["description"], json!("Referral letter"));
    assert_eq!(attachments[0]["entity_id"], json!(published.id.expect("contact id")));
    Ok(())
}
