//! Integration tests for contact updates

mod common;

use anyhow::Result;
use common::Harness;
use crm_form_actions::api::operations::Operation;
use crm_form_actions::form::{ActionInstance, Form, Submission};
use serde_json::json;

/// Updating a referenced contact leaves its stored type alone
#[tokio::test]
async fn test_update_keeps_contact_type() -> Result<()> {
    let harness = Harness::new()?;
    harness
        .gateway
        .seed("Contact", json!({"id": 5, "contact_type": "Organization", "organization_name": "Acme"}));
    let form = Form::new("CF1").with_action(
        ActionInstance::new("cwps_contact", "org")
            .with_field("phone_1.phone", "%phone%")
            .with_settings(json!({"contact": {"id": 5}})),
    );

    let report = harness.submit(&form, &Submission::new().with_value("phone", "0113 496 0000")).await?;

    assert_eq!(report.results.id_of("org"), Some(5));
    let contact = harness.gateway.record("Contact", 5).expect("stored contact");
    assert_eq!(contact.get("contact_type"), Some(&json!("Organization")));
    let operations = harness.gateway.operations();
    let updates: Vec<&serde_json::Value> = operations
        .operations()
        .iter()
        .filter_map(|operation| match operation {
            Operation::Update { data, .. } => Some(data),
            _ => None,
        })
        .collect();
    assert_eq!(updates.len(), 1);
    assert!(updates[0].get("contact_type").is_none());
    assert_eq!(harness.gateway.records("Phone").len(), 1);
    Ok(())
}

/// A mapped type is still written on update
#[tokio::test]
async fn test_update_writes_mapped_contact_type() -> Result<()> {
    let harness = Harness::new()?;
    harness
        .gateway
        .seed("Contact", json!({"id": 5, "contact_type": "Individual", "first_name": "Jo"}));
    let form = Form::new("CF1").with_action(
        ActionInstance::new("cwps_contact", "household")
            .with_field("contact_type", "household")
            .with_field("household_name", "The Bloggs")
            .with_settings(json!({"contact": {"id": 5}})),
    );

    harness.submit(&form, &Submission::new()).await?;

    let contact = harness.gateway.record("Contact", 5).expect("stored contact");
    assert_eq!(contact.get("contact_type"), Some(&json!("Household")));
    Ok(())
}

/// Dedupe matches regardless of type when the form maps none
#[tokio::test]
async fn test_dedupe_ignores_default_contact_type() -> Result<()> {
    let harness = Harness::new()?;
    harness
        .gateway
        .seed("Contact", json!({"id": 7, "contact_type": "Organization", "organization_name": "Acme"}));
    harness
        .gateway
        .seed("Email", json!({"id": 1, "contact_id": 7, "email": "info@acme.org"}));
    let form = Form::new("CF1").with_action(
        ActionInstance::new("cwps_contact", "enquirer")
            .with_field("email_1.email", "%email%")
            .with_settings(json!({"dedupe_fields": ["email"]})),
    );

    let report = harness.submit(&form, &Submission::new().with_value("email", "info@acme.org")).await?;

    assert_eq!(report.results.id_of("enquirer"), Some(7));
    assert_eq!(harness.gateway.operations().creates(Some("Contact")), 0);
    let contact = harness.gateway.record("Contact", 7).expect("stored contact");
    assert_eq!(contact.get("contact_type"), Some(&json!("Organization")));
    Ok(())
}
