//! Integration tests for the submission pipeline
//!
//! Covers cross-action references, validation before any write, gates and
//! redirects, using the in-memory CRM.

mod common;

use anyhow::Result;
use common::Harness;
use crm_form_actions::ActionRegistry;
use crm_form_actions::actions::contact::ContactAction;
use crm_form_actions::api::models::value_as_id;
use crm_form_actions::form::{ActionInstance, Form, Submission};
use crm_form_actions::pipeline::SubmissionOutcome;
use serde_json::json;

fn contact_then_case() -> Form {
    Form::new("CF_HOUSING")
        .with_action(ActionInstance::new("cwps_contact", "new_contact").with_field("first_name", "%first_name%"))
        .with_action(
            ActionInstance::new("cwps_case", "new_case")
                .with_field("case_type_id", "Housing Support")
                .with_settings(json!({"contact": "new_contact"})),
        )
}

/// A case references the contact created earlier in the same submission
#[tokio::test]
async fn test_new_contact_then_new_case() -> Result<()> {
    let harness = Harness::new()?;
    harness
        .gateway
        .seed("CaseType", json!({"id": 1, "name": "housing_support", "title": "Housing Support"}));

    let report = harness
        .submit(&contact_then_case(), &Submission::new().with_value("first_name", "Jo"))
        .await?;

    let contact_id = report.results.id_of("new_contact").expect("contact id");
    let case_id = report.results.id_of("new_case").expect("case id");
    let case = harness.gateway.record("Case", case_id).expect("stored case");

    assert_eq!(case.get("contact_id").and_then(value_as_id), Some(contact_id));
    assert_eq!(case.get("case_type_id").and_then(value_as_id), Some(1));
    assert_eq!(case.get("status_id").and_then(value_as_id), Some(1));
    assert_eq!(
        harness.gateway.record("Contact", contact_id).and_then(|c| c.get("first_name").cloned()),
        Some(json!("Jo"))
    );
    assert!(report.redirect.is_none());
    Ok(())
}

/// A failing action leaves nothing written when validation rejects the submission
#[tokio::test]
async fn test_validation_failure_writes_nothing() -> Result<()> {
    let harness = Harness::new()?;
    harness
        .gateway
        .seed("CaseType", json!({"id": 1, "name": "housing_support", "title": "Housing Support"}));

    let errors = harness.reject(&contact_then_case(), &Submission::new()).await?;

    assert_eq!(errors.len(), 1);
    assert_eq!(errors.errors()[0].alias, "new_contact");
    assert!(harness.gateway.operations().is_empty());
    Ok(())
}

/// A closed entity gate skips the action without error and without writes
#[tokio::test]
async fn test_closed_gate_writes_nothing() -> Result<()> {
    let harness = Harness::new()?;
    let form = Form::new("CF1").with_action(
        ActionInstance::new("cwps_contact", "new_contact")
            .with_field("first_name", "%first_name%")
            .with_conditional("%create_contact%"),
    );
    let submission = Submission::new().with_value("first_name", "Jo").with_value("create_contact", "0");

    let report = harness.submit(&form, &submission).await?;

    assert_eq!(harness.gateway.operations().writes(), 0);
    let published = report.results.get_result("new_contact").expect("published result");
    assert_eq!(published.to_value()["id"], json!(false));
    assert_eq!(published.to_value()["contact"], json!(false));
    Ok(())
}

/// An unmapped block gate always runs; a mapped empty one skips the block
#[tokio::test]
async fn test_block_gates() -> Result<()> {
    let harness = Harness::new()?;
    let form = Form::new("CF1").with_action(
        ActionInstance::new("cwps_contact", "new_contact")
            .with_field("first_name", "%first_name%")
            .with_field("email_1.email", "%email%")
            .with_field("phone_1.phone", "%phone%")
            .with_field("phone_1.conditional", "%add_phone%"),
    );
    let submission = Submission::new()
        .with_value("first_name", "Jo")
        .with_value("email", "jo@example.org")
        .with_value("phone", "555-0100")
        .with_value("add_phone", "");

    let report = harness.submit(&form, &submission).await?;

    let operations = harness.gateway.operations();
    assert_eq!(operations.creates(Some("Email")), 1);
    assert_eq!(operations.creates(Some("Phone")), 0);
    let published = report.results.get_result("new_contact").expect("published result");
    let contact_id = published.id.expect("contact id");
    assert_eq!(published.nested("email_1").and_then(|email| email.get("contact_id")), Some(&json!(contact_id)));
    assert!(published.nested("phone_1").is_none());
    Ok(())
}

/// Results are published under both the action name and the alias; a later
/// action of the same type overwrites the action-name key only
#[tokio::test]
async fn test_results_are_keyed_by_name_and_alias() -> Result<()> {
    let harness = Harness::new()?;
    let form = Form::new("CF1")
        .with_action(ActionInstance::new("cwps_contact", "applicant").with_field("first_name", "Jo"))
        .with_action(ActionInstance::new("cwps_contact", "partner").with_field("first_name", "Al"));

    let report = harness.submit(&form, &Submission::new()).await?;

    assert_eq!(report.results.id_of("applicant"), Some(1));
    assert_eq!(report.results.id_of("partner"), Some(2));
    assert_eq!(report.results.id_of("cwps_contact"), Some(2));
    let aliases: Vec<&str> = report.results.by_alias().map(|(alias, _)| alias).collect();
    assert_eq!(aliases, vec!["applicant", "partner"]);
    Ok(())
}

/// An action reference that produced no id falls back to the direct id
#[tokio::test]
async fn test_reference_falls_back_when_action_wrote_nothing() -> Result<()> {
    let harness = Harness::new()?;
    harness
        .gateway
        .seed("CaseType", json!({"id": 1, "name": "housing_support", "title": "Housing Support"}));
    let client = harness.gateway.seed("Contact", json!({"id": 99, "first_name": "Existing"}));
    let form = Form::new("CF1")
        .with_action(
            ActionInstance::new("cwps_contact", "new_contact")
                .with_field("first_name", "%first_name%")
                .with_conditional("%create_contact%"),
        )
        .with_action(
            ActionInstance::new("cwps_case", "new_case")
                .with_field("case_type_id", "1")
                .with_settings(json!({"contact": {"action": "new_contact", "id": client}})),
        );
    let submission = Submission::new().with_value("first_name", "Jo").with_value("create_contact", "");

    let report = harness.submit(&form, &submission).await?;

    let case_id = report.results.id_of("new_case").expect("case id");
    let case = harness.gateway.record("Case", case_id).expect("stored case");
    assert_eq!(case.get("contact_id").and_then(value_as_id), Some(99));
    assert_eq!(harness.gateway.operations().creates(Some("Contact")), 0);
    Ok(())
}

/// A redirect stops the actions configured after it
#[tokio::test]
async fn test_redirect_halts_the_pipeline() -> Result<()> {
    let harness = Harness::new()?;
    let form = Form::new("CF1")
        .with_action(ActionInstance::new("cwps_contact", "new_contact").with_field("first_name", "Jo"))
        .with_action(ActionInstance::new("cwps_redirect", "thanks").with_field("url", "https://example.org/thanks"))
        .with_action(
            ActionInstance::new("cwps_case", "new_case")
                .with_field("case_type_id", "1")
                .with_settings(json!({"contact": "new_contact"})),
        );

    let report = harness.submit(&form, &Submission::new()).await?;

    assert_eq!(report.redirect.as_deref(), Some("https://example.org/thanks"));
    assert_eq!(report.not_run, vec!["new_case".to_string()]);
    assert!(report.results.get_result("new_case").is_none());
    assert_eq!(harness.gateway.operations().creates(Some("Case")), 0);
    assert_eq!(harness.gateway.operations().creates(Some("Contact")), 1);
    Ok(())
}

/// A failed primary write publishes `id: false` and later actions still run
#[tokio::test]
async fn test_failed_write_publishes_false() -> Result<()> {
    let harness = Harness::new()?;
    harness.gateway.fail_creates_for("Contact");
    let form = Form::new("CF1")
        .with_action(ActionInstance::new("cwps_contact", "new_contact").with_field("first_name", "Jo"))
        .with_action(ActionInstance::new("cwps_contact", "second").with_field("first_name", "Al"));

    let report = harness.submit(&form, &Submission::new()).await?;

    let value = report.results.to_value();
    assert_eq!(value["new_contact"]["id"], json!(false));
    assert_eq!(value["second"]["id"], json!(false));
    assert_eq!(value["second"]["form_action"], json!("cwps_contact"));
    Ok(())
}

/// Unknown action types and duplicate aliases fail before anything runs
#[tokio::test]
async fn test_form_is_checked_before_running() -> Result<()> {
    let harness = Harness::new()?;
    let unknown = Form::new("CF1")
        .with_action(ActionInstance::new("cwps_contact", "new_contact").with_field("first_name", "Jo"))
        .with_action(ActionInstance::new("cwps_grant", "grant"));
    assert!(harness.processor()?.submit(&unknown, &Submission::new()).await.is_err());

    let duplicate = Form::new("CF2")
        .with_action(ActionInstance::new("cwps_contact", "c").with_field("first_name", "Jo"))
        .with_action(ActionInstance::new("cwps_contact", "c").with_field("first_name", "Al"));
    assert!(harness.processor()?.submit(&duplicate, &Submission::new()).await.is_err());

    assert!(harness.gateway.operations().is_empty());
    Ok(())
}

/// Hosts can drive validate and make themselves, one action at a time
#[tokio::test]
async fn test_host_driven_lifecycle() -> Result<()> {
    let harness = Harness::new()?;
    harness
        .gateway
        .seed("CaseType", json!({"id": 1, "name": "housing_support", "title": "Housing Support"}));
    let form = contact_then_case();
    let submission = Submission::new().with_value("first_name", "Jo");
    let processor = harness.processor()?;

    let mut run = processor.begin(&form, &submission)?;
    for instance in &form.actions {
        assert!(run.validate_action(instance).await?.is_empty());
    }
    run.enter_make();
    for instance in &form.actions {
        run.make_action(instance).await?;
    }

    let results = run.into_results();
    assert_eq!(results.id_of("new_contact"), Some(1));
    assert_eq!(results.id_of("new_case"), Some(1));
    Ok(())
}

/// Form schemas carry option choices loaded from the CRM
#[tokio::test]
async fn test_load_form_schema() -> Result<()> {
    let harness = Harness::new()?;
    harness.gateway.seed(
        "OptionValue",
        json!({"option_group_id:name": "activity_type", "value": "3", "name": "Meeting", "label": "Meeting"}),
    );
    let form = Form::new("CF1")
        .with_action(ActionInstance::new("cwps_contact", "new_contact"))
        .with_action(ActionInstance::new("cwps_activity", "new_activity"));

    let schema = harness.processor()?.load(&form).await?;

    assert_eq!(schema.actions.len(), 2);
    let activity = &schema.actions[1];
    let activity_type = activity
        .fields
        .iter()
        .find(|field| field.code == "activity_type_id")
        .expect("activity type field");
    assert_eq!(activity_type.key, "cwps_activity_activity_type_id");
    assert_eq!(activity_type.choices.len(), 1);
    assert_eq!(activity_type.choices[0].label, "Meeting");

    let source = activity.settings.iter().find(|group| group.key == "source").expect("source group");
    let action_choices: Vec<&str> = source.fields[0].choices.iter().map(|choice| choice.label.as_str()).collect();
    assert_eq!(action_choices, vec!["new_contact"]);
    Ok(())
}

/// A processor only runs the action types its registry holds
#[tokio::test]
async fn test_custom_registry() -> Result<()> {
    let harness = Harness::new()?;
    let mut registry = ActionRegistry::new();
    registry.register(Box::new(ContactAction))?;
    let processor = harness.processor()?.with_registry(registry);
    let contact_only = Form::new("CF1").with_action(ActionInstance::new("cwps_contact", "c").with_field("first_name", "Jo"));
    let with_redirect = Form::new("CF2")
        .with_action(ActionInstance::new("cwps_contact", "c").with_field("first_name", "Jo"))
        .with_action(ActionInstance::new("cwps_redirect", "thanks").with_field("url", "https://example.org"));

    assert!(matches!(
        processor.submit(&contact_only, &Submission::new()).await?,
        SubmissionOutcome::Completed(_)
    ));
    let err = processor.submit(&with_redirect, &Submission::new()).await.unwrap_err();
    assert!(err.to_string().contains("cwps_redirect"));
    assert_eq!(processor.registry().names(), vec!["cwps_contact"]);
    Ok(())
}
