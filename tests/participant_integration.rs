//! Integration tests for event registration through the participant action

mod common;

use anyhow::Result;
use common::Harness;
use crm_form_actions::api::models::value_as_id;
use crm_form_actions::form::{ActionInstance, Form, Submission};
use serde_json::json;

/// Event 3 holds one seat, already taken by a counted attendee
fn seed_full_event(harness: &Harness) {
    harness.gateway.seed(
        "OptionValue",
        json!({"option_group_id:name": "participant_role", "value": 1, "name": "Attendee", "label": "Attendee", "filter": 1}),
    );
    harness.gateway.seed(
        "OptionValue",
        json!({"option_group_id:name": "participant_role", "value": 2, "name": "Volunteer", "label": "Volunteer", "filter": 0}),
    );
    harness
        .gateway
        .seed("Event", json!({"id": 3, "title": "Open Day", "event_type_id": 1, "max_participants": 1}));
    harness.gateway.seed("Contact", json!({"id": 12, "first_name": "Jo"}));
    seed_statuses(harness);
    harness
        .gateway
        .seed("Participant", json!({"id": 1, "event_id": 3, "contact_id": 40, "role_id": [1], "status_id": 1}));
}

fn seed_statuses(harness: &Harness) {
    harness
        .gateway
        .seed("ParticipantStatusType", json!({"id": 1, "name": "Registered", "is_counted": 1}));
    harness
        .gateway
        .seed("ParticipantStatusType", json!({"id": 4, "name": "Cancelled", "is_counted": 0}));
}

fn participant(settings: serde_json::Value) -> ActionInstance {
    ActionInstance::new("cwps_participant", "registration").with_settings(settings)
}

/// A counted role cannot register for a full event
#[tokio::test]
async fn test_full_event_is_rejected() -> Result<()> {
    let harness = Harness::new()?;
    seed_full_event(&harness);
    let form = Form::new("CF1").with_action(participant(json!({"event": {"id": 3}, "contact": {"id": 12}})));

    let errors = harness.reject(&form, &Submission::new()).await?;

    assert_eq!(errors.len(), 1);
    assert_eq!(errors.errors()[0].field, "event");
    assert_eq!(errors.errors()[0].message, "This event is full");
    assert!(harness.gateway.operations().is_empty());
    Ok(())
}

/// A cancelled registration gives its seat back
#[tokio::test]
async fn test_cancelled_registration_frees_seat() -> Result<()> {
    let harness = Harness::new()?;
    harness.gateway.seed(
        "OptionValue",
        json!({"option_group_id:name": "participant_role", "value": 1, "name": "Attendee", "label": "Attendee", "filter": 1}),
    );
    seed_statuses(&harness);
    harness
        .gateway
        .seed("Event", json!({"id": 3, "title": "Open Day", "event_type_id": 1, "max_participants": 1}));
    harness.gateway.seed("Contact", json!({"id": 12, "first_name": "Jo"}));
    harness
        .gateway
        .seed("Participant", json!({"id": 1, "event_id": 3, "contact_id": 40, "role_id": [1], "status_id": 4}));
    let form = Form::new("CF1").with_action(participant(json!({"event": {"id": 3}, "contact": {"id": 12}})));

    let report = harness.submit(&form, &Submission::new()).await?;

    let id = report.results.id_of("registration").expect("participant id");
    let participant = harness.gateway.record("Participant", id).expect("stored");
    assert_eq!(participant.get("status_id").and_then(value_as_id), Some(1));
    assert_eq!(harness.gateway.operations().creates(Some("Participant")), 1);
    Ok(())
}

/// `add_anyway` registers past capacity
#[tokio::test]
async fn test_add_anyway_ignores_capacity() -> Result<()> {
    let harness = Harness::new()?;
    seed_full_event(&harness);
    let form = Form::new("CF1").with_action(participant(json!({
        "event": {"id": 3},
        "contact": {"id": 12},
        "add_anyway": true,
    })));

    let report = harness.submit(&form, &Submission::new()).await?;

    let published = report.results.get_result("registration").expect("published result");
    assert_eq!(published.nested("full"), Some(&json!(false)));
    let participant = harness.gateway.record("Participant", published.id.expect("participant id")).expect("stored");
    assert_eq!(participant.get("contact_id").and_then(value_as_id), Some(12));
    assert_eq!(participant.get("role_id"), Some(&json!([1])));
    assert_eq!(participant.get("status_id").and_then(value_as_id), Some(1));
    Ok(())
}

/// Roles that do not count toward capacity still register
#[tokio::test]
async fn test_uncounted_role_registers_for_full_event() -> Result<()> {
    let harness = Harness::new()?;
    seed_full_event(&harness);
    let form = Form::new("CF1").with_action(
        participant(json!({"event": {"id": 3}, "contact": {"id": 12}})).with_field("role_id", "Volunteer"),
    );

    let report = harness.submit(&form, &Submission::new()).await?;

    let id = report.results.id_of("registration").expect("participant id");
    let participant = harness.gateway.record("Participant", id).expect("stored");
    assert_eq!(participant.get("role_id"), Some(&json!([2])));
    assert_eq!(harness.gateway.operations().creates(Some("Participant")), 1);
    Ok(())
}

/// An event that fills up between validation and make is reported as full
#[tokio::test]
async fn test_full_at_make_time_is_skipped() -> Result<()> {
    let harness = Harness::new()?;
    seed_full_event(&harness);
    let form = Form::new("CF1").with_action(participant(json!({"event": {"id": 3}, "contact": {"id": 12}})));
    let submission = Submission::new();
    let processor = harness.processor()?;

    let mut run = processor.begin(&form, &submission)?;
    run.enter_make();
    let outcome = run.make_action(&form.actions[0]).await?;

    assert_eq!(outcome.result().id, None);
    assert_eq!(outcome.result().nested("full"), Some(&json!(true)));
    assert_eq!(harness.gateway.operations().writes(), 0);
    Ok(())
}

/// Registration for the event and contact created earlier in the submission
#[tokio::test]
async fn test_register_contact_created_in_same_submission() -> Result<()> {
    let harness = Harness::new()?;
    seed_full_event(&harness);
    harness
        .gateway
        .seed("Event", json!({"id": 8, "title": "Workshop", "event_type_id": 2, "max_participants": 20}));
    let form = Form::new("CF1")
        .with_action(ActionInstance::new("cwps_contact", "new_contact").with_field("first_name", "%first_name%"))
        .with_action(participant(json!({"event": {"field": "%event%"}, "contact": "new_contact"})));
    let submission = Submission::new().with_value("first_name", "Al").with_value("event", "8");

    let report = harness.submit(&form, &submission).await?;

    let contact_id = report.results.id_of("new_contact").expect("contact id");
    let id = report.results.id_of("registration").expect("participant id");
    let participant = harness.gateway.record("Participant", id).expect("stored");
    assert_eq!(participant.get("contact_id").and_then(value_as_id), Some(contact_id));
    assert_eq!(participant.get("event_id").and_then(value_as_id), Some(8));
    Ok(())
}
