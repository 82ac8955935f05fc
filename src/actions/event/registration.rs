//! Registration profiles joined to an event once it exists

use crate::actions::action::{ActionDefinition, SettingsGroup};
use crate::actions::context::SubmissionContext;
use crate::actions::entity;
use crate::actions::field_specs::{FieldKind, REGISTRATION_PROFILES};
use crate::actions::results::ActionResult;
use crate::api::constants::{defaults, tables};
use crate::api::models::Record;
use crate::form::ActionInstance;
use serde_json::json;

/// Settings groups through which the profiles are mapped
pub fn profile_groups(definition: &ActionDefinition) -> Vec<SettingsGroup> {
    REGISTRATION_PROFILES
        .iter()
        .map(|profile| {
            let mut fields = vec![definition.mapping_field(
                &profile.gate_code(),
                &format!("{} Conditional Reference", profile.label),
                FieldKind::Text,
                false,
            )];
            fields.extend(profile.fields.iter().map(|spec| {
                definition.mapping_field(&profile.mapping_code(spec.code), profile.label, spec.kind, spec.required)
            }));
            SettingsGroup {
                key: profile.key.to_string(),
                label: profile.label.to_string(),
                fields,
            }
        })
        .collect()
}

/// Join the mapped profiles to the event, in order
pub async fn write_profiles(ctx: &SubmissionContext<'_>, instance: &ActionInstance, event_id: i64, result: &mut ActionResult) {
    for (weight, profile) in REGISTRATION_PROFILES.iter().enumerate() {
        let mut links = Record::new();
        links.insert("module".to_string(), json!(defaults::PROFILE_MODULE));
        links.insert("entity_table".to_string(), json!(tables::EVENT));
        links.insert("entity_id".to_string(), json!(event_id));
        links.insert("weight".to_string(), json!(weight + 1));
        links.insert("is_active".to_string(), json!(true));

        if let Some(outcome) = entity::write_block(ctx, instance, profile, &links).await {
            result.set_nested(profile.key, outcome);
        }
    }
}
