//! Participant action
//!
//! Roles split into those counted toward an event's capacity and those
//! that are not. A counted registration for a full event is rejected
//! during validation and skipped in `make` unless `add_anyway` is set.

use super::action::{ActionDefinition, FormAction, MakeOutcome, SettingsGroup};
use super::attachments::write_attachments;
use super::context::SubmissionContext;
use super::custom_fields::{ExtendsContext, write_custom_fields};
use super::entity::{self, EntityData, EntityTarget};
use super::field_specs::{EntitySchema, PARTICIPANT_SCHEMA};
use super::references::{EntityReference, Resolution, lookup_option, lookup_options};
use super::results::ActionResult;
use super::validation::ValidationError;
use crate::api::constants::{defaults, entities, option_groups, tables};
use crate::form::{ActionInstance, Form};
use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;

pub static DEFINITION: ActionDefinition = ActionDefinition {
    action_name: "cwps_participant",
    action_label: "CiviCRM Participant",
    alias_placeholder: "new_participant",
    field_key_prefix: "cwps_participant_",
    field_name_prefix: "Participant ",
};

/// Custom group columns a participant group can filter on
const ROLE_COLUMN: i64 = 1;
const EVENT_COLUMN: i64 = 2;
const EVENT_TYPE_COLUMN: i64 = 3;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ParticipantSettings {
    pub event: EntityReference,
    pub contact: EntityReference,
    /// Register even when the event is full
    pub add_anyway: bool,
}

pub struct ParticipantAction;

impl ParticipantAction {
    async fn roles(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> Result<Vec<i64>> {
        let roles = match entity::resolve_field(instance, &ctx.mapper(), "role_id") {
            Some(value) => lookup_options(ctx.gateway, option_groups::PARTICIPANT_ROLE, &value).await?,
            None => Vec::new(),
        };
        Ok(if roles.is_empty() {
            vec![defaults::PARTICIPANT_ROLE_ID]
        } else {
            roles
        })
    }

    /// Whether the registration would overfill the event
    async fn over_capacity(&self, ctx: &SubmissionContext<'_>, settings: &ParticipantSettings, event_id: i64, roles: &[i64]) -> Result<bool> {
        if settings.add_anyway {
            return Ok(false);
        }
        let counted = ctx.gateway.counted_role_ids().await?;
        if !roles.iter().any(|role| counted.contains(role)) {
            return Ok(false);
        }
        ctx.gateway.is_event_full(event_id).await
    }
}

#[async_trait]
impl FormAction for ParticipantAction {
    fn definition(&self) -> &'static ActionDefinition {
        &DEFINITION
    }

    fn schema(&self) -> &'static EntitySchema {
        &PARTICIPANT_SCHEMA
    }

    fn settings_groups(&self, form: &Form, instance: &ActionInstance) -> Vec<SettingsGroup> {
        vec![
            DEFINITION.reference_group("event", "Event", form, instance),
            DEFINITION.reference_group("contact", "Participant Contact", form, instance),
        ]
    }

    async fn validate(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> Result<Vec<ValidationError>> {
        let settings: ParticipantSettings = instance.settings()?;
        if !entity::entity_gate(instance, &ctx.mapper()).allows() {
            return Ok(Vec::new());
        }

        let mut errors = Vec::new();
        if settings.contact.resolve(ctx).is_missing() {
            errors.push(ValidationError::new(&instance.alias, "contact", "A participant contact is required"));
        }
        match settings.event.resolve(ctx) {
            Resolution::Missing => {
                errors.push(ValidationError::new(&instance.alias, "event", "An event is required"));
            }
            Resolution::Pending => {}
            Resolution::Found(event_id) => {
                let roles = self.roles(instance, ctx).await?;
                if self.over_capacity(ctx, &settings, event_id, &roles).await? {
                    errors.push(ValidationError::new(&instance.alias, "event", "This event is full"));
                }
            }
        }
        Ok(errors)
    }

    async fn make(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> Result<MakeOutcome> {
        let settings: ParticipantSettings = instance.settings()?;
        let mapper = ctx.mapper();
        let empty = ActionResult::empty(&instance.action_name, PARTICIPANT_SCHEMA.result_key);
        if !entity::entity_gate(instance, &mapper).allows() {
            return Ok(MakeOutcome::Continue(entity::skipped(instance, &PARTICIPANT_SCHEMA)));
        }

        let (Some(event_id), Some(contact_id)) = (settings.event.resolve(ctx).found(), settings.contact.resolve(ctx).found()) else {
            warn!("Action {} has no event or contact, nothing written", instance.alias);
            return Ok(MakeOutcome::Continue(empty));
        };
        let roles = self.roles(instance, ctx).await?;
        if self.over_capacity(ctx, &settings, event_id, &roles).await? {
            info!("Event {} is full, action {} not registering contact {}", event_id, instance.alias, contact_id);
            return Ok(MakeOutcome::Continue(empty.with_nested("full", true)));
        }

        let EntityData { mut data, custom } = entity::collect(instance, &PARTICIPANT_SCHEMA, &mapper);
        data.insert("event_id".to_string(), json!(event_id));
        data.insert("contact_id".to_string(), json!(contact_id));
        data.insert("role_id".to_string(), json!(roles));

        let status = match entity::resolve_field(instance, &mapper, "status_id") {
            Some(value) => lookup_option(ctx.gateway, option_groups::PARTICIPANT_STATUS, &value).await?,
            None => None,
        };
        data.insert("status_id".to_string(), json!(status.unwrap_or(defaults::PARTICIPANT_STATUS_ID)));

        let registered = entity::resolve_field(instance, &mapper, "register_date")
            .unwrap_or_else(|| json!(entity::submitted_at(ctx, false)));
        data.insert("register_date".to_string(), registered);
        for code in entity::normalize_dates(&mut data, &["register_date"], false) {
            warn!("Action {} dropped unparsable {}", instance.alias, code);
            data.remove(&code);
        }

        let Some(record) = entity::save_primary(ctx, instance, entities::PARTICIPANT, None, data).await else {
            return Ok(MakeOutcome::Continue(empty.with_nested("full", false)));
        };
        let mut result = empty.with_record(record).with_nested("full", false);
        let Some(id) = result.id else {
            return Ok(MakeOutcome::Continue(result));
        };

        let event_type = match ctx.gateway.get_by_id(entities::EVENT, event_id).await {
            Ok(event) => event.and_then(|event| event.get("event_type_id").cloned()),
            Err(e) => {
                warn!("Event {} not read for participant custom fields: {:#}", event_id, e);
                None
            }
        };
        let target = EntityTarget {
            entity: entities::PARTICIPANT,
            table: tables::PARTICIPANT,
            id,
        };
        let extends = ExtendsContext::new(&["Participant"])
            .with_values(Some(ROLE_COLUMN), roles.iter().map(|role| json!(role)))
            .with_values(Some(EVENT_COLUMN), [json!(event_id)])
            .with_values(Some(EVENT_TYPE_COLUMN), event_type);
        write_custom_fields(ctx, instance, &target, &custom, &extends, &mut result).await;
        write_attachments(ctx, instance, &target, PARTICIPANT_SCHEMA.attachments, &mut result).await;

        Ok(MakeOutcome::Continue(result))
    }
}
