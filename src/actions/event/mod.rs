//! Event action
//!
//! The location is settled before the event is created, since the event
//! points at it. Registration profiles need the event's id and are joined
//! afterwards.
//!
//! Profiles are only written when `is_online_registration` resolves truthy;
//! without online registration there is no form for them to appear on.

pub mod location;
pub mod registration;

use super::action::{ActionDefinition, FormAction, MakeOutcome, SettingsGroup};
use super::attachments::write_attachments;
use super::context::SubmissionContext;
use super::custom_fields::{ExtendsContext, write_custom_fields};
use super::entity::{self, EntityData, EntityTarget};
use super::field_specs::{EVENT_SCHEMA, EntitySchema, FieldKind};
use super::references::lookup_option;
use super::results::ActionResult;
use super::validation::ValidationError;
use crate::api::constants::{defaults, entities, option_groups, tables};
use crate::api::models::Record;
use crate::form::gate::is_falsy;
use crate::form::sanitize::is_blank;
use crate::form::{ActionInstance, Form};
use anyhow::Result;
use async_trait::async_trait;
use log::warn;
use serde_json::json;

pub static DEFINITION: ActionDefinition = ActionDefinition {
    action_name: "cwps_event",
    action_label: "CiviCRM Event",
    alias_placeholder: "new_event",
    field_key_prefix: "cwps_event_",
    field_name_prefix: "Event ",
};

/// Date-time fields, all of which bypass generic mapping
const DATE_FIELDS: &[&str] = &["start_date", "end_date", "registration_start_date", "registration_end_date"];

pub struct EventAction;

impl EventAction {
    async fn event_type(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> Result<Option<i64>> {
        match entity::resolve_field(instance, &ctx.mapper(), "event_type_id") {
            Some(value) => lookup_option(ctx.gateway, option_groups::EVENT_TYPE, &value).await,
            None => Ok(None),
        }
    }

    fn dates(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> Record {
        let mapper = ctx.mapper();
        let mut dates = Record::new();
        for code in DATE_FIELDS {
            if let Some(value) = entity::resolve_field(instance, &mapper, code) {
                dates.insert(code.to_string(), value);
            }
        }
        dates
    }
}

#[async_trait]
impl FormAction for EventAction {
    fn definition(&self) -> &'static ActionDefinition {
        &DEFINITION
    }

    fn schema(&self) -> &'static EntitySchema {
        &EVENT_SCHEMA
    }

    fn settings_groups(&self, _form: &Form, _instance: &ActionInstance) -> Vec<SettingsGroup> {
        let mut groups = vec![SettingsGroup {
            key: "loc_block".to_string(),
            label: "Location".to_string(),
            fields: vec![DEFINITION.mapping_field(location::LOCATION_GATE, "Location Conditional Reference", FieldKind::Text, false)],
        }];
        groups.extend(registration::profile_groups(&DEFINITION));
        groups
    }

    async fn validate(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> Result<Vec<ValidationError>> {
        let mapper = ctx.mapper();
        if !entity::entity_gate(instance, &mapper).allows() {
            return Ok(Vec::new());
        }

        let EntityData { data, .. } = entity::collect(instance, &EVENT_SCHEMA, &mapper);
        let mut errors = Vec::new();
        if data.get("title").is_none_or(is_blank) {
            errors.push(ValidationError::new(&instance.alias, "title", "Title is required"));
        }

        let mut dates = self.dates(instance, ctx);
        if !dates.contains_key("start_date") {
            errors.push(ValidationError::new(&instance.alias, "start_date", "Start Date is required"));
        }
        for code in entity::normalize_dates(&mut dates, DATE_FIELDS, false) {
            errors.push(ValidationError::new(&instance.alias, &code, "Not a valid date"));
        }

        if entity::resolve_field(instance, &mapper, "event_type_id").is_some() && self.event_type(instance, ctx).await?.is_none() {
            errors.push(ValidationError::new(&instance.alias, "event_type_id", "Unknown event type"));
        }
        Ok(errors)
    }

    async fn make(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> Result<MakeOutcome> {
        let mapper = ctx.mapper();
        let empty = ActionResult::empty(&instance.action_name, EVENT_SCHEMA.result_key);
        if !entity::entity_gate(instance, &mapper).allows() {
            return Ok(MakeOutcome::Continue(entity::skipped(instance, &EVENT_SCHEMA)));
        }

        let EntityData { mut data, custom } = entity::collect(instance, &EVENT_SCHEMA, &mapper);
        let event_type = self.event_type(instance, ctx).await?;
        if let Some(event_type) = event_type {
            data.insert("event_type_id".to_string(), json!(event_type));
        }

        let mut dates = self.dates(instance, ctx);
        for code in entity::normalize_dates(&mut dates, DATE_FIELDS, false) {
            warn!("Action {} dropped unparsable {}", instance.alias, code);
            dates.remove(&code);
        }
        data.extend(dates);

        // Absent means the CRM default, an explicit 0 is kept
        for (code, default) in [
            ("is_public", defaults::EVENT_IS_PUBLIC),
            ("is_confirm_enabled", defaults::EVENT_IS_CONFIRM_ENABLED),
        ] {
            if data.get(code).is_none_or(is_blank) {
                data.insert(code.to_string(), json!(default));
            }
        }

        let location = location::resolve(ctx, instance).await;
        if let Some(loc_block_id) = location.loc_block_id {
            data.insert("loc_block_id".to_string(), json!(loc_block_id));
        }
        let online_registration = data.get("is_online_registration").is_some_and(|value| !is_falsy(value));

        let Some(record) = entity::save_primary(ctx, instance, entities::EVENT, None, data).await else {
            let mut failed = empty;
            if let Some(outcome) = location.outcome {
                failed.set_nested("loc_block", outcome);
            }
            return Ok(MakeOutcome::Continue(failed));
        };
        let mut result = empty.with_record(record);
        if let Some(outcome) = location.outcome {
            result.set_nested("loc_block", outcome);
        }
        let Some(id) = result.id else {
            return Ok(MakeOutcome::Continue(result));
        };

        let target = EntityTarget {
            entity: entities::EVENT,
            table: tables::EVENT,
            id,
        };
        let extends = ExtendsContext::new(&["Event"]).with_values(None, event_type.map(|id| json!(id)));
        write_custom_fields(ctx, instance, &target, &custom, &extends, &mut result).await;
        write_attachments(ctx, instance, &target, EVENT_SCHEMA.attachments, &mut result).await;

        if online_registration {
            registration::write_profiles(ctx, instance, id, &mut result).await;
        }

        Ok(MakeOutcome::Continue(result))
    }
}
