//! Activity action
//!
//! Source, target and assignee contacts are entity references. The source
//! falls back to the first target when it does not resolve. After the
//! activity exists, assignees are notified by email when the CRM has
//! assignee notifications switched on for the activity's type.

use super::action::{ActionDefinition, FormAction, MakeOutcome, SettingsGroup};
use super::attachments::write_attachments;
use super::context::SubmissionContext;
use super::custom_fields::{ExtendsContext, write_custom_fields};
use super::entity::{self, EntityData, EntityTarget};
use super::field_specs::{ACTIVITY_SCHEMA, EntitySchema};
use super::references::{EntityReference, Resolution, lookup_option};
use super::results::ActionResult;
use super::validation::ValidationError;
use crate::api::constants::{defaults, entities, option_groups, settings as crm_settings, tables};
use crate::api::gateway::Filter;
use crate::api::models::{Record, loose_eq};
use crate::form::gate::is_falsy;
use crate::form::mapper::ids_from_value;
use crate::form::{ActionInstance, Form};
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{Value, json};

pub static DEFINITION: ActionDefinition = ActionDefinition {
    action_name: "cwps_activity",
    action_label: "CiviCRM Activity",
    alias_placeholder: "new_activity",
    field_key_prefix: "cwps_activity_",
    field_name_prefix: "Activity ",
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ActivitySettings {
    pub source: EntityReference,
    pub target: EntityReference,
    pub assignee: EntityReference,
    /// Case the activity is filed on
    pub case: EntityReference,
}

pub struct ActivityAction;

/// Contacts of an activity as resolved for this submission
struct Contacts {
    source: Resolution<i64>,
    targets: Resolution<Vec<i64>>,
    assignees: Vec<i64>,
}

impl ActivityAction {
    async fn activity_type(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> Result<Option<i64>> {
        match entity::resolve_field(instance, &ctx.mapper(), "activity_type_id") {
            Some(value) => lookup_option(ctx.gateway, option_groups::ACTIVITY_TYPE, &value).await,
            None => Ok(None),
        }
    }

    fn contacts(&self, settings: &ActivitySettings, ctx: &SubmissionContext<'_>) -> Contacts {
        let targets = settings.target.resolve_all(ctx);
        let source = match settings.source.resolve(ctx) {
            Resolution::Missing => match &targets {
                Resolution::Found(ids) => ids.first().copied().map_or(Resolution::Missing, Resolution::Found),
                Resolution::Pending => Resolution::Pending,
                Resolution::Missing => Resolution::Missing,
            },
            resolved => resolved,
        };
        let assignees = settings.assignee.resolve_all(ctx).found().unwrap_or_default();
        Contacts {
            source,
            targets,
            assignees,
        }
    }

    /// Email the assignees when the CRM wants them notified for this type
    async fn notify_assignees(&self, ctx: &SubmissionContext<'_>, activity: &Record, activity_type: i64, assignees: &[i64]) -> Result<bool> {
        if assignees.is_empty() {
            return Ok(false);
        }
        let enabled = ctx
            .gateway
            .setting(crm_settings::ACTIVITY_ASSIGNEE_NOTIFICATION)
            .await?
            .is_some_and(|value| !is_falsy(&value));
        if !enabled {
            debug!("Assignee notification is switched off");
            return Ok(false);
        }
        let opted_out = ctx
            .gateway
            .setting(crm_settings::DO_NOT_NOTIFY_ASSIGNEES_FOR)
            .await?
            .map(|value| ids_from_value(&value))
            .unwrap_or_default();
        if opted_out.contains(&activity_type) {
            debug!("Activity type {} does not notify assignees", activity_type);
            return Ok(false);
        }

        let mut emails = Vec::new();
        for contact_id in assignees {
            let records = ctx
                .gateway
                .find(entities::EMAIL, &Filter::new().eq("contact_id", *contact_id))
                .await?;
            let primary = records
                .iter()
                .find(|record| record.get("is_primary").is_some_and(|v| loose_eq(v, &json!(true))))
                .or_else(|| records.first())
                .and_then(|record| record.get("email").and_then(Value::as_str));
            if let Some(email) = primary {
                emails.push(email.to_string());
            }
        }
        if emails.is_empty() {
            return Ok(false);
        }

        ctx.gateway.notify_assignees(activity, &emails).await?;
        info!("Notified {} assignees of activity {:?}", emails.len(), activity.get("id"));
        Ok(true)
    }
}

#[async_trait]
impl FormAction for ActivityAction {
    fn definition(&self) -> &'static ActionDefinition {
        &DEFINITION
    }

    fn schema(&self) -> &'static EntitySchema {
        &ACTIVITY_SCHEMA
    }

    fn settings_groups(&self, form: &Form, instance: &ActionInstance) -> Vec<SettingsGroup> {
        vec![
            DEFINITION.reference_group("source", "Source Contact", form, instance),
            DEFINITION.reference_group("target", "Target Contact", form, instance),
            DEFINITION.reference_group("assignee", "Assignee Contact", form, instance),
            DEFINITION.reference_group("case", "Case", form, instance),
        ]
    }

    async fn validate(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> Result<Vec<ValidationError>> {
        let settings: ActivitySettings = instance.settings()?;
        if !entity::entity_gate(instance, &ctx.mapper()).allows() {
            return Ok(Vec::new());
        }

        let mut errors = Vec::new();
        if self.activity_type(instance, ctx).await?.is_none() {
            errors.push(ValidationError::new(&instance.alias, "activity_type_id", "Activity Type is required"));
        }
        if self.contacts(&settings, ctx).source.is_missing() {
            errors.push(ValidationError::new(&instance.alias, "source", "A source or target contact is required"));
        }

        let mut dates = Record::new();
        if let Some(value) = entity::resolve_field(instance, &ctx.mapper(), "activity_date_time") {
            dates.insert("activity_date_time".to_string(), value);
        }
        for code in entity::normalize_dates(&mut dates, &["activity_date_time"], false) {
            errors.push(ValidationError::new(&instance.alias, &code, "Not a valid date"));
        }
        Ok(errors)
    }

    async fn make(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> Result<MakeOutcome> {
        let settings: ActivitySettings = instance.settings()?;
        let mapper = ctx.mapper();
        let empty = ActionResult::empty(&instance.action_name, ACTIVITY_SCHEMA.result_key);
        if !entity::entity_gate(instance, &mapper).allows() {
            return Ok(MakeOutcome::Continue(entity::skipped(instance, &ACTIVITY_SCHEMA)));
        }

        let Some(activity_type) = self.activity_type(instance, ctx).await? else {
            warn!("Action {} has no activity type, nothing written", instance.alias);
            return Ok(MakeOutcome::Continue(empty));
        };
        let contacts = self.contacts(&settings, ctx);
        let Some(source) = contacts.source.found() else {
            warn!("Action {} has no source contact, nothing written", instance.alias);
            return Ok(MakeOutcome::Continue(empty));
        };

        let EntityData { mut data, custom } = entity::collect(instance, &ACTIVITY_SCHEMA, &mapper);
        data.insert("activity_type_id".to_string(), json!(activity_type));
        data.insert("source_contact_id".to_string(), json!(source));
        if let Some(targets) = contacts.targets.found() {
            data.insert("target_contact_id".to_string(), json!(targets));
        }
        if !contacts.assignees.is_empty() {
            data.insert("assignee_contact_id".to_string(), json!(contacts.assignees));
        }
        if let Some(case_id) = settings.case.resolve(ctx).found() {
            data.insert("case_id".to_string(), json!(case_id));
        }

        let status = match entity::resolve_field(instance, &mapper, "status_id") {
            Some(value) => lookup_option(ctx.gateway, option_groups::ACTIVITY_STATUS, &value).await?,
            None => None,
        };
        data.insert("status_id".to_string(), json!(status.unwrap_or(defaults::ACTIVITY_STATUS_ID)));

        let when = entity::resolve_field(instance, &mapper, "activity_date_time")
            .unwrap_or_else(|| json!(entity::submitted_at(ctx, false)));
        data.insert("activity_date_time".to_string(), when);
        for code in entity::normalize_dates(&mut data, &["activity_date_time"], false) {
            warn!("Action {} dropped unparsable {}", instance.alias, code);
            data.remove(&code);
        }

        let Some(record) = entity::save_primary(ctx, instance, entities::ACTIVITY, None, data).await else {
            return Ok(MakeOutcome::Continue(empty));
        };
        let mut result = empty.with_record(record.clone());
        let Some(id) = result.id else {
            return Ok(MakeOutcome::Continue(result));
        };

        let target = EntityTarget {
            entity: entities::ACTIVITY,
            table: tables::ACTIVITY,
            id,
        };
        let extends = ExtendsContext::new(&["Activity"]).with_values(None, [json!(activity_type)]);
        write_custom_fields(ctx, instance, &target, &custom, &extends, &mut result).await;
        write_attachments(ctx, instance, &target, ACTIVITY_SCHEMA.attachments, &mut result).await;

        match self.notify_assignees(ctx, &record, activity_type, &contacts.assignees).await {
            Ok(notified) => result.set_nested("assignees_notified", notified),
            Err(e) => {
                warn!("Assignees of activity {} not notified: {:#}", id, e);
                result.set_nested("assignees_notified", false);
            }
        }

        Ok(MakeOutcome::Continue(result))
    }
}
