//! Case action
//!
//! With `dismiss_if_exists` set, an open case of the same type for the
//! same client is reported instead of opening a duplicate. The case
//! manager relationship is written as its own step once the case exists.

use super::action::{ActionDefinition, FormAction, MakeOutcome, SettingsGroup};
use super::attachments::write_attachments;
use super::context::SubmissionContext;
use super::custom_fields::{ExtendsContext, write_custom_fields};
use super::entity::{self, EntityData, EntityTarget};
use super::field_specs::{CASE_SCHEMA, EntitySchema};
use super::references::{EntityReference, Resolution, lookup_case_type, lookup_option};
use super::results::ActionResult;
use super::validation::ValidationError;
use crate::api::constants::{defaults, entities, option_groups, tables};
use crate::api::models::{Record, value_as_id};
use crate::form::{ActionInstance, Form};
use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use serde::Deserialize;
use serde_json::{Value, json};

pub static DEFINITION: ActionDefinition = ActionDefinition {
    action_name: "cwps_case",
    action_label: "CiviCRM Case",
    alias_placeholder: "new_case",
    field_key_prefix: "cwps_case_",
    field_name_prefix: "Case ",
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CaseSettings {
    /// The case client
    pub contact: EntityReference,
    /// Contact who manages the case
    pub manager: EntityReference,
    /// Report an existing open case of the same type instead of opening another
    pub dismiss_if_exists: bool,
    /// Relationship type of the case manager; defaults to the case type's
    pub manager_relationship_type_id: Option<i64>,
}

pub struct CaseAction;

impl CaseAction {
    async fn case_type(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> Result<Option<i64>> {
        match entity::resolve_field(instance, &ctx.mapper(), "case_type_id") {
            Some(value) => lookup_case_type(ctx.gateway, &value).await,
            None => Ok(None),
        }
    }

    async fn manager_relationship_type(&self, ctx: &SubmissionContext<'_>, settings: &CaseSettings, case_type: i64) -> Result<Option<i64>> {
        if let Some(configured) = settings.manager_relationship_type_id {
            return Ok(Some(configured));
        }
        Ok(ctx
            .gateway
            .get_by_id(entities::CASE_TYPE, case_type)
            .await?
            .and_then(|record| record.get("definition").and_then(|d| d.get("manager_relationship_type_id")).and_then(value_as_id)))
    }

    /// Relate the manager to the client for this case
    async fn write_manager(
        &self,
        instance: &ActionInstance,
        ctx: &SubmissionContext<'_>,
        settings: &CaseSettings,
        case: &Record,
        client: i64,
        case_type: i64,
    ) -> Option<Value> {
        let manager = settings.manager.resolve(ctx).found()?;
        let relationship_type = match self.manager_relationship_type(ctx, settings, case_type).await {
            Ok(Some(relationship_type)) => relationship_type,
            Ok(None) => {
                warn!("Case type {} has no manager relationship type, manager not added", case_type);
                return Some(Value::Bool(false));
            }
            Err(e) => {
                warn!("Case manager relationship type lookup failed: {:#}", e);
                return Some(Value::Bool(false));
            }
        };

        let mut relationship = Record::new();
        relationship.insert("contact_id_a".to_string(), json!(client));
        relationship.insert("contact_id_b".to_string(), json!(manager));
        relationship.insert("relationship_type_id".to_string(), json!(relationship_type));
        relationship.insert("case_id".to_string(), case.get("id").cloned().unwrap_or(Value::Null));
        relationship.insert("start_date".to_string(), json!(entity::submitted_at(ctx, true)));
        relationship.insert("is_active".to_string(), json!(true));

        match ctx.gateway.create(entities::RELATIONSHIP, relationship).await {
            Ok(record) => Some(Value::Object(record)),
            Err(e) => {
                warn!("Action {} failed to add the case manager: {:#}", instance.alias, e);
                Some(Value::Bool(false))
            }
        }
    }
}

#[async_trait]
impl FormAction for CaseAction {
    fn definition(&self) -> &'static ActionDefinition {
        &DEFINITION
    }

    fn schema(&self) -> &'static EntitySchema {
        &CASE_SCHEMA
    }

    fn settings_groups(&self, form: &Form, instance: &ActionInstance) -> Vec<SettingsGroup> {
        vec![
            DEFINITION.reference_group("contact", "Client", form, instance),
            DEFINITION.reference_group("manager", "Case Manager", form, instance),
        ]
    }

    async fn validate(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> Result<Vec<ValidationError>> {
        let settings: CaseSettings = instance.settings()?;
        if !entity::entity_gate(instance, &ctx.mapper()).allows() {
            return Ok(Vec::new());
        }

        let mut errors = Vec::new();
        if self.case_type(instance, ctx).await?.is_none() {
            errors.push(ValidationError::new(&instance.alias, "case_type_id", "Case Type is required"));
        }
        if settings.contact.resolve(ctx).is_missing() {
            errors.push(ValidationError::new(&instance.alias, "contact", "A client contact is required"));
        }
        Ok(errors)
    }

    async fn make(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> Result<MakeOutcome> {
        let settings: CaseSettings = instance.settings()?;
        let mapper = ctx.mapper();
        let empty = ActionResult::empty(&instance.action_name, CASE_SCHEMA.result_key);
        if !entity::entity_gate(instance, &mapper).allows() {
            return Ok(MakeOutcome::Continue(entity::skipped(instance, &CASE_SCHEMA)));
        }

        let Some(case_type) = self.case_type(instance, ctx).await? else {
            warn!("Action {} has no case type, nothing written", instance.alias);
            return Ok(MakeOutcome::Continue(empty));
        };
        let Resolution::Found(client) = settings.contact.resolve(ctx) else {
            warn!("Action {} has no client contact, nothing written", instance.alias);
            return Ok(MakeOutcome::Continue(empty));
        };

        if settings.dismiss_if_exists {
            if let Some(existing) = ctx.gateway.existing_case(client, case_type).await? {
                info!("Action {} found open case {:?}, not opening another", instance.alias, existing.get("id"));
                return Ok(MakeOutcome::Continue(
                    empty.with_record(existing).with_nested("skipped", true).with_nested("created", false),
                ));
            }
        }

        let EntityData { mut data, custom } = entity::collect(instance, &CASE_SCHEMA, &mapper);
        data.insert("case_type_id".to_string(), json!(case_type));
        data.insert("contact_id".to_string(), json!(client));
        data.entry("creator_id").or_insert_with(|| json!(client));

        let status = match entity::resolve_field(instance, &mapper, "status_id") {
            Some(value) => lookup_option(ctx.gateway, option_groups::CASE_STATUS, &value).await?,
            None => None,
        };
        data.insert("status_id".to_string(), json!(status.unwrap_or(defaults::CASE_STATUS_ID)));

        let start = entity::resolve_field(instance, &mapper, "start_date").unwrap_or_else(|| json!(entity::submitted_at(ctx, true)));
        data.insert("start_date".to_string(), start);
        for code in entity::normalize_dates(&mut data, &["start_date", "end_date"], true) {
            warn!("Action {} dropped unparsable {}", instance.alias, code);
            data.remove(&code);
        }

        let Some(record) = entity::save_primary(ctx, instance, entities::CASE, None, data).await else {
            return Ok(MakeOutcome::Continue(empty));
        };
        let mut result = empty
            .with_record(record.clone())
            .with_nested("skipped", false)
            .with_nested("created", true);
        let Some(id) = result.id else {
            return Ok(MakeOutcome::Continue(result));
        };

        let target = EntityTarget {
            entity: entities::CASE,
            table: tables::CASE,
            id,
        };
        let extends = ExtendsContext::new(&["Case"]).with_values(None, [json!(case_type)]);
        write_custom_fields(ctx, instance, &target, &custom, &extends, &mut result).await;
        write_attachments(ctx, instance, &target, CASE_SCHEMA.attachments, &mut result).await;

        if let Some(manager) = self.write_manager(instance, ctx, &settings, &record, client, case_type).await {
            result.set_nested("manager", manager);
        }

        Ok(MakeOutcome::Continue(result))
    }
}
