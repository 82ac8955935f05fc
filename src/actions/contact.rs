//! Contact action: create a contact, or update one found by reference or
//! by the configured dedupe fields, with its email, phone, address and
//! website blocks

use super::action::{ActionDefinition, FormAction, MakeOutcome, SettingsGroup};
use super::attachments::write_attachments;
use super::context::SubmissionContext;
use super::custom_fields::{ExtendsContext, write_custom_fields};
use super::entity::{self, EntityData, EntityTarget};
use super::field_specs::{CONTACT_SCHEMA, EntitySchema};
use super::references::{EntityReference, Resolution};
use super::results::ActionResult;
use super::validation::ValidationError;
use crate::api::constants::{entities, tables};
use crate::api::gateway::Filter;
use crate::api::models::{Record, record_id, value_as_id};
use crate::form::mapper::value_to_string;
use crate::form::sanitize::is_blank;
use crate::form::{ActionInstance, Form};
use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::{Value, json};

pub static DEFINITION: ActionDefinition = ActionDefinition {
    action_name: "cwps_contact",
    action_label: "CiviCRM Contact",
    alias_placeholder: "new_contact",
    field_key_prefix: "cwps_contact_",
    field_name_prefix: "Contact ",
};

const CONTACT_TYPES: &[&str] = &["Individual", "Organization", "Household"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContactSettings {
    /// Existing contact to update instead of creating one
    pub contact: EntityReference,
    /// Codes that identify an existing contact; `email` matches the first email block
    pub dedupe_fields: Vec<String>,
}

pub struct ContactAction;

impl ContactAction {
    /// Contact type named by the form, if it maps one
    fn mapped_contact_type(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> Option<String> {
        let mapped = entity::resolve_field(instance, &ctx.mapper(), "contact_type")
            .map(|value| value_to_string(&value))
            .unwrap_or_default();
        let wanted = mapped.trim();
        if wanted.is_empty() {
            return None;
        }
        Some(
            CONTACT_TYPES
                .iter()
                .find(|known| known.eq_ignore_ascii_case(wanted))
                .map_or_else(|| wanted.to_string(), |known| known.to_string()),
        )
    }

    fn contact_type(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> String {
        self.mapped_contact_type(instance, ctx)
            .unwrap_or_else(|| ctx.settings.default_contact_type.clone())
    }

    fn primary_email(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> Option<Value> {
        let block = CONTACT_SCHEMA.block("email_1")?;
        entity::resolve_block(instance, block, &ctx.mapper()).and_then(|data| data.get("email").cloned())
    }

    /// First contact matching every dedupe field
    async fn find_duplicate(
        &self,
        instance: &ActionInstance,
        ctx: &SubmissionContext<'_>,
        settings: &ContactSettings,
        data: &Record,
    ) -> Result<Option<i64>> {
        if settings.dedupe_fields.is_empty() {
            return Ok(None);
        }

        let mut filter = Filter::new();
        let mut email = None;
        for code in &settings.dedupe_fields {
            let value = if code == "email" {
                self.primary_email(instance, ctx)
            } else {
                data.get(code).cloned()
            };
            let Some(value) = value.filter(|value| !is_blank(value)) else {
                debug!("Dedupe field {} is empty, not matching existing contacts", code);
                return Ok(None);
            };
            if code == "email" {
                email = Some(value);
            } else {
                filter = filter.eq(code.clone(), value);
            }
        }
        if let Some(contact_type) = data.get("contact_type") {
            filter = filter.eq("contact_type", contact_type.clone());
        }

        let mut candidates: Vec<i64> = ctx
            .gateway
            .find(entities::CONTACT, &filter)
            .await?
            .iter()
            .filter_map(record_id)
            .collect();

        if let Some(email) = email {
            let owners: Vec<i64> = ctx
                .gateway
                .find(entities::EMAIL, &Filter::new().eq("email", email))
                .await?
                .iter()
                .filter_map(|record| record.get("contact_id").and_then(value_as_id))
                .collect();
            candidates.retain(|id| owners.contains(id));
        }

        let found = candidates.into_iter().next();
        if let Some(id) = found {
            debug!("Action {} matched existing contact {}", instance.alias, id);
        }
        Ok(found)
    }
}

#[async_trait]
impl FormAction for ContactAction {
    fn definition(&self) -> &'static ActionDefinition {
        &DEFINITION
    }

    fn schema(&self) -> &'static EntitySchema {
        &CONTACT_SCHEMA
    }

    fn settings_groups(&self, form: &Form, instance: &ActionInstance) -> Vec<SettingsGroup> {
        vec![DEFINITION.reference_group("contact", "Existing Contact", form, instance)]
    }

    async fn validate(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> Result<Vec<ValidationError>> {
        let settings: ContactSettings = instance.settings()?;
        let mapper = ctx.mapper();
        if !entity::entity_gate(instance, &mapper).allows() {
            return Ok(Vec::new());
        }

        let EntityData { data, .. } = entity::collect(instance, &CONTACT_SCHEMA, &mapper);
        let contact_type = self.contact_type(instance, ctx);
        let has = |code: &str| data.get(code).is_some_and(|value| !is_blank(value));
        let mut errors = Vec::new();

        // Updates may leave the identifying fields out
        if !settings.contact.resolve(ctx).is_missing() {
            return Ok(errors);
        }

        match contact_type.as_str() {
            "Individual" => {
                if !has("first_name") && !has("last_name") && self.primary_email(instance, ctx).is_none() {
                    errors.push(ValidationError::new(
                        &instance.alias,
                        "first_name",
                        "First Name, Last Name or Email is required",
                    ));
                }
            }
            "Organization" if !has("organization_name") => {
                errors.push(ValidationError::new(&instance.alias, "organization_name", "Organization Name is required"));
            }
            "Household" if !has("household_name") => {
                errors.push(ValidationError::new(&instance.alias, "household_name", "Household Name is required"));
            }
            "Organization" | "Household" => {}
            other => {
                errors.push(ValidationError::new(
                    &instance.alias,
                    "contact_type",
                    format!("Unknown contact type '{}'", other),
                ));
            }
        }
        Ok(errors)
    }

    async fn make(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> Result<MakeOutcome> {
        let settings: ContactSettings = instance.settings()?;
        let mapper = ctx.mapper();
        if !entity::entity_gate(instance, &mapper).allows() {
            return Ok(MakeOutcome::Continue(entity::skipped(instance, &CONTACT_SCHEMA)));
        }

        let EntityData { mut data, custom } = entity::collect(instance, &CONTACT_SCHEMA, &mapper);
        data.remove("contact_type");
        if let Some(contact_type) = self.mapped_contact_type(instance, ctx) {
            data.insert("contact_type".to_string(), json!(contact_type));
        }
        entity::normalize_dates(&mut data, &["birth_date"], true);

        let existing = match settings.contact.resolve(ctx) {
            Resolution::Found(id) => Some(id),
            _ => self.find_duplicate(instance, ctx, &settings, &data).await?,
        };
        // Updates keep the stored type unless the form maps one
        if existing.is_none() && !data.contains_key("contact_type") {
            data.insert("contact_type".to_string(), json!(self.contact_type(instance, ctx)));
        }
        let sub_types = data
            .get("contact_sub_type")
            .map(|value| match value {
                Value::Array(items) => items.clone(),
                other => vec![other.clone()],
            })
            .unwrap_or_default();

        let empty = ActionResult::empty(&instance.action_name, CONTACT_SCHEMA.result_key);
        let Some(record) = entity::save_primary(ctx, instance, entities::CONTACT, existing, data).await else {
            return Ok(MakeOutcome::Continue(empty));
        };
        let contact_type = record
            .get("contact_type")
            .filter(|value| !is_blank(value))
            .map(value_to_string)
            .unwrap_or_else(|| self.contact_type(instance, ctx));
        let mut result = empty.with_record(record);
        let Some(id) = result.id else {
            return Ok(MakeOutcome::Continue(result));
        };

        let target = EntityTarget {
            entity: entities::CONTACT,
            table: tables::CONTACT,
            id,
        };
        let extends = ExtendsContext::new(&["Contact", contact_type.as_str()]).with_values(None, sub_types);
        write_custom_fields(ctx, instance, &target, &custom, &extends, &mut result).await;

        let mut links = Record::new();
        links.insert("contact_id".to_string(), json!(id));
        entity::write_blocks(ctx, instance, CONTACT_SCHEMA.blocks, &links, &mut result).await;
        write_attachments(ctx, instance, &target, CONTACT_SCHEMA.attachments, &mut result).await;

        Ok(MakeOutcome::Continue(result))
    }
}
