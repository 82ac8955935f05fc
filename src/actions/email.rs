//! Email action: send a message template to a contact
//!
//! Nothing is stored as an entity. The result carries the CRM's record of
//! the send under `email` and whether anything went out under `sent`.

use super::action::{ActionDefinition, FormAction, MakeOutcome, SettingsGroup};
use super::context::SubmissionContext;
use super::entity;
use super::field_specs::{EMAIL_SEND_SCHEMA, EntitySchema};
use super::references::EntityReference;
use super::results::ActionResult;
use super::validation::ValidationError;
use crate::api::models::{Record, value_as_id};
use crate::form::gate::is_falsy;
use crate::form::mapper::value_to_string;
use crate::form::{ActionInstance, Form};
use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;

pub static DEFINITION: ActionDefinition = ActionDefinition {
    action_name: "cwps_email",
    action_label: "CiviCRM Email",
    alias_placeholder: "new_email",
    field_key_prefix: "cwps_email_",
    field_name_prefix: "Email ",
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    /// Recipient
    pub contact: EntityReference,
}

pub struct EmailAction;

impl EmailAction {
    /// Send parameters from the mapped fields: text as given, the
    /// smarty switch as a boolean
    fn params(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> Record {
        let mapper = ctx.mapper();
        let mut params = Record::new();
        for spec in EMAIL_SEND_SCHEMA.mapped_fields() {
            let Some(value) = entity::resolve_field(instance, &mapper, spec.code) else {
                continue;
            };
            let value = if spec.code == "disable_smarty" {
                json!(!is_falsy(&value))
            } else {
                json!(value_to_string(&value).trim())
            };
            params.insert(spec.code.to_string(), value);
        }
        params
    }
}

#[async_trait]
impl FormAction for EmailAction {
    fn definition(&self) -> &'static ActionDefinition {
        &DEFINITION
    }

    fn schema(&self) -> &'static EntitySchema {
        &EMAIL_SEND_SCHEMA
    }

    fn settings_groups(&self, form: &Form, instance: &ActionInstance) -> Vec<SettingsGroup> {
        vec![DEFINITION.reference_group("contact", "Recipient", form, instance)]
    }

    async fn validate(&self, instance: &ActionInstance, _ctx: &SubmissionContext<'_>) -> Result<Vec<ValidationError>> {
        // A send without recipient or template is skipped, not rejected
        instance.settings::<EmailSettings>()?;
        Ok(Vec::new())
    }

    async fn make(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> Result<MakeOutcome> {
        let settings: EmailSettings = instance.settings()?;
        let mapper = ctx.mapper();
        let unsent = ActionResult::empty(&instance.action_name, EMAIL_SEND_SCHEMA.result_key).with_nested("sent", false);
        if !entity::entity_gate(instance, &mapper).allows() {
            return Ok(MakeOutcome::Continue(entity::skipped(instance, &EMAIL_SEND_SCHEMA).with_nested("sent", false)));
        }

        let recipient = settings.contact.resolve(ctx).found();
        let template = entity::resolve_field(instance, &mapper, "template_id").and_then(|value| value_as_id(&value));
        let (Some(contact_id), Some(template_id)) = (recipient, template) else {
            warn!("Action {} has no recipient or template, nothing sent", instance.alias);
            return Ok(MakeOutcome::Continue(unsent));
        };

        let mut params = self.params(instance, ctx);
        params.insert("contact_id".to_string(), json!(contact_id));
        params.insert("template_id".to_string(), json!(template_id));

        match ctx.gateway.send_email(params).await {
            Ok(sent) => {
                info!("Action {} sent template {} to contact {}", instance.alias, template_id, contact_id);
                // The send is not an entity, so the result keeps `id: false`
                let mut result = unsent.with_nested("sent", true);
                result.record = Some(sent);
                Ok(MakeOutcome::Continue(result))
            }
            Err(e) => {
                warn!("Action {} failed to send template {}: {:#}", instance.alias, template_id, e);
                Ok(MakeOutcome::Continue(unsent))
            }
        }
    }
}
