//! Redirect action: send the submitter elsewhere and stop the pipeline

use super::action::{ActionDefinition, FormAction, MakeOutcome};
use super::context::SubmissionContext;
use super::entity;
use super::field_specs::{EntitySchema, REDIRECT_SCHEMA};
use super::results::ActionResult;
use super::validation::ValidationError;
use crate::form::ActionInstance;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};

pub static DEFINITION: ActionDefinition = ActionDefinition {
    action_name: "cwps_redirect",
    action_label: "Redirect",
    alias_placeholder: "redirect",
    field_key_prefix: "cwps_redirect_",
    field_name_prefix: "Redirect ",
};

pub struct RedirectAction;

#[async_trait]
impl FormAction for RedirectAction {
    fn definition(&self) -> &'static ActionDefinition {
        &DEFINITION
    }

    fn schema(&self) -> &'static EntitySchema {
        &REDIRECT_SCHEMA
    }

    async fn validate(&self, _instance: &ActionInstance, _ctx: &SubmissionContext<'_>) -> Result<Vec<ValidationError>> {
        Ok(Vec::new())
    }

    async fn make(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> Result<MakeOutcome> {
        let mapper = ctx.mapper();
        let result = ActionResult::empty(&instance.action_name, REDIRECT_SCHEMA.result_key);
        if !entity::entity_gate(instance, &mapper).allows() {
            return Ok(MakeOutcome::Continue(entity::skipped(instance, &REDIRECT_SCHEMA)));
        }

        let url = instance
            .source("url")
            .map(|source| mapper.resolve_string(source))
            .unwrap_or_default();
        let url = url.trim();
        if url.is_empty() {
            debug!("Action {} has no redirect URL", instance.alias);
            return Ok(MakeOutcome::Continue(result));
        }

        info!("Action {} redirects to {}", instance.alias, url);
        Ok(MakeOutcome::Redirect {
            result: result.with_nested("url", url),
            url: url.to_string(),
        })
    }
}
