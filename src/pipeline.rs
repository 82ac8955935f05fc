//! Runs a form's actions against one submission
//!
//! Every action validates before any of them writes. When all pass, the
//! actions make their entities one at a time in form order, each
//! publishing its result before the next one starts. A redirect ends the
//! run; the actions after it do not run. Writes of actions that already
//! ran are never undone.

use crate::actions::{
    ActionRegistry, ActionResult, ActionResults, ActionSchema, FormAction, MakeOutcome, SubmissionContext,
    ValidationError, ValidationErrors,
};
use crate::api::gateway::CrmGateway;
use crate::config::Settings;
use crate::files::FileStore;
use crate::form::{ActionInstance, Form, Submission};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;

/// Everything the host form builder renders for a form
#[derive(Debug, Clone, Serialize)]
pub struct FormSchema {
    pub form_id: String,
    pub actions: Vec<ActionSchema>,
}

/// What a completed submission left behind
#[derive(Debug, Clone, Default)]
pub struct SubmissionReport {
    pub results: ActionResults,
    /// Where the submitter is sent, when a redirect fired
    pub redirect: Option<String>,
    /// Aliases of the actions skipped because a redirect ended the run
    pub not_run: Vec<String>,
}

impl SubmissionReport {
    pub fn to_value(&self) -> Value {
        json!({
            "results": self.results.to_value(),
            "redirect": self.redirect,
            "not_run": self.not_run,
        })
    }
}

#[derive(Debug, Clone)]
pub enum SubmissionOutcome {
    /// Validation failed; nothing was written
    Rejected(ValidationErrors),
    Completed(SubmissionReport),
}

pub struct FormProcessor {
    gateway: Arc<dyn CrmGateway>,
    files: Arc<dyn FileStore>,
    registry: ActionRegistry,
    settings: Settings,
}

impl FormProcessor {
    /// Processor with the built-in actions and default settings
    pub fn new(gateway: Arc<dyn CrmGateway>, files: Arc<dyn FileStore>) -> Result<Self> {
        Ok(Self {
            gateway,
            files,
            registry: ActionRegistry::builtin()?,
            settings: Settings::default(),
        })
    }

    pub fn with_registry(mut self, registry: ActionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Check that the form can run: aliases are unique and every action
    /// type is registered
    fn check_form(&self, form: &Form) -> Result<()> {
        form.check_aliases()?;
        for instance in &form.actions {
            self.registry.resolve(instance)?;
        }
        Ok(())
    }

    /// Build the schema of every action in the form
    pub async fn load(&self, form: &Form) -> Result<FormSchema> {
        self.check_form(form)?;
        let mut actions = Vec::with_capacity(form.actions.len());
        for instance in &form.actions {
            let action = self.registry.resolve(instance)?;
            let schema = action
                .load(form, instance, self.gateway.as_ref())
                .await
                .with_context(|| format!("Failed to load action {}", instance.alias))?;
            actions.push(schema);
        }
        Ok(FormSchema {
            form_id: form.id.clone(),
            actions,
        })
    }

    /// Start a run for one submission
    ///
    /// Hosts that drive the lifecycle themselves call `validate_action` for
    /// every action, then `enter_make` and `make_action` in form order.
    pub fn begin<'a>(&'a self, form: &'a Form, submission: &'a Submission) -> Result<SubmissionRun<'a>> {
        self.check_form(form)?;
        debug!("Starting submission of form {}", form.id);
        Ok(SubmissionRun {
            registry: &self.registry,
            ctx: SubmissionContext::new(
                form,
                submission,
                self.gateway.as_ref(),
                self.files.as_ref(),
                &self.settings,
            ),
            halted: false,
        })
    }

    /// Validate every action without writing anything
    pub async fn validate(&self, form: &Form, submission: &Submission) -> Result<ValidationErrors> {
        let run = self.begin(form, submission)?;
        run.validate_all().await
    }

    /// Validate, then make every action
    pub async fn submit(&self, form: &Form, submission: &Submission) -> Result<SubmissionOutcome> {
        let mut run = self.begin(form, submission)?;

        let errors = run.validate_all().await?;
        if !errors.is_empty() {
            info!("Form {} rejected with {} validation errors", form.id, errors.len());
            return Ok(SubmissionOutcome::Rejected(errors));
        }

        run.enter_make();
        let mut redirect = None;
        let mut not_run = Vec::new();
        for instance in &form.actions {
            if run.is_halted() {
                not_run.push(instance.alias.clone());
                continue;
            }
            if let MakeOutcome::Redirect { url, .. } = run.make_action(instance).await? {
                redirect = Some(url);
            }
        }
        if !not_run.is_empty() {
            debug!("Redirect skipped actions: {}", not_run.join(", "));
        }

        info!("Form {} submitted", form.id);
        Ok(SubmissionOutcome::Completed(SubmissionReport {
            results: run.into_results(),
            redirect,
            not_run,
        }))
    }
}

/// One submission moving through validate and make
pub struct SubmissionRun<'a> {
    registry: &'a ActionRegistry,
    ctx: SubmissionContext<'a>,
    halted: bool,
}

impl<'a> SubmissionRun<'a> {
    fn action(&self, instance: &ActionInstance) -> Result<&'a dyn FormAction> {
        self.registry.resolve(instance)
    }

    pub fn context(&self) -> &SubmissionContext<'a> {
        &self.ctx
    }

    /// Whether a redirect has ended the run
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub async fn validate_action(&self, instance: &ActionInstance) -> Result<Vec<ValidationError>> {
        let action = self.action(instance)?;
        action
            .validate(instance, &self.ctx)
            .await
            .with_context(|| format!("Failed to validate action {}", instance.alias))
    }

    async fn validate_all(&self) -> Result<ValidationErrors> {
        let mut errors = ValidationErrors::new();
        for instance in &self.ctx.form.actions {
            errors.extend(self.validate_action(instance).await?);
        }
        Ok(errors)
    }

    /// Leave validation; results published from here on are visible to
    /// later actions
    pub fn enter_make(&mut self) {
        self.ctx.enter_make();
    }

    /// Make one action and publish its result
    ///
    /// A failing action publishes an empty result and the run goes on.
    /// After a redirect nothing else is made.
    pub async fn make_action(&mut self, instance: &ActionInstance) -> Result<MakeOutcome> {
        let action = self.action(instance)?;
        if self.halted {
            anyhow::bail!("Action {} cannot run after a redirect", instance.alias);
        }

        let outcome = match action.make(instance, &self.ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Action {} failed: {:#}", instance.alias, e);
                MakeOutcome::Continue(ActionResult::empty(&instance.action_name, action.schema().result_key))
            }
        };

        self.ctx.publish(&instance.action_name, &instance.alias, outcome.result().clone());
        if matches!(outcome, MakeOutcome::Redirect { .. }) {
            self.halted = true;
        }
        Ok(outcome)
    }

    pub fn into_results(self) -> ActionResults {
        self.ctx.into_results()
    }
}
