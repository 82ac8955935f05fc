//! State shared by the actions of one submission
//!
//! A context is created when a submission starts and dropped when it
//! finishes, so published results never outlive the submission that
//! produced them.

use super::custom_fields::CustomFieldMap;
use super::results::{ActionResult, ActionResults};
use crate::api::gateway::CrmGateway;
use crate::config::Settings;
use crate::files::FileStore;
use crate::form::{FieldMapper, Form, Submission};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Lifecycle step the context is currently serving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Every action checks its data; nothing has been published yet
    Validate,
    /// Actions persist in form order and publish their results
    Make,
}

pub struct SubmissionContext<'a> {
    pub form: &'a Form,
    pub submission: &'a Submission,
    pub gateway: &'a dyn CrmGateway,
    pub files: &'a dyn FileStore,
    pub settings: &'a Settings,
    phase: Phase,
    results: ActionResults,
    /// Custom field definitions per entity, fetched once per submission
    custom_fields: Mutex<HashMap<String, CustomFieldMap>>,
}

impl<'a> SubmissionContext<'a> {
    pub fn new(
        form: &'a Form,
        submission: &'a Submission,
        gateway: &'a dyn CrmGateway,
        files: &'a dyn FileStore,
        settings: &'a Settings,
    ) -> Self {
        Self {
            form,
            submission,
            gateway,
            files,
            settings,
            phase: Phase::Validate,
            results: ActionResults::new(),
            custom_fields: Mutex::new(HashMap::new()),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Switch to the make phase, starting from an empty registry
    pub fn enter_make(&mut self) {
        self.phase = Phase::Make;
        self.results = ActionResults::new();
    }

    pub fn mapper(&self) -> FieldMapper<'a> {
        FieldMapper::new(self.submission)
    }

    pub fn results(&self) -> &ActionResults {
        &self.results
    }

    pub fn publish(&mut self, action_name: &str, alias: &str, result: ActionResult) {
        self.results.set_result(action_name, alias, result);
    }

    pub fn into_results(self) -> ActionResults {
        self.results
    }

    /// Custom groups and fields that can extend an entity
    pub async fn custom_fields(&self, entity: &str) -> Result<CustomFieldMap> {
        let cached = self
            .custom_fields
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity)
            .cloned();
        if let Some(map) = cached {
            return Ok(map);
        }

        let map = CustomFieldMap::load(self.gateway, entity).await?;
        self.custom_fields
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entity.to_string(), map.clone());
        Ok(map)
    }
}
