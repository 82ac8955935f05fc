//! Shared setup for the integration tests

#![allow(dead_code)]

use anyhow::Result;
use crm_form_actions::api::memory::InMemoryGateway;
use crm_form_actions::files::LocalFileStore;
use crm_form_actions::form::{Form, Submission, UploadedFile};
use crm_form_actions::pipeline::{FormProcessor, SubmissionOutcome, SubmissionReport};
use crm_form_actions::actions::ValidationErrors;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// An in-memory CRM and a file store in a temporary directory
pub struct Harness {
    pub gateway: Arc<InMemoryGateway>,
    pub files: Arc<LocalFileStore>,
    pub temp_dir: TempDir,
}

impl Harness {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let files = Arc::new(LocalFileStore::open(temp_dir.path().join("files"))?);
        Ok(Self {
            gateway: Arc::new(InMemoryGateway::new()),
            files,
            temp_dir,
        })
    }

    pub fn processor(&self) -> Result<FormProcessor> {
        FormProcessor::new(self.gateway.clone(), self.files.clone())
    }

    /// Submit and expect every action to pass validation
    pub async fn submit(&self, form: &Form, submission: &Submission) -> Result<SubmissionReport> {
        match self.processor()?.submit(form, submission).await? {
            SubmissionOutcome::Completed(report) => Ok(report),
            SubmissionOutcome::Rejected(errors) => anyhow::bail!("unexpected rejection: {}", errors),
        }
    }

    /// Submit and expect a validation failure
    pub async fn reject(&self, form: &Form, submission: &Submission) -> Result<ValidationErrors> {
        match self.processor()?.submit(form, submission).await? {
            SubmissionOutcome::Rejected(errors) => Ok(errors),
            SubmissionOutcome::Completed(_) => anyhow::bail!("submission was not rejected"),
        }
    }

    /// Write a staged upload for a form field
    pub fn stage(&self, field: &str, name: &str, content: &[u8]) -> Result<UploadedFile> {
        let path: PathBuf = self.temp_dir.path().join(format!("staged-{}", name));
        std::fs::write(&path, content)?;
        Ok(UploadedFile {
            field: field.to_string(),
            path,
            name: name.to_string(),
            mime_type: "application/pdf".to_string(),
        })
    }
}
