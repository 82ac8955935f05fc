//! Raw data handed over by the host form builder for one submission

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One submitted form field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedField {
    /// Builder field id, e.g. `fld_8768091`
    pub id: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub value: Value,
}

/// A file uploaded through a form field and staged locally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Id or slug of the field the file was uploaded through
    pub field: String,
    pub path: PathBuf,
    pub name: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
}

fn default_mime_type() -> String {
    "application/octet-stream".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    /// CMS post the form is embedded in
    #[serde(default)]
    pub post_id: Option<i64>,
    #[serde(default)]
    pub fields: Vec<SubmittedField>,
    /// Magic tag values supplied by the host, keyed without braces (`user:id`)
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Query-string variables of the page the form was submitted from
    #[serde(default)]
    pub query: HashMap<String, String>,
    #[serde(default)]
    pub uploads: Vec<UploadedFile>,
    #[serde(default = "Local::now")]
    pub submitted_at: DateTime<Local>,
}

impl Default for Submission {
    fn default() -> Self {
        Self {
            post_id: None,
            fields: Vec::new(),
            tags: HashMap::new(),
            query: HashMap::new(),
            uploads: Vec::new(),
            submitted_at: Local::now(),
        }
    }
}

impl Submission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse submission JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read submission file: {:?}", path))?;
        Self::from_json_str(&content).with_context(|| format!("Invalid submission file: {:?}", path))
    }

    /// Add a field whose slug equals its id
    pub fn with_value(self, slug: &str, value: impl Into<Value>) -> Self {
        self.with_field(slug, Some(slug), value)
    }

    pub fn with_field(mut self, id: &str, slug: Option<&str>, value: impl Into<Value>) -> Self {
        self.fields.push(SubmittedField {
            id: id.to_string(),
            slug: slug.map(str::to_string),
            value: value.into(),
        });
        self
    }

    pub fn with_tag(mut self, tag: &str, value: &str) -> Self {
        self.tags.insert(tag.to_string(), value.to_string());
        self
    }

    pub fn with_upload(mut self, upload: UploadedFile) -> Self {
        self.uploads.push(upload);
        self
    }

    pub fn with_post_id(mut self, post_id: i64) -> Self {
        self.post_id = Some(post_id);
        self
    }

    fn field(&self, key: &str) -> Option<&SubmittedField> {
        self.fields
            .iter()
            .find(|field| field.id == key)
            .or_else(|| self.fields.iter().find(|field| field.slug.as_deref() == Some(key)))
    }

    /// Value of a field looked up by id, then by slug
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.field(key).map(|field| &field.value)
    }

    /// File uploaded through a field, looked up by id or slug
    pub fn upload(&self, key: &str) -> Option<&UploadedFile> {
        let id = self.field(key).map(|field| field.id.as_str());
        let slug = self.field(key).and_then(|field| field.slug.as_deref());
        self.uploads.iter().find(|upload| {
            upload.field == key || Some(upload.field.as_str()) == id || Some(upload.field.as_str()) == slug
        })
    }

    pub fn tag(&self, tag: &str) -> Option<&str> {
        self.tags.get(tag).map(String::as_str)
    }

    pub fn query_var(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}
