//! Form definitions as authored in the form builder
//!
//! ```toml
//! id = "CF5f1a"
//! name = "Housing request"
//!
//! [[actions]]
//! type = "cwps_contact"
//! alias = "new_contact"
//! fields = { first_name = "%first_name%", email = "%email%" }
//! ```

use super::mapper::Source;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Per-field options for File-type fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileFieldOptions {
    /// Keep the file only in the CRM, never in local storage
    #[serde(default)]
    pub crm_only: bool,
}

/// One action placed on a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInstance {
    /// Identifier of the action type, e.g. `cwps_case`
    #[serde(rename = "type")]
    pub action_name: String,
    /// Unique name of this action within the form
    pub alias: String,
    /// Entity field code → mapped source
    #[serde(default)]
    pub fields: BTreeMap<String, Source>,
    /// Entity-level conditional reference
    #[serde(default)]
    pub conditional: Option<Source>,
    /// Action-specific settings, parsed by the action into its own type
    #[serde(default)]
    pub settings: Value,
    #[serde(default)]
    pub files: BTreeMap<String, FileFieldOptions>,
}

impl ActionInstance {
    pub fn new(action_name: &str, alias: &str) -> Self {
        Self {
            action_name: action_name.to_string(),
            alias: alias.to_string(),
            fields: BTreeMap::new(),
            conditional: None,
            settings: Value::Null,
            files: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, code: &str, source: impl Into<Source>) -> Self {
        self.fields.insert(code.to_string(), source.into());
        self
    }

    pub fn with_conditional(mut self, source: impl Into<Source>) -> Self {
        self.conditional = Some(source.into());
        self
    }

    pub fn with_settings(mut self, settings: Value) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_file_options(mut self, code: &str, options: FileFieldOptions) -> Self {
        self.files.insert(code.to_string(), options);
        self
    }

    /// Mapped source of a field code
    pub fn source(&self, code: &str) -> Option<&Source> {
        self.fields.get(code).filter(|source| !source.is_empty())
    }

    pub fn file_options(&self, code: &str) -> FileFieldOptions {
        self.files.get(code).cloned().unwrap_or_default()
    }

    /// Parse the settings table into the action's settings type
    pub fn settings<T: DeserializeOwned>(&self) -> Result<T> {
        let settings = match &self.settings {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        serde_json::from_value(settings)
            .with_context(|| format!("Invalid settings for action '{}' ({})", self.alias, self.action_name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Actions in execution order
    #[serde(default)]
    pub actions: Vec<ActionInstance>,
}

impl Form {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: String::new(),
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: ActionInstance) -> Self {
        self.actions.push(action);
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let form: Form = toml::from_str(content).context("Failed to parse form definition")?;
        form.check_aliases()?;
        Ok(form)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read form file: {:?}", path))?;
        Self::from_toml_str(&content).with_context(|| format!("Invalid form file: {:?}", path))
    }

    pub fn action(&self, alias: &str) -> Option<&ActionInstance> {
        self.actions.iter().find(|action| action.alias == alias)
    }

    /// Every action needs a non-empty alias that is unique within the form
    pub fn check_aliases(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for action in &self.actions {
            if action.alias.trim().is_empty() {
                anyhow::bail!("Action of type '{}' on form '{}' has no alias", action.action_name, self.id);
            }
            if !seen.insert(action.alias.as_str()) {
                anyhow::bail!("Duplicate action alias '{}' on form '{}'", action.alias, self.id);
            }
        }
        Ok(())
    }
}
