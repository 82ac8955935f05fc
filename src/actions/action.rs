//! The protocol every form action implements

use super::attachments::slot_code;
use super::context::SubmissionContext;
use super::custom_fields::{CustomField, CustomFieldMap};
use super::field_specs::{CONDITIONAL_CODE, EntitySchema, FieldKind, FieldSpec};
use super::results::ActionResult;
use super::validation::ValidationError;
use crate::api::gateway::CrmGateway;
use crate::form::{ActionInstance, Form};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Static description of an action type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionDefinition {
    /// Stable identifier, e.g. `cwps_contact`
    pub action_name: &'static str,
    pub action_label: &'static str,
    pub alias_placeholder: &'static str,
    /// Prepended to every field key the action contributes to a form schema
    pub field_key_prefix: &'static str,
    /// Prepended to every field label
    pub field_name_prefix: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Choice {
    pub value: Value,
    pub label: String,
}

/// One field of a form schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDefinition {
    pub key: String,
    pub name: String,
    pub code: String,
    pub kind: FieldKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Choice>,
    /// Custom group the field belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsGroup {
    pub key: String,
    pub label: String,
    pub fields: Vec<FieldDefinition>,
}

/// What the host form builder renders for one action instance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionSchema {
    pub action_name: String,
    pub action_label: String,
    pub alias: String,
    pub fields: Vec<FieldDefinition>,
    pub settings: Vec<SettingsGroup>,
}

impl ActionDefinition {
    /// Field definition for a mapping code
    pub fn mapping_field(&self, code: &str, label: &str, kind: FieldKind, required: bool) -> FieldDefinition {
        FieldDefinition {
            key: format!("{}{}", self.field_key_prefix, code),
            name: format!("{}{}", self.field_name_prefix, label),
            code: code.to_string(),
            kind,
            required,
            choices: Vec::new(),
            group: None,
        }
    }

    fn spec_field(&self, code: &str, spec: &FieldSpec) -> FieldDefinition {
        self.mapping_field(code, spec.label, spec.kind, spec.required)
    }

    /// Every mapping field of an entity schema: entity fields, the entity
    /// gate, nested blocks with their gates and attachment slots
    pub fn mapping_fields(&self, schema: &EntitySchema) -> Vec<FieldDefinition> {
        let mut fields: Vec<FieldDefinition> = schema.fields.iter().map(|spec| self.spec_field(spec.code, spec)).collect();
        fields.push(self.mapping_field(CONDITIONAL_CODE, "Conditional Reference", FieldKind::Text, false));

        for block in schema.blocks {
            fields.push(self.mapping_field(
                &block.gate_code(),
                &format!("{} Conditional Reference", block.label),
                FieldKind::Text,
                false,
            ));
            for spec in block.fields {
                let mut field = self.spec_field(&block.mapping_code(spec.code), spec);
                field.name = format!("{}{} {}", self.field_name_prefix, block.label, spec.label);
                fields.push(field);
            }
        }

        for slot in 1..=schema.attachments {
            let code = slot_code(slot);
            fields.push(self.mapping_field(&code, &format!("Attachment {}", slot), FieldKind::File, false));
            fields.push(self.mapping_field(
                &format!("{}.description", code),
                &format!("Attachment {} Description", slot),
                FieldKind::Text,
                false,
            ));
        }
        fields
    }

    /// Settings group for an entity reference; the action choices are the
    /// aliases of the actions placed before this one
    pub fn reference_group(&self, key: &str, label: &str, form: &Form, instance: &ActionInstance) -> SettingsGroup {
        let mut action = self.mapping_field(&format!("{}.action", key), &format!("{} Action Reference", label), FieldKind::Text, false);
        action.choices = form
            .actions
            .iter()
            .take_while(|earlier| earlier.alias != instance.alias)
            .map(|earlier| Choice {
                value: Value::String(earlier.alias.clone()),
                label: earlier.alias.clone(),
            })
            .collect();

        SettingsGroup {
            key: key.to_string(),
            label: label.to_string(),
            fields: vec![
                action,
                self.mapping_field(&format!("{}.id", key), &format!("{} ID", label), FieldKind::Number, false),
                self.mapping_field(&format!("{}.field", key), &format!("{} Field", label), FieldKind::Text, false),
            ],
        }
    }

    fn custom_field(&self, group: &str, field: &CustomField) -> FieldDefinition {
        let kind = match field.data_type.as_str() {
            "File" => FieldKind::File,
            "Date" => FieldKind::DateTime,
            "Int" | "Float" | "Money" => FieldKind::Number,
            "Boolean" => FieldKind::Boolean,
            _ => FieldKind::Text,
        };
        let mut definition = self.mapping_field(&field.code(), &field.label, kind, field.is_required);
        definition.group = Some(group.to_string());
        definition
    }
}

/// How `make` ended
#[derive(Debug, Clone, PartialEq)]
pub enum MakeOutcome {
    /// Publish the result and go on with the next action
    Continue(ActionResult),
    /// Publish the result, then stop the pipeline and send the submitter here
    Redirect { result: ActionResult, url: String },
}

impl MakeOutcome {
    pub fn result(&self) -> &ActionResult {
        match self {
            Self::Continue(result) | Self::Redirect { result, .. } => result,
        }
    }
}

#[async_trait]
pub trait FormAction: Send + Sync {
    fn definition(&self) -> &'static ActionDefinition;

    fn schema(&self) -> &'static EntitySchema;

    /// Settings groups shown next to the field mapping
    fn settings_groups(&self, _form: &Form, _instance: &ActionInstance) -> Vec<SettingsGroup> {
        Vec::new()
    }

    /// Build the form schema for an instance, filling option choices and
    /// custom fields from the CRM
    async fn load(&self, form: &Form, instance: &ActionInstance, gateway: &dyn CrmGateway) -> Result<ActionSchema> {
        let definition = self.definition();
        let schema = self.schema();
        let mut fields = definition.mapping_fields(schema);

        let mut choices: HashMap<&'static str, Vec<Choice>> = HashMap::new();
        for field in &mut fields {
            let FieldKind::Option { group } = field.kind else {
                continue;
            };
            if !choices.contains_key(group) {
                let options = gateway
                    .option_values(group)
                    .await
                    .with_context(|| format!("Failed to load options of {}", group))?;
                let loaded = options
                    .iter()
                    .map(|option| Choice {
                        value: option.get("value").cloned().unwrap_or(Value::Null),
                        label: option
                            .get("label")
                            .or_else(|| option.get("name"))
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    })
                    .collect();
                choices.insert(group, loaded);
            }
            field.choices = choices.get(group).cloned().unwrap_or_default();
        }

        if schema.entity_table.is_some() {
            let custom = CustomFieldMap::load(gateway, schema.entity).await?;
            for group in custom.groups() {
                fields.extend(group.fields.iter().map(|field| definition.custom_field(&group.title, field)));
            }
        }

        Ok(ActionSchema {
            action_name: definition.action_name.to_string(),
            action_label: definition.action_label.to_string(),
            alias: instance.alias.clone(),
            fields,
            settings: self.settings_groups(form, instance),
        })
    }

    /// Check the submission without writing anything
    async fn validate(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> Result<Vec<ValidationError>>;

    /// Persist the action's entities and return the result to publish
    async fn make(&self, instance: &ActionInstance, ctx: &SubmissionContext<'_>) -> Result<MakeOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::field_specs::CASE_SCHEMA;

    const DEFINITION: ActionDefinition = ActionDefinition {
        action_name: "cwps_case",
        action_label: "CiviCRM Case",
        alias_placeholder: "new_case",
        field_key_prefix: "cwps_case_",
        field_name_prefix: "Case ",
    };

    #[test]
    fn test_mapping_fields_are_prefixed() {
        let fields = DEFINITION.mapping_fields(&CASE_SCHEMA);
        let subject = fields.iter().find(|field| field.code == "subject").unwrap();

        assert_eq!(subject.key, "cwps_case_subject");
        assert_eq!(subject.name, "Case Subject");
        assert!(fields.iter().any(|field| field.code == "conditional"));
        assert!(fields.iter().any(|field| field.code == "attachment_3.description"));
    }

    #[test]
    fn test_reference_choices_exclude_later_actions() {
        let form = Form::new("CF1")
            .with_action(ActionInstance::new("cwps_contact", "new_contact"))
            .with_action(ActionInstance::new("cwps_case", "new_case"))
            .with_action(ActionInstance::new("cwps_contact", "later_contact"));
        let instance = form.action("new_case").unwrap();

        let group = DEFINITION.reference_group("contact", "Contact", &form, instance);
        let choices: Vec<&str> = group.fields[0].choices.iter().map(|choice| choice.label.as_str()).collect();

        assert_eq!(choices, vec!["new_contact"]);
    }
}
