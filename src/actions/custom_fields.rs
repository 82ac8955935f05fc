//! Custom groups, their "extends" conditions and custom field persistence
//!
//! Custom fields are mapped as `custom_N` and sent to the CRM under their
//! APIv4 name, `group_name.field_name`. They are written after the
//! primary entity exists, one group at a time, and only when the group
//! extends the entity in the submission's context (contact type and
//! sub-type, activity or case type, participant role, event and event
//! type).

use super::context::SubmissionContext;
use super::entity::EntityTarget;
use super::results::ActionResult;
use crate::api::constants::entities;
use crate::api::gateway::{CrmGateway, Filter};
use crate::api::models::{AttachmentHandle, Record, loose_eq, record_id, value_as_id};
use crate::form::ActionInstance;
use crate::form::sanitize::{self, is_blank};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde_json::{Value, json};
use std::collections::HashMap;

/// Data type of File custom fields
const FILE_DATA_TYPE: &str = "File";

/// Separator CiviCRM uses in serialized multi-value columns
const VALUE_SEPARATOR: char = '\u{1}';

#[derive(Debug, Clone, PartialEq)]
pub struct CustomField {
    pub id: i64,
    pub name: String,
    pub label: String,
    pub data_type: String,
    pub html_type: String,
    pub is_required: bool,
}

impl CustomField {
    fn from_record(record: &Record) -> Option<Self> {
        Some(Self {
            id: record_id(record)?,
            name: text(record, "name"),
            label: text(record, "label"),
            data_type: text(record, "data_type"),
            html_type: text(record, "html_type"),
            is_required: record.get("is_required").is_some_and(|v| loose_eq(v, &json!(true))),
        })
    }

    /// Mapping code, e.g. `custom_12`
    pub fn code(&self) -> String {
        format!("custom_{}", self.id)
    }

    pub fn is_file(&self) -> bool {
        self.data_type == FILE_DATA_TYPE
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomGroup {
    pub id: i64,
    pub name: String,
    pub title: String,
    /// Entity type the group extends, e.g. `Individual` or `Participant`
    pub extends: String,
    /// Which column `extends_entity_column_value` filters on; entity specific
    pub extends_entity_column_id: Option<i64>,
    /// Sub-types, types or parent ids the group is restricted to
    pub extends_entity_column_value: Vec<Value>,
    pub fields: Vec<CustomField>,
}

impl CustomGroup {
    fn from_record(record: &Record) -> Option<Self> {
        Some(Self {
            id: record_id(record)?,
            name: text(record, "name"),
            title: text(record, "title"),
            extends: text(record, "extends"),
            extends_entity_column_id: record.get("extends_entity_column_id").and_then(value_as_id),
            extends_entity_column_value: column_values(record.get("extends_entity_column_value")),
            fields: Vec::new(),
        })
    }

    /// Whether the group extends an entity described by the context
    pub fn applies(&self, context: &ExtendsContext) -> bool {
        if !context.entity_types.iter().any(|entity_type| *entity_type == self.extends) {
            return false;
        }
        if self.extends_entity_column_value.is_empty() {
            return true;
        }
        let Some(values) = context.columns.get(&self.extends_entity_column_id) else {
            return false;
        };
        values
            .iter()
            .any(|value| self.extends_entity_column_value.iter().any(|wanted| loose_eq(value, wanted)))
    }
}

fn text(record: &Record, key: &str) -> String {
    record.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn is_active(record: &Record) -> bool {
    record.get("is_active").is_none_or(|active| !loose_eq(active, &json!(false)))
}

fn column_values(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.iter().filter(|item| !is_blank(item)).cloned().collect(),
        Some(Value::String(s)) => s
            .split([VALUE_SEPARATOR, ','])
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| json!(part))
            .collect(),
        Some(Value::Number(n)) => vec![Value::Number(n.clone())],
        _ => Vec::new(),
    }
}

/// What an entity in a submission offers for matching "extends" conditions
#[derive(Debug, Clone, Default)]
pub struct ExtendsContext {
    entity_types: Vec<String>,
    columns: HashMap<Option<i64>, Vec<Value>>,
}

impl ExtendsContext {
    pub fn new(entity_types: &[&str]) -> Self {
        Self {
            entity_types: entity_types.iter().map(|entity_type| entity_type.to_string()).collect(),
            columns: HashMap::new(),
        }
    }

    /// Values matched against groups filtering on the given column
    pub fn with_values(mut self, column: Option<i64>, values: impl IntoIterator<Item = Value>) -> Self {
        self.columns.entry(column).or_default().extend(values);
        self
    }
}

/// Entity types whose custom groups can apply to an entity
fn extended_types(entity: &str) -> &'static [&'static str] {
    match entity {
        entities::CONTACT => &["Contact", "Individual", "Organization", "Household"],
        entities::ACTIVITY => &["Activity"],
        entities::CASE => &["Case"],
        entities::EVENT => &["Event"],
        entities::PARTICIPANT => &["Participant"],
        _ => &[],
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomFieldMap {
    groups: Vec<CustomGroup>,
}

impl CustomFieldMap {
    pub fn new(groups: Vec<CustomGroup>) -> Self {
        Self { groups }
    }

    /// Fetch the active groups extending an entity, with their active fields
    pub async fn load(gateway: &dyn CrmGateway, entity: &str) -> Result<Self> {
        let types = extended_types(entity);
        if types.is_empty() {
            return Ok(Self::default());
        }

        let records = gateway
            .find(entities::CUSTOM_GROUP, &Filter::new())
            .await
            .context("Failed to load custom groups")?;

        let mut groups = Vec::new();
        for record in records.iter().filter(|record| is_active(record)) {
            let Some(mut group) = CustomGroup::from_record(record) else {
                continue;
            };
            if !types.contains(&group.extends.as_str()) {
                continue;
            }
            let fields = gateway
                .find(entities::CUSTOM_FIELD, &Filter::new().eq("custom_group_id", group.id))
                .await
                .with_context(|| format!("Failed to load fields of custom group {}", group.name))?;
            group.fields = fields
                .iter()
                .filter(|field| is_active(field))
                .filter_map(CustomField::from_record)
                .collect();
            groups.push(group);
        }

        debug!("Loaded {} custom groups for {}", groups.len(), entity);
        Ok(Self { groups })
    }

    pub fn groups(&self) -> &[CustomGroup] {
        &self.groups
    }

    /// The field behind a `custom_N` code, with its group
    pub fn field(&self, code: &str) -> Option<(&CustomGroup, &CustomField)> {
        let id: i64 = code.strip_prefix("custom_")?.parse().ok()?;
        self.groups
            .iter()
            .find_map(|group| group.fields.iter().find(|field| field.id == id).map(|field| (group, field)))
    }

    /// APIv4 name of the field behind a `custom_N` code
    pub fn api_name(&self, code: &str) -> Option<String> {
        self.field(code).map(|(group, field)| format!("{}.{}", group.name, field.name))
    }

    /// Re-key a `custom_N` payload by APIv4 names
    fn to_api(&self, values: &Record) -> Record {
        values
            .iter()
            .map(|(code, value)| (self.api_name(code).unwrap_or_else(|| code.clone()), value.clone()))
            .collect()
    }

    /// Map a code to its field when the field's group applies in this context
    fn applicable(&self, code: &str, context: &ExtendsContext) -> Option<&CustomField> {
        let Some((group, field)) = self.field(code) else {
            debug!("Skipping unknown custom field {}", code);
            return None;
        };
        if !group.applies(context) {
            debug!("Custom group {} does not extend this entity, skipping {}", group.name, code);
            return None;
        }
        Some(field)
    }
}

/// Whether a mapping code names a custom field
pub fn is_custom_code(code: &str) -> bool {
    code.strip_prefix("custom_")
        .is_some_and(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
}

/// Write the mapped custom fields of a freshly saved entity
///
/// Failures are logged and recorded as `custom_fields: false`; they never
/// undo the primary entity.
pub async fn write_custom_fields(
    ctx: &SubmissionContext<'_>,
    instance: &ActionInstance,
    target: &EntityTarget<'_>,
    values: &Record,
    extends: &ExtendsContext,
    result: &mut ActionResult,
) {
    if values.is_empty() {
        return;
    }

    let map = match ctx.custom_fields(target.entity).await {
        Ok(map) => map,
        Err(e) => {
            warn!("Custom fields of {} {} not written: {:#}", target.entity, target.id, e);
            result.set_nested("custom_fields", false);
            return;
        }
    };

    match save_values(ctx, instance, target, values, extends, &map).await {
        Ok(Some(written)) => result.set_nested("custom_fields", Value::Object(written)),
        Ok(None) => {}
        Err(e) => {
            warn!("Custom fields of {} {} not written: {:#}", target.entity, target.id, e);
            result.set_nested("custom_fields", false);
        }
    }

    match clear_removed_files(ctx, instance, target, values, extends, &map).await {
        Ok(cleared) if !cleared.is_empty() => result.set_nested("cleared_files", json!(cleared)),
        Ok(_) => {}
        Err(e) => {
            warn!("File fields of {} {} not cleared: {:#}", target.entity, target.id, e);
            result.set_nested("cleared_files", false);
        }
    }
}

async fn save_values(
    ctx: &SubmissionContext<'_>,
    instance: &ActionInstance,
    target: &EntityTarget<'_>,
    values: &Record,
    extends: &ExtendsContext,
    map: &CustomFieldMap,
) -> Result<Option<Record>> {
    let mapper = ctx.mapper();
    let mut payload = Record::new();

    for (code, value) in values {
        let Some(field) = map.applicable(code, extends) else {
            continue;
        };
        if !field.is_file() {
            payload.insert(code.clone(), value.clone());
            continue;
        }

        let options = instance.file_options(code);
        let upload = instance.source(code).and_then(|source| mapper.resolve_upload(source));

        if is_blank(value) {
            // Nothing submitted: a staged upload for a CRM-only field is not kept either
            if let (true, Some(upload)) = (options.crm_only, upload) {
                ctx.files.discard(&upload.path)?;
            }
            continue;
        }

        let Some(upload) = upload else {
            // Already a CRM file id, e.g. a resubmitted value
            payload.insert(code.clone(), value.clone());
            continue;
        };

        let handle = AttachmentHandle::new(&upload.path, &upload.name, &upload.mime_type);
        let attachment = ctx
            .gateway
            .create_attachment(&handle, target.table, target.id)
            .await
            .with_context(|| format!("Failed to attach {} for {}", upload.name, code))?;
        let file_id = record_id(&attachment).context("Attachment has no id")?;

        if options.crm_only {
            ctx.files.discard(&upload.path)?;
        } else {
            ctx.files.store(file_id, &upload.path, &upload.name)?;
        }
        payload.insert(code.clone(), json!(file_id));
    }

    sanitize::prepare(&mut payload);
    if payload.is_empty() {
        return Ok(None);
    }

    ctx.gateway
        .update(target.entity, target.id, map.to_api(&payload))
        .await
        .with_context(|| format!("Failed to update custom fields of {} {}", target.entity, target.id))?;
    Ok(Some(payload))
}

/// Clear File fields that were submitted empty while the entity still holds a file
///
/// The CRM ignores empty File values on write, so a removed file would
/// otherwise survive. Fields stored only in the CRM are left alone.
async fn clear_removed_files(
    ctx: &SubmissionContext<'_>,
    instance: &ActionInstance,
    target: &EntityTarget<'_>,
    values: &Record,
    extends: &ExtendsContext,
    map: &CustomFieldMap,
) -> Result<Vec<String>> {
    let candidates: Vec<&String> = values
        .iter()
        .filter(|(code, value)| is_blank(value) && !instance.file_options(code).crm_only)
        .filter(|(code, _)| map.applicable(code, extends).is_some_and(CustomField::is_file))
        .map(|(code, _)| code)
        .collect();
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let Some(current) = ctx.gateway.get_by_id(target.entity, target.id).await? else {
        return Ok(Vec::new());
    };

    let mut cleared = Vec::new();
    for code in candidates {
        let Some(api_name) = map.api_name(code) else {
            continue;
        };
        let Some(file_id) = current.get(&api_name).and_then(value_as_id) else {
            continue;
        };

        ctx.files.remove_stored(file_id)?;
        if let Err(e) = ctx.gateway.delete(entities::ATTACHMENT, file_id).await {
            warn!("Attachment {} of {} {} not deleted: {:#}", file_id, target.entity, target.id, e);
        }
        let mut reset = Record::new();
        reset.insert(api_name, Value::Null);
        ctx.gateway.update(target.entity, target.id, reset).await?;

        info!("Cleared file {} from {} of {} {}", file_id, code, target.entity, target.id);
        cleared.push(code.clone());
    }
    Ok(cleared)
}
