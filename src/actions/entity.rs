//! Steps shared by every entity action's `make`
//!
//! The actions run the same sequence: collect the mapped data, check the
//! entity gate, resolve references, clean the data, write the primary
//! entity, then its custom fields, attachments and nested blocks. Only the
//! primary write can fail the action. Everything after it is logged and
//! recorded as `false` in the published result.

use super::context::SubmissionContext;
use super::custom_fields::is_custom_code;
use super::field_specs::{EntitySchema, NestedBlock};
use super::results::ActionResult;
use crate::api::constants::{CRM_DATE_FORMAT, CRM_DATETIME_FORMAT, DATE_FORMATS, defaults};
use crate::api::models::Record;
use crate::form::sanitize::{self, is_blank};
use crate::form::{ActionInstance, FieldMapper, GateState, gate};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::{debug, info, warn};
use serde_json::{Value, json};

/// A saved entity that custom fields and attachments link to
#[derive(Debug, Clone, Copy)]
pub struct EntityTarget<'a> {
    pub entity: &'a str,
    pub table: &'a str,
    pub id: i64,
}

/// Mapped data of an action, before clean-up
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityData {
    /// Primary entity fields
    pub data: Record,
    /// `custom_N` values, including empty ones
    pub custom: Record,
}

/// Resolve every mapped field the schema allows, plus custom fields
pub fn collect(instance: &ActionInstance, schema: &EntitySchema, mapper: &FieldMapper<'_>) -> EntityData {
    let mut collected = EntityData::default();

    for spec in schema.mapped_fields() {
        if let Some(source) = instance.source(spec.code) {
            collected.data.insert(spec.code.to_string(), mapper.resolve(source));
        }
    }

    for (code, source) in &instance.fields {
        if is_custom_code(code) {
            collected.custom.insert(code.clone(), mapper.resolve(source));
        }
    }

    collected
}

/// Resolve one ignored field explicitly
pub fn resolve_field(instance: &ActionInstance, mapper: &FieldMapper<'_>, code: &str) -> Option<Value> {
    instance
        .source(code)
        .map(|source| mapper.resolve(source))
        .filter(|value| !is_blank(value))
}

pub fn entity_gate(instance: &ActionInstance, mapper: &FieldMapper<'_>) -> GateState {
    gate::evaluate(instance.conditional.as_ref(), mapper)
}

/// Result published when an action writes nothing
pub fn skipped(instance: &ActionInstance, schema: &EntitySchema) -> ActionResult {
    debug!("Action {} gated off, nothing written", instance.alias);
    ActionResult::empty(&instance.action_name, schema.result_key)
}

/// Create the primary entity, or update it when an id is known
///
/// `None` means the write failed; the caller publishes `id: false`.
pub async fn save_primary(
    ctx: &SubmissionContext<'_>,
    instance: &ActionInstance,
    entity: &str,
    existing_id: Option<i64>,
    mut data: Record,
) -> Option<Record> {
    sanitize::prepare(&mut data);

    let saved = match existing_id {
        Some(id) => ctx.gateway.update(entity, id, data).await,
        None => ctx.gateway.create(entity, data).await,
    };

    match saved {
        Ok(record) => {
            info!(
                "{} {} {:?} for action {}",
                if existing_id.is_some() { "Updated" } else { "Created" },
                entity,
                record.get("id"),
                instance.alias
            );
            Some(record)
        }
        Err(e) => {
            warn!("Action {} failed to save {}: {:#}", instance.alias, entity, e);
            None
        }
    }
}

/// Resolve a nested block: `None` when its gate is closed or it has no data
pub fn resolve_block(instance: &ActionInstance, block: &NestedBlock, mapper: &FieldMapper<'_>) -> Option<Record> {
    let gate_source = instance.source(&block.gate_code());
    if !gate::evaluate(gate_source, mapper).allows() {
        debug!("Block {} of action {} gated off", block.key, instance.alias);
        return None;
    }

    let mut data = Record::new();
    for spec in block.fields {
        if let Some(source) = instance.source(&block.mapping_code(spec.code)) {
            data.insert(spec.code.to_string(), mapper.resolve(source));
        }
    }
    sanitize::prepare(&mut data);

    if !block.requires_any.iter().any(|code| data.contains_key(*code)) {
        return None;
    }
    if block.fields.iter().any(|spec| spec.code == "location_type_id") && !data.contains_key("location_type_id") {
        data.insert("location_type_id".to_string(), json!(defaults::LOCATION_TYPE_ID));
    }
    Some(data)
}

/// Create a nested block, linked to its parent by `links`
///
/// Returns the created record, `false` when the write failed, or `None`
/// when the block was skipped.
pub async fn write_block(
    ctx: &SubmissionContext<'_>,
    instance: &ActionInstance,
    block: &NestedBlock,
    links: &Record,
) -> Option<Value> {
    let mut data = resolve_block(instance, block, &ctx.mapper())?;
    for (key, value) in links {
        data.insert(key.clone(), value.clone());
    }

    match ctx.gateway.create(block.entity, data).await {
        Ok(record) => {
            debug!("Created {} {:?} for action {}", block.entity, record.get("id"), instance.alias);
            Some(Value::Object(record))
        }
        Err(e) => {
            warn!("Action {} failed to create {} ({}): {:#}", instance.alias, block.entity, block.key, e);
            Some(Value::Bool(false))
        }
    }
}

/// Create every nested block of a schema and record the outcomes
pub async fn write_blocks(
    ctx: &SubmissionContext<'_>,
    instance: &ActionInstance,
    blocks: &[NestedBlock],
    links: &Record,
    result: &mut ActionResult,
) {
    for block in blocks {
        if let Some(outcome) = write_block(ctx, instance, block, links).await {
            result.set_nested(block.key, outcome);
        }
    }
}

pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            ["%Y-%m-%d", "%d/%m/%Y", "%Y%m%d"]
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|date| date.naive_local()))
}

/// Rewrite date fields into the CRM's format
///
/// Returns the codes whose value could not be parsed; those are left as
/// they were.
pub fn normalize_dates(data: &mut Record, codes: &[&str], date_only: bool) -> Vec<String> {
    let format = if date_only { CRM_DATE_FORMAT } else { CRM_DATETIME_FORMAT };
    let mut invalid = Vec::new();

    for code in codes {
        let Some(value) = data.get_mut(*code) else {
            continue;
        };
        let Some(text) = value.as_str() else {
            continue;
        };
        match parse_datetime(text) {
            Some(parsed) => *value = json!(parsed.format(format).to_string()),
            None => invalid.push(code.to_string()),
        }
    }
    invalid
}

/// Submission time in the CRM's date-time format
pub fn submitted_at(ctx: &SubmissionContext<'_>, date_only: bool) -> String {
    let format = if date_only { CRM_DATE_FORMAT } else { CRM_DATETIME_FORMAT };
    ctx.submission.submitted_at.format(format).to_string()
}
