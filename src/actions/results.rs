//! Results published by actions during one submission
//!
//! Every action publishes exactly one [`ActionResult`] after its `make`
//! step, under both its action name and its alias. Later actions read
//! them back to find the ids of entities created earlier in the same
//! submission. Lookups of a key that has not been published yet simply
//! return `None`.

use crate::api::models::{Record, record_id};
use serde_json::{Map, Value, json};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ActionResult {
    /// Action name of the producing action, e.g. `cwps_case`
    pub form_action: String,
    /// Key the primary record is published under, e.g. `case`
    pub entity_key: String,
    pub id: Option<i64>,
    pub record: Option<Record>,
    /// Outcomes of sub-steps, merged into the top level of the published value
    pub nested: Map<String, Value>,
}

impl ActionResult {
    /// A result with no entity, as published by a skipped or failed action
    pub fn empty(form_action: &str, entity_key: &str) -> Self {
        Self {
            form_action: form_action.to_string(),
            entity_key: entity_key.to_string(),
            id: None,
            record: None,
            nested: Map::new(),
        }
    }

    /// Attach the primary record; the id is taken from it
    pub fn with_record(mut self, record: Record) -> Self {
        self.id = record_id(&record);
        self.record = Some(record);
        self
    }

    pub fn with_nested(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set_nested(key, value);
        self
    }

    pub fn set_nested(&mut self, key: &str, value: impl Into<Value>) {
        self.nested.insert(key.to_string(), value.into());
    }

    pub fn nested(&self, key: &str) -> Option<&Value> {
        self.nested.get(key)
    }

    /// `{ form_action, id: <id|false>, <entity_key>: <record|false>, ...nested }`
    pub fn to_value(&self) -> Value {
        let mut value = Map::new();
        value.insert("form_action".to_string(), json!(self.form_action));
        value.insert("id".to_string(), self.id.map_or(Value::Bool(false), |id| json!(id)));
        value.insert(
            self.entity_key.clone(),
            self.record.clone().map_or(Value::Bool(false), Value::Object),
        );
        for (key, nested) in &self.nested {
            value.entry(key.clone()).or_insert_with(|| nested.clone());
        }
        Value::Object(value)
    }
}

/// Per-submission store of published results
#[derive(Debug, Clone, Default)]
pub struct ActionResults {
    results: HashMap<String, ActionResult>,
    /// Aliases in publication order
    aliases: Vec<String>,
}

impl ActionResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a result under both keys, replacing anything stored there
    pub fn set_result(&mut self, action_name: &str, alias: &str, result: ActionResult) {
        self.results.insert(action_name.to_string(), result.clone());
        self.results.insert(alias.to_string(), result);
        if !self.aliases.iter().any(|known| known == alias) {
            self.aliases.push(alias.to_string());
        }
    }

    pub fn get_result(&self, key: &str) -> Option<&ActionResult> {
        self.results.get(key)
    }

    /// Id of the primary entity published under a key
    pub fn id_of(&self, key: &str) -> Option<i64> {
        self.get_result(key).and_then(|result| result.id)
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Results keyed by alias, in the order they were first published
    pub fn by_alias(&self) -> impl Iterator<Item = (&str, &ActionResult)> {
        self.aliases
            .iter()
            .filter_map(|alias| self.results.get(alias).map(|result| (alias.as_str(), result)))
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.by_alias()
                .map(|(alias, result)| (alias.to_string(), result.to_value()))
                .collect(),
        )
    }
}
