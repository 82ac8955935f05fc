//! In-memory CRM gateway
//!
//! Keeps one table per entity with sequential ids and records every write
//! in an [`Operations`] log. Used by the test-suite and by the CLI when no
//! remote CRM is configured.

use super::constants::entities;
use super::gateway::{CrmGateway, Filter};
use super::models::{AttachmentHandle, Record, record_id};
use super::operations::{Operation, Operations};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, BTreeMap<i64, Record>>,
    next_ids: HashMap<String, i64>,
    settings: HashMap<String, Value>,
    failing: HashSet<String>,
    log: Operations,
}

impl State {
    fn next_id(&mut self, entity: &str) -> i64 {
        let next = self.next_ids.entry(entity.to_string()).or_insert(1);
        let id = *next;
        *next += 1;
        id
    }

    fn insert(&mut self, entity: &str, mut record: Record) -> Record {
        let id = match record_id(&record) {
            Some(id) => {
                let next = self.next_ids.entry(entity.to_string()).or_insert(1);
                *next = (*next).max(id + 1);
                id
            }
            None => self.next_id(entity),
        };
        record.insert("id".to_string(), json!(id));
        self.tables
            .entry(entity.to_string())
            .or_default()
            .insert(id, record.clone());
        record
    }
}

/// Seed file layout: `{ "settings": {...}, "records": { "Entity": [ {...} ] } }`
#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub settings: HashMap<String, Value>,
    #[serde(default)]
    pub records: BTreeMap<String, Vec<Record>>,
}

#[derive(Debug, Default)]
pub struct InMemoryGateway {
    state: Mutex<State>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a gateway from a parsed seed
    pub fn from_seed(seed: Seed) -> Self {
        let gateway = Self::new();
        {
            let mut state = gateway.lock();
            state.settings = seed.settings;
            for (entity, records) in seed.records {
                for record in records {
                    state.insert(&entity, record);
                }
            }
        }
        gateway
    }

    /// Build a gateway from a JSON seed file
    pub fn from_seed_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file: {:?}", path))?;
        let seed: Seed = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse seed file: {:?}", path))?;
        Ok(Self::from_seed(seed))
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a record without logging it as a write; returns its id
    pub fn seed(&self, entity: &str, record: Value) -> i64 {
        let record = match record {
            Value::Object(map) => map,
            _ => Record::new(),
        };
        let stored = self.lock().insert(entity, record);
        record_id(&stored).unwrap_or_default()
    }

    pub fn set_setting(&self, name: &str, value: Value) {
        self.lock().settings.insert(name.to_string(), value);
    }

    /// Make every subsequent create for the entity fail
    pub fn fail_creates_for(&self, entity: &str) {
        self.lock().failing.insert(entity.to_string());
    }

    /// Snapshot of the write log
    pub fn operations(&self) -> Operations {
        self.lock().log.clone()
    }

    /// All records of an entity, in id order
    pub fn records(&self, entity: &str) -> Vec<Record> {
        self.lock()
            .tables
            .get(entity)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn record(&self, entity: &str, id: i64) -> Option<Record> {
        self.lock().tables.get(entity).and_then(|table| table.get(&id).cloned())
    }
}

#[async_trait]
impl CrmGateway for InMemoryGateway {
    async fn create(&self, entity: &str, data: Record) -> Result<Record> {
        let mut state = self.lock();
        if state.failing.contains(entity) {
            anyhow::bail!("Create {} rejected by the CRM", entity);
        }
        state.log.push(Operation::create(entity, Value::Object(data.clone())));
        let mut data = data;
        data.remove("id");
        let stored = state.insert(entity, data);
        debug!("Created {} {:?}", entity, record_id(&stored));
        Ok(stored)
    }

    async fn update(&self, entity: &str, id: i64, data: Record) -> Result<Record> {
        let mut state = self.lock();
        state.log.push(Operation::update(entity, id, Value::Object(data.clone())));
        let record = state
            .tables
            .get_mut(entity)
            .and_then(|table| table.get_mut(&id))
            .with_context(|| format!("{} {} does not exist", entity, id))?;
        for (key, value) in data {
            if key != "id" {
                record.insert(key, value);
            }
        }
        Ok(record.clone())
    }

    async fn delete(&self, entity: &str, id: i64) -> Result<()> {
        let mut state = self.lock();
        state.log.push(Operation::delete(entity, id));
        state
            .tables
            .get_mut(entity)
            .and_then(|table| table.remove(&id))
            .with_context(|| format!("{} {} does not exist", entity, id))?;
        Ok(())
    }

    async fn get_by_id(&self, entity: &str, id: i64) -> Result<Option<Record>> {
        Ok(self.record(entity, id))
    }

    async fn find(&self, entity: &str, filter: &Filter) -> Result<Vec<Record>> {
        Ok(self
            .lock()
            .tables
            .get(entity)
            .map(|table| table.values().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn send_email(&self, params: Record) -> Result<Record> {
        let mut state = self.lock();
        state.log.push(Operation::SendEmail {
            data: Value::Object(params.clone()),
        });
        let mut sent = params;
        sent.insert("is_error".to_string(), json!(0));
        Ok(sent)
    }

    async fn create_attachment(
        &self,
        attachment: &AttachmentHandle,
        entity_table: &str,
        entity_id: i64,
    ) -> Result<Record> {
        let mut state = self.lock();
        if state.failing.contains(entities::ATTACHMENT) {
            anyhow::bail!("Attachment {} rejected by the CRM", attachment.name);
        }
        state.log.push(Operation::Attach {
            entity_table: entity_table.to_string(),
            entity_id,
            file_name: attachment.name.clone(),
        });
        let mut record = Record::new();
        record.insert("name".to_string(), json!(attachment.name));
        record.insert("mime_type".to_string(), json!(attachment.mime_type));
        record.insert("entity_table".to_string(), json!(entity_table));
        record.insert("entity_id".to_string(), json!(entity_id));
        if let Some(description) = &attachment.description {
            record.insert("description".to_string(), json!(description));
        }
        Ok(state.insert(entities::ATTACHMENT, record))
    }

    async fn setting(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.lock().settings.get(name).cloned())
    }

    async fn notify_assignees(&self, activity: &Record, emails: &[String]) -> Result<()> {
        let activity_id = record_id(activity).context("Activity has no id")?;
        self.lock().log.push(Operation::NotifyAssignees {
            activity_id,
            emails: emails.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids_per_entity() -> Result<()> {
        let gateway = InMemoryGateway::new();
        let first = gateway.create("Contact", record(json!({"first_name": "Jo"}))).await?;
        let second = gateway.create("Contact", record(json!({"first_name": "Al"}))).await?;
        let case = gateway.create("Case", record(json!({"subject": "Roof"}))).await?;

        assert_eq!(record_id(&first), Some(1));
        assert_eq!(record_id(&second), Some(2));
        assert_eq!(record_id(&case), Some(1));
        assert_eq!(gateway.operations().creates(None), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_seed_is_not_logged_and_advances_ids() -> Result<()> {
        let gateway = InMemoryGateway::new();
        gateway.seed("Contact", json!({"id": 10, "first_name": "Seeded"}));
        let created = gateway.create("Contact", record(json!({"first_name": "New"}))).await?;

        assert_eq!(record_id(&created), Some(11));
        assert_eq!(gateway.operations().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failing_create() {
        let gateway = InMemoryGateway::new();
        gateway.fail_creates_for("Case");

        assert!(gateway.create("Case", Record::new()).await.is_err());
        assert!(gateway.records("Case").is_empty());
        assert!(gateway.operations().is_empty());
    }

    #[tokio::test]
    async fn test_update_and_delete() -> Result<()> {
        let gateway = InMemoryGateway::new();
        let id = gateway.seed("Contact", json!({"first_name": "Jo", "custom_3": 8}));

        let updated = gateway.update("Contact", id, record(json!({"custom_3": null}))).await?;
        assert_eq!(updated.get("custom_3"), Some(&Value::Null));
        assert_eq!(updated.get("first_name"), Some(&json!("Jo")));

        gateway.delete("Contact", id).await?;
        assert!(gateway.get_by_id("Contact", id).await?.is_none());
        assert!(gateway.delete("Contact", id).await.is_err());
        Ok(())
    }

    #[test]
    fn test_from_seed() {
        let seed: Seed = serde_json::from_value(json!({
            "settings": {"activity_assignee_notification": true},
            "records": {"CaseType": [{"id": 3, "name": "housing_support"}]}
        }))
        .unwrap();
        let gateway = InMemoryGateway::from_seed(seed);

        assert_eq!(gateway.records("CaseType").len(), 1);
        assert!(gateway.record("CaseType", 3).is_some());
    }

    #[tokio::test]
    async fn test_provided_queries() -> Result<()> {
        let gateway = InMemoryGateway::new();
        gateway.seed(
            "OptionValue",
            json!({"option_group_id:name": "participant_role", "value": "1", "name": "Attendee", "filter": 1}),
        );
        gateway.seed(
            "OptionValue",
            json!({"option_group_id:name": "participant_role", "value": "2", "name": "Volunteer", "filter": 0}),
        );
        gateway.seed("ParticipantStatusType", json!({"id": 1, "name": "Registered", "is_counted": 1}));
        gateway.seed("ParticipantStatusType", json!({"id": 4, "name": "Cancelled", "is_counted": 0}));
        let event_id = gateway.seed("Event", json!({"title": "AGM", "max_participants": 1}));
        gateway.seed("Participant", json!({"event_id": event_id, "role_id": 2, "status_id": 1, "contact_id": 1}));
        gateway.seed("Participant", json!({"event_id": event_id, "role_id": [1], "status_id": 4, "contact_id": 3}));

        assert_eq!(gateway.counted_role_ids().await?, vec![1]);
        assert_eq!(gateway.counted_status_ids().await?, vec![1]);
        assert!(!gateway.is_event_full(event_id).await?);

        gateway.seed("Participant", json!({"event_id": event_id, "role_id": [1], "status_id": 1, "contact_id": 2}));
        assert!(gateway.is_event_full(event_id).await?);
        assert!(!gateway.is_event_full(99).await?);

        gateway.seed("Case", json!({"case_type_id": 4, "contact_id": [7], "status_id": 2}));
        assert!(gateway.existing_case(7, 4).await?.is_none());
        let open = gateway.seed("Case", json!({"case_type_id": 4, "contact_id": [7], "status_id": 1}));
        let found = gateway.existing_case(7, 4).await?.unwrap();
        assert_eq!(record_id(&found), Some(open));
        Ok(())
    }
}
