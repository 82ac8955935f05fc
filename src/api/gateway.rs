//! The CRM boundary consumed by form actions
//!
//! Implementations only need the primitive calls. The entity-specific
//! queries (capacity, duplicate cases, option lookups) have provided
//! implementations built on `get_by_id` and `find`, which a gateway may
//! override when the CRM can answer them directly.

use super::constants::{defaults, entities, option_groups};
use super::models::{AttachmentHandle, Record, loose_eq, record_id, value_as_id};
use async_trait::async_trait;
use serde_json::{Value, json};

/// Equality conditions for `find`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `field = value` condition
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    /// Whether a record satisfies every condition
    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|(field, wanted)| {
            record
                .get(field)
                .is_some_and(|stored| loose_eq(stored, wanted))
        })
    }

    /// APIv4 `where` clause
    pub fn to_where(&self) -> Value {
        Value::Array(
            self.conditions
                .iter()
                .map(|(field, value)| json!([field, "=", value]))
                .collect(),
        )
    }
}

/// Request/response access to the CRM
#[async_trait]
pub trait CrmGateway: Send + Sync {
    /// Create a record and return it as stored
    async fn create(&self, entity: &str, data: Record) -> anyhow::Result<Record>;

    /// Update the given fields of a record and return it as stored
    async fn update(&self, entity: &str, id: i64, data: Record) -> anyhow::Result<Record>;

    async fn delete(&self, entity: &str, id: i64) -> anyhow::Result<()>;

    async fn get_by_id(&self, entity: &str, id: i64) -> anyhow::Result<Option<Record>>;

    async fn find(&self, entity: &str, filter: &Filter) -> anyhow::Result<Vec<Record>>;

    /// Send a templated email; returns the CRM's record of the send
    async fn send_email(&self, params: Record) -> anyhow::Result<Record>;

    /// Store a file and link it to an entity; returns the attachment record
    async fn create_attachment(
        &self,
        attachment: &AttachmentHandle,
        entity_table: &str,
        entity_id: i64,
    ) -> anyhow::Result<Record>;

    /// Read a CRM-level setting
    async fn setting(&self, name: &str) -> anyhow::Result<Option<Value>>;

    /// Email the assignees of an activity
    async fn notify_assignees(&self, activity: &Record, emails: &[String]) -> anyhow::Result<()>;

    /// Active option values of an option group
    async fn option_values(&self, group: &str) -> anyhow::Result<Vec<Record>> {
        let values = self
            .find(entities::OPTION_VALUE, &Filter::new().eq("option_group_id:name", group))
            .await?;
        Ok(values
            .into_iter()
            .filter(|value| value.get("is_active") != Some(&Value::Bool(false)))
            .collect())
    }

    /// Participant roles whose participants count toward event capacity
    async fn counted_role_ids(&self) -> anyhow::Result<Vec<i64>> {
        let roles = self.option_values(option_groups::PARTICIPANT_ROLE).await?;
        Ok(roles
            .iter()
            .filter(|role| role.get("filter").and_then(value_as_id) == Some(1))
            .filter_map(|role| role.get("value").and_then(value_as_id))
            .collect())
    }

    /// Participant statuses that hold a seat at the event
    async fn counted_status_ids(&self) -> anyhow::Result<Vec<i64>> {
        let statuses = self
            .find(entities::PARTICIPANT_STATUS_TYPE, &Filter::new().eq("is_counted", true))
            .await?;
        Ok(statuses
            .iter()
            .filter(|status| status.get("is_active") != Some(&Value::Bool(false)))
            .filter_map(record_id)
            .collect())
    }

    /// Whether the event has no room left for counted participants
    ///
    /// A participant takes a seat only when both its role and its status
    /// are counted.
    async fn is_event_full(&self, event_id: i64) -> anyhow::Result<bool> {
        let Some(event) = self.get_by_id(entities::EVENT, event_id).await? else {
            return Ok(false);
        };
        let Some(max) = event.get("max_participants").and_then(value_as_id) else {
            return Ok(false);
        };

        let counted_roles = self.counted_role_ids().await?;
        let counted_statuses = self.counted_status_ids().await?;
        let participants = self
            .find(entities::PARTICIPANT, &Filter::new().eq("event_id", event_id))
            .await?;
        let counted = participants
            .iter()
            .filter(|participant| {
                participant.get("role_id").is_some_and(|role| {
                    counted_roles.iter().any(|counted| loose_eq(role, &json!(counted)))
                })
            })
            .filter(|participant| {
                participant
                    .get("status_id")
                    .and_then(value_as_id)
                    .is_some_and(|status| counted_statuses.contains(&status))
            })
            .count();

        Ok(counted as i64 >= max)
    }

    /// An open case of the given type for the given client
    async fn existing_case(&self, contact_id: i64, case_type_id: i64) -> anyhow::Result<Option<Record>> {
        let cases = self
            .find(
                entities::CASE,
                &Filter::new()
                    .eq("case_type_id", case_type_id)
                    .eq("contact_id", contact_id),
            )
            .await?;

        Ok(cases.into_iter().find(|case| {
            let deleted = case.get("is_deleted").is_some_and(|v| loose_eq(v, &json!(true)));
            let closed = case
                .get("status_id")
                .and_then(value_as_id)
                .is_some_and(|status| defaults::CLOSED_CASE_STATUS_IDS.contains(&status));
            !deleted && !closed
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches() {
        let record: Record = serde_json::from_value(json!({
            "id": 3,
            "case_type_id": "2",
            "contact_id": [5, 9],
        }))
        .unwrap();

        assert!(Filter::new().eq("case_type_id", 2).eq("contact_id", 9).matches(&record));
        assert!(!Filter::new().eq("contact_id", 7).matches(&record));
        assert!(!Filter::new().eq("missing", 1).matches(&record));
        assert!(Filter::new().matches(&record));
    }

    #[test]
    fn test_filter_to_where() {
        let filter = Filter::new().eq("event_id", 4);
        assert_eq!(filter.to_where(), json!([["event_id", "=", 4]]));
    }
}
