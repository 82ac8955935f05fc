//! References from one action to entities created elsewhere
//!
//! A reference is resolved in strict priority order:
//!
//! 1. an action reference: the id published by an earlier action, by alias
//! 2. a direct id configured on the action
//! 3. a mapped form field holding the id
//!
//! The first tier that yields a positive integer wins.

use super::context::{Phase, SubmissionContext};
use crate::api::constants::entities;
use crate::api::gateway::{CrmGateway, Filter};
use crate::api::models::{Record, value_as_id};
use crate::form::Source;
use crate::form::mapper::{ids_from_value, value_to_string};
use anyhow::Result;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of resolving a reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    Found(T),
    /// Depends on an action that has not run yet (validation phase)
    Pending,
    Missing,
}

impl<T> Resolution<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawReference")]
pub struct EntityReference {
    /// Alias of an earlier action
    pub action: Option<String>,
    /// Id configured on the action
    pub id: Option<Source>,
    /// Form field submitting the id
    pub field: Option<Source>,
}

/// Settings accept a bare alias as shorthand for `{ action = "alias" }`
#[derive(Deserialize)]
#[serde(untagged)]
enum RawReference {
    Alias(String),
    Full {
        #[serde(default)]
        action: Option<String>,
        #[serde(default)]
        id: Option<Source>,
        #[serde(default)]
        field: Option<Source>,
    },
}

impl From<RawReference> for EntityReference {
    fn from(raw: RawReference) -> Self {
        let reference = match raw {
            RawReference::Alias(alias) => Self {
                action: Some(alias),
                ..Self::default()
            },
            RawReference::Full { action, id, field } => Self { action, id, field },
        };
        Self {
            action: reference.action.filter(|alias| !alias.trim().is_empty()),
            id: reference.id.filter(|source| !source.is_empty()),
            field: reference.field.filter(|source| !source.is_empty()),
        }
    }
}

impl EntityReference {
    pub fn to_action(alias: &str) -> Self {
        Self {
            action: Some(alias.to_string()),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<Source>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<Source>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Resolve to a single id
    pub fn resolve(&self, ctx: &SubmissionContext<'_>) -> Resolution<i64> {
        match self.resolve_all(ctx) {
            Resolution::Found(ids) => ids.into_iter().next().map_or(Resolution::Missing, Resolution::Found),
            Resolution::Pending => Resolution::Pending,
            Resolution::Missing => Resolution::Missing,
        }
    }

    /// Resolve to every id the winning tier yields
    pub fn resolve_all(&self, ctx: &SubmissionContext<'_>) -> Resolution<Vec<i64>> {
        if let Some(alias) = &self.action {
            if ctx.phase() == Phase::Validate {
                return Resolution::Pending;
            }
            if let Some(id) = ctx.results().id_of(alias) {
                return Resolution::Found(vec![id]);
            }
            debug!("Action reference '{}' has no id, falling back", alias);
        }

        let mapper = ctx.mapper();
        for source in [&self.id, &self.field].into_iter().flatten() {
            let ids = mapper.resolve_ids(source);
            if !ids.is_empty() {
                return Resolution::Found(ids);
            }
        }
        Resolution::Missing
    }
}

fn matches_text(record: &Record, keys: &[&str], wanted: &str) -> bool {
    keys.iter().any(|key| {
        record
            .get(*key)
            .and_then(Value::as_str)
            .is_some_and(|text| text.trim().eq_ignore_ascii_case(wanted))
    })
}

/// Resolve an option value: numbers pass through; text is matched against
/// the option group's names and labels
pub async fn lookup_option(gateway: &dyn CrmGateway, group: &str, value: &Value) -> Result<Option<i64>> {
    if let Some(id) = value_as_id(value) {
        return Ok(Some(id));
    }
    let wanted = value_to_string(value);
    let wanted = wanted.trim();
    if wanted.is_empty() {
        return Ok(None);
    }

    let options = gateway.option_values(group).await?;
    let found = options
        .iter()
        .find(|option| matches_text(option, &["name", "label"], wanted))
        .and_then(|option| option.get("value").and_then(value_as_id));
    if found.is_none() {
        debug!("No option '{}' in group {}", wanted, group);
    }
    Ok(found)
}

/// Resolve every option in a multi-valued field
pub async fn lookup_options(gateway: &dyn CrmGateway, group: &str, value: &Value) -> Result<Vec<i64>> {
    let items: Vec<Value> = match value {
        Value::Array(items) => items.clone(),
        Value::String(s) if s.contains(',') => s.split(',').map(|part| Value::String(part.trim().to_string())).collect(),
        other => vec![other.clone()],
    };

    let mut ids = Vec::new();
    for item in &items {
        if let Some(id) = lookup_option(gateway, group, item).await? {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Resolve a case type by id, name or title
pub async fn lookup_case_type(gateway: &dyn CrmGateway, value: &Value) -> Result<Option<i64>> {
    if let Some(id) = ids_from_value(value).into_iter().next() {
        return Ok(Some(id));
    }
    let wanted = value_to_string(value);
    let wanted = wanted.trim();
    if wanted.is_empty() {
        return Ok(None);
    }

    let case_types = gateway.find(entities::CASE_TYPE, &Filter::new()).await?;
    Ok(case_types
        .iter()
        .find(|case_type| matches_text(case_type, &["name", "title"], wanted))
        .and_then(|case_type| case_type.get("id").and_then(value_as_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::results::ActionResult;
    use crate::api::memory::InMemoryGateway;
    use crate::config::Settings;
    use crate::files::LocalFileStore;
    use crate::form::{Form, Submission};
    use serde_json::json;

    fn published(id: i64) -> ActionResult {
        let record: Record = serde_json::from_value(json!({"id": id})).unwrap();
        ActionResult::empty("cwps_contact", "contact").with_record(record)
    }

    #[test]
    fn test_deserialize_shorthand() {
        #[derive(Deserialize)]
        struct Settings {
            contact: EntityReference,
            manager: EntityReference,
        }
        let settings: Settings = serde_json::from_value(json!({
            "contact": "new_contact",
            "manager": {"action": "", "id": "42", "field": "%manager%"},
        }))
        .unwrap();

        assert_eq!(settings.contact, EntityReference::to_action("new_contact"));
        assert_eq!(settings.manager.action, None);
        assert_eq!(settings.manager.id, Some(Source::literal("42")));
        assert_eq!(settings.manager.field, Some(Source::FieldSlug("manager".to_string())));
    }

    #[tokio::test]
    async fn test_three_tier_priority() -> anyhow::Result<()> {
        let gateway = InMemoryGateway::new();
        let files = LocalFileStore::open(std::env::temp_dir().join("crm-form-actions-references"))?;
        let settings = Settings::default();
        let form = Form::new("CF1");
        let submission = Submission::new().with_value("contact_id", "30");
        let mut ctx = SubmissionContext::new(&form, &submission, &gateway, &files, &settings);

        let all_tiers = EntityReference::to_action("new_contact").with_id("20").with_field("%contact_id%");
        let no_action = EntityReference::default().with_id("20").with_field("%contact_id%");
        let field_only = EntityReference::default().with_field("%contact_id%");

        assert_eq!(all_tiers.resolve(&ctx), Resolution::Pending);
        assert_eq!(no_action.resolve(&ctx), Resolution::Found(20));

        ctx.enter_make();
        // Referenced action has not published: lower tiers take over
        assert_eq!(all_tiers.resolve(&ctx), Resolution::Found(20));

        ctx.publish("cwps_contact", "new_contact", published(10));
        assert_eq!(all_tiers.resolve(&ctx), Resolution::Found(10));
        assert_eq!(no_action.resolve(&ctx), Resolution::Found(20));
        assert_eq!(field_only.resolve(&ctx), Resolution::Found(30));
        assert_eq!(EntityReference::default().resolve(&ctx), Resolution::Missing);
        Ok(())
    }

    #[tokio::test]
    async fn test_lookup_option_and_case_type() -> anyhow::Result<()> {
        let gateway = InMemoryGateway::new();
        gateway.seed(
            entities::OPTION_VALUE,
            json!({"option_group_id:name": "activity_type", "name": "Meeting", "label": "Meeting", "value": "1"}),
        );
        gateway.seed(entities::CASE_TYPE, json!({"id": 3, "name": "housing_support", "title": "Housing Support"}));

        assert_eq!(lookup_option(&gateway, "activity_type", &json!("meeting")).await?, Some(1));
        assert_eq!(lookup_option(&gateway, "activity_type", &json!("9")).await?, Some(9));
        assert_eq!(lookup_option(&gateway, "activity_type", &json!("Unknown")).await?, None);
        assert_eq!(lookup_case_type(&gateway, &json!("Housing Support")).await?, Some(3));
        assert_eq!(lookup_case_type(&gateway, &json!("housing_support")).await?, Some(3));
        assert_eq!(lookup_case_type(&gateway, &json!(5)).await?, Some(5));
        Ok(())
    }
}
