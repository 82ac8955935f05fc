//! CiviCRM APIv4 REST gateway
//!
//! Writes are sent as `POST {base}/civicrm/ajax/api4/{Entity}/{action}` with a
//! form-encoded `params` field; reads go through `GET` with the same
//! `params` in the query string.

use super::constants::{self, entities};
use super::gateway::{CrmGateway, Filter};
use super::models::{AttachmentHandle, Record};
use crate::config::CrmConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::{debug, warn};
use serde_json::{Value, json};
use std::time::Duration;

/// Gateway talking to a remote CRM over HTTP
pub struct HttpGateway {
    base_url: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(config: &CrmConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("crm-form-actions/0.1")
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self::with_custom_client(config, http_client))
    }

    /// Create a gateway with a custom HTTP client configuration
    pub fn with_custom_client(config: &CrmConfig, http_client: reqwest::Client) -> Self {
        Self {
            base_url: config.url.clone(),
            api_key: config.api_key.clone(),
            http_client,
        }
    }

    /// Execute a write action and return the `values` array
    async fn post(&self, entity: &str, action: &str, params: Value) -> Result<Vec<Record>> {
        let url = constants::api_endpoint(&self.base_url, entity, action);
        debug!("POST {} {}", url, params);

        let response = self
            .http_client
            .post(&url)
            .header("X-Civi-Auth", format!("Bearer {}", self.api_key))
            .header("X-Requested-With", "XMLHttpRequest")
            .form(&[("params", params.to_string())])
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        Self::parse_response(entity, action, response).await
    }

    /// Execute a read action and return the `values` array
    async fn get(&self, entity: &str, action: &str, params: Value) -> Result<Vec<Record>> {
        let url = format!(
            "{}?params={}",
            constants::api_endpoint(&self.base_url, entity, action),
            urlencoding::encode(&params.to_string())
        );
        debug!("GET {}", url);

        let response = self
            .http_client
            .get(&url)
            .header("X-Civi-Auth", format!("Bearer {}", self.api_key))
            .header("X-Requested-With", "XMLHttpRequest")
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        Self::parse_response(entity, action, response).await
    }

    async fn parse_response(entity: &str, action: &str, response: reqwest::Response) -> Result<Vec<Record>> {
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .with_context(|| format!("{}.{} returned a non-JSON body", entity, action))?;

        if !status.is_success() || body.get("error_code").is_some() || body.get("error_message").is_some() {
            let message = body
                .get("error_message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error");
            warn!("{}.{} failed with status {}: {}", entity, action, status, message);
            anyhow::bail!("{}.{} failed with status {}: {}", entity, action, status, message);
        }

        let values = match body.get("values") {
            Some(Value::Array(values)) => values.clone(),
            Some(Value::Object(map)) => map.values().cloned().collect(),
            _ => Vec::new(),
        };

        Ok(values
            .into_iter()
            .filter_map(|value| match value {
                Value::Object(record) => Some(record),
                _ => None,
            })
            .collect())
    }

    fn first(entity: &str, action: &str, mut values: Vec<Record>) -> Result<Record> {
        if values.is_empty() {
            anyhow::bail!("{}.{} returned no record", entity, action);
        }
        Ok(values.swap_remove(0))
    }
}

#[async_trait]
impl CrmGateway for HttpGateway {
    async fn create(&self, entity: &str, data: Record) -> Result<Record> {
        let values = self.post(entity, "create", json!({ "values": data })).await?;
        Self::first(entity, "create", values)
    }

    async fn update(&self, entity: &str, id: i64, data: Record) -> Result<Record> {
        let params = json!({
            "where": [["id", "=", id]],
            "values": data,
        });
        let values = self.post(entity, "update", params).await?;
        Self::first(entity, "update", values)
    }

    async fn delete(&self, entity: &str, id: i64) -> Result<()> {
        self.post(entity, "delete", json!({ "where": [["id", "=", id]] }))
            .await?;
        Ok(())
    }

    async fn get_by_id(&self, entity: &str, id: i64) -> Result<Option<Record>> {
        let params = json!({
            "select": ["*", "custom.*"],
            "where": [["id", "=", id]],
            "limit": 1,
        });
        let mut values = self.get(entity, "get", params).await?;
        Ok((!values.is_empty()).then(|| values.swap_remove(0)))
    }

    async fn find(&self, entity: &str, filter: &Filter) -> Result<Vec<Record>> {
        let params = json!({ "where": filter.to_where() });
        self.get(entity, "get", params).await
    }

    async fn send_email(&self, params: Record) -> Result<Record> {
        let values = self.post(entities::EMAIL, "send", Value::Object(params)).await?;
        Ok(values.into_iter().next().unwrap_or_default())
    }

    async fn create_attachment(
        &self,
        attachment: &AttachmentHandle,
        entity_table: &str,
        entity_id: i64,
    ) -> Result<Record> {
        let bytes = tokio::fs::read(&attachment.path)
            .await
            .with_context(|| format!("Failed to read attachment: {:?}", attachment.path))?;

        let params = json!({
            "values": {
                "name": attachment.name,
                "mime_type": attachment.mime_type,
                "description": attachment.description,
                "entity_table": entity_table,
                "entity_id": entity_id,
                "content": BASE64.encode(&bytes),
            }
        });
        let values = self.post(entities::ATTACHMENT, "create", params).await?;
        Self::first(entities::ATTACHMENT, "create", values)
    }

    async fn setting(&self, name: &str) -> Result<Option<Value>> {
        let values = self.get("Setting", "get", json!({ "select": [name] })).await?;
        Ok(values
            .into_iter()
            .find(|setting| setting.get("name").and_then(Value::as_str) == Some(name))
            .and_then(|setting| setting.get("value").cloned()))
    }

    async fn notify_assignees(&self, activity: &Record, emails: &[String]) -> Result<()> {
        let params = json!({
            "activity_id": activity.get("id"),
            "emails": emails,
        });
        self.post(entities::ACTIVITY, "notifyAssignees", params).await?;
        Ok(())
    }
}
