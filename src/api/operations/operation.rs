//! Core Operation types for CRM writes

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single write issued against the CRM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Create a new record
    Create {
        /// Entity name (e.g., "Contact", "Case")
        entity: String,
        /// Record data as JSON
        data: Value,
    },
    /// Update an existing record
    Update {
        entity: String,
        id: i64,
        /// Changed fields only
        data: Value,
    },
    /// Delete a record
    Delete { entity: String, id: i64 },
    /// Send a templated email to a contact
    SendEmail { data: Value },
    /// Store a file and link it to an entity
    Attach {
        entity_table: String,
        entity_id: i64,
        file_name: String,
    },
    /// Notify activity assignees by email
    NotifyAssignees { activity_id: i64, emails: Vec<String> },
}

impl Operation {
    /// Create a new Create operation
    pub fn create(entity: impl Into<String>, data: Value) -> Self {
        Self::Create {
            entity: entity.into(),
            data,
        }
    }

    /// Create a new Update operation
    pub fn update(entity: impl Into<String>, id: i64, data: Value) -> Self {
        Self::Update {
            entity: entity.into(),
            id,
            data,
        }
    }

    /// Create a new Delete operation
    pub fn delete(entity: impl Into<String>, id: i64) -> Self {
        Self::Delete {
            entity: entity.into(),
            id,
        }
    }

    /// Get the entity name for this operation, if it targets one
    pub fn entity(&self) -> Option<&str> {
        match self {
            Self::Create { entity, .. } => Some(entity),
            Self::Update { entity, .. } => Some(entity),
            Self::Delete { entity, .. } => Some(entity),
            Self::SendEmail { .. } => None,
            Self::Attach { .. } => None,
            Self::NotifyAssignees { .. } => None,
        }
    }

    /// Get the operation type as a string
    pub fn operation_type(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::SendEmail { .. } => "send_email",
            Self::Attach { .. } => "attach",
            Self::NotifyAssignees { .. } => "notify_assignees",
        }
    }

    /// Create and update calls, the writes that persist entity data
    pub fn is_create_or_update(&self) -> bool {
        matches!(self, Self::Create { .. } | Self::Update { .. })
    }

    pub fn is_create(&self) -> bool {
        matches!(self, Self::Create { .. })
    }
}
