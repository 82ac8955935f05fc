//! Event location: an address plus up to two emails and two phones,
//! joined in a LocBlock the event points at

use crate::actions::context::SubmissionContext;
use crate::actions::entity;
use crate::actions::field_specs::{LOC_BLOCK_PARTS, NestedBlock};
use crate::api::constants::entities;
use crate::api::models::{Record, record_id, value_as_id};
use crate::form::{ActionInstance, gate};
use log::{debug, warn};
use serde_json::{Map, Value, json};

/// Gate of the whole location, mapped as `loc_block.conditional`
pub const LOCATION_GATE: &str = "loc_block.conditional";

/// How the event's location was settled
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Location {
    /// LocBlock the event should point at
    pub loc_block_id: Option<i64>,
    /// Outcome of every part written, published as `loc_block`
    pub outcome: Option<Value>,
}

/// LocBlock column that holds the id of a part
fn column(part: &NestedBlock) -> String {
    format!("{}_id", part.key)
}

/// Use the mapped `loc_block_id`, or create a new location from its parts
///
/// Part failures are recorded as `false` and leave the rest of the
/// location intact. A failed LocBlock write leaves the event without a
/// location.
pub async fn resolve(ctx: &SubmissionContext<'_>, instance: &ActionInstance) -> Location {
    let mapper = ctx.mapper();
    if let Some(existing) = entity::resolve_field(instance, &mapper, "loc_block_id")
        .as_ref()
        .and_then(value_as_id)
    {
        debug!("Action {} reuses location {}", instance.alias, existing);
        return Location {
            loc_block_id: Some(existing),
            outcome: None,
        };
    }

    if !gate::evaluate(instance.source(LOCATION_GATE), &mapper).allows() {
        debug!("Location of action {} gated off", instance.alias);
        return Location::default();
    }

    let links = Record::new();
    let mut outcome = Map::new();
    let mut loc_block = Record::new();
    for part in LOC_BLOCK_PARTS {
        let Some(written) = entity::write_block(ctx, instance, part, &links).await else {
            continue;
        };
        if let Some(id) = written.as_object().and_then(record_id) {
            loc_block.insert(column(part), json!(id));
        }
        outcome.insert(part.key.to_string(), written);
    }

    if loc_block.is_empty() {
        if outcome.is_empty() {
            return Location::default();
        }
        warn!("Action {} wrote no location part, event has no location", instance.alias);
        outcome.insert("loc_block".to_string(), Value::Bool(false));
        return Location {
            loc_block_id: None,
            outcome: Some(Value::Object(outcome)),
        };
    }

    let loc_block_id = match ctx.gateway.create(entities::LOC_BLOCK, loc_block).await {
        Ok(record) => {
            let id = record_id(&record);
            outcome.insert("loc_block".to_string(), Value::Object(record));
            id
        }
        Err(e) => {
            warn!("Action {} failed to create the event location: {:#}", instance.alias, e);
            outcome.insert("loc_block".to_string(), Value::Bool(false));
            None
        }
    };

    Location {
        loc_block_id,
        outcome: Some(Value::Object(outcome)),
    }
}
