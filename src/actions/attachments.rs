//! Generic attachment slots (`attachment_1` .. `attachment_N`)

use super::context::SubmissionContext;
use super::entity::EntityTarget;
use super::results::ActionResult;
use crate::api::models::AttachmentHandle;
use crate::form::ActionInstance;
use log::{debug, warn};
use serde_json::Value;

pub fn slot_code(slot: usize) -> String {
    format!("attachment_{}", slot)
}

/// Attach the files uploaded through the configured slots
pub async fn write_attachments(
    ctx: &SubmissionContext<'_>,
    instance: &ActionInstance,
    target: &EntityTarget<'_>,
    slots: usize,
    result: &mut ActionResult,
) {
    let mapper = ctx.mapper();
    let mut outcomes = Vec::new();

    for slot in 1..=slots {
        let code = slot_code(slot);
        let Some(upload) = instance.source(&code).and_then(|source| mapper.resolve_upload(source)) else {
            continue;
        };
        let description = instance
            .source(&format!("{}.description", code))
            .map(|source| mapper.resolve_string(source))
            .filter(|text| !text.trim().is_empty());

        let handle = AttachmentHandle::new(&upload.path, &upload.name, &upload.mime_type).with_description(description);
        match ctx.gateway.create_attachment(&handle, target.table, target.id).await {
            Ok(record) => {
                debug!("Attached {} to {} {}", upload.name, target.entity, target.id);
                outcomes.push(Value::Object(record));
            }
            Err(e) => {
                warn!("Attachment {} for {} {} failed: {:#}", upload.name, target.entity, target.id, e);
                outcomes.push(Value::Bool(false));
            }
        }
    }

    if !outcomes.is_empty() {
        result.set_nested("attachments", Value::Array(outcomes));
    }
}
