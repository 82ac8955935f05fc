//! Static field specifications for the entity actions
//!
//! Each action maps only the codes its schema lists (plus `custom_N`
//! custom fields). Codes on a schema's ignore list are listed so they show
//! up in the form schema, but the action fills them in itself.

use crate::api::constants::{entities, option_groups, tables};
use serde::Serialize;

/// How a field's value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Boolean,
    Date,
    DateTime,
    /// Numeric option value, or a name/label looked up in the option group
    Option { group: &'static str },
    /// Id of another CRM record
    Reference { entity: &'static str },
    /// Upload handed to the CRM as an attachment
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Entity field code, also the key in the action's `fields` table
    pub code: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

macro_rules! field {
    ($code:expr, $label:expr, $kind:expr) => {
        FieldSpec {
            code: $code,
            label: $label,
            kind: $kind,
            required: false,
        }
    };
}

macro_rules! text_field {
    ($code:expr, $label:expr) => {
        field!($code, $label, FieldKind::Text)
    };
}

macro_rules! option_field {
    ($code:expr, $label:expr, $group:expr) => {
        field!($code, $label, FieldKind::Option { group: $group })
    };
}

macro_rules! required_field {
    ($code:expr, $label:expr, $kind:expr) => {
        FieldSpec {
            code: $code,
            label: $label,
            kind: $kind,
            required: true,
        }
    };
}

/// Typed description of one entity action
#[derive(Debug)]
pub struct EntitySchema {
    /// Entity name used with the gateway
    pub entity: &'static str,
    /// Table attachments and profiles link to
    pub entity_table: Option<&'static str>,
    /// Key the primary record is published under
    pub result_key: &'static str,
    pub fields: &'static [FieldSpec],
    /// Codes with bespoke handling, skipped by generic mapping
    pub ignore: &'static [&'static str],
    /// Nested sub-entities, each with its own gate
    pub blocks: &'static [NestedBlock],
    /// Number of generic attachment slots
    pub attachments: usize,
}

impl EntitySchema {
    pub fn field(&self, code: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|spec| spec.code == code)
    }

    pub fn is_ignored(&self, code: &str) -> bool {
        self.ignore.contains(&code)
    }

    /// Codes copied straight from the mapping into the entity data
    pub fn mapped_fields(&self) -> impl Iterator<Item = &'static FieldSpec> + '_ {
        self.fields.iter().filter(|spec| !self.is_ignored(spec.code))
    }

    pub fn block(&self, key: &str) -> Option<&'static NestedBlock> {
        self.blocks.iter().find(|block| block.key == key)
    }
}

/// A sub-entity created alongside the primary entity
///
/// Its fields are mapped as `<key>.<code>` and its gate as
/// `<key>.conditional`.
#[derive(Debug)]
pub struct NestedBlock {
    pub key: &'static str,
    pub label: &'static str,
    pub entity: &'static str,
    pub fields: &'static [FieldSpec],
    /// The block is only written when at least one of these has a value
    pub requires_any: &'static [&'static str],
}

impl NestedBlock {
    pub fn mapping_code(&self, code: &str) -> String {
        format!("{}.{}", self.key, code)
    }

    pub fn gate_code(&self) -> String {
        self.mapping_code("conditional")
    }
}

/// Code of the entity-level conditional reference in a form schema
pub const CONDITIONAL_CODE: &str = "conditional";

pub const EMAIL_FIELDS: &[FieldSpec] = &[
    text_field!("email", "Email"),
    option_field!("location_type_id", "Location Type", option_groups::LOCATION_TYPE),
    field!("is_primary", "Is Primary", FieldKind::Boolean),
];

pub const PHONE_FIELDS: &[FieldSpec] = &[
    text_field!("phone", "Phone"),
    text_field!("phone_ext", "Extension"),
    option_field!("phone_type_id", "Phone Type", "phone_type"),
    option_field!("location_type_id", "Location Type", option_groups::LOCATION_TYPE),
    field!("is_primary", "Is Primary", FieldKind::Boolean),
];

pub const ADDRESS_FIELDS: &[FieldSpec] = &[
    text_field!("street_address", "Street Address"),
    text_field!("supplemental_address_1", "Supplemental Address 1"),
    text_field!("supplemental_address_2", "Supplemental Address 2"),
    text_field!("city", "City"),
    text_field!("postal_code", "Postal Code"),
    field!("state_province_id", "State/Province", FieldKind::Number),
    field!("country_id", "Country", FieldKind::Number),
    option_field!("location_type_id", "Location Type", option_groups::LOCATION_TYPE),
    field!("is_primary", "Is Primary", FieldKind::Boolean),
];

pub const WEBSITE_FIELDS: &[FieldSpec] = &[
    text_field!("url", "Website"),
    option_field!("website_type_id", "Website Type", "website_type"),
];

pub const CONTACT_FIELDS: &[FieldSpec] = &[
    option_field!("contact_type", "Contact Type", option_groups::CONTACT_TYPE),
    text_field!("contact_sub_type", "Contact Sub-type"),
    option_field!("prefix_id", "Prefix", "individual_prefix"),
    text_field!("first_name", "First Name"),
    text_field!("middle_name", "Middle Name"),
    text_field!("last_name", "Last Name"),
    option_field!("suffix_id", "Suffix", "individual_suffix"),
    text_field!("nick_name", "Nickname"),
    text_field!("job_title", "Job Title"),
    field!("birth_date", "Birth Date", FieldKind::Date),
    option_field!("gender_id", "Gender", "gender"),
    text_field!("organization_name", "Organization Name"),
    text_field!("household_name", "Household Name"),
    text_field!("source", "Source"),
    field!("do_not_email", "Do Not Email", FieldKind::Boolean),
    field!("do_not_phone", "Do Not Phone", FieldKind::Boolean),
    field!("is_opt_out", "No Bulk Emails", FieldKind::Boolean),
];

pub static CONTACT_SCHEMA: EntitySchema = EntitySchema {
    entity: entities::CONTACT,
    entity_table: Some(tables::CONTACT),
    result_key: "contact",
    fields: CONTACT_FIELDS,
    ignore: &["contact_type"],
    blocks: &[
        NestedBlock { key: "email_1", label: "Email", entity: entities::EMAIL, fields: EMAIL_FIELDS, requires_any: &["email"] },
        NestedBlock { key: "email_2", label: "Second Email", entity: entities::EMAIL, fields: EMAIL_FIELDS, requires_any: &["email"] },
        NestedBlock { key: "phone_1", label: "Phone", entity: entities::PHONE, fields: PHONE_FIELDS, requires_any: &["phone"] },
        NestedBlock { key: "phone_2", label: "Second Phone", entity: entities::PHONE, fields: PHONE_FIELDS, requires_any: &["phone"] },
        NestedBlock {
            key: "address_1",
            label: "Address",
            entity: entities::ADDRESS,
            fields: ADDRESS_FIELDS,
            requires_any: &["street_address", "supplemental_address_1", "city", "postal_code"],
        },
        NestedBlock { key: "website_1", label: "Website", entity: entities::WEBSITE, fields: WEBSITE_FIELDS, requires_any: &["url"] },
    ],
    attachments: 3,
};

pub static ACTIVITY_SCHEMA: EntitySchema = EntitySchema {
    entity: entities::ACTIVITY,
    entity_table: Some(tables::ACTIVITY),
    result_key: "activity",
    fields: &[
        required_field!("activity_type_id", "Activity Type", FieldKind::Option { group: option_groups::ACTIVITY_TYPE }),
        option_field!("status_id", "Activity Status", option_groups::ACTIVITY_STATUS),
        text_field!("subject", "Subject"),
        text_field!("details", "Details"),
        text_field!("location", "Location"),
        field!("activity_date_time", "Date", FieldKind::DateTime),
        field!("duration", "Duration", FieldKind::Number),
        option_field!("priority_id", "Priority", "priority"),
        option_field!("engagement_level", "Engagement Level", "engagement_index"),
    ],
    ignore: &["activity_type_id", "status_id", "activity_date_time"],
    blocks: &[],
    attachments: 3,
};

pub static CASE_SCHEMA: EntitySchema = EntitySchema {
    entity: entities::CASE,
    entity_table: Some(tables::CASE),
    result_key: "case",
    fields: &[
        required_field!("case_type_id", "Case Type", FieldKind::Reference { entity: entities::CASE_TYPE }),
        option_field!("status_id", "Case Status", option_groups::CASE_STATUS),
        text_field!("subject", "Subject"),
        text_field!("details", "Details"),
        field!("start_date", "Start Date", FieldKind::Date),
        field!("end_date", "End Date", FieldKind::Date),
        option_field!("medium_id", "Medium", "encounter_medium"),
    ],
    ignore: &["case_type_id", "status_id", "start_date"],
    blocks: &[],
    attachments: 3,
};

pub static EMAIL_SEND_SCHEMA: EntitySchema = EntitySchema {
    entity: entities::EMAIL,
    entity_table: None,
    result_key: "email",
    fields: &[
        required_field!("template_id", "Message Template", FieldKind::Reference { entity: "MessageTemplate" }),
        text_field!("from_email_option", "From"),
        text_field!("cc", "CC"),
        text_field!("bcc", "BCC"),
        text_field!("alternative_receiver_address", "Alternative Receiver Address"),
        text_field!("alternative_receiver_name", "Alternative Receiver Name"),
        field!("disable_smarty", "Disable Smarty", FieldKind::Boolean),
    ],
    ignore: &["template_id"],
    blocks: &[],
    attachments: 0,
};

pub const LOC_BLOCK_PARTS: &[NestedBlock] = &[
    NestedBlock {
        key: "address",
        label: "Event Address",
        entity: entities::ADDRESS,
        fields: ADDRESS_FIELDS,
        requires_any: &["street_address", "supplemental_address_1", "city", "postal_code"],
    },
    NestedBlock { key: "email", label: "Event Email", entity: entities::EMAIL, fields: EMAIL_FIELDS, requires_any: &["email"] },
    NestedBlock { key: "email_2", label: "Second Event Email", entity: entities::EMAIL, fields: EMAIL_FIELDS, requires_any: &["email"] },
    NestedBlock { key: "phone", label: "Event Phone", entity: entities::PHONE, fields: PHONE_FIELDS, requires_any: &["phone"] },
    NestedBlock { key: "phone_2", label: "Second Event Phone", entity: entities::PHONE, fields: PHONE_FIELDS, requires_any: &["phone"] },
];

pub const PROFILE_FIELDS: &[FieldSpec] = &[field!("uf_group_id", "Profile", FieldKind::Reference { entity: "UFGroup" })];

pub const REGISTRATION_PROFILES: &[NestedBlock] = &[
    NestedBlock { key: "profile_1", label: "Registration Profile", entity: entities::UF_JOIN, fields: PROFILE_FIELDS, requires_any: &["uf_group_id"] },
    NestedBlock {
        key: "profile_2",
        label: "Second Registration Profile",
        entity: entities::UF_JOIN,
        fields: PROFILE_FIELDS,
        requires_any: &["uf_group_id"],
    },
];

pub static EVENT_SCHEMA: EntitySchema = EntitySchema {
    entity: entities::EVENT,
    entity_table: Some(tables::EVENT),
    result_key: "event",
    fields: &[
        required_field!("title", "Title", FieldKind::Text),
        option_field!("event_type_id", "Event Type", option_groups::EVENT_TYPE),
        text_field!("summary", "Summary"),
        text_field!("description", "Description"),
        required_field!("start_date", "Start Date", FieldKind::DateTime),
        field!("end_date", "End Date", FieldKind::DateTime),
        field!("registration_start_date", "Registration Start", FieldKind::DateTime),
        field!("registration_end_date", "Registration End", FieldKind::DateTime),
        field!("max_participants", "Max Participants", FieldKind::Number),
        text_field!("event_full_text", "Event Full Message"),
        field!("is_online_registration", "Online Registration", FieldKind::Boolean),
        field!("is_public", "Is Public", FieldKind::Boolean),
        field!("is_confirm_enabled", "Confirmation Screen", FieldKind::Boolean),
        field!("is_monetary", "Paid Event", FieldKind::Boolean),
        field!("is_active", "Is Active", FieldKind::Boolean),
        option_field!("default_role_id", "Default Role", option_groups::PARTICIPANT_ROLE),
        field!("loc_block_id", "Existing Location", FieldKind::Reference { entity: entities::LOC_BLOCK }),
    ],
    ignore: &[
        "event_type_id",
        "start_date",
        "end_date",
        "registration_start_date",
        "registration_end_date",
        "loc_block_id",
    ],
    blocks: LOC_BLOCK_PARTS,
    attachments: 0,
};

pub static PARTICIPANT_SCHEMA: EntitySchema = EntitySchema {
    entity: entities::PARTICIPANT,
    entity_table: Some(tables::PARTICIPANT),
    result_key: "participant",
    fields: &[
        option_field!("role_id", "Participant Role", option_groups::PARTICIPANT_ROLE),
        option_field!("status_id", "Participant Status", option_groups::PARTICIPANT_STATUS),
        field!("register_date", "Register Date", FieldKind::DateTime),
        text_field!("source", "Source"),
        text_field!("fee_level", "Fee Level"),
        field!("fee_amount", "Fee Amount", FieldKind::Number),
    ],
    ignore: &["role_id", "status_id", "register_date"],
    blocks: &[],
    attachments: 0,
};

pub static REDIRECT_SCHEMA: EntitySchema = EntitySchema {
    entity: "Redirect",
    entity_table: None,
    result_key: "redirect",
    fields: &[required_field!("url", "Redirect URL", FieldKind::Text)],
    ignore: &["url"],
    blocks: &[],
    attachments: 0,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignored_fields_are_not_mapped() {
        let mapped: Vec<&str> = CASE_SCHEMA.mapped_fields().map(|spec| spec.code).collect();
        assert!(mapped.contains(&"subject"));
        assert!(!mapped.contains(&"case_type_id"));
        assert!(CASE_SCHEMA.field("case_type_id").is_some_and(|spec| spec.required));
    }

    #[test]
    fn test_block_codes() {
        let block = CONTACT_SCHEMA.block("email_1").unwrap();
        assert_eq!(block.mapping_code("email"), "email_1.email");
        assert_eq!(block.gate_code(), "email_1.conditional");
    }

    #[test]
    fn test_ignore_lists_name_real_fields() {
        for schema in [
            &CONTACT_SCHEMA,
            &ACTIVITY_SCHEMA,
            &CASE_SCHEMA,
            &EMAIL_SEND_SCHEMA,
            &EVENT_SCHEMA,
            &PARTICIPANT_SCHEMA,
            &REDIRECT_SCHEMA,
        ] {
            for code in schema.ignore {
                assert!(schema.field(code).is_some(), "{} ignores unknown field {}", schema.entity, code);
            }
        }
    }
}
