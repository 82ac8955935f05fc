//! CRM entity names, option groups and defaults used by the form actions

/// APIv4 REST path, relative to the CRM base URL
pub const API_BASE_PATH: &str = "/civicrm/ajax/api4";

/// Build the endpoint for an entity action
pub fn api_endpoint(base_url: &str, entity: &str, action: &str) -> String {
    format!("{}{}/{}/{}", base_url.trim_end_matches('/'), API_BASE_PATH, entity, action)
}

/// Entity names as understood by the gateway
pub mod entities {
    pub const CONTACT: &str = "Contact";
    pub const ACTIVITY: &str = "Activity";
    pub const CASE: &str = "Case";
    pub const CASE_TYPE: &str = "CaseType";
    pub const EVENT: &str = "Event";
    pub const PARTICIPANT: &str = "Participant";
    pub const PARTICIPANT_STATUS_TYPE: &str = "ParticipantStatusType";
    pub const EMAIL: &str = "Email";
    pub const PHONE: &str = "Phone";
    pub const ADDRESS: &str = "Address";
    pub const WEBSITE: &str = "Website";
    pub const LOC_BLOCK: &str = "LocBlock";
    pub const UF_JOIN: &str = "UFJoin";
    pub const RELATIONSHIP: &str = "Relationship";
    pub const ATTACHMENT: &str = "Attachment";
    pub const OPTION_VALUE: &str = "OptionValue";
    pub const CUSTOM_GROUP: &str = "CustomGroup";
    pub const CUSTOM_FIELD: &str = "CustomField";
}

/// Database tables used when linking attachments and profiles to an entity
pub mod tables {
    pub const CONTACT: &str = "civicrm_contact";
    pub const ACTIVITY: &str = "civicrm_activity";
    pub const CASE: &str = "civicrm_case";
    pub const EVENT: &str = "civicrm_event";
    pub const PARTICIPANT: &str = "civicrm_participant";
}

/// Option group names
pub mod option_groups {
    pub const ACTIVITY_TYPE: &str = "activity_type";
    pub const ACTIVITY_STATUS: &str = "activity_status";
    pub const CASE_STATUS: &str = "case_status";
    pub const EVENT_TYPE: &str = "event_type";
    pub const PARTICIPANT_ROLE: &str = "participant_role";
    pub const PARTICIPANT_STATUS: &str = "participant_status";
    pub const CONTACT_TYPE: &str = "contact_type";
    pub const LOCATION_TYPE: &str = "location_type";
}

/// CRM-level setting names consulted by the actions
pub mod settings {
    pub const ACTIVITY_ASSIGNEE_NOTIFICATION: &str = "activity_assignee_notification";
    pub const DO_NOT_NOTIFY_ASSIGNEES_FOR: &str = "do_not_notify_assignees_for";
}

/// Defaults applied when a submission leaves a field out
pub mod defaults {
    pub const CONTACT_TYPE: &str = "Individual";
    /// Activity status "Completed"
    pub const ACTIVITY_STATUS_ID: i64 = 2;
    /// Case status "Ongoing"
    pub const CASE_STATUS_ID: i64 = 1;
    /// Case statuses in the "Closed" class
    pub const CLOSED_CASE_STATUS_IDS: &[i64] = &[2];
    /// Participant status "Registered"
    pub const PARTICIPANT_STATUS_ID: i64 = 1;
    /// Participant role "Attendee"
    pub const PARTICIPANT_ROLE_ID: i64 = 1;
    /// Location type "Home"
    pub const LOCATION_TYPE_ID: i64 = 1;
    /// Events are public unless told otherwise
    pub const EVENT_IS_PUBLIC: i64 = 1;
    /// Confirmation screens are enabled unless told otherwise
    pub const EVENT_IS_CONFIRM_ENABLED: i64 = 1;
    pub const PROFILE_MODULE: &str = "CiviEvent";
}

/// Date formats accepted from submissions, in order of preference
pub const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%Y %H:%M",
];

/// Format the CRM expects for date-time fields
pub const CRM_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format the CRM expects for date-only fields
pub const CRM_DATE_FORMAT: &str = "%Y-%m-%d";
