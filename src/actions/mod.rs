//! Form actions: the protocol, the shared persistence steps and the
//! built-in entity actions

pub mod action;
pub mod activity;
pub mod attachments;
pub mod case;
pub mod contact;
pub mod context;
pub mod custom_fields;
pub mod email;
pub mod entity;
pub mod event;
pub mod field_specs;
pub mod participant;
pub mod redirect;
pub mod references;
pub mod registry;
pub mod results;
pub mod validation;

pub use action::{ActionDefinition, ActionSchema, FieldDefinition, FormAction, MakeOutcome, SettingsGroup};
pub use context::{Phase, SubmissionContext};
pub use references::{EntityReference, Resolution};
pub use registry::ActionRegistry;
pub use results::{ActionResult, ActionResults};
pub use validation::{ValidationError, ValidationErrors};
