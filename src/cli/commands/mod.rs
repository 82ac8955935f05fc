pub mod form;

pub use form::{handle_schema_command, handle_submit_command, handle_validate_command};
