//! Field-attached validation failures reported back to the submitter

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{alias}.{field}: {message}")]
pub struct ValidationError {
    /// Alias of the action that rejected the submission
    pub alias: String,
    /// Entity field code the message is attached to
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(alias: &str, field: &str, message: impl Into<String>) -> Self {
        Self {
            alias: alias.to_string(),
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Error)]
#[error("Submission rejected: {}", join_messages(.errors))]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = ValidationError>) {
        self.errors.extend(errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Errors raised by one action
    pub fn for_alias<'a>(&'a self, alias: &'a str) -> impl Iterator<Item = &'a ValidationError> + 'a {
        self.errors.iter().filter(move |error| error.alias == alias)
    }
}

fn join_messages(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl From<Vec<ValidationError>> for ValidationErrors {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self { errors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let errors = ValidationErrors::from(vec![
            ValidationError::new("new_event", "title", "Title is required"),
            ValidationError::new("join", "event", "This event is full"),
        ]);

        assert_eq!(
            errors.to_string(),
            "Submission rejected: new_event.title: Title is required; join.event: This event is full"
        );
        assert_eq!(errors.for_alias("join").count(), 1);
    }

    #[test]
    fn test_errors_convert_to_anyhow() {
        let errors = ValidationErrors::from(vec![ValidationError::new("new_case", "contact", "Contact is required")]);

        let err = anyhow::Error::new(errors.clone());

        assert_eq!(err.to_string(), "Submission rejected: new_case.contact: Contact is required");
        assert_eq!(err.downcast_ref::<ValidationErrors>(), Some(&errors));
        assert!(std::error::Error::source(&errors.errors()[0]).is_none());
    }
}
