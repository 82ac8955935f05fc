pub mod actions;
pub mod api;
pub mod config;
pub mod files;
pub mod form;
pub mod pipeline;

pub use actions::{ActionRegistry, ActionResult, ActionResults, FormAction};
pub use pipeline::{FormProcessor, SubmissionOutcome, SubmissionReport};
