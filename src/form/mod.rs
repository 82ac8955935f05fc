//! Form definitions, submissions and the value-resolution helpers every
//! action shares

pub mod definition;
pub mod gate;
pub mod mapper;
pub mod sanitize;
pub mod submission;

pub use definition::{ActionInstance, FileFieldOptions, Form};
pub use gate::GateState;
pub use mapper::{FieldMapper, Source};
pub use submission::{Submission, SubmittedField, UploadedFile};
