//! Gateway write operations
//!
//! Every write a gateway performs can be described as an [`Operation`].
//! The in-memory gateway records them in an [`Operations`] log so tests can
//! assert on exactly which writes a submission produced.

pub mod operation;
pub mod operations;

pub use operation::Operation;
pub use operations::Operations;
