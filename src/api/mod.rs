//! CRM access: the gateway trait the actions consume, an HTTP
//! implementation and an in-memory one

pub mod client;
pub mod constants;
pub mod gateway;
pub mod memory;
pub mod models;
pub mod operations;

pub use client::HttpGateway;
pub use gateway::{CrmGateway, Filter};
pub use memory::InMemoryGateway;
pub use models::{AttachmentHandle, Record};
pub use operations::{Operation, Operations};
