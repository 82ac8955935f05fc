//! Ordered log of operations a gateway has executed

use super::operation::Operation;
use serde::{Deserialize, Serialize};

/// The calls a gateway received, oldest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Operations {
    operations: Vec<Operation>,
}

impl Operations {
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
        }
    }

    /// Append a single operation
    pub fn push(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Number of create calls, optionally restricted to one entity
    pub fn creates(&self, entity: Option<&str>) -> usize {
        self.operations
            .iter()
            .filter(|op| op.is_create())
            .filter(|op| entity.is_none() || op.entity() == entity)
            .count()
    }

    /// Number of calls that create or update entity data
    pub fn writes(&self) -> usize {
        self.operations.iter().filter(|op| op.is_create_or_update()).count()
    }

    /// Operations that target the given entity
    pub fn for_entity<'a>(&'a self, entity: &'a str) -> impl Iterator<Item = &'a Operation> + 'a {
        self.operations.iter().filter(move |op| op.entity() == Some(entity))
    }
}

impl<'a> IntoIterator for &'a Operations {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}
