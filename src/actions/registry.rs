//! Registry of the action types a form can use

use super::action::FormAction;
use super::activity::ActivityAction;
use super::case::CaseAction;
use super::contact::ContactAction;
use super::email::EmailAction;
use super::event::EventAction;
use super::participant::ParticipantAction;
use super::redirect::RedirectAction;
use crate::form::ActionInstance;
use anyhow::Result;
use std::collections::BTreeMap;

/// Action implementations keyed by action name
pub struct ActionRegistry {
    actions: BTreeMap<&'static str, Box<dyn FormAction>>,
}

impl ActionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            actions: BTreeMap::new(),
        }
    }

    /// Registry holding every built-in action
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Box::new(ContactAction))?;
        registry.register(Box::new(ActivityAction))?;
        registry.register(Box::new(CaseAction))?;
        registry.register(Box::new(EmailAction))?;
        registry.register(Box::new(EventAction))?;
        registry.register(Box::new(ParticipantAction))?;
        registry.register(Box::new(RedirectAction))?;
        Ok(registry)
    }

    /// Register an action implementation
    ///
    /// Returns an error if an action with the same name is already registered
    pub fn register(&mut self, action: Box<dyn FormAction>) -> Result<()> {
        let definition = action.definition();
        if self.actions.contains_key(definition.action_name) {
            anyhow::bail!("Action '{}' is already registered", definition.action_name);
        }
        log::debug!("Registered action: {} ({})", definition.action_name, definition.action_label);
        self.actions.insert(definition.action_name, action);
        Ok(())
    }

    pub fn get(&self, action_name: &str) -> Option<&dyn FormAction> {
        self.actions.get(action_name).map(|action| action.as_ref())
    }

    /// Implementation for a configured instance
    pub fn resolve(&self, instance: &ActionInstance) -> Result<&dyn FormAction> {
        self.get(&instance.action_name).ok_or_else(|| {
            anyhow::anyhow!("Action '{}' has unknown type '{}'", instance.alias, instance.action_name)
        })
    }

    /// Names of all registered actions, sorted
    pub fn names(&self) -> Vec<&'static str> {
        self.actions.keys().copied().collect()
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
