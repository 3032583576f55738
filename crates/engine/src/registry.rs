//! Registry of personas keyed by their rendered id.

use personax_core::error::RegistryError;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::persona::Core;

/// Holds the personas a process serves. Constructed and passed around
/// explicitly; there is no global instance.
#[derive(Debug, Default)]
pub struct PersonaRegistry {
    personas: BTreeMap<String, Arc<Core>>,
}

impl PersonaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, core: Core) -> Result<Arc<Core>, RegistryError> {
        let id = core.id().to_string();
        if self.personas.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        let core = Arc::new(core);
        self.personas.insert(id, Arc::clone(&core));
        Ok(core)
    }

    pub fn unregister(&mut self, id: &str) -> Result<Arc<Core>, RegistryError> {
        self.personas
            .remove(id)
            .ok_or_else(|| RegistryError::Unknown(id.to_string()))
    }

    pub fn get(&self, id: &str) -> Result<Arc<Core>, RegistryError> {
        self.personas
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::Unknown(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.personas.contains_key(id)
    }

    /// Registered personas, ordered by id.
    pub fn list(&self) -> Vec<Arc<Core>> {
        self.personas.values().cloned().collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.personas.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}
