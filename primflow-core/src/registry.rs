//! Primitive registry.

use crate::error::CoreError;
use crate::primitive::Primitive;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Maps operation names to primitives.
///
/// Built once during bootstrap and then shared behind an `Arc`. There is no
/// interior mutability, so nothing can register while runs hold a reference.
#[derive(Default, Clone)]
pub struct PrimitiveRegistry {
    primitives: HashMap<String, Arc<dyn Primitive>>,
}

impl PrimitiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a primitive under `name`. The last registration wins; the
    /// replaced primitive is returned.
    pub fn register<P>(&mut self, name: impl Into<String>, primitive: P) -> Option<Arc<dyn Primitive>>
    where
        P: Primitive + 'static,
    {
        self.register_arc(name, Arc::new(primitive))
    }

    /// Registers an already shared primitive.
    pub fn register_arc(
        &mut self,
        name: impl Into<String>,
        primitive: Arc<dyn Primitive>,
    ) -> Option<Arc<dyn Primitive>> {
        let name = name.into();
        let replaced = self.primitives.insert(name.clone(), primitive);
        if replaced.is_some() {
            tracing::debug!("Replaced primitive registration for '{}'", name);
        }
        replaced
    }

    /// Looks up a primitive by name.
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Primitive>, CoreError> {
        self.primitives
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::PrimitiveNotFound {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.primitives.contains_key(name)
    }

    /// Returns all registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.primitives.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }
}

impl fmt::Debug for PrimitiveRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimitiveRegistry")
            .field("primitives", &self.names())
            .finish()
    }
}
