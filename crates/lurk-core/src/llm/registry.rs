//! Provider registry for runtime provider lookup.
//!
//! An id-indexed table of adapters. Registration order is kept for listings
//! and default selections.

use std::collections::HashMap;
use std::sync::Arc;

use super::adapter::ProviderAdapter;

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<ProviderAdapter>>,
    order: Vec<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register an adapter under its provider id.
    ///
    /// If an adapter with this id already exists, it is replaced in place.
    pub fn register(&mut self, adapter: ProviderAdapter) {
        let id = adapter.id().to_string();
        if self.providers.insert(id.clone(), Arc::new(adapter)).is_none() {
            self.order.push(id);
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<ProviderAdapter>> {
        self.providers.get(id).cloned()
    }

    /// Display name for `id`, or the id itself when unknown.
    pub fn label<'a>(&'a self, id: &'a str) -> &'a str {
        self.providers
            .get(id)
            .map(|a| a.display_name())
            .unwrap_or(id)
    }

    /// All adapters in registration order.
    pub fn adapters(&self) -> impl Iterator<Item = &Arc<ProviderAdapter>> {
        self.order.iter().filter_map(|id| self.providers.get(id))
    }

    /// Ids of enabled providers in registration order.
    pub fn enabled_ids(&self) -> Vec<String> {
        self.adapters()
            .filter(|a| a.config().enabled)
            .map(|a| a.id().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
