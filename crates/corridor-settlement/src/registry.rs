use std::sync::Arc;

use corridor_core::Currency;

use crate::adapter::SettlementAdapter;
use crate::error::SettlementError;

/// Holds the registered settlement rails and performs rail selection.
///
/// Registration order is preserved: `adapter_for_currency` returns the
/// first registered adapter that supports the currency, and nothing else
/// in the system makes that choice.
pub struct SettlementRegistry {
    adapters: Vec<Arc<dyn SettlementAdapter>>,
}

impl SettlementRegistry {
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Register a rail. Re-registering a layer id replaces the adapter in
    /// its original position.
    pub fn register(&mut self, adapter: Arc<dyn SettlementAdapter>) {
        let id = adapter.layer_id().to_string();
        tracing::info!(layer_id = %id, "registering settlement adapter");
        match self.adapters.iter().position(|a| a.layer_id() == id) {
            Some(idx) => self.adapters[idx] = adapter,
            None => self.adapters.push(adapter),
        }
    }

    pub fn unregister(&mut self, layer_id: &str) -> Option<Arc<dyn SettlementAdapter>> {
        let idx = self.adapters.iter().position(|a| a.layer_id() == layer_id)?;
        Some(self.adapters.remove(idx))
    }

    pub fn adapter(&self, layer_id: &str) -> Result<Arc<dyn SettlementAdapter>, SettlementError> {
        self.adapters
            .iter()
            .find(|a| a.layer_id() == layer_id)
            .cloned()
            .ok_or_else(|| SettlementError::AdapterNotFound(layer_id.to_string()))
    }

    /// First registered rail that settles the currency.
    pub fn adapter_for_currency(
        &self,
        currency: &Currency,
    ) -> Result<Arc<dyn SettlementAdapter>, SettlementError> {
        self.adapters
            .iter()
            .find(|a| a.supported_currencies().contains(currency))
            .cloned()
            .ok_or_else(|| SettlementError::NoAdapterForCurrency(currency.code()))
    }

    pub fn layer_ids(&self) -> Vec<String> {
        self.adapters
            .iter()
            .map(|a| a.layer_id().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl Default for SettlementRegistry {
    fn default() -> Self {
        Self::new()
    }
}
