//! Exchange client factory.
//!
//! Creates venue clients from configuration and keeps them in a registry
//! shared by the aggregator, detector and orchestrator.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use super::simulated::SimulatedExchange;
use super::traits::ExchangeClient;
use crate::config::{VenueConfig, VenueKind};
use crate::domain::VenueId;
use crate::error::ExchangeError;

/// Factory for creating exchange clients.
pub struct ExchangeFactory;

impl ExchangeFactory {
    /// Create the client for one configured venue.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::UnsupportedVenue`] when this build has no
    /// client for the venue's kind.
    pub fn create(config: &VenueConfig) -> Result<Arc<dyn ExchangeClient>, ExchangeError> {
        match &config.kind {
            VenueKind::Simulated => Ok(Arc::new(SimulatedExchange::from_config(config))),
            VenueKind::Unsupported(kind) => Err(ExchangeError::UnsupportedVenue {
                venue: config.id.clone(),
                kind: kind.clone(),
            }),
        }
    }

    /// Create a registry holding a client for every configured venue.
    ///
    /// # Errors
    ///
    /// Fails on the first venue whose kind is unsupported.
    pub fn create_all(configs: &[VenueConfig]) -> Result<ClientRegistry, ExchangeError> {
        let mut registry = ClientRegistry::new();
        for config in configs {
            let client = Self::create(config)?;
            info!(venue = %config.id, kind = ?config.kind, "Venue client created");
            registry.insert(client);
        }
        Ok(registry)
    }
}

/// Venue clients keyed by venue id.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: HashMap<VenueId, Arc<dyn ExchangeClient>>,
}

impl ClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `client` under its own venue id, replacing any previous one.
    pub fn insert(&mut self, client: Arc<dyn ExchangeClient>) {
        self.clients.insert(client.venue().clone(), client);
    }

    #[must_use]
    pub fn get(&self, venue: &VenueId) -> Option<Arc<dyn ExchangeClient>> {
        self.clients.get(venue).cloned()
    }

    /// Like [`get`](Self::get) but reports a missing client as an error.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::UnknownVenue`] if nothing is registered.
    pub fn require(&self, venue: &VenueId) -> Result<Arc<dyn ExchangeClient>, ExchangeError> {
        self.get(venue)
            .ok_or_else(|| ExchangeError::UnknownVenue(venue.clone()))
    }

    /// Registered venue ids, sorted.
    #[must_use]
    pub fn venues(&self) -> Vec<VenueId> {
        let mut venues: Vec<_> = self.clients.keys().cloned().collect();
        venues.sort();
        venues
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ExchangeClient>> {
        self.clients.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn venue(id: &str, kind: &str) -> VenueConfig {
        toml::from_str(&format!("id = \"{id}\"\nkind = \"{kind}\"")).unwrap()
    }

    #[test]
    fn simulated_kind_creates_client() {
        let client = ExchangeFactory::create(&venue("alpha", "simulated")).unwrap();
        assert_eq!(client.venue().as_str(), "alpha");
        assert!(client.supports_streaming());
    }

    #[test]
    fn unknown_kind_is_unsupported() {
        let err = match ExchangeFactory::create(&venue("beta", "kraken")) {
            Err(err) => err,
            Ok(_) => panic!("expected unsupported venue"),
        };
        assert!(matches!(
            err,
            ExchangeError::UnsupportedVenue { ref kind, .. } if kind == "kraken"
        ));
    }

    #[test]
    fn registry_lookup() {
        let registry =
            ExchangeFactory::create_all(&[venue("b", "simulated"), venue("a", "simulated")])
                .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.venues(), vec![VenueId::from("a"), VenueId::from("b")]);
        assert!(registry.get(&VenueId::from("a")).is_some());
        assert!(matches!(
            registry.require(&VenueId::from("zzz")),
            Err(ExchangeError::UnknownVenue(_))
        ));
    }
}
