//! Persisted last-known-fix boundary.

use crate::provider::ProviderKind;
use crate::sample::PositionSample;
use async_trait::async_trait;
use std::collections::HashMap;

/// Store for the last known fix per provider.
///
/// Read once at startup to warm the in-memory cache, written through on
/// every successful fix. Durability is the store's own concern; the engine
/// never retries a failed write.
#[async_trait]
pub trait FixStore: Send + Sync {
    /// Loads every persisted fix. Missing or unreadable state yields an
    /// empty map rather than an error; the cache simply starts cold.
    async fn load(&self) -> HashMap<ProviderKind, PositionSample>;

    /// Persists one provider's fix, overwriting any previous slot.
    async fn persist(&self, kind: ProviderKind, sample: PositionSample);
}

/// No-op store for embedders that do not persist fixes.
pub struct NullFixStore;

#[async_trait]
impl FixStore for NullFixStore {
    async fn load(&self) -> HashMap<ProviderKind, PositionSample> {
        HashMap::new()
    }

    async fn persist(&self, _kind: ProviderKind, _sample: PositionSample) {}
}
