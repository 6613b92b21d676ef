//! Shared, read-only federator context
//!
//! Built once at startup and handed to every topic worker behind an `Arc`.
//! Workers never mutate it; all per-topic state lives in the worker.

use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use fedtree_core::{BrokerId, FedtreeError, FedtreeResult};
use fedtree_transport::Transport;
use fedtree_wire::Envelope;

/// Identity, protocol parameters and links of one federator
pub struct FederatorContext {
    id: BrokerId,
    redundancy: usize,
    cache_capacity: NonZeroUsize,
    /// Link to the local host broker (subscriber-facing side)
    host: Arc<dyn Transport>,
    /// Links to neighbor federators, ordered by id
    neighbors: BTreeMap<BrokerId, Arc<dyn Transport>>,
}

impl FederatorContext {
    /// Create a context without neighbors.
    ///
    /// Redundancy and cache capacity are clamped to at least one.
    pub fn new(
        id: BrokerId,
        redundancy: usize,
        cache_capacity: usize,
        host: Arc<dyn Transport>,
    ) -> Self {
        FederatorContext {
            id,
            redundancy: redundancy.max(1),
            cache_capacity: NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::MIN),
            host,
            neighbors: BTreeMap::new(),
        }
    }

    /// Register a neighbor link. The local id is never a neighbor.
    pub fn with_neighbor(mut self, id: BrokerId, link: Arc<dyn Transport>) -> Self {
        if id != self.id {
            self.neighbors.insert(id, link);
        }
        self
    }

    pub fn id(&self) -> BrokerId {
        self.id
    }

    /// Maximum number of parents per topic
    pub fn redundancy(&self) -> usize {
        self.redundancy
    }

    pub fn cache_capacity(&self) -> NonZeroUsize {
        self.cache_capacity
    }

    pub fn host(&self) -> &Arc<dyn Transport> {
        &self.host
    }

    /// Known neighbor ids in ascending order
    pub fn neighbor_ids(&self) -> impl Iterator<Item = BrokerId> + '_ {
        self.neighbors.keys().copied()
    }

    pub fn neighbor_count(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_neighbor(&self, id: BrokerId) -> bool {
        self.neighbors.contains_key(&id)
    }

    /// Publish an envelope to one neighbor
    pub fn send_to(&self, id: BrokerId, envelope: &Envelope) -> FedtreeResult<()> {
        let link = self
            .neighbors
            .get(&id)
            .ok_or(FedtreeError::UnknownNeighbor(id))?;
        link.send(envelope.clone())
    }

    /// Publish an envelope to the local host broker
    pub fn send_to_host(&self, envelope: Envelope) -> FedtreeResult<()> {
        self.host.send(envelope)
    }
}

impl fmt::Debug for FederatorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederatorContext")
            .field("id", &self.id)
            .field("redundancy", &self.redundancy)
            .field("cache_capacity", &self.cache_capacity)
            .field("neighbors", &self.neighbors.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use fedtree_core::QoS;
    use fedtree_transport::MemoryTransport;

    #[test]
    fn test_send_to_unknown_neighbor() {
        let ctx = FederatorContext::new(BrokerId(1), 2, 10, Arc::new(MemoryTransport::new()));
        let env = Envelope::new("t", Bytes::new(), QoS::AtMostOnce);

        assert!(matches!(
            ctx.send_to(BrokerId(9), &env),
            Err(FedtreeError::UnknownNeighbor(BrokerId(9)))
        ));
    }

    #[test]
    fn test_self_is_never_a_neighbor() {
        let link = MemoryTransport::new();
        let ctx = FederatorContext::new(BrokerId(1), 0, 0, Arc::new(MemoryTransport::new()))
            .with_neighbor(BrokerId(1), Arc::new(link.clone()))
            .with_neighbor(BrokerId(3), Arc::new(link.clone()))
            .with_neighbor(BrokerId(2), Arc::new(link));

        assert_eq!(ctx.neighbor_ids().collect::<Vec<_>>(), vec![BrokerId(2), BrokerId(3)]);
        assert_eq!(ctx.redundancy(), 1);
        assert_eq!(ctx.cache_capacity().get(), 1);
    }
}
