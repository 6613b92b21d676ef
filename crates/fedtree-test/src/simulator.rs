//! Overlay simulator for fedtree protocol testing
//!
//! Every simulated broker runs real `TopicWorker`s against in-memory links.
//! Traffic is delivered in rounds: everything published during a round is
//! collected, shuffled with a seeded RNG and delivered in the next one.
//! Delivery is synchronous, so a run is fully reproducible from its seed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use fedtree_core::{BrokerId, QoS};
use fedtree_runtime::{CoreRecord, FederatorContext, TopicWorker};
use fedtree_transport::MemoryTransport;
use fedtree_wire::{
    decode_envelope, Envelope, Namespace, SubscriptionNotice, TopicMessage, SUBSCRIPTION_LOG_TOPIC,
};

use crate::Topology;

/// Simulation counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimStats {
    pub rounds: u64,
    pub delivered: u64,
    pub dropped_unseeded: u64,
    pub dropped_malformed: u64,
}

struct SimBroker {
    ctx: Arc<FederatorContext>,
    host: MemoryTransport,
    /// Outbound link per neighbor
    outbound: BTreeMap<BrokerId, MemoryTransport>,
    workers: HashMap<String, TopicWorker>,
}

/// Deterministic multi-broker overlay
pub struct OverlaySimulator {
    brokers: BTreeMap<BrokerId, SimBroker>,
    topology: Topology,
    redundancy: usize,
    rng: StdRng,
    stats: SimStats,
}

impl OverlaySimulator {
    pub fn new(topology: Topology, redundancy: usize, cache_size: usize, seed: u64) -> Self {
        let mut brokers = BTreeMap::new();

        for id in topology.nodes() {
            let host = MemoryTransport::new();
            let mut outbound = BTreeMap::new();
            let mut ctx = FederatorContext::new(id, redundancy, cache_size, Arc::new(host.clone()));
            for neighbor in topology.neighbors(id) {
                let link = MemoryTransport::new();
                ctx = ctx.with_neighbor(neighbor, Arc::new(link.clone()));
                outbound.insert(neighbor, link);
            }

            brokers.insert(
                id,
                SimBroker {
                    ctx: Arc::new(ctx),
                    host,
                    outbound,
                    workers: HashMap::new(),
                },
            );
        }

        OverlaySimulator {
            brokers,
            redundancy: redundancy.max(1),
            topology,
            rng: StdRng::seed_from_u64(seed),
            stats: SimStats::default(),
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn redundancy(&self) -> usize {
        self.redundancy
    }

    /// A local client at `node` subscribes to `topic`
    pub fn subscribe(&mut self, node: BrokerId, topic: &str) {
        let notice = SubscriptionNotice::new("sim-client", topic);
        self.inject(
            node,
            Envelope::new(SUBSCRIPTION_LOG_TOPIC, Bytes::from(notice.line), QoS::AtMostOnce),
        );
    }

    /// A local client at `node` publishes on `topic`
    pub fn publish(&mut self, node: BrokerId, topic: &str, payload: impl Into<Bytes>) {
        self.inject(
            node,
            Envelope::new(Namespace::Federated.topic_for(topic), payload, QoS::AtMostOnce),
        );
    }

    /// Hand an envelope to a broker as if its host had forwarded it
    pub fn inject(&mut self, node: BrokerId, envelope: Envelope) {
        self.deliver(node, envelope);
    }

    /// Deliver one round. Returns the number of envelopes delivered.
    pub fn step(&mut self) -> usize {
        let mut batch = Vec::new();
        for broker in self.brokers.values() {
            for (to, link) in &broker.outbound {
                batch.extend(link.drain().into_iter().map(|env| (*to, env)));
            }
        }

        batch.shuffle(&mut self.rng);
        let count = batch.len();

        for (to, envelope) in batch {
            // Through the datagram framing, as on the wire
            match envelope.serialize().and_then(Envelope::parse) {
                Ok(envelope) => self.deliver(to, envelope),
                Err(_) => self.stats.dropped_malformed += 1,
            }
        }

        self.stats.rounds += 1;
        self.stats.delivered += count as u64;
        count
    }

    /// Step until no traffic is in flight or `max_rounds` is reached.
    ///
    /// Returns the number of rounds that carried traffic.
    pub fn run_until_quiet(&mut self, max_rounds: usize) -> usize {
        let mut rounds = 0;
        while rounds < max_rounds && self.step() > 0 {
            rounds += 1;
        }
        rounds
    }

    /// Envelopes waiting on outbound links
    pub fn in_flight(&self) -> usize {
        self.brokers
            .values()
            .flat_map(|broker| broker.outbound.values())
            .map(|link| link.len())
            .sum()
    }

    pub fn worker(&self, node: BrokerId, topic: &str) -> Option<&TopicWorker> {
        self.brokers.get(&node)?.workers.get(topic)
    }

    /// Hop distance to the core, zero at the core itself
    pub fn core_distance(&self, node: BrokerId, topic: &str) -> Option<u32> {
        match self.worker(node, topic)?.core() {
            CoreRecord::Unknown => None,
            CoreRecord::SelfCore => Some(0),
            CoreRecord::Remote(remote) => Some(remote.dist),
        }
    }

    /// Drain what a broker delivered to its local subscribers
    pub fn take_local_deliveries(&self, node: BrokerId) -> Vec<Envelope> {
        self.brokers
            .get(&node)
            .map(|broker| broker.host.drain())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    /// Check the tree invariants of `topic` across all brokers
    pub fn check_tree(&self, topic: &str) -> Result<(), String> {
        let mut cores = Vec::new();

        for (id, broker) in &self.brokers {
            let Some(worker) = broker.workers.get(topic) else {
                continue;
            };
            let parents = worker.parents();

            if parents.len() > self.redundancy {
                return Err(format!("{} has {} parents", id, parents.len()));
            }
            if parents.contains(id) || worker.children().contains(id) {
                return Err(format!("{} is its own parent or child", id));
            }
            for parent in &parents {
                if !self.topology.are_neighbors(*id, *parent) {
                    return Err(format!("{} has non-neighbor parent {}", id, parent));
                }
                let own = self.core_distance(*id, topic);
                let theirs = self.core_distance(*parent, topic);
                match (own, theirs) {
                    (Some(own), Some(theirs)) if theirs < own => {}
                    _ => {
                        return Err(format!(
                            "parent {} of {} is not closer to the core ({:?} vs {:?})",
                            parent, id, theirs, own
                        ))
                    }
                }
            }

            match worker.core() {
                CoreRecord::SelfCore => cores.push(*id),
                CoreRecord::Remote(remote) => cores.push(remote.core_id),
                CoreRecord::Unknown => {}
            }
        }

        cores.sort();
        cores.dedup();
        if cores.len() > 1 {
            return Err(format!("brokers disagree on the core: {:?}", cores));
        }
        Ok(())
    }

    fn deliver(&mut self, to: BrokerId, envelope: Envelope) {
        let Some(broker) = self.brokers.get_mut(&to) else {
            return;
        };

        match decode_envelope(&envelope) {
            Ok(Some(TopicMessage { topic, message })) => {
                if let Some(worker) = broker.workers.get_mut(&topic) {
                    worker.handle(message);
                } else if message.seeds_worker() {
                    let mut worker = TopicWorker::new(topic.clone(), Arc::clone(&broker.ctx));
                    worker.handle(message);
                    broker.workers.insert(topic, worker);
                } else {
                    self.stats.dropped_unseeded += 1;
                }
            }
            Ok(None) => {}
            Err(_) => self.stats.dropped_malformed += 1,
        }
    }
}
