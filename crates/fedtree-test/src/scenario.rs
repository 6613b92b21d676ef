//! End-to-end scenarios over the overlay simulator
//!
//! A scenario builds the tree for one topic, attaches subscribers, lets
//! publishers emit and then checks every subscriber got each foreign
//! publication exactly once.

use std::collections::BTreeMap;

use fedtree_core::BrokerId;

use crate::{OverlaySimulator, SimStats, Topology};

const MAX_ROUNDS: usize = 10_000;

/// Scenario parameters
#[derive(Clone, Debug)]
pub struct Scenario {
    pub topology: Topology,
    pub topic: String,
    pub redundancy: usize,
    pub cache_size: usize,
    pub seed: u64,
    /// First subscriber, becomes the core
    pub core: BrokerId,
    pub subscribers: Vec<BrokerId>,
    pub publishers: Vec<BrokerId>,
    /// Publications per publisher
    pub messages_per_publisher: usize,
}

impl Scenario {
    pub fn new(topology: Topology, core: u64) -> Self {
        Scenario {
            topology,
            topic: "scenario".to_string(),
            redundancy: 2,
            cache_size: 1000,
            seed: 0,
            core: BrokerId(core),
            subscribers: Vec::new(),
            publishers: Vec::new(),
            messages_per_publisher: 1,
        }
    }

    pub fn line(n: u64) -> Self {
        Self::new(Topology::line(n), 1)
    }

    pub fn ring(n: u64) -> Self {
        Self::new(Topology::ring(n), 1)
    }

    pub fn grid(width: u64, height: u64) -> Self {
        Self::new(Topology::grid(width, height), 1)
    }

    pub fn with_redundancy(mut self, redundancy: usize) -> Self {
        self.redundancy = redundancy;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_subscribers(mut self, ids: &[u64]) -> Self {
        self.subscribers = ids.iter().copied().map(BrokerId).collect();
        self
    }

    pub fn with_publishers(mut self, ids: &[u64], messages: usize) -> Self {
        self.publishers = ids.iter().copied().map(BrokerId).collect();
        self.messages_per_publisher = messages;
        self
    }

    /// Execute the scenario to quiescence
    pub fn run(&self) -> ScenarioResult {
        let mut sim = OverlaySimulator::new(
            self.topology.clone(),
            self.redundancy,
            self.cache_size,
            self.seed,
        );

        sim.subscribe(self.core, &self.topic);
        let mut rounds = sim.run_until_quiet(MAX_ROUNDS);

        for subscriber in &self.subscribers {
            sim.subscribe(*subscriber, &self.topic);
        }
        rounds += sim.run_until_quiet(MAX_ROUNDS);

        let tree_error = sim.check_tree(&self.topic).err();

        for publisher in &self.publishers {
            for i in 0..self.messages_per_publisher {
                let payload = format!("{}:{}", publisher, i).into_bytes();
                sim.publish(*publisher, &self.topic, payload);
            }
        }
        rounds += sim.run_until_quiet(MAX_ROUNDS);

        let mut subscribed = self.subscribers.clone();
        subscribed.push(self.core);
        subscribed.sort();
        subscribed.dedup();

        let mut deliveries = BTreeMap::new();
        let mut expected = BTreeMap::new();
        for node in subscribed {
            let received = sim
                .take_local_deliveries(node)
                .into_iter()
                .filter(|env| env.topic == self.topic)
                .count();
            let foreign = self.publishers.iter().filter(|p| **p != node).count();
            deliveries.insert(node, received);
            expected.insert(node, foreign * self.messages_per_publisher);
        }

        ScenarioResult {
            deliveries,
            expected,
            rounds,
            tree_error,
            quiet: sim.in_flight() == 0,
            stats: sim.stats().clone(),
        }
    }
}

/// Outcome of one scenario run
#[derive(Clone, Debug)]
pub struct ScenarioResult {
    /// Local deliveries per subscribing broker
    pub deliveries: BTreeMap<BrokerId, usize>,
    /// Expected deliveries per subscribing broker
    pub expected: BTreeMap<BrokerId, usize>,
    pub rounds: usize,
    pub tree_error: Option<String>,
    /// No traffic left in flight
    pub quiet: bool,
    pub stats: SimStats,
}

impl ScenarioResult {
    pub fn exactly_once(&self) -> bool {
        self.deliveries == self.expected
    }

    pub fn passed(&self) -> bool {
        self.quiet && self.tree_error.is_none() && self.exactly_once()
    }
}
