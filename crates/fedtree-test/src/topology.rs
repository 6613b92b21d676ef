//! Overlay topologies

use std::collections::{BTreeSet, HashMap, VecDeque};

use fedtree_core::BrokerId;

/// Undirected broker overlay. Ids start at 1.
#[derive(Clone, Debug, Default)]
pub struct Topology {
    nodes: BTreeSet<BrokerId>,
    edges: BTreeSet<(BrokerId, BrokerId)>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an undirected edge. Self-loops are ignored.
    pub fn with_edge(mut self, a: u64, b: u64) -> Self {
        self.add_edge(BrokerId(a), BrokerId(b));
        self
    }

    pub fn add_edge(&mut self, a: BrokerId, b: BrokerId) {
        self.nodes.insert(a);
        self.nodes.insert(b);
        if a != b {
            self.edges.insert((a.min(b), a.max(b)));
        }
    }

    pub fn add_node(&mut self, id: BrokerId) {
        self.nodes.insert(id);
    }

    /// 1 - 2 - ... - n
    pub fn line(n: u64) -> Self {
        let mut topology = Topology::new();
        topology.add_node(BrokerId(1));
        for i in 1..n {
            topology.add_edge(BrokerId(i), BrokerId(i + 1));
        }
        topology
    }

    /// Line with the ends joined
    pub fn ring(n: u64) -> Self {
        let mut topology = Self::line(n);
        if n > 2 {
            topology.add_edge(BrokerId(n), BrokerId(1));
        }
        topology
    }

    /// `width` x `height` mesh, row-major ids
    pub fn grid(width: u64, height: u64) -> Self {
        let mut topology = Topology::new();
        let id = |x: u64, y: u64| BrokerId(y * width + x + 1);

        for y in 0..height {
            for x in 0..width {
                topology.add_node(id(x, y));
                if x + 1 < width {
                    topology.add_edge(id(x, y), id(x + 1, y));
                }
                if y + 1 < height {
                    topology.add_edge(id(x, y), id(x, y + 1));
                }
            }
        }
        topology
    }

    pub fn nodes(&self) -> impl Iterator<Item = BrokerId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn neighbors(&self, id: BrokerId) -> BTreeSet<BrokerId> {
        self.edges
            .iter()
            .filter_map(|(a, b)| {
                if *a == id {
                    Some(*b)
                } else if *b == id {
                    Some(*a)
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn are_neighbors(&self, a: BrokerId, b: BrokerId) -> bool {
        self.edges.contains(&(a.min(b), a.max(b)))
    }

    /// Hop distance from `from` to every reachable node
    pub fn hop_distances(&self, from: BrokerId) -> HashMap<BrokerId, u32> {
        let mut dist = HashMap::new();
        let mut queue = VecDeque::new();
        dist.insert(from, 0);
        queue.push_back(from);

        while let Some(node) = queue.pop_front() {
            let d = dist[&node];
            for next in self.neighbors(node) {
                if !dist.contains_key(&next) {
                    dist.insert(next, d + 1);
                    queue.push_back(next);
                }
            }
        }
        dist
    }
}
