//! Topic worker - per-topic core-based tree state machine
//!
//! One worker per federated topic. It owns the topic's core record,
//! children, publication counter and recency cache, and processes its
//! mailbox strictly in order:
//!
//! - Core election: the first local subscriber makes this broker core,
//!   otherwise the first core announcement heard picks a remote core
//! - Membership: announcements climb from children towards the core
//! - Routing: publications fan out over parents and children, deduplicated
//!   by PubId and never echoed back to the neighbor they came from

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::Instrument;

use fedtree_core::{BrokerId, PubId, HOST_QOS, NEIGHBOR_QOS};
use fedtree_wire::{
    CoreAnnouncement, Envelope, MembershipAnnouncement, Message, Publication, RoutedPublication,
};

use crate::{Announcer, FederatorContext, RecencyCache};

/// Sending half of a topic worker's mailbox
pub type Mailbox = mpsc::UnboundedSender<Message>;

/// Tree state when another broker is the core
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteCore {
    pub core_id: BrokerId,
    /// Hops from this broker to the core
    pub dist: u32,
    /// Neighbors one hop closer to the core, at most `redundancy` of them
    pub parents: BTreeSet<BrokerId>,
}

/// Outcome of offering a parent candidate to a `RemoteCore`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParentUpdate {
    /// Same distance, free slot
    Added,
    /// Same distance, set full, candidate lower than every parent
    Replaced { evicted: Option<BrokerId> },
    /// Same distance, candidate already a parent
    AlreadyParent,
    /// Same distance, set full, candidate not lower than every parent
    Rejected,
    /// Strictly shorter path: parents replaced by the candidate
    Shortened,
    /// Longer path
    Stale,
}

impl RemoteCore {
    pub fn new(core_id: BrokerId, dist: u32, parent: BrokerId) -> Self {
        RemoteCore {
            core_id,
            dist,
            parents: BTreeSet::from([parent]),
        }
    }

    /// Offer `sender` as a parent at `dist` hops from the core.
    ///
    /// Ties favour lower ids: when the set is full the highest id is
    /// evicted to make room for a candidate lower than every parent.
    pub fn offer(&mut self, sender: BrokerId, dist: u32, redundancy: usize) -> ParentUpdate {
        match dist.cmp(&self.dist) {
            Ordering::Greater => ParentUpdate::Stale,
            Ordering::Less => {
                self.dist = dist;
                self.parents.clear();
                self.parents.insert(sender);
                ParentUpdate::Shortened
            }
            Ordering::Equal => {
                if self.parents.contains(&sender) {
                    return ParentUpdate::AlreadyParent;
                }
                if self.parents.len() < redundancy {
                    self.parents.insert(sender);
                    return ParentUpdate::Added;
                }
                let lowest = self.parents.first().copied();
                if lowest.is_some_and(|lowest| sender >= lowest) {
                    return ParentUpdate::Rejected;
                }
                let mut evicted = None;
                while self.parents.len() >= redundancy.max(1) {
                    evicted = self.parents.pop_last();
                }
                self.parents.insert(sender);
                ParentUpdate::Replaced { evicted }
            }
        }
    }
}

/// Core record of a topic
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum CoreRecord {
    #[default]
    Unknown,
    /// This broker is the core
    SelfCore,
    Remote(RemoteCore),
}

impl CoreRecord {
    /// Effective core id as seen by `local`
    pub fn core_id(&self, local: BrokerId) -> Option<BrokerId> {
        match self {
            CoreRecord::Unknown => None,
            CoreRecord::SelfCore => Some(local),
            CoreRecord::Remote(remote) => Some(remote.core_id),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, CoreRecord::Unknown)
    }
}

/// Per-worker counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub messages: u64,
    pub announcements_forwarded: u64,
    pub membership_sent: u64,
    pub publications_originated: u64,
    pub routed_forwarded: u64,
    pub local_deliveries: u64,
    pub duplicates_dropped: u64,
    pub send_failures: u64,
}

/// Per-topic actor
pub struct TopicWorker {
    topic: String,
    ctx: Arc<FederatorContext>,
    core: CoreRecord,
    children: BTreeSet<BrokerId>,
    has_local_subs: bool,
    next_seq: u64,
    recent: RecencyCache,
    stats: WorkerStats,
}

impl TopicWorker {
    pub fn new(topic: impl Into<String>, ctx: Arc<FederatorContext>) -> Self {
        let recent = RecencyCache::new(ctx.cache_capacity());
        TopicWorker {
            topic: topic.into(),
            ctx,
            core: CoreRecord::Unknown,
            children: BTreeSet::new(),
            has_local_subs: false,
            next_seq: 0,
            recent,
            stats: WorkerStats::default(),
        }
    }

    /// Start a worker task and return its mailbox.
    ///
    /// Must be called from within a tokio runtime. The task runs until
    /// every mailbox sender is dropped.
    pub fn spawn(topic: impl Into<String>, ctx: Arc<FederatorContext>) -> Mailbox {
        let worker = TopicWorker::new(topic, ctx);
        let span = tracing::info_span!("worker", topic = %worker.topic);
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(worker.run(rx).instrument(span));
        tx
    }

    /// Consume the mailbox one message at a time
    pub async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<Message>) {
        tracing::debug!("worker started");
        while let Some(msg) = mailbox.recv().await {
            self.handle(msg);
        }
        tracing::debug!("mailbox closed, worker stopping");
    }

    /// Process one message to completion
    pub fn handle(&mut self, msg: Message) {
        self.stats.messages += 1;
        tracing::debug!(kind = msg.kind_name(), "handling message");

        match msg {
            Message::SubscriptionNotice(_) => self.on_subscription(),
            Message::CoreAnnouncement(ann) => self.on_core_announcement(ann),
            Message::MembershipAnnouncement(ann) => self.on_membership(ann),
            Message::Publication(publication) => self.on_publication(publication),
            Message::RoutedPublication(routed) => self.on_routed(routed),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn core(&self) -> &CoreRecord {
        &self.core
    }

    /// Current parents (empty unless a remote core is known)
    pub fn parents(&self) -> BTreeSet<BrokerId> {
        match &self.core {
            CoreRecord::Remote(remote) => remote.parents.clone(),
            _ => BTreeSet::new(),
        }
    }

    pub fn children(&self) -> &BTreeSet<BrokerId> {
        &self.children
    }

    pub fn has_local_subs(&self) -> bool {
        self.has_local_subs
    }

    /// Sequence number the next local publication will get
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn recent(&self) -> &RecencyCache {
        &self.recent
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    fn on_subscription(&mut self) {
        match self.core {
            CoreRecord::Unknown => {
                Announcer::new(&self.topic).announce(&self.ctx);
                self.has_local_subs = true;
                self.core = CoreRecord::SelfCore;
                self.children.clear();
            }
            CoreRecord::Remote(_) => {
                self.has_local_subs = true;
                self.answer_parents();
            }
            CoreRecord::SelfCore => tracing::debug!("already core, subscription needs no signaling"),
        }
    }

    fn on_core_announcement(&mut self, ann: CoreAnnouncement) {
        let local = self.ctx.id();
        if ann.core_id == local || ann.sender_id == local {
            tracing::debug!(core = %ann.core_id, sender = %ann.sender_id, "own announcement looped back");
            return;
        }

        let dist = ann.dist.saturating_add(1);
        let sender = ann.sender_id;

        if self.core == CoreRecord::Unknown {
            tracing::info!(core = %ann.core_id, dist, parent = %sender, "core elected");
            self.core = CoreRecord::Remote(RemoteCore::new(ann.core_id, dist, sender));
            self.children.clear();
            self.forward_core_announcement(ann.core_id, dist, sender);
            return;
        }

        let redundancy = self.ctx.redundancy();
        let update = match &mut self.core {
            CoreRecord::Remote(remote) if remote.core_id == ann.core_id => {
                remote.offer(sender, dist, redundancy)
            }
            CoreRecord::Remote(remote) => {
                // Conflicting cores are left unresolved
                tracing::warn!(
                    current = %remote.core_id,
                    announced = %ann.core_id,
                    sender = %sender,
                    "announcement for a different core ignored"
                );
                return;
            }
            CoreRecord::SelfCore | CoreRecord::Unknown => {
                tracing::debug!(announced = %ann.core_id, "this broker is core, announcement ignored");
                return;
            }
        };

        match update {
            ParentUpdate::Added => tracing::debug!(parent = %sender, "parent added"),
            ParentUpdate::Replaced { evicted } => {
                tracing::debug!(parent = %sender, evicted = ?evicted, "parent set full, replaced highest id")
            }
            ParentUpdate::AlreadyParent => tracing::warn!(parent = %sender, "sender already a parent"),
            ParentUpdate::Rejected => tracing::debug!(candidate = %sender, "parent set full, candidate rejected"),
            ParentUpdate::Shortened => {
                tracing::info!(parent = %sender, dist, "shorter path to core, parents replaced");
                self.forward_core_announcement(ann.core_id, dist, sender);
            }
            ParentUpdate::Stale => tracing::trace!(candidate = %sender, dist, "longer path ignored"),
        }

        tracing::debug!(parents = ?self.parents(), "parent set");
    }

    fn on_membership(&mut self, ann: MembershipAnnouncement) {
        let local = self.ctx.id();
        if ann.sender_id == local {
            tracing::debug!("own membership announcement looped back");
            return;
        }

        let Some(core_id) = self.core.core_id(local) else {
            tracing::error!(announced = %ann.core_id, sender = %ann.sender_id, "membership announcement before any core is known");
            return;
        };
        if core_id != ann.core_id {
            tracing::error!(
                current = %core_id,
                announced = %ann.core_id,
                sender = %ann.sender_id,
                "membership announcement core does not match"
            );
            return;
        }

        if self.children.insert(ann.sender_id) {
            tracing::info!(child = %ann.sender_id, "child joined");
        }

        if matches!(self.core, CoreRecord::Remote(_)) {
            self.answer_parents();
        }

        tracing::debug!(children = ?self.children, "children");
    }

    fn on_publication(&mut self, publication: Publication) {
        let pub_id = PubId::new(self.ctx.id(), self.next_seq);
        self.next_seq += 1;
        // Mark before sending so the publication is dropped if it loops back
        self.recent.put(pub_id);
        self.stats.publications_originated += 1;

        let routed = RoutedPublication::new(pub_id, self.ctx.id(), publication.payload);
        let envelope = Message::from(routed).to_envelope(&self.topic, NEIGHBOR_QOS);
        let sent = self.fan_out(&envelope, None);

        tracing::debug!(?pub_id, sent, "publication originated");
    }

    fn on_routed(&mut self, routed: RoutedPublication) {
        if self.recent.contains(&routed.pub_id) {
            self.stats.duplicates_dropped += 1;
            tracing::debug!(pub_id = ?routed.pub_id, from = %routed.sender_id, "duplicate dropped");
            return;
        }
        self.recent.put(routed.pub_id);

        if self.has_local_subs {
            self.deliver_local(routed.payload.clone());
        }

        let from = routed.sender_id;
        let forwarded = RoutedPublication::new(routed.pub_id, self.ctx.id(), routed.payload);
        let envelope = Message::from(forwarded).to_envelope(&self.topic, NEIGHBOR_QOS);
        let sent = self.fan_out(&envelope, Some(from));
        self.stats.routed_forwarded += sent as u64;

        tracing::debug!(pub_id = ?routed.pub_id, from = %from, sent, "publication routed");
    }

    /// Send a membership announcement to every current parent
    fn answer_parents(&mut self) {
        let CoreRecord::Remote(remote) = &self.core else {
            return;
        };
        let ann = MembershipAnnouncement::new(remote.core_id, self.ctx.id());
        let parents: Vec<BrokerId> = remote.parents.iter().copied().collect();
        let envelope = Message::from(ann).to_envelope(&self.topic, NEIGHBOR_QOS);

        for parent in parents {
            if self.send(parent, &envelope) {
                self.stats.membership_sent += 1;
            }
        }
    }

    fn forward_core_announcement(&mut self, core_id: BrokerId, dist: u32, from: BrokerId) {
        let ann = CoreAnnouncement::new(core_id, dist, self.ctx.id());
        let envelope = Message::from(ann).to_envelope(&self.topic, NEIGHBOR_QOS);
        let targets: Vec<BrokerId> = self.ctx.neighbor_ids().filter(|id| *id != from).collect();

        for neighbor in targets {
            if self.send(neighbor, &envelope) {
                self.stats.announcements_forwarded += 1;
            }
        }
    }

    /// Send to every parent and child except `exclude`. A neighbor that is
    /// both parent and child gets one copy.
    fn fan_out(&mut self, envelope: &Envelope, exclude: Option<BrokerId>) -> usize {
        let mut targets = self.children.clone();
        if let CoreRecord::Remote(remote) = &self.core {
            targets.extend(remote.parents.iter().copied());
        }
        if let Some(exclude) = exclude {
            targets.remove(&exclude);
        }

        targets
            .into_iter()
            .filter(|target| self.send(*target, envelope))
            .count()
    }

    fn deliver_local(&mut self, payload: Bytes) {
        let envelope = Envelope::new(self.topic.clone(), payload, HOST_QOS);
        match self.ctx.send_to_host(envelope) {
            Ok(()) => self.stats.local_deliveries += 1,
            Err(e) => {
                self.stats.send_failures += 1;
                tracing::error!("local delivery failed: {}", e);
            }
        }
    }

    fn send(&mut self, to: BrokerId, envelope: &Envelope) -> bool {
        match self.ctx.send_to(to, envelope) {
            Ok(()) => true,
            Err(e) => {
                self.stats.send_failures += 1;
                tracing::error!(neighbor = %to, "send skipped: {}", e);
                false
            }
        }
    }
}
