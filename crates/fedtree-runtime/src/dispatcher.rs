//! Dispatcher - routes inbound traffic to per-topic workers
//!
//! Decodes every inbound envelope, looks up the worker for its federated
//! topic and enqueues the message. Only a subscription notice or a core
//! announcement may create a worker; anything else for an unknown topic
//! is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::error::SendError;

use fedtree_transport::InboundReceiver;
use fedtree_wire::{decode_envelope, Envelope, TopicMessage};

use crate::{FederatorContext, Mailbox, TopicWorker};

/// What happened to one inbound envelope
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handed to an existing worker
    Enqueued,
    /// A new worker was created for the topic
    Spawned,
    /// Not addressed to any worker
    Irrelevant,
    /// Could not be decoded
    Malformed,
    /// Topic has no worker and the message may not create one
    Unseeded,
}

/// Dispatcher counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub dispatched: u64,
    pub workers_spawned: u64,
    pub dropped_irrelevant: u64,
    pub dropped_malformed: u64,
    pub dropped_unseeded: u64,
}

/// Owner of the topic-to-mailbox map
pub struct Dispatcher {
    ctx: Arc<FederatorContext>,
    mailboxes: HashMap<String, Mailbox>,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(ctx: Arc<FederatorContext>) -> Self {
        Dispatcher {
            ctx,
            mailboxes: HashMap::new(),
            stats: DispatchStats::default(),
        }
    }

    /// Drain the inbound bridge until every sender is gone
    pub async fn run(mut self, mut inbound: InboundReceiver) -> DispatchStats {
        tracing::info!(id = %self.ctx.id(), "dispatcher started");

        while let Some(envelope) = inbound.recv().await {
            self.dispatch(envelope);
        }

        tracing::info!(topics = self.mailboxes.len(), "inbound bridge closed, dispatcher stopping");
        self.stats
    }

    /// Route one envelope. Must be called from within a tokio runtime.
    pub fn dispatch(&mut self, envelope: Envelope) -> DispatchOutcome {
        self.stats.dispatched += 1;

        let TopicMessage { topic, message } = match decode_envelope(&envelope) {
            Ok(Some(decoded)) => decoded,
            Ok(None) => {
                self.stats.dropped_irrelevant += 1;
                tracing::trace!(topic = %envelope.topic, "not for any worker");
                return DispatchOutcome::Irrelevant;
            }
            Err(e) => {
                self.stats.dropped_malformed += 1;
                tracing::warn!(topic = %envelope.topic, "dropping malformed message: {}", e);
                return DispatchOutcome::Malformed;
            }
        };

        let message = match self.mailboxes.get(&topic) {
            Some(mailbox) => match mailbox.send(message) {
                Ok(()) => return DispatchOutcome::Enqueued,
                Err(SendError(message)) => message,
            },
            None => message,
        };

        if self.mailboxes.remove(&topic).is_some() {
            tracing::warn!(topic = %topic, "worker stopped, mailbox removed");
        }

        if !message.seeds_worker() {
            self.stats.dropped_unseeded += 1;
            tracing::debug!(topic = %topic, kind = message.kind_name(), "no worker for topic, dropped");
            return DispatchOutcome::Unseeded;
        }

        let mailbox = TopicWorker::spawn(topic.clone(), Arc::clone(&self.ctx));
        if mailbox.send(message).is_err() {
            tracing::error!(topic = %topic, "new worker rejected its first message");
        }
        self.mailboxes.insert(topic.clone(), mailbox);
        self.stats.workers_spawned += 1;

        tracing::info!(topic = %topic, workers = self.mailboxes.len(), "topic worker spawned");
        DispatchOutcome::Spawned
    }

    /// Number of topics with a worker
    pub fn topic_count(&self) -> usize {
        self.mailboxes.len()
    }

    pub fn has_worker(&self, topic: &str) -> bool {
        self.mailboxes.contains_key(topic)
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use fedtree_core::{BrokerId, PubId, QoS, NEIGHBOR_QOS};
    use fedtree_transport::{inbound_channel, ChannelTransport, MemoryTransport};
    use fedtree_wire::{
        CoreAnnouncement, Message, MembershipAnnouncement, RoutedPublication, SUBSCRIPTION_LOG_TOPIC,
    };

    fn setup() -> (Dispatcher, MemoryTransport, MemoryTransport) {
        let host = MemoryTransport::new();
        let neighbor = MemoryTransport::new();
        let ctx = FederatorContext::new(BrokerId(1), 2, 32, Arc::new(host.clone()))
            .with_neighbor(BrokerId(2), Arc::new(neighbor.clone()));
        (Dispatcher::new(Arc::new(ctx)), host, neighbor)
    }

    fn sub_log(topic: &str) -> Envelope {
        Envelope::new(
            SUBSCRIPTION_LOG_TOPIC,
            Bytes::from(format!("client 0 {}", topic)),
            QoS::AtMostOnce,
        )
    }

    /// Yield until the link has `n` envelopes or give up
    async fn wait_for(link: &MemoryTransport, n: usize) -> bool {
        for _ in 0..100 {
            if link.len() >= n {
                return true;
            }
            tokio::task::yield_now().await;
        }
        link.len() >= n
    }

    #[tokio::test]
    async fn test_subscription_spawns_worker() {
        let (mut dispatcher, _host, neighbor) = setup();

        assert_eq!(dispatcher.dispatch(sub_log("room")), DispatchOutcome::Spawned);
        assert!(dispatcher.has_worker("room"));
        assert_eq!(dispatcher.topic_count(), 1);

        assert!(wait_for(&neighbor, 1).await);
        assert_eq!(neighbor.drain()[0].topic, "federator/core_ann/room");

        assert_eq!(dispatcher.dispatch(sub_log("room")), DispatchOutcome::Enqueued);
        assert_eq!(dispatcher.topic_count(), 1);
        assert_eq!(dispatcher.stats().workers_spawned, 1);
    }

    #[tokio::test]
    async fn test_core_announcement_spawns_worker() {
        let (mut dispatcher, _host, _neighbor) = setup();
        let env = Message::from(CoreAnnouncement::new(BrokerId(9), 0, BrokerId(2)))
            .to_envelope("lobby", NEIGHBOR_QOS);

        assert_eq!(dispatcher.dispatch(env), DispatchOutcome::Spawned);
        assert!(dispatcher.has_worker("lobby"));
    }

    #[tokio::test]
    async fn test_non_seeding_messages_do_not_spawn() {
        let (mut dispatcher, _host, _neighbor) = setup();

        let memb = Message::from(MembershipAnnouncement::new(BrokerId(9), BrokerId(2)))
            .to_envelope("room", NEIGHBOR_QOS);
        let routed = Message::from(RoutedPublication::new(
            PubId::new(BrokerId(9), 0),
            BrokerId(2),
            Bytes::from_static(b"x"),
        ))
        .to_envelope("room", NEIGHBOR_QOS);
        let publication = Envelope::new("federated/room", Bytes::from_static(b"x"), QoS::AtMostOnce);

        assert_eq!(dispatcher.dispatch(memb), DispatchOutcome::Unseeded);
        assert_eq!(dispatcher.dispatch(routed), DispatchOutcome::Unseeded);
        assert_eq!(dispatcher.dispatch(publication), DispatchOutcome::Unseeded);
        assert_eq!(dispatcher.topic_count(), 0);
        assert_eq!(dispatcher.stats().dropped_unseeded, 3);
    }

    #[tokio::test]
    async fn test_irrelevant_and_malformed_dropped() {
        let (mut dispatcher, _host, _neighbor) = setup();

        assert_eq!(
            dispatcher.dispatch(sub_log("federator/core_ann/room")),
            DispatchOutcome::Irrelevant
        );
        assert_eq!(
            dispatcher.dispatch(Envelope::new("elsewhere/room", Bytes::new(), QoS::AtMostOnce)),
            DispatchOutcome::Malformed
        );
        assert_eq!(
            dispatcher.dispatch(Envelope::new(
                "federator/core_ann/room",
                Bytes::from_static(&[0x01, 0x02]),
                QoS::AtMostOnce
            )),
            DispatchOutcome::Malformed
        );

        let stats = dispatcher.stats();
        assert_eq!(stats.dispatched, 3);
        assert_eq!(stats.dropped_irrelevant, 1);
        assert_eq!(stats.dropped_malformed, 2);
        assert_eq!(dispatcher.topic_count(), 0);
    }

    #[tokio::test]
    async fn test_publication_reaches_existing_worker() {
        let (mut dispatcher, _host, neighbor) = setup();

        dispatcher.dispatch(sub_log("room"));
        let memb = Message::from(MembershipAnnouncement::new(BrokerId(1), BrokerId(2)))
            .to_envelope("room", NEIGHBOR_QOS);
        assert_eq!(dispatcher.dispatch(memb), DispatchOutcome::Enqueued);

        let publication = Envelope::new("federated/room", Bytes::from_static(b"hi"), QoS::AtMostOnce);
        assert_eq!(dispatcher.dispatch(publication), DispatchOutcome::Enqueued);

        // core announcement, then the routed publication to child 2
        assert!(wait_for(&neighbor, 2).await);
        let sent = neighbor.drain();
        assert_eq!(sent[1].topic, "federator/routing/room");
    }

    #[tokio::test]
    async fn test_two_federators_in_process() {
        let (tx1, rx1) = inbound_channel();
        let (tx2, rx2) = inbound_channel();
        let host1 = MemoryTransport::new();
        let host2 = MemoryTransport::new();

        let ctx1 = FederatorContext::new(BrokerId(1), 1, 16, Arc::new(host1.clone()))
            .with_neighbor(BrokerId(2), Arc::new(ChannelTransport::new(tx2.clone())));
        let ctx2 = FederatorContext::new(BrokerId(2), 1, 16, Arc::new(host2.clone()))
            .with_neighbor(BrokerId(1), Arc::new(ChannelTransport::new(tx1.clone())));
        tokio::spawn(Dispatcher::new(Arc::new(ctx1)).run(rx1));
        tokio::spawn(Dispatcher::new(Arc::new(ctx2)).run(rx2));

        tx1.send(sub_log("room")).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        tx2.send(sub_log("room")).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        tx1.send(Envelope::new("federated/room", Bytes::from_static(b"hi"), QoS::AtMostOnce))
            .unwrap();

        for _ in 0..200 {
            if !host2.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let delivered = host2.drain();
        assert_eq!(delivered[0].topic, "room");
        assert_eq!(&delivered[0].payload[..], b"hi");
        assert!(host1.is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_when_inbound_closes() {
        let (dispatcher, _host, _neighbor) = setup();
        let (tx, rx) = inbound_channel();

        tx.send(sub_log("room")).unwrap();
        tx.send(sub_log("hall")).unwrap();
        drop(tx);

        let stats = dispatcher.run(rx).await;
        assert_eq!(stats.dispatched, 2);
        assert_eq!(stats.workers_spawned, 2);
    }
}
