//! Transport boundary

use bytes::Bytes;
use tokio::sync::mpsc;

use fedtree_core::{FedtreeResult, QoS};
use fedtree_wire::Envelope;

/// A publish/subscribe link to one broker.
///
/// `publish` is fire-and-forget: it must not block and does not wait for
/// delivery. Implementations are shared between topic workers.
pub trait Transport: Send + Sync {
    fn publish(&self, topic: &str, payload: Bytes, qos: QoS) -> FedtreeResult<()>;

    /// Publish a ready-made envelope
    fn send(&self, envelope: Envelope) -> FedtreeResult<()> {
        self.publish(&envelope.topic, envelope.payload, envelope.qos)
    }
}

/// Sending half of the inbound bridge. Cloned into every receive task.
pub type InboundSender = mpsc::UnboundedSender<Envelope>;

/// Receiving half of the inbound bridge, owned by the dispatcher
pub type InboundReceiver = mpsc::UnboundedReceiver<Envelope>;

/// Create the inbound bridge
pub fn inbound_channel() -> (InboundSender, InboundReceiver) {
    mpsc::unbounded_channel()
}
