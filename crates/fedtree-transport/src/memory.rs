//! In-memory transports

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use fedtree_core::{FedtreeError, FedtreeResult, QoS};
use fedtree_wire::Envelope;

use crate::{InboundSender, Transport};

/// Transport that queues every published envelope for later inspection.
///
/// Clones share the same queue.
#[derive(Clone, Debug, Default)]
pub struct MemoryTransport {
    outbox: Arc<Mutex<VecDeque<Envelope>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every queued envelope
    pub fn drain(&self) -> Vec<Envelope> {
        self.outbox.lock().drain(..).collect()
    }

    /// Copy of the queued envelopes
    pub fn published(&self) -> Vec<Envelope> {
        self.outbox.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.outbox.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.outbox.lock().is_empty()
    }
}

impl Transport for MemoryTransport {
    fn publish(&self, topic: &str, payload: Bytes, qos: QoS) -> FedtreeResult<()> {
        self.outbox.lock().push_back(Envelope::new(topic, payload, qos));
        Ok(())
    }
}

/// Transport that hands envelopes straight to another federator's inbound
/// bridge, for in-process overlays.
#[derive(Clone, Debug)]
pub struct ChannelTransport {
    peer: InboundSender,
}

impl ChannelTransport {
    pub fn new(peer: InboundSender) -> Self {
        ChannelTransport { peer }
    }
}

impl Transport for ChannelTransport {
    fn publish(&self, topic: &str, payload: Bytes, qos: QoS) -> FedtreeResult<()> {
        self.peer
            .send(Envelope::new(topic, payload, qos))
            .map_err(|_| FedtreeError::ChannelClosed)
    }
}
