//! Core announcer
//!
//! Broadcasts `CoreAnnouncement{core: self, dist: 0, sender: self}` to every
//! neighbor when a broker elects itself core for a topic.

use fedtree_core::NEIGHBOR_QOS;
use fedtree_wire::{CoreAnnouncement, Message};

use crate::FederatorContext;

pub struct Announcer<'a> {
    topic: &'a str,
}

impl<'a> Announcer<'a> {
    pub fn new(topic: &'a str) -> Self {
        Announcer { topic }
    }

    /// Send the initial core announcement to all neighbors.
    ///
    /// Returns the number of neighbors the announcement was handed to.
    pub fn announce(&self, ctx: &FederatorContext) -> usize {
        let ann = CoreAnnouncement::new(ctx.id(), 0, ctx.id());
        let envelope = Message::from(ann).to_envelope(self.topic, NEIGHBOR_QOS);

        let mut sent = 0;
        for neighbor in ctx.neighbor_ids() {
            match ctx.send_to(neighbor, &envelope) {
                Ok(()) => sent += 1,
                Err(e) => tracing::error!(%neighbor, "core announcement not sent: {}", e),
            }
        }

        tracing::info!(topic = self.topic, neighbors = sent, "announcing self as core");
        sent
    }
}
