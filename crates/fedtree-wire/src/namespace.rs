//! Topic namespaces
//!
//! Every protocol message travels on `prefix + federated_topic`. The
//! federated namespace is a catch-all for application traffic, so inbound
//! topics are classified by walking the namespaces in a fixed priority order.

/// Topic on which the host broker logs new subscriptions
pub const SUBSCRIPTION_LOG_TOPIC: &str = "$SYS/broker/log/M/subscribe";

/// Prefix for core announcements
pub const CORE_ANNOUNCEMENT_PREFIX: &str = "federator/core_ann/";

/// Prefix for mesh membership announcements
pub const MEMBERSHIP_ANNOUNCEMENT_PREFIX: &str = "federator/memb_ann/";

/// Prefix for publications in flight on a distribution tree
pub const ROUTING_PREFIX: &str = "federator/routing/";

/// Prefix under which local clients publish federated traffic
pub const FEDERATED_PREFIX: &str = "federated/";

/// Topic namespace of an inbound or outbound message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
    SubscriptionLog,
    CoreAnnouncement,
    MembershipAnnouncement,
    Routing,
    Federated,
}

impl Namespace {
    /// Classification order. Federated is the catch-all and must stay last.
    pub const PRIORITY: [Namespace; 5] = [
        Namespace::SubscriptionLog,
        Namespace::CoreAnnouncement,
        Namespace::MembershipAnnouncement,
        Namespace::Routing,
        Namespace::Federated,
    ];

    /// Literal topic prefix of this namespace
    pub fn prefix(self) -> &'static str {
        match self {
            Namespace::SubscriptionLog => SUBSCRIPTION_LOG_TOPIC,
            Namespace::CoreAnnouncement => CORE_ANNOUNCEMENT_PREFIX,
            Namespace::MembershipAnnouncement => MEMBERSHIP_ANNOUNCEMENT_PREFIX,
            Namespace::Routing => ROUTING_PREFIX,
            Namespace::Federated => FEDERATED_PREFIX,
        }
    }

    /// Subscription filter a federator registers for this namespace
    pub fn filter(self) -> String {
        match self {
            Namespace::SubscriptionLog => SUBSCRIPTION_LOG_TOPIC.to_string(),
            other => format!("{}#", other.prefix()),
        }
    }

    /// Concrete topic for a federated topic in this namespace
    pub fn topic_for(self, federated_topic: &str) -> String {
        match self {
            Namespace::SubscriptionLog => SUBSCRIPTION_LOG_TOPIC.to_string(),
            other => format!("{}{}", other.prefix(), federated_topic),
        }
    }

    /// Classify a topic, returning its namespace and the remainder after
    /// the prefix.
    pub fn classify(topic: &str) -> Option<(Namespace, &str)> {
        Self::PRIORITY
            .iter()
            .find_map(|ns| topic.strip_prefix(ns.prefix()).map(|rest| (*ns, rest)))
    }

    /// All subscription filters, in priority order
    pub fn filters() -> Vec<String> {
        Self::PRIORITY.iter().map(|ns| ns.filter()).collect()
    }
}

/// Whether a subscribed topic belongs to the federator itself.
///
/// Such subscriptions show up in the host's subscription log (including the
/// federator's own wildcard filters) and must never seed a topic worker.
pub fn is_management_topic(topic: &str) -> bool {
    Namespace::PRIORITY
        .iter()
        .any(|ns| topic.starts_with(ns.prefix()) || topic == ns.filter())
}
