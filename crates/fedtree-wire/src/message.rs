//! Protocol messages
//!
//! Every message belongs to exactly one federated topic. The topic is carried
//! by the transport topic string, so payloads only hold the message body:
//!
//! - Subscription notice: UTF-8 log line, subscribed topic is the last token
//! - Publication: raw application bytes
//! - Core announcement: kind (1) + core id (8) + dist (4) + sender (8)
//! - Membership announcement: kind (1) + core id (8) + sender (8)
//! - Routed publication: kind (1) + origin (8) + seq (8) + sender (8) + bytes

use bytes::{Buf, BufMut, Bytes, BytesMut};

use fedtree_core::{BrokerId, FedtreeError, FedtreeResult, PubId, QoS};

use crate::{is_management_topic, Envelope, Namespace};

const KIND_CORE_ANNOUNCEMENT: u8 = 0x01;
const KIND_MEMBERSHIP_ANNOUNCEMENT: u8 = 0x02;
const KIND_ROUTED_PUBLICATION: u8 = 0x03;

const CORE_ANNOUNCEMENT_SIZE: usize = 21;
const MEMBERSHIP_ANNOUNCEMENT_SIZE: usize = 17;
const ROUTED_HEADER_SIZE: usize = 1 + PubId::SIZE + 8;

/// A local client subscribed to a topic on the host broker
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionNotice {
    /// Raw subscription log line
    pub line: String,
}

impl SubscriptionNotice {
    /// Build a log line in the host broker's `<client> <qos> <topic>` layout
    pub fn new(client_id: &str, topic: &str) -> Self {
        SubscriptionNotice {
            line: format!("{} 0 {}", client_id, topic),
        }
    }

    pub fn from_line(line: impl Into<String>) -> Self {
        SubscriptionNotice { line: line.into() }
    }

    /// The subscribed topic (last whitespace separated token)
    pub fn subscribed_topic(&self) -> Option<&str> {
        self.line.split_whitespace().last()
    }
}

/// Flooded announcement of a topic's core broker
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoreAnnouncement {
    pub core_id: BrokerId,
    /// Hops from the sender to the core
    pub dist: u32,
    pub sender_id: BrokerId,
}

impl CoreAnnouncement {
    pub fn new(core_id: BrokerId, dist: u32, sender_id: BrokerId) -> Self {
        CoreAnnouncement {
            core_id,
            dist,
            sender_id,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(CORE_ANNOUNCEMENT_SIZE);
        buf.put_u8(KIND_CORE_ANNOUNCEMENT);
        buf.put_u64_le(self.core_id.0);
        buf.put_u32_le(self.dist);
        buf.put_u64_le(self.sender_id.0);
        buf.freeze()
    }

    pub fn decode(mut buf: &[u8]) -> FedtreeResult<Self> {
        expect_kind(buf, KIND_CORE_ANNOUNCEMENT, CORE_ANNOUNCEMENT_SIZE)?;
        buf.advance(1);
        Ok(CoreAnnouncement {
            core_id: BrokerId(buf.get_u64_le()),
            dist: buf.get_u32_le(),
            sender_id: BrokerId(buf.get_u64_le()),
        })
    }
}

/// Announcement that the sender joined the tree below the receiver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MembershipAnnouncement {
    pub core_id: BrokerId,
    pub sender_id: BrokerId,
}

impl MembershipAnnouncement {
    pub fn new(core_id: BrokerId, sender_id: BrokerId) -> Self {
        MembershipAnnouncement { core_id, sender_id }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(MEMBERSHIP_ANNOUNCEMENT_SIZE);
        buf.put_u8(KIND_MEMBERSHIP_ANNOUNCEMENT);
        buf.put_u64_le(self.core_id.0);
        buf.put_u64_le(self.sender_id.0);
        buf.freeze()
    }

    pub fn decode(mut buf: &[u8]) -> FedtreeResult<Self> {
        expect_kind(buf, KIND_MEMBERSHIP_ANNOUNCEMENT, MEMBERSHIP_ANNOUNCEMENT_SIZE)?;
        buf.advance(1);
        Ok(MembershipAnnouncement {
            core_id: BrokerId(buf.get_u64_le()),
            sender_id: BrokerId(buf.get_u64_le()),
        })
    }
}

/// Publication originated by a local client
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Publication {
    pub payload: Bytes,
}

impl Publication {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Publication {
            payload: payload.into(),
        }
    }
}

/// Publication in flight on a distribution tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutedPublication {
    pub pub_id: PubId,
    /// Last broker that forwarded this copy
    pub sender_id: BrokerId,
    pub payload: Bytes,
}

impl RoutedPublication {
    pub fn new(pub_id: PubId, sender_id: BrokerId, payload: Bytes) -> Self {
        RoutedPublication {
            pub_id,
            sender_id,
            payload,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(ROUTED_HEADER_SIZE + self.payload.len());
        buf.put_u8(KIND_ROUTED_PUBLICATION);
        buf.put_slice(&self.pub_id.to_bytes());
        buf.put_u64_le(self.sender_id.0);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    pub fn decode(buf: Bytes) -> FedtreeResult<Self> {
        expect_kind(&buf, KIND_ROUTED_PUBLICATION, ROUTED_HEADER_SIZE)?;
        let mut header = &buf[1..ROUTED_HEADER_SIZE];
        let mut id = [0u8; PubId::SIZE];
        header.copy_to_slice(&mut id);
        let sender_id = BrokerId(header.get_u64_le());
        Ok(RoutedPublication {
            pub_id: PubId::from_bytes(id),
            sender_id,
            payload: buf.slice(ROUTED_HEADER_SIZE..),
        })
    }
}

/// The closed set of messages a topic worker consumes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    SubscriptionNotice(SubscriptionNotice),
    CoreAnnouncement(CoreAnnouncement),
    MembershipAnnouncement(MembershipAnnouncement),
    Publication(Publication),
    RoutedPublication(RoutedPublication),
}

impl Message {
    /// Namespace this message travels in
    pub fn namespace(&self) -> Namespace {
        match self {
            Message::SubscriptionNotice(_) => Namespace::SubscriptionLog,
            Message::CoreAnnouncement(_) => Namespace::CoreAnnouncement,
            Message::MembershipAnnouncement(_) => Namespace::MembershipAnnouncement,
            Message::Publication(_) => Namespace::Federated,
            Message::RoutedPublication(_) => Namespace::Routing,
        }
    }

    /// Short name for logs
    pub fn kind_name(&self) -> &'static str {
        match self {
            Message::SubscriptionNotice(_) => "subscription_notice",
            Message::CoreAnnouncement(_) => "core_announcement",
            Message::MembershipAnnouncement(_) => "membership_announcement",
            Message::Publication(_) => "publication",
            Message::RoutedPublication(_) => "routed_publication",
        }
    }

    /// Whether this message may create a topic worker
    pub fn seeds_worker(&self) -> bool {
        matches!(
            self,
            Message::SubscriptionNotice(_) | Message::CoreAnnouncement(_)
        )
    }

    /// Encode the message body
    pub fn encode(&self) -> Bytes {
        match self {
            Message::SubscriptionNotice(notice) => Bytes::from(notice.line.clone()),
            Message::CoreAnnouncement(ann) => ann.encode(),
            Message::MembershipAnnouncement(ann) => ann.encode(),
            Message::Publication(publication) => publication.payload.clone(),
            Message::RoutedPublication(routed) => routed.encode(),
        }
    }

    /// Wrap the message for a federated topic
    pub fn to_envelope(&self, federated_topic: &str, qos: QoS) -> Envelope {
        Envelope::new(
            self.namespace().topic_for(federated_topic),
            self.encode(),
            qos,
        )
    }
}

impl From<CoreAnnouncement> for Message {
    fn from(ann: CoreAnnouncement) -> Self {
        Message::CoreAnnouncement(ann)
    }
}

impl From<MembershipAnnouncement> for Message {
    fn from(ann: MembershipAnnouncement) -> Self {
        Message::MembershipAnnouncement(ann)
    }
}

impl From<RoutedPublication> for Message {
    fn from(routed: RoutedPublication) -> Self {
        Message::RoutedPublication(routed)
    }
}

/// A decoded message bound to its federated topic
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicMessage {
    pub topic: String,
    pub message: Message,
}

/// Decode an inbound `(topic, payload)` pair.
///
/// Returns `Ok(None)` for traffic that is not relevant to any topic worker:
/// subscription log lines about the federator's own namespaces.
pub fn decode(topic: &str, payload: Bytes) -> FedtreeResult<Option<TopicMessage>> {
    let (namespace, rest) =
        Namespace::classify(topic).ok_or_else(|| FedtreeError::UnknownNamespace(topic.into()))?;

    let message = match namespace {
        Namespace::SubscriptionLog => return decode_subscription_log(topic, &payload),
        _ if rest.is_empty() => return Err(FedtreeError::EmptyFederatedTopic(topic.into())),
        Namespace::CoreAnnouncement => Message::CoreAnnouncement(CoreAnnouncement::decode(&payload)?),
        Namespace::MembershipAnnouncement => {
            Message::MembershipAnnouncement(MembershipAnnouncement::decode(&payload)?)
        }
        Namespace::Routing => Message::RoutedPublication(RoutedPublication::decode(payload)?),
        Namespace::Federated => Message::Publication(Publication::new(payload)),
    };

    Ok(Some(TopicMessage {
        topic: rest.to_string(),
        message,
    }))
}

fn decode_subscription_log(topic: &str, payload: &[u8]) -> FedtreeResult<Option<TopicMessage>> {
    let line = std::str::from_utf8(payload)
        .map_err(|e| FedtreeError::InvalidWireFormat(format!("subscription log: {}", e)))?;
    let notice = SubscriptionNotice::from_line(line);
    let federated = notice
        .subscribed_topic()
        .ok_or_else(|| FedtreeError::EmptyFederatedTopic(topic.into()))?
        .to_string();

    if is_management_topic(&federated) {
        return Ok(None);
    }

    Ok(Some(TopicMessage {
        topic: federated,
        message: Message::SubscriptionNotice(notice),
    }))
}

/// Decode an envelope received from a transport
pub fn decode_envelope(envelope: &Envelope) -> FedtreeResult<Option<TopicMessage>> {
    decode(&envelope.topic, envelope.payload.clone())
}

fn expect_kind(buf: &[u8], kind: u8, min_len: usize) -> FedtreeResult<()> {
    if buf.len() < min_len {
        return Err(FedtreeError::BufferTooShort {
            expected: min_len,
            actual: buf.len(),
        });
    }
    if buf[0] != kind {
        return Err(FedtreeError::UnknownMessageKind(buf[0]));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FEDERATED_PREFIX, SUBSCRIPTION_LOG_TOPIC};

    #[test]
    fn test_core_announcement_topic_and_body() {
        let ann = CoreAnnouncement::new(BrokerId(1), 3, BrokerId(4));
        let env = Message::from(ann).to_envelope("sensors/temp", QoS::ExactlyOnce);

        assert_eq!(env.topic, "federator/core_ann/sensors/temp");
        let decoded = decode_envelope(&env).unwrap().unwrap();
        assert_eq!(decoded.topic, "sensors/temp");
        assert_eq!(decoded.message, Message::CoreAnnouncement(ann));
    }

    #[test]
    fn test_routed_publication_keeps_payload() {
        let routed = RoutedPublication::new(
            PubId::new(BrokerId(9), 42),
            BrokerId(3),
            Bytes::from_static(b"21.5C"),
        );
        let env = Message::from(routed.clone()).to_envelope("t", QoS::AtMostOnce);
        let decoded = decode_envelope(&env).unwrap().unwrap();

        match decoded.message {
            Message::RoutedPublication(r) => {
                assert_eq!(r.pub_id, PubId::new(BrokerId(9), 42));
                assert_eq!(r.sender_id, BrokerId(3));
                assert_eq!(&r.payload[..], b"21.5C");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_routed_publication_empty_payload() {
        let routed = RoutedPublication::new(PubId::new(BrokerId(1), 0), BrokerId(1), Bytes::new());
        let decoded = RoutedPublication::decode(routed.encode()).unwrap();
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_subscription_log_last_token_is_topic() {
        let line = Bytes::from_static(b"1690000000: client-7 1 sensors/temp");
        let decoded = decode(SUBSCRIPTION_LOG_TOPIC, line).unwrap().unwrap();
        assert_eq!(decoded.topic, "sensors/temp");
        assert!(matches!(decoded.message, Message::SubscriptionNotice(_)));
    }

    #[test]
    fn test_subscription_log_for_management_topic_is_dropped() {
        for sub in [
            "federator/core_ann/#",
            "federator/memb_ann/#",
            "federator/routing/#",
            "federated/#",
            "federated/sensors",
            SUBSCRIPTION_LOG_TOPIC,
        ] {
            let line = Bytes::from(format!("fed-client 2 {}", sub));
            assert_eq!(decode(SUBSCRIPTION_LOG_TOPIC, line).unwrap(), None, "{}", sub);
        }
    }

    #[test]
    fn test_subscription_log_without_topic() {
        let err = decode(SUBSCRIPTION_LOG_TOPIC, Bytes::from_static(b"   ")).unwrap_err();
        assert!(matches!(err, FedtreeError::EmptyFederatedTopic(_)));
    }

    #[test]
    fn test_federated_publication_is_raw() {
        let topic = format!("{}room/1", FEDERATED_PREFIX);
        let decoded = decode(&topic, Bytes::from_static(b"\x00\xffraw")).unwrap().unwrap();
        assert_eq!(decoded.topic, "room/1");
        assert_eq!(
            decoded.message,
            Message::Publication(Publication::new(Bytes::from_static(b"\x00\xffraw")))
        );
    }

    #[test]
    fn test_unknown_namespace() {
        let err = decode("sensors/temp", Bytes::new()).unwrap_err();
        assert!(matches!(err, FedtreeError::UnknownNamespace(_)));
    }

    #[test]
    fn test_empty_federated_topic() {
        let body = CoreAnnouncement::new(BrokerId(1), 0, BrokerId(1)).encode();
        let err = decode("federator/core_ann/", body).unwrap_err();
        assert!(matches!(err, FedtreeError::EmptyFederatedTopic(_)));
    }

    #[test]
    fn test_truncated_and_mislabelled_bodies() {
        let body = CoreAnnouncement::new(BrokerId(1), 0, BrokerId(1)).encode();
        let err = CoreAnnouncement::decode(&body[..10]).unwrap_err();
        assert!(matches!(err, FedtreeError::BufferTooShort { expected: 21, actual: 10 }));

        let memb = MembershipAnnouncement::new(BrokerId(1), BrokerId(2)).encode();
        let err = decode("federator/core_ann/t", {
            let mut padded = memb.to_vec();
            padded.extend_from_slice(&[0u8; 8]);
            Bytes::from(padded)
        })
        .unwrap_err();
        assert!(matches!(err, FedtreeError::UnknownMessageKind(0x02)));
    }

    #[test]
    fn test_seeding_messages() {
        assert!(Message::SubscriptionNotice(SubscriptionNotice::new("c", "t")).seeds_worker());
        assert!(Message::from(CoreAnnouncement::new(BrokerId(1), 0, BrokerId(1))).seeds_worker());
        assert!(!Message::from(MembershipAnnouncement::new(BrokerId(1), BrokerId(2))).seeds_worker());
        assert!(!Message::Publication(Publication::new(Bytes::new())).seeds_worker());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn membership_codec_is_lossless(core in any::<u64>(), sender in any::<u64>()) {
                let ann = MembershipAnnouncement::new(BrokerId(core), BrokerId(sender));
                prop_assert_eq!(MembershipAnnouncement::decode(&ann.encode()).unwrap(), ann);
            }

            #[test]
            fn decode_never_panics(topic in "\\PC{0,40}", body in proptest::collection::vec(any::<u8>(), 0..64)) {
                let _ = decode(&topic, Bytes::from(body));
            }
        }
    }
}
