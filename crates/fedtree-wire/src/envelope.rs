//! Envelope framing for datagram transports
//!
//! Envelope = 4-byte header + topic + payload:
//! - Byte 0: Wire version
//! - Byte 1: QoS
//! - Bytes 2-3: Topic length (LE)
//! - Topic: UTF-8
//! - Payload: remaining bytes

use bytes::{BufMut, Bytes, BytesMut};

use fedtree_core::{FedtreeError, FedtreeResult, QoS};

/// Envelope header size in bytes
pub const ENVELOPE_HEADER_SIZE: usize = 4;

/// Current envelope version
pub const ENVELOPE_VERSION: u8 = 1;

/// Maximum datagram size
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// A topic-addressed payload as handed to or received from a transport
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
}

impl Envelope {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>, qos: QoS) -> Self {
        Envelope {
            topic: topic.into(),
            payload: payload.into(),
            qos,
        }
    }

    /// Serialized size
    pub fn size(&self) -> usize {
        ENVELOPE_HEADER_SIZE + self.topic.len() + self.payload.len()
    }

    /// Serialize to a datagram
    pub fn serialize(&self) -> FedtreeResult<Bytes> {
        if self.topic.len() > u16::MAX as usize {
            return Err(FedtreeError::InvalidWireFormat(format!(
                "Topic too long: {} bytes",
                self.topic.len()
            )));
        }
        if self.size() > MAX_DATAGRAM_SIZE {
            return Err(FedtreeError::InvalidWireFormat(format!(
                "Envelope too large: {} > {}",
                self.size(),
                MAX_DATAGRAM_SIZE
            )));
        }

        let mut buf = BytesMut::with_capacity(self.size());
        buf.put_u8(ENVELOPE_VERSION);
        buf.put_u8(self.qos.to_byte());
        buf.put_u16_le(self.topic.len() as u16);
        buf.put_slice(self.topic.as_bytes());
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Parse a datagram
    pub fn parse(buf: Bytes) -> FedtreeResult<Self> {
        if buf.len() < ENVELOPE_HEADER_SIZE {
            return Err(FedtreeError::BufferTooShort {
                expected: ENVELOPE_HEADER_SIZE,
                actual: buf.len(),
            });
        }
        if buf[0] != ENVELOPE_VERSION {
            return Err(FedtreeError::InvalidWireFormat(format!(
                "Unsupported envelope version {}",
                buf[0]
            )));
        }

        let qos = QoS::from_byte(buf[1])
            .ok_or_else(|| FedtreeError::InvalidWireFormat(format!("Invalid QoS {}", buf[1])))?;
        let topic_len = u16::from_le_bytes([buf[2], buf[3]]) as usize;
        let topic_end = ENVELOPE_HEADER_SIZE + topic_len;
        if buf.len() < topic_end {
            return Err(FedtreeError::BufferTooShort {
                expected: topic_end,
                actual: buf.len(),
            });
        }

        let topic = std::str::from_utf8(&buf[ENVELOPE_HEADER_SIZE..topic_end])
            .map_err(|e| FedtreeError::InvalidWireFormat(format!("Topic is not UTF-8: {}", e)))?
            .to_string();

        Ok(Envelope {
            topic,
            payload: buf.slice(topic_end..),
            qos,
        })
    }
}
