//! Delivery quality requested from the transport

/// Delivery quality level, mirroring the three levels common to
/// publish/subscribe brokers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// QoS used for protocol traffic between neighbor brokers
pub const NEIGHBOR_QOS: QoS = QoS::ExactlyOnce;

/// QoS used for traffic towards the local host broker
pub const HOST_QOS: QoS = QoS::ExactlyOnce;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_byte_mapping() {
        for qos in [QoS::AtMostOnce, QoS::AtLeastOnce, QoS::ExactlyOnce] {
            assert_eq!(QoS::from_byte(qos.to_byte()), Some(qos));
        }
        assert_eq!(QoS::from_byte(3), None);
    }
}
