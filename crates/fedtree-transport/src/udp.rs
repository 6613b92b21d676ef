//! UDP transport implementation
//!
//! One socket per federator. Outbound envelopes from every link go through a
//! single send task so `publish` never blocks the caller.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use fedtree_core::{FedtreeError, FedtreeResult, QoS};
use fedtree_wire::{Envelope, MAX_DATAGRAM_SIZE};

use crate::{InboundSender, Transport};

type Outbound = mpsc::UnboundedSender<(Bytes, SocketAddr)>;

/// UDP transport for fedtree
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    outbound: Outbound,
}

impl UdpTransport {
    /// Bind to a local address and start the send task
    pub async fn bind(addr: SocketAddr) -> FedtreeResult<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| FedtreeError::TransportError(e.to_string()))?;

        let local_addr = socket
            .local_addr()
            .map_err(|e| FedtreeError::TransportError(e.to_string()))?;

        let socket = Arc::new(socket);
        let outbound = start_send_loop(Arc::clone(&socket));

        Ok(UdpTransport {
            socket,
            local_addr,
            outbound,
        })
    }

    /// Get local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Create a link that publishes to a remote federator or host bridge
    pub fn link(&self, remote: SocketAddr) -> UdpLink {
        UdpLink {
            remote,
            outbound: self.outbound.clone(),
        }
    }

    /// Get a clone of the socket for concurrent operations
    pub fn socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }
}

/// Publishing handle towards one remote address
#[derive(Clone, Debug)]
pub struct UdpLink {
    remote: SocketAddr,
    outbound: Outbound,
}

impl UdpLink {
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }
}

impl Transport for UdpLink {
    fn publish(&self, topic: &str, payload: Bytes, qos: QoS) -> FedtreeResult<()> {
        let datagram = Envelope::new(topic, payload, qos).serialize()?;
        self.outbound
            .send((datagram, self.remote))
            .map_err(|_| FedtreeError::ChannelClosed)
    }
}

fn start_send_loop(socket: Arc<UdpSocket>) -> Outbound {
    let (tx, mut rx) = mpsc::unbounded_channel::<(Bytes, SocketAddr)>();

    tokio::spawn(async move {
        while let Some((datagram, dest)) = rx.recv().await {
            if let Err(e) = socket.send_to(&datagram, dest).await {
                tracing::warn!("UDP send to {} failed: {}", dest, e);
            }
        }
    });

    tx
}

/// Start a background receive loop feeding the inbound bridge.
///
/// Malformed datagrams are logged and dropped. The loop ends when the
/// dispatcher side of the bridge is dropped.
pub fn start_receive_loop(socket: Arc<UdpSocket>, inbound: InboundSender) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, addr)) => {
                    let envelope = match Envelope::parse(Bytes::copy_from_slice(&buf[..len])) {
                        Ok(envelope) => envelope,
                        Err(e) => {
                            tracing::warn!("Dropping datagram from {}: {}", addr, e);
                            continue;
                        }
                    };
                    tracing::trace!(topic = %envelope.topic, from = %addr, "datagram received");
                    if inbound.send(envelope).is_err() {
                        break; // Dispatcher dropped
                    }
                }
                Err(e) => {
                    tracing::warn!("UDP receive error: {}", e);
                }
            }
        }
    })
}
