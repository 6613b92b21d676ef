//! Federator - wires config, transport and dispatcher together

use std::sync::Arc;

use tokio::task::JoinHandle;

use fedtree_core::{BrokerId, FedtreeError, FedtreeResult};
use fedtree_transport::{inbound_channel, start_receive_loop, UdpTransport};

use crate::{DispatchStats, Dispatcher, FederatorConfig, FederatorContext};

/// A running federator
pub struct Federator {
    id: BrokerId,
    transport: UdpTransport,
    receiver: JoinHandle<()>,
    dispatcher: JoinHandle<DispatchStats>,
}

impl Federator {
    /// Bind the socket, build every link and start the background tasks
    pub async fn start(config: &FederatorConfig) -> FedtreeResult<Self> {
        let invalid = |e: crate::ConfigError| FedtreeError::InvalidConfig(e.to_string());

        let bind = config.bind_addr().map_err(invalid)?;
        let transport = UdpTransport::bind(bind).await?;

        let host = transport.link(config.host.socket_addr().map_err(invalid)?);
        let mut ctx = FederatorContext::new(
            config.broker_id(),
            config.redundancy,
            config.cache_size,
            Arc::new(host),
        );
        for neighbor in &config.neighbors {
            let link = transport.link(neighbor.socket_addr().map_err(invalid)?);
            ctx = ctx.with_neighbor(neighbor.broker_id(), Arc::new(link));
        }
        let ctx = Arc::new(ctx);

        let (inbound_tx, inbound_rx) = inbound_channel();
        let receiver = start_receive_loop(transport.socket(), inbound_tx);
        let dispatcher = tokio::spawn(Dispatcher::new(Arc::clone(&ctx)).run(inbound_rx));

        tracing::info!(
            id = %ctx.id(),
            local = %transport.local_addr(),
            neighbors = ctx.neighbor_count(),
            redundancy = ctx.redundancy(),
            "federator started"
        );

        Ok(Federator {
            id: ctx.id(),
            transport,
            receiver,
            dispatcher,
        })
    }

    pub fn id(&self) -> BrokerId {
        self.id
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.transport.local_addr()
    }

    /// Run until the dispatcher stops or Ctrl-C
    pub async fn run(self) -> FedtreeResult<()> {
        let Federator {
            id,
            receiver,
            dispatcher,
            ..
        } = self;

        tokio::select! {
            result = dispatcher => {
                let stats = result.map_err(|e| FedtreeError::TaskFailed(e.to_string()))?;
                tracing::info!(%id, ?stats, "dispatcher finished");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(%id, "shutdown requested");
            }
        }

        receiver.abort();
        Ok(())
    }
}
