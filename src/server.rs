//! DHCP server driver
//!
//! This module owns the listening socket and turns every inbound datagram
//! into its own task:
//! - decode and dispatch through [`DhcpV4Handler`]
//! - execute the resulting [`Action`]
//! - log and drop anything that fails

use crate::{
    config::ServerConfig,
    error::UsherError,
    network::{
        self,
        link::{FrameTransmitter, InterfaceLink, LinkLayer},
    },
    v4::{AddressAllocator, Action, DhcpV4Handler},
};
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Largest datagram read from the listener; DHCP messages fit an Ethernet MTU.
const RECV_BUFFER_SIZE: usize = 1500;

pub struct DhcpServer {
    config: ServerConfig,
    socket: Arc<UdpSocket>,
    handler: Arc<DhcpV4Handler>,
    transmitter: Arc<FrameTransmitter>,
}

impl DhcpServer {
    /// Binds the listener and prepares raw delivery on `config.interface`.
    pub async fn new(config: ServerConfig) -> Result<Self, UsherError> {
        let link = InterfaceLink::new(&config.interface)?;
        Self::with_link(config, Box::new(link)).await
    }

    pub async fn with_link(
        config: ServerConfig,
        link: Box<dyn LinkLayer>,
    ) -> Result<Self, UsherError> {
        let socket =
            network::new_tokio_socket_bound_to_device(&config.interface, config.server_port)?;

        let allocator = Arc::new(AddressAllocator::new(config.prefix()));
        let handler = Arc::new(DhcpV4Handler::new(&config, allocator));
        let transmitter = Arc::new(FrameTransmitter::new(
            config.mac_address,
            config.local_ip,
            config.server_port,
            link,
        ));

        Ok(Self {
            config,
            socket: Arc::new(socket),
            handler,
            transmitter,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serves until the listener fails.
    pub async fn serve(&self) -> Result<(), UsherError> {
        tracing::info!(
            "Serving DHCP on {} ({}:{})",
            self.config.interface,
            self.config.local_ip,
            self.config.server_port
        );

        let mut buf = [0u8; RECV_BUFFER_SIZE];
        loop {
            let (len, peer) = self.socket.recv_from(&mut buf).await.map_err(|e| {
                tracing::error!("Socket receive error: {}", e);
                UsherError::Io(e)
            })?;
            tracing::debug!("Received {} bytes from {}", len, peer);

            let data = buf[..len].to_vec();
            let handler = self.handler.clone();
            let transmitter = self.transmitter.clone();
            let socket = self.socket.clone();

            tokio::spawn(async move {
                let action = match handler.handle_packet(peer, &data) {
                    Ok(action) => action,
                    Err(e) => {
                        tracing::warn!("Dropping request from {}: {}", peer, e);
                        return;
                    }
                };

                if let Err(e) = execute(action, &transmitter, &socket).await {
                    tracing::warn!("Cannot reply to {}: {}", peer, e);
                }
            });
        }
    }
}

/// Carries out one handler decision.
///
/// Raw transmission runs on the blocking pool so a stalled interface holds
/// up only this reply.
pub async fn execute(
    action: Action,
    transmitter: &Arc<FrameTransmitter>,
    socket: &UdpSocket,
) -> Result<(), UsherError> {
    match action {
        Action::Unicast { target, payload } => {
            let transmitter = transmitter.clone();
            tokio::task::spawn_blocking(move || transmitter.send_unicast(&target, &payload))
                .await??;
            tracing::debug!("Sent unicast frame to {} ({})", target.ip, target.mac);
        }
        Action::Broadcast(payload, addr) => {
            let sent = socket.send_to(&payload, addr).await?;
            tracing::debug!("Sent {} bytes to {}", sent, addr);
        }
        Action::Drop => {}
    }
    Ok(())
}

/// Resolves `interface`, checks its addressing and serves on `port` until
/// the listener fails.
pub async fn create_server(interface: &str, port: u16) -> Result<(), UsherError> {
    let local = network::resolve_interface(interface)?;
    let config =
        ServerConfig::new(local.name, local.ip, local.mask, local.mac)?.with_server_port(port);

    tracing::info!(
        "Interface {}: ip={} mask={} mac={}",
        config.interface,
        config.local_ip,
        config.subnet_mask,
        config.mac_address
    );

    let server = DhcpServer::new(config).await?;
    server.serve().await
}
