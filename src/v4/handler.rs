//! DHCPv4 request dispatch
//!
//! Each inbound request is classified on its own; no state is carried
//! between requests apart from the address registry.
//!
//! | request                              | reply                       |
//! |--------------------------------------|-----------------------------|
//! | not a BOOTREQUEST                    | none                        |
//! | DISCOVER                             | OFFER, hand-framed unicast  |
//! | REQUEST without requested IP         | none                        |
//! | REQUEST for the client's address     | ACK, hand-framed unicast    |
//! | REQUEST for any other address        | NAK, socket broadcast       |
//! | anything else                        | none                        |

use super::{
    allocator::{format_mac, AddressAllocator},
    message::{client_hardware_address, encode_message, ReplyBuilder},
};
use crate::{config::ServerConfig, error::UsherError, network::link::UnicastTarget};
use dhcproto::{v4, Decodable};
use pnet::util::MacAddr;
use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

/// What the server should do with a request.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    /// Frame `payload` by hand and write it to the client's MAC.
    Unicast {
        target: UnicastTarget,
        payload: Vec<u8>,
    },
    /// Send `payload` through the listening socket.
    Broadcast(Vec<u8>, SocketAddr),
    Drop,
}

/// Message types the responder acts on.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RequestKind {
    Discover,
    Request { requested: Option<Ipv4Addr> },
    Other(Option<v4::MessageType>),
}

impl RequestKind {
    pub fn classify(msg: &v4::Message) -> Self {
        match msg.opts().get(v4::OptionCode::MessageType) {
            Some(v4::DhcpOption::MessageType(v4::MessageType::Discover)) => Self::Discover,
            Some(v4::DhcpOption::MessageType(v4::MessageType::Request)) => {
                let requested = match msg.opts().get(v4::OptionCode::RequestedIpAddress) {
                    Some(v4::DhcpOption::RequestedIpAddress(ip)) => Some(*ip),
                    _ => None,
                };
                Self::Request { requested }
            }
            Some(v4::DhcpOption::MessageType(other)) => Self::Other(Some(*other)),
            _ => Self::Other(None),
        }
    }
}

pub struct DhcpV4Handler {
    allocator: Arc<AddressAllocator>,
    builder: ReplyBuilder,
}

impl DhcpV4Handler {
    pub fn new(config: &ServerConfig, allocator: Arc<AddressAllocator>) -> Self {
        Self {
            allocator,
            builder: ReplyBuilder::new(config),
        }
    }

    pub fn allocator(&self) -> &Arc<AddressAllocator> {
        &self.allocator
    }

    /// Decodes a raw datagram and dispatches it. Bytes that are not a DHCP
    /// message fail with [`UsherError::Decode`] and get no reply.
    pub fn handle_packet(&self, peer: SocketAddr, data: &[u8]) -> Result<Action, UsherError> {
        let msg = v4::Message::decode(&mut v4::Decoder::new(data))?;
        self.handle(peer, &msg)
    }

    pub fn handle(&self, peer: SocketAddr, msg: &v4::Message) -> Result<Action, UsherError> {
        if msg.opcode() != v4::Opcode::BootRequest {
            tracing::warn!("Dropping non-BootRequest from {}", peer);
            return Ok(Action::Drop);
        }

        let kind = RequestKind::classify(msg);
        tracing::debug!("{:?} from {} (xid {:x})", kind, peer, msg.xid());

        match kind {
            RequestKind::Discover => self.offer(peer, msg),
            RequestKind::Request { requested: None } => {
                tracing::warn!("REQUEST from {} has no requested IP, dropping", peer);
                Ok(Action::Drop)
            }
            RequestKind::Request {
                requested: Some(requested),
            } => self.acknowledge(peer, msg, requested),
            RequestKind::Other(message_type) => {
                tracing::warn!("Unhandled message type {:?} from {}", message_type, peer);
                Ok(Action::Drop)
            }
        }
    }

    fn offer(&self, peer: SocketAddr, msg: &v4::Message) -> Result<Action, UsherError> {
        let mac = client_hardware_address(msg)?;
        let assigned = self.allocator.assign(mac)?;
        let reply = self
            .builder
            .unicast_reply(msg, v4::MessageType::Offer, assigned)?;
        tracing::info!("OFFER {} to {}", assigned, format_mac(&mac));
        unicast(peer, mac, assigned, &reply)
    }

    fn acknowledge(
        &self,
        peer: SocketAddr,
        msg: &v4::Message,
        requested: Ipv4Addr,
    ) -> Result<Action, UsherError> {
        let mac = client_hardware_address(msg)?;
        let assigned = self.allocator.assign(mac)?;

        if requested == assigned {
            let reply = self
                .builder
                .unicast_reply(msg, v4::MessageType::Ack, assigned)?;
            tracing::info!("ACK {} to {}", assigned, format_mac(&mac));
            unicast(peer, mac, assigned, &reply)
        } else {
            let reply = self.builder.broadcast_reply(msg, v4::MessageType::Nak)?;
            tracing::info!(
                "NAK {} to {} (assigned {})",
                requested,
                format_mac(&mac),
                assigned
            );
            Ok(Action::Broadcast(
                encode_message(&reply)?,
                broadcast_destination(peer),
            ))
        }
    }
}

fn unicast(
    peer: SocketAddr,
    mac: [u8; 6],
    assigned: Ipv4Addr,
    reply: &v4::Message,
) -> Result<Action, UsherError> {
    let [a, b, c, d, e, f] = mac;
    Ok(Action::Unicast {
        target: UnicastTarget {
            ip: assigned,
            mac: MacAddr::new(a, b, c, d, e, f),
            port: peer.port(),
        },
        payload: encode_message(reply)?,
    })
}

/// An unconfigured client sends from 0.0.0.0, which cannot be replied to;
/// such replies go to the limited broadcast address on the same port.
pub fn broadcast_destination(peer: SocketAddr) -> SocketAddr {
    if peer.ip().is_unspecified() {
        SocketAddr::from((Ipv4Addr::BROADCAST, peer.port()))
    } else {
        peer
    }
}
