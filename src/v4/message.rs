use crate::{config::ServerConfig, error::UsherError};
use dhcproto::{
    v4::{self, OptionCode},
    Encodable as _, Encoder,
};
use std::{net::Ipv4Addr, time::Duration};

pub const NAK_MESSAGE: &str = "requested address not available";

const ETHERNET_ADDR_LEN: usize = 6;

/// Fills in server-side fields on top of the echoed request fields.
#[derive(Debug, Clone)]
pub struct ReplyBuilder {
    server_ip: Ipv4Addr,
    subnet_mask: Ipv4Addr,
    lease_time: Duration,
}

impl ReplyBuilder {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            server_ip: config.local_ip,
            subnet_mask: config.subnet_mask,
            lease_time: config.lease_time,
        }
    }

    /// Constructs an OFFER or ACK carrying `assigned_ip`, to be delivered
    /// as a hand-framed unicast.
    pub fn unicast_reply(
        &self,
        request: &v4::Message,
        message_type: v4::MessageType,
        assigned_ip: Ipv4Addr,
    ) -> Result<v4::Message, UsherError> {
        let mut reply = reply_from_request(request)?;
        let lease_secs = u32::try_from(self.lease_time.as_secs()).unwrap_or(u32::MAX);

        let opts = reply.opts_mut();
        opts.insert(v4::DhcpOption::MessageType(message_type));
        opts.insert(v4::DhcpOption::ServerIdentifier(self.server_ip));
        opts.insert(v4::DhcpOption::AddressLeaseTime(lease_secs));
        opts.insert(v4::DhcpOption::SubnetMask(self.subnet_mask));
        opts.insert(v4::DhcpOption::Router(vec![self.server_ip]));
        opts.remove(OptionCode::ClientIdentifier);

        reply
            .set_flags(v4::Flags::default())
            .set_yiaddr(assigned_ip)
            .set_siaddr(self.server_ip);
        Ok(reply)
    }

    /// Constructs a NAK, to be broadcast through the listening socket.
    pub fn broadcast_reply(
        &self,
        request: &v4::Message,
        message_type: v4::MessageType,
    ) -> Result<v4::Message, UsherError> {
        let mut reply = reply_from_request(request)?;

        let opts = reply.opts_mut();
        opts.insert(v4::DhcpOption::MessageType(message_type));
        opts.insert(v4::DhcpOption::ServerIdentifier(self.server_ip));
        opts.insert(v4::DhcpOption::Message(NAK_MESSAGE.to_string()));
        opts.remove(OptionCode::ClientIdentifier);

        reply.set_flags(v4::Flags::default().set_broadcast());
        Ok(reply)
    }
}

/// Copies the transaction-identifying fields of `request` into a fresh
/// BOOTREPLY. Relay agent information (option 82) is echoed as-is.
pub fn reply_from_request(request: &v4::Message) -> Result<v4::Message, UsherError> {
    let chaddr = client_hardware_address(request)?;

    let mut reply = v4::Message::default();
    reply
        .set_opcode(v4::Opcode::BootReply)
        .set_htype(request.htype())
        .set_hops(0)
        .set_xid(request.xid())
        .set_secs(0)
        .set_flags(request.flags())
        .set_ciaddr(request.ciaddr())
        .set_giaddr(request.giaddr())
        .set_chaddr(&chaddr);

    if let Some(relay_info) = request.opts().get(OptionCode::RelayAgentInformation) {
        reply.opts_mut().insert(relay_info.clone());
    }

    Ok(reply)
}

/// The request's 6-byte Ethernet hardware address.
pub fn client_hardware_address(request: &v4::Message) -> Result<[u8; 6], UsherError> {
    if request.htype() != v4::HType::Eth {
        return Err(UsherError::MalformedRequest(format!(
            "unsupported hardware type {:?}",
            request.htype()
        )));
    }

    // `chaddr()` slices by `hlen` without bounds checking it.
    let hlen = request.hlen() as usize;
    if hlen != ETHERNET_ADDR_LEN {
        return Err(UsherError::MalformedRequest(format!(
            "hardware address is {} bytes, expected {}",
            hlen, ETHERNET_ADDR_LEN
        )));
    }

    <[u8; ETHERNET_ADDR_LEN]>::try_from(request.chaddr()).map_err(|_| {
        UsherError::MalformedRequest("hardware address length mismatch".to_string())
    })
}

pub fn encode_message(msg: &v4::Message) -> Result<Vec<u8>, UsherError> {
    let mut buffer = Vec::new();
    let mut encoder = Encoder::new(&mut buffer);
    msg.encode(&mut encoder)?;
    Ok(buffer)
}
