//! Raw link-layer delivery of DHCP replies
//!
//! A client that has not finished DHCP has no address the kernel can route
//! to, so unicast replies are wrapped in hand-built Ethernet/IPv4/UDP headers
//! and written straight onto the interface, addressed to the client's MAC.

use pnet::{
    datalink::{self, Channel, NetworkInterface},
    packet::{
        ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket},
        ip::IpNextHeaderProtocols,
        ipv4::{self, Ipv4Flags, Ipv4Packet, MutableIpv4Packet},
        udp::{self, MutableUdpPacket, UdpPacket},
    },
    util::MacAddr,
};
use std::{fmt::Write as _, io, net::Ipv4Addr};
use thiserror::Error;

const IPV4_TTL: u8 = 128;
/// Header length in 32-bit words; no options are ever emitted.
const IPV4_HEADER_WORDS: u8 = 5;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("Failed to open datalink channel on interface '{interface}'")]
    Open {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("Interface '{0}' does not provide an Ethernet channel")]
    UnsupportedChannel(String),

    #[error("Failed to write frame to interface '{interface}'")]
    Send {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("Payload of {0} bytes does not fit in a single UDP datagram")]
    FrameTooLarge(usize),

    #[error("Frame buffer too small for {0} header")]
    Truncated(&'static str),
}

/// Where a hand-framed reply goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnicastTarget {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
    pub port: u16,
}

/// A capability to put a complete Ethernet frame on the wire.
pub trait LinkLayer: Send + Sync {
    fn transmit(&self, frame: &[u8]) -> Result<(), LinkError>;
}

/// Sends frames through a `pnet` datalink channel on a named interface.
///
/// The channel is opened for every frame and closed when `transmit`
/// returns, whether or not the write succeeded.
pub struct InterfaceLink {
    interface: NetworkInterface,
}

impl InterfaceLink {
    pub fn new(name: &str) -> Result<Self, LinkError> {
        let interface = datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == name)
            .ok_or_else(|| LinkError::InterfaceNotFound(name.to_string()))?;
        Ok(Self { interface })
    }
}

impl LinkLayer for InterfaceLink {
    fn transmit(&self, frame: &[u8]) -> Result<(), LinkError> {
        let name = &self.interface.name;
        let mut tx = match datalink::channel(&self.interface, Default::default()) {
            Ok(Channel::Ethernet(tx, _rx)) => tx,
            Ok(_) => return Err(LinkError::UnsupportedChannel(name.clone())),
            Err(source) => {
                return Err(LinkError::Open {
                    interface: name.clone(),
                    source,
                })
            }
        };

        let result = tx.send_to(frame, None).unwrap_or_else(|| {
            Err(io::Error::new(
                io::ErrorKind::Other,
                "datalink sender returned no result",
            ))
        });
        result.map_err(|source| LinkError::Send {
            interface: name.clone(),
            source,
        })
    }
}

/// Frames DHCP payloads and hands them to a [`LinkLayer`].
pub struct FrameTransmitter {
    source_mac: MacAddr,
    source_ip: Ipv4Addr,
    source_port: u16,
    link: Box<dyn LinkLayer>,
}

impl FrameTransmitter {
    pub fn new(
        source_mac: MacAddr,
        source_ip: Ipv4Addr,
        source_port: u16,
        link: Box<dyn LinkLayer>,
    ) -> Self {
        Self {
            source_mac,
            source_ip,
            source_port,
            link,
        }
    }

    pub fn send_unicast(&self, target: &UnicastTarget, payload: &[u8]) -> Result<(), LinkError> {
        let frame = build_unicast_frame(
            self.source_mac,
            self.source_ip,
            self.source_port,
            target,
            payload,
        )?;

        tracing::trace!("Outbound frame ({} bytes):\n{}", frame.len(), hex_dump(&frame));
        self.link.transmit(&frame)
    }
}

/// Serializes Ethernet, IPv4 and UDP headers followed by `payload` into one
/// contiguous frame. Lengths and both checksums are filled in.
pub fn build_unicast_frame(
    source_mac: MacAddr,
    source_ip: Ipv4Addr,
    source_port: u16,
    target: &UnicastTarget,
    payload: &[u8],
) -> Result<Vec<u8>, LinkError> {
    let eth_len = EthernetPacket::minimum_packet_size();
    let ip_len = Ipv4Packet::minimum_packet_size();
    let udp_len = UdpPacket::minimum_packet_size() + payload.len();

    let ip_total = u16::try_from(ip_len + udp_len)
        .map_err(|_| LinkError::FrameTooLarge(payload.len()))?;
    let udp_total = ip_total - ip_len as u16;

    let mut buffer = vec![0u8; eth_len + ip_len + udp_len];

    {
        let mut udp = MutableUdpPacket::new(&mut buffer[eth_len + ip_len..])
            .ok_or(LinkError::Truncated("UDP"))?;
        udp.set_source(source_port);
        udp.set_destination(target.port);
        udp.set_length(udp_total);
        udp.set_payload(payload);
        let checksum = udp::ipv4_checksum(&udp.to_immutable(), &source_ip, &target.ip);
        udp.set_checksum(checksum);
    }

    {
        let mut ip = MutableIpv4Packet::new(&mut buffer[eth_len..])
            .ok_or(LinkError::Truncated("IPv4"))?;
        ip.set_version(4);
        ip.set_header_length(IPV4_HEADER_WORDS);
        ip.set_total_length(ip_total);
        ip.set_identification(0);
        ip.set_flags(Ipv4Flags::DontFragment);
        ip.set_ttl(IPV4_TTL);
        ip.set_next_level_protocol(IpNextHeaderProtocols::Udp);
        ip.set_source(source_ip);
        ip.set_destination(target.ip);
        let checksum = ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(checksum);
    }

    {
        let mut eth = MutableEthernetPacket::new(&mut buffer[..])
            .ok_or(LinkError::Truncated("Ethernet"))?;
        eth.set_source(source_mac);
        eth.set_destination(target.mac);
        eth.set_ethertype(EtherTypes::Ipv4);
    }

    Ok(buffer)
}

/// Space-separated hex bytes, an extra gap every 8 bytes, 16 bytes per line.
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3 + data.len() / 8);
    for (i, byte) in data.iter().enumerate() {
        let _ = write!(out, "{:02x} ", byte);
        if (i + 1) % 8 == 0 {
            out.push(' ');
        }
        if (i + 1) % 16 == 0 {
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet::packet::Packet;
    use std::sync::{Arc, Mutex};

    struct CapturingLink(Arc<Mutex<Vec<Vec<u8>>>>);

    impl LinkLayer for CapturingLink {
        fn transmit(&self, frame: &[u8]) -> Result<(), LinkError> {
            self.0.lock().unwrap().push(frame.to_vec());
            Ok(())
        }
    }

    struct FailingLink;

    impl LinkLayer for FailingLink {
        fn transmit(&self, _frame: &[u8]) -> Result<(), LinkError> {
            Err(LinkError::UnsupportedChannel("tap0".to_string()))
        }
    }

    fn server_mac() -> MacAddr {
        MacAddr::new(0x02, 0x42, 0xac, 0x11, 0x00, 0x01)
    }

    fn target() -> UnicastTarget {
        UnicastTarget {
            ip: Ipv4Addr::new(192, 168, 10, 2),
            mac: MacAddr::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01),
            port: 68,
        }
    }

    #[test]
    fn test_frame_layers() {
        let payload = b"dhcp reply bytes";
        let server_ip = Ipv4Addr::new(192, 168, 10, 1);
        let frame = build_unicast_frame(server_mac(), server_ip, 67, &target(), payload).unwrap();

        assert_eq!(frame.len(), 14 + 20 + 8 + payload.len());

        let eth = EthernetPacket::new(&frame).unwrap();
        assert_eq!(eth.get_source(), server_mac());
        assert_eq!(eth.get_destination(), target().mac);
        assert_eq!(eth.get_ethertype(), EtherTypes::Ipv4);

        let ip = Ipv4Packet::new(eth.payload()).unwrap();
        assert_eq!(ip.get_version(), 4);
        assert_eq!(ip.get_header_length(), 5);
        assert_eq!(ip.get_total_length() as usize, 20 + 8 + payload.len());
        assert_eq!(ip.get_ttl(), 128);
        assert_eq!(ip.get_flags(), Ipv4Flags::DontFragment);
        assert_eq!(ip.get_next_level_protocol(), IpNextHeaderProtocols::Udp);
        assert_eq!(ip.get_source(), server_ip);
        assert_eq!(ip.get_destination(), target().ip);
        assert_eq!(ip.get_checksum(), ipv4::checksum(&ip));

        let udp = UdpPacket::new(ip.payload()).unwrap();
        assert_eq!(udp.get_source(), 67);
        assert_eq!(udp.get_destination(), 68);
        assert_eq!(udp.get_length() as usize, 8 + payload.len());
        assert_eq!(
            udp.get_checksum(),
            udp::ipv4_checksum(&udp, &server_ip, &target().ip)
        );
        assert_ne!(udp.get_checksum(), 0);
        assert_eq!(udp.payload(), payload);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let payload = vec![0u8; 70_000];
        let result = build_unicast_frame(
            server_mac(),
            Ipv4Addr::new(192, 168, 10, 1),
            67,
            &target(),
            &payload,
        );
        assert!(matches!(result, Err(LinkError::FrameTooLarge(70_000))));
    }

    #[test]
    fn test_transmitter_hands_frame_to_link() {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let transmitter = FrameTransmitter::new(
            server_mac(),
            Ipv4Addr::new(192, 168, 10, 1),
            67,
            Box::new(CapturingLink(frames.clone())),
        );

        transmitter.send_unicast(&target(), b"offer").unwrap();

        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][42..], b"offer");
    }

    #[test]
    fn test_transmitter_surfaces_link_failure() {
        let transmitter = FrameTransmitter::new(
            server_mac(),
            Ipv4Addr::new(192, 168, 10, 1),
            67,
            Box::new(FailingLink),
        );

        let result = transmitter.send_unicast(&target(), b"offer");
        assert!(matches!(result, Err(LinkError::UnsupportedChannel(_))));
    }

    #[test]
    fn test_hex_dump_layout() {
        let data: Vec<u8> = (0u8..18).collect();
        let dump = hex_dump(&data);
        let lines: Vec<&str> = dump.split('\n').collect();

        assert_eq!(lines[0], "00 01 02 03 04 05 06 07  08 09 0a 0b 0c 0d 0e 0f  ");
        assert_eq!(lines[1], "10 11 ");
    }
}
