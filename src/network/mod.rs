pub mod link;

use crate::error::UsherError;
use pnet::{datalink, util::MacAddr};
use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket as StdUdpSocket},
};
use thiserror::Error;
use tokio::net::UdpSocket as TokioUdpSocket;

/// Defines all possible errors for socket operations.
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("Failed to create a new socket")]
    CreateSocket(#[source] io::Error),

    #[error("Failed to enable broadcast on socket")]
    SetBroadcast(#[source] io::Error),

    #[error("Failed to set SO_BINDTODEVICE on interface '{interface}'")]
    BindToDevice {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to bind socket to {addr}")]
    BindSocket {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Failed to set SO_REUSEADDR on socket")]
    SetReuseAddress(#[source] io::Error),

    #[error("Failed to set socket to non-blocking mode")]
    SetNonBlocking(#[source] io::Error),

    #[error("Failed to convert socket to TokioUdpSocket")]
    ConvertToTokio(#[source] io::Error),

    #[allow(dead_code)]
    #[error("Binding to a specific device is not implemented on this platform")]
    NotImplemented,
}

/// IPv4 addressing and hardware address of a local interface.
#[derive(Debug, Clone)]
pub struct LocalInterface {
    pub name: String,
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub mac: MacAddr,
}

/// Looks up `name` among the host's interfaces and returns its first IPv4
/// address, the matching netmask and its MAC address.
pub fn resolve_interface(name: &str) -> Result<LocalInterface, UsherError> {
    let interface = datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == name)
        .ok_or_else(|| UsherError::InterfaceNotFound(name.to_string()))?;

    let mac = interface.mac.ok_or_else(|| UsherError::InterfaceIncomplete {
        interface: name.to_string(),
        missing: "hardware address",
    })?;

    let (ip, mask) = interface
        .ips
        .iter()
        .find_map(|net| match (net.ip(), net.mask()) {
            (IpAddr::V4(ip), IpAddr::V4(mask)) => Some((ip, mask)),
            _ => None,
        })
        .ok_or_else(|| UsherError::InterfaceIncomplete {
            interface: name.to_string(),
            missing: "IPv4 address",
        })?;

    tracing::debug!("Resolved interface {}: ip={} mask={} mac={}", name, ip, mask, mac);

    Ok(LocalInterface {
        name: name.to_string(),
        ip,
        mask,
        mac,
    })
}

/// Creates a new `tokio::net::UdpSocket` bound to a specific network device and port.
///
/// The listener must see broadcasts from unconfigured clients and must be able
/// to send broadcast NAKs back through the same socket, so `SO_BROADCAST` is
/// enabled and the socket is pinned to the served device.
///
/// # Arguments
/// * `interface` - The name of the network interface (e.g., "eth0").
/// * `port` - The port number to bind the socket to.
#[cfg(target_os = "linux")]
pub fn new_tokio_socket_bound_to_device(
    interface: &str,
    port: u16,
) -> Result<TokioUdpSocket, SocketError> {
    use socket2::{Domain, Socket, Type};
    use std::os::fd::AsRawFd;

    let socket2 =
        Socket::new(Domain::IPV4, Type::DGRAM, None).map_err(SocketError::CreateSocket)?;

    socket2
        .set_broadcast(true)
        .map_err(SocketError::SetBroadcast)?;

    socket2
        .set_reuse_address(true)
        .map_err(SocketError::SetReuseAddress)?;

    // SAFETY: the descriptor is owned by `socket2` and the option value points
    // at `interface.len()` readable bytes.
    let ret = unsafe {
        libc::setsockopt(
            socket2.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_BINDTODEVICE,
            interface.as_ptr() as *const libc::c_void,
            interface.len() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(SocketError::BindToDevice {
            interface: interface.to_string(),
            source: io::Error::last_os_error(),
        });
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    socket2
        .bind(&addr.into())
        .map_err(|source| SocketError::BindSocket { addr, source })?;

    let std_socket: StdUdpSocket = socket2.into();
    std_socket
        .set_nonblocking(true)
        .map_err(SocketError::SetNonBlocking)?;
    TokioUdpSocket::from_std(std_socket).map_err(SocketError::ConvertToTokio)
}

/// Fallback for non-Linux systems where `SO_BINDTODEVICE` is not available.
#[cfg(not(target_os = "linux"))]
pub fn new_tokio_socket_bound_to_device(
    _interface: &str,
    _port: u16,
) -> Result<TokioUdpSocket, SocketError> {
    Err(SocketError::NotImplemented)
}
