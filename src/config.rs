use crate::error::UsherError;
use clap::Parser;
use pnet::util::MacAddr;
use std::{net::Ipv4Addr, time::Duration};

/// The only mask the allocation scheme supports: one free host octet.
pub const REQUIRED_SUBNET_MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

pub const DHCP_SERVER_PORT: u16 = 67;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// The network interface to serve (e.g., 'eth0', 'tap0')
    #[arg(short, long)]
    pub interface: String,

    /// UDP port to listen on
    #[arg(short, long, default_value_t = DHCP_SERVER_PORT)]
    pub port: u16,
}

/// Addressing of the served interface, fixed at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub interface: String,
    pub local_ip: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub mac_address: MacAddr,
    pub server_port: u16,
    pub lease_time: Duration,
}

impl ServerConfig {
    pub fn new(
        interface: String,
        local_ip: Ipv4Addr,
        subnet_mask: Ipv4Addr,
        mac_address: MacAddr,
    ) -> Result<Self, UsherError> {
        if subnet_mask != REQUIRED_SUBNET_MASK {
            return Err(UsherError::InvalidSubnetMask {
                interface,
                mask: subnet_mask,
            });
        }

        Ok(Self {
            interface,
            local_ip,
            subnet_mask,
            mac_address,
            server_port: DHCP_SERVER_PORT,
            lease_time: Duration::from_secs(6 * 60 * 60),
        })
    }

    pub fn with_server_port(mut self, port: u16) -> Self {
        self.server_port = port;
        self
    }

    /// First three octets of the local address; every client shares them.
    pub fn prefix(&self) -> [u8; 3] {
        let [a, b, c, _] = self.local_ip.octets();
        [a, b, c]
    }
}
