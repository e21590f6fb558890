use crate::{
    network::{link::LinkError, SocketError},
    v4::allocator::AllocationError,
};
use dhcproto::error::{DecodeError, EncodeError};
use std::{io, net::Ipv4Addr};
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Error, Debug)]
pub enum UsherError {
    #[error("Socket operation failed: {0}")]
    Socket(#[from] SocketError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to decode DHCP message: {0}")]
    Decode(#[from] DecodeError),

    #[error("Failed to encode DHCP message: {0}")]
    Encode(#[from] EncodeError),

    #[error("Raw frame transmission failed: {0}")]
    Link(#[from] LinkError),

    #[error("Address allocation failed: {0}")]
    Allocation(#[from] AllocationError),

    #[error("Reply task failed: {0}")]
    Task(#[from] JoinError),

    #[error("Interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("Interface '{interface}' has no {missing}")]
    InterfaceIncomplete {
        interface: String,
        missing: &'static str,
    },

    #[error("Interface '{interface}' has subnet mask {mask}, expected 255.255.255.0")]
    InvalidSubnetMask { interface: String, mask: Ipv4Addr },

    #[error("Malformed request: {0}")]
    MalformedRequest(String),
}
