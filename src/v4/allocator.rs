//! MAC address to IPv4 assignment
//!
//! Addresses are never stored. A client's address is `prefix.(index + 2)`,
//! where `index` is the position at which its hardware address was first
//! seen. Entries are never removed, so an address is stable for the
//! lifetime of the process.

use std::{
    net::Ipv4Addr,
    sync::{Mutex, PoisonError},
};
use thiserror::Error;

/// `.0` is the network address and `.1` belongs to the server.
const FIRST_HOST_OCTET: usize = 2;

/// Number of hardware addresses that fit in the single free octet.
pub const MAX_CLIENTS: usize = u8::MAX as usize + 1 - FIRST_HOST_OCTET;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AllocationError {
    #[error("Address pool exhausted, cannot register {0}")]
    Exhausted(String),
}

pub struct AddressAllocator {
    prefix: [u8; 3],
    registry: Mutex<Vec<[u8; 6]>>,
}

impl AddressAllocator {
    pub fn new(prefix: [u8; 3]) -> Self {
        Self {
            prefix,
            registry: Mutex::new(Vec::new()),
        }
    }

    /// Returns the address for `mac`, registering it on first sight.
    ///
    /// The lookup and the append happen under one lock, so concurrent first
    /// requests from different clients get distinct indices and concurrent
    /// requests from the same client share one entry.
    pub fn assign(&self, mac: [u8; 6]) -> Result<Ipv4Addr, AllocationError> {
        // The registry is append-only plain data; a panic elsewhere cannot
        // leave it half-updated.
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);

        let index = match registry.iter().position(|known| *known == mac) {
            Some(index) => index,
            None => {
                if registry.len() >= MAX_CLIENTS {
                    return Err(AllocationError::Exhausted(format_mac(&mac)));
                }
                registry.push(mac);
                tracing::debug!(
                    "Registered {} at index {}",
                    format_mac(&mac),
                    registry.len() - 1
                );
                registry.len() - 1
            }
        };

        Ok(self.address_at(index))
    }

    pub fn len(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn address_at(&self, index: usize) -> Ipv4Addr {
        let [a, b, c] = self.prefix;
        // `index < MAX_CLIENTS` keeps this within one octet.
        Ipv4Addr::new(a, b, c, (index + FIRST_HOST_OCTET) as u8)
    }
}

pub fn format_mac(mac: &[u8]) -> String {
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}
