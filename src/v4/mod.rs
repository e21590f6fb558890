//! DHCPv4 responder logic
//!
//! This module contains the DHCPv4-specific implementation including:
//! - Address assignment from the hardware address registry
//! - Reply construction
//! - Request dispatch

pub mod allocator;
pub mod handler;
pub mod message;


pub use allocator::AddressAllocator;
pub use handler::{Action, DhcpV4Handler, RequestKind};
pub use message::ReplyBuilder;
