//! # Usher - A Minimal DHCPv4 Responder
//!
//! Usher answers DHCP DISCOVER and REQUEST broadcasts on a single /24
//! segment. Every client hardware address gets a fixed address derived from
//! the order in which it was first seen: the first client receives `.2`, the
//! next `.3`, and so on. There is no lease table, no expiry and no
//! persistence.
//!
//! ## Features
//!
//! - OFFER/ACK delivered as hand-built Ethernet/IPv4/UDP frames, since the
//!   client has no address the kernel could route to
//! - NAK broadcast through the listening socket
//! - One Tokio task per request; the address registry is the only shared state
//!
//! ## Example
//!
//! ```rust,no_run
//! #[tokio::main]
//! async fn main() -> Result<(), usher::UsherError> {
//!     usher::create_server("tap0", 67).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod network;
pub mod server;
pub mod v4;

pub use config::{Args, ServerConfig};
pub use error::UsherError;
pub use server::{create_server, DhcpServer};
