//! DNS front end of the edge router
//!
//! Names found in the routing table are answered locally with an A record;
//! anything else is forwarded to an upstream resolver. All questions of one
//! query are answered in a single, authoritative reply.

pub mod handler;
pub mod server;
pub mod upstream;

pub use handler::DnsHandler;
pub use server::DnsServer;
pub use upstream::{UdpUpstream, Upstream};

use std::net::SocketAddr;
use thiserror::Error;

/// DNS server errors
#[derive(Debug, Error)]
pub enum DnsError {
    #[error("Failed to bind to {address}: {reason}")]
    BindError { address: SocketAddr, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("DNS message error: {0}")]
    ProtoError(#[from] hickory_proto::error::ProtoError),

    #[error("Upstream {0} did not answer in time")]
    UpstreamTimeout(SocketAddr),

    #[error("Upstream reply id {got} does not match query id {expected}")]
    UpstreamIdMismatch { expected: u16, got: u16 },

    #[error("Invalid address {0:?} for a local answer")]
    InvalidAddress(String),
}
