//! Exchange with the upstream resolver

use crate::DnsError;
use async_trait::async_trait;
use hickory_proto::op::Message;
use hickory_proto::serialize::binary::BinEncodable;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::trace;

const MAX_DATAGRAM: usize = 4096;

/// Resolver consulted for names without a local entry
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Send `query` unmodified and return the parsed reply
    async fn exchange(&self, query: &Message) -> Result<Message, DnsError>;
}

/// Plain UDP upstream with a per-exchange timeout
#[derive(Debug, Clone)]
pub struct UdpUpstream {
    addr: SocketAddr,
    timeout: Duration,
}

impl UdpUpstream {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    async fn round_trip(&self, bytes: &[u8]) -> Result<Vec<u8>, DnsError> {
        let local: SocketAddr = if self.addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(self.addr).await?;
        socket.send(bytes).await?;

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let len = socket.recv(&mut buf).await?;
        buf.truncate(len);
        Ok(buf)
    }
}

#[async_trait]
impl Upstream for UdpUpstream {
    async fn exchange(&self, query: &Message) -> Result<Message, DnsError> {
        let bytes = query.to_bytes()?;
        trace!(upstream = %self.addr, id = query.id(), "exchanging with upstream");

        let raw = tokio::time::timeout(self.timeout, self.round_trip(&bytes))
            .await
            .map_err(|_| DnsError::UpstreamTimeout(self.addr))??;

        let reply = Message::from_vec(&raw)?;
        if reply.id() != query.id() {
            return Err(DnsError::UpstreamIdMismatch {
                expected: query.id(),
                got: reply.id(),
            });
        }
        Ok(reply)
    }
}
