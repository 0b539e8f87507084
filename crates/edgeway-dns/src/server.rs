//! UDP DNS server

use crate::handler::DnsHandler;
use crate::DnsError;
use hickory_proto::op::Message;
use hickory_proto::serialize::binary::BinEncodable;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

const MAX_DATAGRAM: usize = 4096;

/// DNS server answering one task per datagram
pub struct DnsServer {
    socket: Arc<UdpSocket>,
    handler: Arc<DnsHandler>,
    shutdown: CancellationToken,
    force: CancellationToken,
    tracker: TaskTracker,
}

impl DnsServer {
    /// Bind the UDP socket; the server does not receive until [`run`](Self::run)
    pub async fn bind(address: SocketAddr, handler: DnsHandler) -> Result<Self, DnsError> {
        let socket = UdpSocket::bind(address)
            .await
            .map_err(|e| DnsError::BindError {
                address,
                reason: e.to_string(),
            })?;

        info!("DNS server listening on {}", socket.local_addr()?);

        Ok(Self {
            socket: Arc::new(socket),
            handler: Arc::new(handler),
            shutdown: CancellationToken::new(),
            force: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DnsError> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive and answer datagrams until shutdown is requested
    pub async fn run(&self) -> Result<(), DnsError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            let (len, peer) = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        // ICMP errors from earlier sends surface here on some platforms
                        debug!("DNS receive error: {}", e);
                        continue;
                    }
                },
            };

            let request = match Message::from_vec(&buf[..len]) {
                Ok(request) => request,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "dropping malformed DNS message");
                    continue;
                }
            };

            let socket = self.socket.clone();
            let handler = self.handler.clone();
            let force = self.force.clone();
            let id = request.id();

            self.tracker.spawn(async move {
                tokio::select! {
                    _ = force.cancelled() => {
                        debug!(peer = %peer, id, "query abandoned on shutdown");
                    }
                    _ = answer(&socket, &handler, request, peer) => {}
                }
            });
        }

        info!("DNS server stopped accepting queries");
        Ok(())
    }

    /// Stop receiving, wait up to `deadline` for in-flight queries, then drop them
    ///
    /// Returns `true` when every query finished within the deadline.
    pub async fn shutdown(&self, deadline: Duration) -> bool {
        info!("Shutting down DNS server...");
        self.shutdown.cancel();
        self.tracker.close();

        let drained = tokio::time::timeout(deadline, self.tracker.wait())
            .await
            .is_ok();
        if !drained {
            warn!(
                pending = self.tracker.len(),
                "DNS shutdown deadline reached, abandoning queries"
            );
            self.force.cancel();
            self.tracker.wait().await;
        }
        drained
    }
}

async fn answer(socket: &UdpSocket, handler: &DnsHandler, request: Message, peer: SocketAddr) {
    info!(
        peer = %peer,
        id = request.id(),
        questions = request.queries().len(),
        "DNS query received"
    );

    let reply = handler.handle(&request).await;

    let bytes = match reply.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(peer = %peer, id = reply.id(), error = %e, "failed to encode DNS reply");
            return;
        }
    };

    match socket.send_to(&bytes, peer).await {
        Ok(_) => info!(
            peer = %peer,
            id = reply.id(),
            answers = reply.answers().len(),
            rcode = %reply.response_code(),
            "DNS reply sent"
        ),
        Err(e) => error!(peer = %peer, error = %e, "failed to send DNS reply"),
    }
}
