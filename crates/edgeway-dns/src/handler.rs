//! Per-message DNS resolution
//!
//! Every question of a request is looked up in the routing table. A match
//! yields a synthesized A record; a miss forwards the whole request upstream
//! and keeps the upstream answers. Any failure turns the reply into
//! SERVFAIL, but the remaining questions are still processed.

use crate::upstream::Upstream;
use crate::DnsError;
use edgeway_router::{normalize_name, RoutingTable};
use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// TTL for locally synthesized answers
pub const DEFAULT_TTL: u32 = 60;

/// Outcome of one question
#[derive(Debug)]
enum Resolution {
    Local(Record),
    Forwarded(Vec<Record>),
    Failed,
}

/// Resolves queries against a domain table with upstream fallback
pub struct DnsHandler {
    table: Arc<RoutingTable<String>>,
    upstream: Arc<dyn Upstream>,
    ttl: u32,
}

impl DnsHandler {
    pub fn new(table: Arc<RoutingTable<String>>, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            table,
            upstream,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Build the single reply for `request`
    pub async fn handle(&self, request: &Message) -> Message {
        let mut reply = reply_to(request);

        for query in request.queries() {
            debug!(
                id = request.id(),
                name = %query.name(),
                qtype = %query.query_type(),
                class = %query.query_class(),
                "question"
            );

            match self.resolve(request, query).await {
                Resolution::Local(record) => {
                    reply.add_answer(record);
                }
                Resolution::Forwarded(records) => {
                    reply.add_answers(records);
                }
                Resolution::Failed => {
                    reply.set_response_code(ResponseCode::ServFail);
                }
            }
        }

        reply
    }

    async fn resolve(&self, request: &Message, query: &Query) -> Resolution {
        let name = normalize_name(&query.name().to_ascii());

        if let Some(address) = self.table.resolve(&name) {
            return match self.local_answer(query.name(), address) {
                Ok(record) => {
                    info!(name = %name, address = %address, "answered locally");
                    Resolution::Local(record)
                }
                Err(e) => {
                    warn!(name = %name, error = %e, "failed to build local answer");
                    Resolution::Failed
                }
            };
        }

        info!(name = %name, "forwarding to upstream");
        match self.upstream.exchange(request).await {
            Ok(mut response) => {
                let answers = response.take_answers();
                debug!(name = %name, answers = answers.len(), "upstream answered");
                Resolution::Forwarded(answers)
            }
            Err(e) => {
                warn!(name = %name, error = %e, "upstream query failed");
                Resolution::Failed
            }
        }
    }

    fn local_answer(&self, name: &Name, address: &str) -> Result<Record, DnsError> {
        let ip: Ipv4Addr = address
            .parse()
            .map_err(|_| DnsError::InvalidAddress(address.to_string()))?;
        Ok(Record::from_rdata(name.clone(), self.ttl, RData::A(A(ip))))
    }
}

/// Reply skeleton: id, opcode, recursion-desired and questions copied
fn reply_to(request: &Message) -> Message {
    let mut reply = Message::new();
    reply
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(request.op_code())
        .set_recursion_desired(request.recursion_desired())
        .set_checking_disabled(request.checking_disabled())
        .set_authoritative(true)
        .set_response_code(ResponseCode::NoError);
    reply.add_queries(request.queries().iter().cloned());
    reply
}
