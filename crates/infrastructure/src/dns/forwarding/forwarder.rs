use crate::dns::settings::ProxySettings;
use crate::dns::synthesizer::ResponseSynthesizer;
use crate::dns::transport::DnsExchange;
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::RecordType;
use intercept_dns_application::ThrottledLogger;
use intercept_dns_domain::{DnsProtocol, DomainError, UpstreamAddr};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Relays non-intercepted queries to the upstream resolver.
///
/// Every failure is answered locally with SERVFAIL; reverse lookups never
/// leave the proxy.
pub struct UpstreamForwarder {
    exchange: Arc<dyn DnsExchange>,
    synthesizer: ResponseSynthesizer,
    throttle: Arc<ThrottledLogger>,
    timeout: Duration,
}

impl UpstreamForwarder {
    pub fn new(
        exchange: Arc<dyn DnsExchange>,
        synthesizer: ResponseSynthesizer,
        throttle: Arc<ThrottledLogger>,
        timeout: Duration,
    ) -> Self {
        Self {
            exchange,
            synthesizer,
            throttle,
            timeout,
        }
    }

    /// Answers `request` from upstream, or synthesizes the local failure.
    ///
    /// `raw` is the request exactly as received and is what goes upstream.
    /// An `Err` only means the local reply could not be encoded.
    pub async fn forward(
        &self,
        request: &Message,
        raw: &[u8],
        protocol: DnsProtocol,
        settings: &ProxySettings,
    ) -> Result<Vec<u8>, DomainError> {
        let query = request.queries().first();

        if query.is_some_and(|q| q.query_type() == RecordType::PTR) {
            debug!(
                domain = %query.map(|q| q.name().to_ascii()).unwrap_or_default(),
                "PTR query answered locally with NXDOMAIN"
            );
            return self
                .synthesizer
                .error_response(request, ResponseCode::NXDomain);
        }

        match self.relay(raw, protocol, settings).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                self.report(&e);
                self.synthesizer
                    .error_response(request, ResponseCode::ServFail)
            }
        }
    }

    async fn relay(
        &self,
        raw: &[u8],
        protocol: DnsProtocol,
        settings: &ProxySettings,
    ) -> Result<Vec<u8>, DomainError> {
        let upstream = settings.upstream.as_ref().ok_or(DomainError::NoUpstream)?;

        if let Some(bind) = settings.self_reference(upstream) {
            return Err(DomainError::LoopDetected {
                upstream: upstream.to_string(),
                bind,
            });
        }

        // Resolution and the exchange share one budget.
        let deadline = Instant::now() + self.timeout;
        let timed_out = || DomainError::QueryTimeout {
            server: upstream.to_string(),
        };

        let server = tokio::time::timeout_at(deadline, resolve_upstream(upstream))
            .await
            .map_err(|_| timed_out())??;

        if settings.is_local_target(server) {
            return Err(DomainError::LoopDetected {
                upstream: upstream.to_string(),
                bind: server.to_string(),
            });
        }

        let remaining = remaining_budget(deadline).ok_or_else(timed_out)?;
        let response = self
            .exchange
            .exchange(raw, server, protocol, remaining)
            .await?;

        debug!(
            server = %server,
            protocol = response.protocol_used,
            bytes = response.bytes.len(),
            "Upstream response relayed"
        );

        Ok(response.bytes)
    }

    fn report(&self, error: &DomainError) {
        match error {
            DomainError::NoUpstream => {
                self.throttle
                    .log("No upstream DNS server configured, answering SERVFAIL");
            }
            DomainError::LoopDetected { upstream, .. } => {
                self.throttle.log_keyed(
                    "forward_loop",
                    upstream,
                    &format!("Refusing to forward to self: {}", error),
                );
            }
            DomainError::QueryTimeout { server } | DomainError::Transport { server, .. } => {
                self.throttle.log_keyed(
                    "forward_failed",
                    server,
                    &format!("Upstream forward failed: {}", error),
                );
            }
            other => {
                self.throttle.log_keyed(
                    "forward_failed",
                    "",
                    &format!("Upstream forward failed: {}", other),
                );
            }
        }
    }
}

fn remaining_budget(deadline: Instant) -> Option<Duration> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    (!remaining.is_zero()).then_some(remaining)
}

/// Turns the configured upstream into a socket address, using the system
/// resolver for hostnames.
async fn resolve_upstream(upstream: &UpstreamAddr) -> Result<SocketAddr, DomainError> {
    if let Some(addr) = upstream.socket_addr() {
        return Ok(addr);
    }

    let mut addrs = tokio::net::lookup_host((upstream.host(), upstream.port()))
        .await
        .map_err(|e| DomainError::Transport {
            server: upstream.to_string(),
            reason: format!("resolution failed: {}", e),
        })?;

    addrs.next().ok_or_else(|| DomainError::Transport {
        server: upstream.to_string(),
        reason: "resolution returned no addresses".to_string(),
    })
}
