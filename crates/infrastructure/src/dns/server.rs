use crate::dns::forwarding::UpstreamForwarder;
use crate::dns::settings::ProxySettings;
use crate::dns::synthesizer::ResponseSynthesizer;
use arc_swap::ArcSwap;
use hickory_proto::op::{Message, MessageType};
use intercept_dns_application::DiscoveryRecorder;
use intercept_dns_domain::{normalize_hostname, DnsProtocol, QueryClassifier};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error};

/// Handles one raw DNS message from either listener.
///
/// Records the queried name, then answers it locally when intercepted or
/// relays it upstream otherwise.
pub struct DnsServerHandler {
    classifier: QueryClassifier,
    synthesizer: ResponseSynthesizer,
    forwarder: UpstreamForwarder,
    recorder: Arc<DiscoveryRecorder>,
    settings: Arc<ArcSwap<ProxySettings>>,
}

impl DnsServerHandler {
    pub fn new(
        classifier: QueryClassifier,
        synthesizer: ResponseSynthesizer,
        forwarder: UpstreamForwarder,
        recorder: Arc<DiscoveryRecorder>,
        settings: Arc<ArcSwap<ProxySettings>>,
    ) -> Self {
        Self {
            classifier,
            synthesizer,
            forwarder,
            recorder,
            settings,
        }
    }

    /// Returns the reply to write back, or `None` when the message is dropped
    /// (unparseable, not a query, or without a question).
    pub async fn handle_raw(
        &self,
        raw: &[u8],
        client: SocketAddr,
        protocol: DnsProtocol,
    ) -> Option<Vec<u8>> {
        let request = match Message::from_vec(raw) {
            Ok(message) => message,
            Err(e) => {
                debug!(
                    client = %client,
                    protocol = %protocol,
                    error = %e,
                    "Ignoring malformed DNS message"
                );
                return None;
            }
        };

        if request.message_type() != MessageType::Query {
            debug!(client = %client, "Ignoring DNS message that is not a query");
            return None;
        }

        let query = match request.queries().first() {
            Some(query) => query,
            None => {
                debug!(client = %client, "Ignoring DNS query without a question");
                return None;
            }
        };

        let fqdn = query.name().to_ascii();
        let domain = normalize_hostname(&fqdn);
        let decision = self.classifier.classify(domain);

        debug!(
            domain = %domain,
            record_type = ?query.query_type(),
            client = %client,
            protocol = %protocol,
            decision = ?decision,
            "DNS query received"
        );

        self.recorder
            .record(domain, decision.is_intercept(), Some(client))
            .await;

        let settings = self.settings.load_full();

        let response = if decision.is_intercept() {
            self.synthesizer
                .intercept_response(&request, settings.intercept_target)
        } else {
            self.forwarder
                .forward(&request, raw, protocol, &settings)
                .await
        };

        match response {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                error!(domain = %domain, error = %e, "Failed to build DNS response");
                None
            }
        }
    }
}
