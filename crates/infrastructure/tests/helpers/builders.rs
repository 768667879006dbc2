use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RecordType};
use intercept_dns_domain::{Config, DnsProtocol, DomainError};
use intercept_dns_infrastructure::dns::{DnsExchange, TransportResponse};
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn query_message(id: u16, name: &str, record_type: RecordType) -> Message {
    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true);
    message.add_query(Query::query(Name::from_str(name).unwrap(), record_type));
    message
}

pub fn query_bytes(id: u16, name: &str, record_type: RecordType) -> Vec<u8> {
    query_message(id, name, record_type).to_vec().unwrap()
}

pub fn parse_response(bytes: &[u8]) -> Message {
    Message::from_vec(bytes).unwrap()
}

/// Defaults, with `example.test` intercepted to `10.0.0.5`.
pub fn test_config(upstream: Option<SocketAddr>) -> Config {
    let mut config = Config::default();
    config.upstream.address = upstream.map(|addr| addr.to_string());
    config.upstream.timeout_ms = 500;
    config.intercept.target_ip = Ipv4Addr::new(10, 0, 0, 5);
    config.intercept.domains = vec!["example.test".to_string(), "bose.io".to_string()];
    config
}

/// Records every exchange and answers with a canned payload.
pub struct CountingExchange {
    calls: AtomicUsize,
    last: Mutex<Option<(SocketAddr, DnsProtocol, Vec<u8>)>>,
    reply: Vec<u8>,
}

impl CountingExchange {
    pub fn new(reply: Vec<u8>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
            reply,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> Option<(SocketAddr, DnsProtocol, Vec<u8>)> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl DnsExchange for CountingExchange {
    async fn exchange(
        &self,
        message_bytes: &[u8],
        server: SocketAddr,
        protocol: DnsProtocol,
        _timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some((server, protocol, message_bytes.to_vec()));
        Ok(TransportResponse {
            bytes: self.reply.clone(),
            protocol_used: protocol.protocol_name(),
        })
    }
}

/// Always fails with the given error.
pub struct FailingExchange {
    error: DomainError,
    calls: AtomicUsize,
}

impl FailingExchange {
    pub fn new(error: DomainError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DnsExchange for FailingExchange {
    async fn exchange(
        &self,
        _message_bytes: &[u8],
        _server: SocketAddr,
        _protocol: DnsProtocol,
        _timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// Never answers: waits out whatever budget it is handed, then times out.
pub struct SlowExchange {
    budgets: Mutex<Vec<Duration>>,
}

impl SlowExchange {
    pub fn new() -> Self {
        Self {
            budgets: Mutex::new(Vec::new()),
        }
    }

    pub fn budgets(&self) -> Vec<Duration> {
        self.budgets.lock().unwrap().clone()
    }
}

#[async_trait]
impl DnsExchange for SlowExchange {
    async fn exchange(
        &self,
        _message_bytes: &[u8],
        server: SocketAddr,
        _protocol: DnsProtocol,
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        self.budgets.lock().unwrap().push(timeout);
        tokio::time::sleep(timeout).await;
        Err(DomainError::QueryTimeout {
            server: server.to_string(),
        })
    }
}
