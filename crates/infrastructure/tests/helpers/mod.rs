#![allow(dead_code)]
mod builders;
mod dns_server_mock;

pub use builders::{
    parse_response, query_bytes, query_message, test_config, CountingExchange, FailingExchange,
    SlowExchange,
};
pub use dns_server_mock::MockDnsServer;
