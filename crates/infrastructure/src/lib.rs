//! Intercept DNS Infrastructure Layer
pub mod bootstrap;
pub mod dns;
pub mod proxy;

pub use proxy::DnsProxy;
