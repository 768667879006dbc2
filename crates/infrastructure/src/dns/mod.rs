pub mod forwarding;
pub mod listener;
pub mod server;
pub mod settings;
pub mod synthesizer;
pub mod transport;

pub use forwarding::UpstreamForwarder;
pub use server::DnsServerHandler;
pub use settings::ProxySettings;
pub use synthesizer::ResponseSynthesizer;
pub use transport::{DnsExchange, NetworkExchange, TransportResponse};
