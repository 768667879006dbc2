mod discovery_callback;

pub use discovery_callback::DiscoveryCallback;
