use std::sync::Arc;

/// Invoked with the normalized hostname the first time it is seen.
///
/// Runs on the recorder's single dispatch worker, one event at a time; a slow
/// callback delays later notifications but never the DNS path.
pub type DiscoveryCallback = Arc<dyn Fn(&str) + Send + Sync>;
