mod discovery_recorder;
mod throttled_logger;

pub use discovery_recorder::{DiscoveryRecorder, RecordOutcome};
pub use throttled_logger::ThrottledLogger;
