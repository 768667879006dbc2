//! Intercept DNS Application Layer
pub mod ports;
pub mod services;

pub use ports::DiscoveryCallback;
pub use services::{DiscoveryRecorder, RecordOutcome, ThrottledLogger};
