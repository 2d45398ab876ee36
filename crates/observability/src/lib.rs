//! Process-wide tracing setup.

pub mod tracing;

pub use crate::tracing::{LogFormat, UnknownLogFormat};

/// Initialize process-wide tracing/logging.
///
/// Safe to call multiple times; only the first call installs a subscriber.
pub fn init(format: LogFormat) {
    crate::tracing::init(format);
}
