//! Tracing and logging setup shared by the binaries and tests.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{LogFormat, UnknownLogFormat};

/// Initialize process-wide tracing with the given output format.
///
/// Safe to call multiple times; only the first call installs a subscriber.
pub fn init(format: LogFormat) {
    self::tracing::init(format);
}
