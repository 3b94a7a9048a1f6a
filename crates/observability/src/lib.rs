//! Tracing/logging setup shared by the binaries.

/// Subscriber configuration (filters, formatters).
pub mod subscriber;

pub use subscriber::LogFormat;

/// Initialize process-wide logging from `RUST_LOG` and `LOG_FORMAT`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    let format = std::env::var("LOG_FORMAT")
        .map(|v| LogFormat::parse(&v))
        .unwrap_or_default();
    subscriber::init(format);
}
