//! Tracing and logging setup shared by binaries and tests.

/// Initialize process-wide tracing.
///
/// Output format comes from `FLEDGER_LOG_FORMAT` (`json` by default, or
/// `pretty`), filtering from `RUST_LOG` (default `info`). Safe to call
/// multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::from_env());
}

/// Initialize tracing for a test binary, writing through the libtest capture.
pub fn init_for_tests() {
    tracing::init_for_tests();
}

/// Tracing configuration (filters, formats).
pub mod tracing;

pub use self::tracing::LogFormat;
