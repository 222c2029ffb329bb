//! Public surface for Strata.
//!
//! Re-exports the memory engine and config crates and wires them into a
//! ready-to-use [`MemoryRuntime`].

mod runtime;

/// Re-export for convenience.
pub use strata_config as config;
/// Re-export for convenience.
pub use strata_embed as embed;
/// Re-export for convenience.
pub use strata_memory as memory;

pub use runtime::{MemoryRuntime, RuntimeError};

/// Initialize env_logger with millisecond timestamps, honoring `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .parse_default_env()
        .try_init();
}
