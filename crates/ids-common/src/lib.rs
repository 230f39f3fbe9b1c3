//! Shared process plumbing for identity server binaries.

pub mod logging;
pub mod shutdown;

pub use logging::init_logging;
pub use shutdown::shutdown_signal;
