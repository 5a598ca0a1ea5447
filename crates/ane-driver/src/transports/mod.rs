//! Transport implementations.
//!
//! - [`DrmTransport`] — the real kernel-backed path through an `accel`
//!   device node.
//! - [`HostTransport`] — in-memory stand-in for CI, tests, and dry runs.

mod drm;
mod host;

pub use drm::DrmTransport;
pub use host::HostTransport;
