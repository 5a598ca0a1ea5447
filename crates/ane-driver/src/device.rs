//! Device session: probing, identity check, open/close.
//!
//! The engine surfaces as an `accel` node under `/dev/accel/`. Nodes are
//! probed in ascending order and accepted only when the kernel's version
//! query names the `ane` driver exactly — other accelerators share the
//! same node namespace.

use std::path::PathBuf;

use crate::error::{AneError, Result};
use crate::transport::AccelTransport;
use crate::transports::DrmTransport;

/// Maximum engine instances a machine can carry.
pub const MAX_DEVICES: usize = 2;

/// Number of candidate device nodes probed.
pub const MAX_NODE_COUNT: usize = 64;

/// Exact driver name required by the identity check.
pub const DRIVER_NAME: &str = "ane";

/// A device node that passed the identity check.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    /// Match ordinal (0 for the first matching node, and so on).
    pub index: usize,
    /// Device node path.
    pub path: PathBuf,
}

/// An open session with one engine instance.
#[derive(Debug)]
pub struct AneDevice {
    transport: Box<dyn AccelTransport>,
    node: Option<NodeInfo>,
}

impl AneDevice {
    /// Open the `index`-th matching device.
    ///
    /// Probes `/dev/accel/accel0..63` in ascending order; a node counts
    /// only if its driver identifies as `ane`. Unopenable or foreign
    /// nodes are skipped.
    ///
    /// # Errors
    ///
    /// [`AneError::InvalidArgument`] if `index >= MAX_DEVICES`;
    /// [`AneError::NotFound`] if fewer than `index + 1` matching devices
    /// exist.
    pub fn open(index: usize) -> Result<Self> {
        if index >= MAX_DEVICES {
            return Err(AneError::invalid_argument(format!(
                "device index {index} out of range [0, {MAX_DEVICES})"
            )));
        }

        let mut found = 0;
        for node in 0..MAX_NODE_COUNT {
            let path = PathBuf::from(format!("/dev/accel/accel{node}"));

            let Some(transport) = probe(&path) else {
                continue;
            };

            if found == index {
                tracing::info!("opened device {index} at {}", path.display());
                return Ok(Self {
                    transport: Box::new(transport),
                    node: Some(NodeInfo { index, path }),
                });
            }
            found += 1;
        }

        tracing::warn!("no device with index {index} ({found} present)");
        Err(AneError::NotFound { index, found })
    }

    /// Bind a session to an arbitrary transport (host transport, tests).
    #[must_use]
    pub fn with_transport(transport: Box<dyn AccelTransport>) -> Self {
        Self {
            transport,
            node: None,
        }
    }

    /// The node backing this session, if it came from a real device.
    #[must_use]
    pub fn node(&self) -> Option<&NodeInfo> {
        self.node.as_ref()
    }

    /// The session's buffer/submit primitives.
    #[must_use]
    pub fn transport(&self) -> &dyn AccelTransport {
        self.transport.as_ref()
    }
}

impl Drop for AneDevice {
    fn drop(&mut self) {
        // Closing an already-dead node is a no-op; the fd owns itself.
        if let Some(node) = &self.node {
            tracing::info!("closing device {} at {}", node.index, node.path.display());
        }
    }
}

/// List every matching device node without retaining any of them.
#[must_use]
pub fn enumerate() -> Vec<NodeInfo> {
    let mut nodes = Vec::new();
    for node in 0..MAX_NODE_COUNT {
        let path = PathBuf::from(format!("/dev/accel/accel{node}"));
        if probe(&path).is_some() {
            nodes.push(NodeInfo {
                index: nodes.len(),
                path,
            });
        }
    }
    nodes
}

/// Open a node and check its identity; `None` if absent or foreign.
fn probe(path: &std::path::Path) -> Option<DrmTransport> {
    let transport = match DrmTransport::open(path) {
        Ok(t) => t,
        Err(e) => {
            tracing::trace!("skipping {}: {e}", path.display());
            return None;
        }
    };

    match transport.driver_name() {
        Ok(name) if name == DRIVER_NAME => Some(transport),
        Ok(name) => {
            tracing::debug!("skipping {}: driver {name:?}", path.display());
            None
        }
        Err(e) => {
            tracing::debug!("skipping {}: {e}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_beyond_max_is_invalid() {
        assert!(matches!(
            AneDevice::open(MAX_DEVICES),
            Err(AneError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn enumerate_without_hardware_is_empty_or_ordered() {
        let nodes = enumerate();
        for (i, node) in nodes.iter().enumerate() {
            assert_eq!(node.index, i);
        }
    }

    #[test]
    #[ignore] // Requires hardware
    fn open_returns_devices_in_node_order() {
        let nodes = enumerate();
        assert!(!nodes.is_empty(), "no engines present");

        for (i, node) in nodes.iter().enumerate() {
            let dev = AneDevice::open(i).expect("device opens");
            assert_eq!(dev.node().expect("real node").path, node.path);
        }

        assert!(matches!(
            AneDevice::open(nodes.len().min(MAX_DEVICES - 1) + 1),
            Err(AneError::NotFound { .. }) | Err(AneError::InvalidArgument { .. })
        ));
    }
}
