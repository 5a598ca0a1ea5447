//! Userspace client library for the Apple Neural Engine.
//!
//! Talks to the `ane` accel kernel driver: loads a compiled network
//! descriptor, allocates and maps the hardware-backed channels the
//! network declares, stages tensors into the engine's tiled layout, and
//! issues blocking execution requests.
//!
//! # Quick start
//!
//! ```no_run
//! use ane_driver::NetworkInstance;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut nn = NetworkInstance::from_file("net.anec", 0)?;
//!
//! let input = vec![0u8; nn.src_size(0)? as usize];
//! nn.send(&input, 0)?;
//! nn.exec()?;
//!
//! let mut output = vec![0u8; nn.dst_size(0)? as usize];
//! nn.read(&mut output, 0)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency model
//!
//! Fully synchronous and single-threaded: no background work, no internal
//! locking. A [`NetworkInstance`] and its device session are shared
//! mutable resources — cross-thread use needs external synchronization,
//! and inputs must not be mutated while a submission is in flight.

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![warn(unsafe_op_in_unsafe_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod channel;
mod descriptor;
mod device;
mod error;
mod model;
mod network;
mod tiling;
mod transport;
pub mod transports;

/// Tile geometry constants (re-exported from ane-hw).
pub mod hw {
    pub use ane_hw::tile::{
        tile_align, tile_shift, ELEM_SIZE, FIFO_NID, SLOT_COUNT, TILE_SIZE,
    };
    pub use ane_hw::uapi::SubmitArgs;
}

pub use channel::{Channel, ChannelSet};
pub use descriptor::{Descriptor, TileShape, HEADER_SIZE, MAX_PAYLOAD};
pub use device::{enumerate, AneDevice, NodeInfo, DRIVER_NAME, MAX_DEVICES};
pub use error::{AneError, Result};
pub use model::Model;
pub use network::NetworkInstance;
pub use tiling::{tile, untile};
pub use transport::{AccelTransport, BoDesc, Mapping};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        AneDevice, AneError, Descriptor, Model, NetworkInstance, Result, TileShape,
    };
}
