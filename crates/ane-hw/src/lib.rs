//! Silicon model for the Apple Neural Engine (ANE).
//!
//! This crate has **no dependencies** and **no hardware access** — it is a
//! pure model of the engine as seen from userspace: tile geometry, the
//! fixed tile-slot layout, and the `accel` kernel driver's uAPI (buffer
//! objects and the submit record).
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`tile`] | Tile geometry (16 KiB pages), slot layout, alignment helpers |
//! | [`uapi`] | Kernel uAPI structs and ioctl numbers |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod tile;
pub mod uapi;
