//! Data-parallel algorithms
//!
//! Each algorithm exposes a slice entry point (convenience, default control),
//! a `_with` entry point (explicit control and device-code prelude), and a
//! `_device` entry point operating on resident [`crate::device::DeviceVector`]
//! buffers without host round-trips.

pub mod sort;
