//! # bulkr
//!
//! **Data-parallel primitives for Rust with runtime-specialized GPU kernels.**
//!
//! bulkr runs sorting primitives on whatever GPU the machine has, specializing
//! generic WGSL kernels at runtime for the caller's key, value, and comparator
//! types. User-defined functors execute inside the kernel: a type that
//! implements [`SortOrdering`] carries both a host-side predicate and the WGSL
//! text of the same predicate, and the two are kept in lockstep by living on
//! one type.
//!
//! ## How it works
//!
//! - **Type registry**: [`DeviceType`] maps host types to WGSL names and
//!   declarations; scalars come built in, structs register their own text
//! - **Specialization**: kernel templates are spliced with concrete type
//!   names and compiled at most once per distinct instantiation, process-wide
//! - **Memory**: [`DeviceVector`] wraps a caller slice, and mapping it back
//!   synchronizes device results into the caller's memory
//! - **Execution**: every launch is awaited; when an algorithm returns, the
//!   results are visible
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bulkr::prelude::*;
//!
//! let mut keys = vec![4u32, 2, 1, 3];
//! let mut values = vec!['d', 'b', 'a', 'c'];
//! bulkr::sort_by_key(&mut keys, &mut values, Less::new())?;
//! assert_eq!(keys, vec![1, 2, 3, 4]);
//! ```
//!
//! Input lengths must be powers of two; other lengths are rejected with a
//! typed error before any device work starts.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod control;
pub mod device;
pub mod error;
pub mod kernels;
pub mod registry;

pub use algo::sort::{
    sort, sort_by_key, sort_by_key_device, sort_by_key_with, sort_device, sort_with,
};
pub use control::{Control, RunMode};
pub use device::{is_gpu_available, DeviceVector, GpuClient, GpuDevice, MapGuard};
pub use error::{Error, Result};
pub use registry::{DeviceType, Greater, Less, SortOrdering};

/// Commonly used items.
pub mod prelude {
    pub use crate::algo::sort::{
        sort, sort_by_key, sort_by_key_device, sort_by_key_with, sort_device, sort_with,
    };
    pub use crate::control::{Control, RunMode};
    pub use crate::device::{DeviceVector, GpuDevice};
    pub use crate::error::{Error, Result};
    pub use crate::registry::{DeviceType, Greater, Less, SortOrdering};
}
