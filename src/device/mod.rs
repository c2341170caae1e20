//! GPU platform layer: adapter identity, client, and device vectors
//!
//! The platform is consumed through a narrow surface: adapter discovery,
//! buffer creation, kernel compilation (see [`crate::kernels`]), argument
//! binding, dispatch, and blocking completion. Exactly one
//! `wgpu::Device`/`Queue` pair exists per adapter index, shared through a
//! process-wide client cache.

mod cache;
mod client;
mod device;
mod vector;

pub use client::GpuClient;
pub use device::{is_gpu_available, GpuDevice};
pub use vector::{DeviceVector, MapGuard};

pub(crate) use cache::get_or_create_client;
