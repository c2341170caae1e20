//! GPU device identity and adapter discovery
//!
//! `GpuDevice` is a cheap identifier naming an adapter by enumeration index.
//! It does not initialize the GPU; that happens when a client is first
//! created for the index. Adapter info is cached on the identity once known.

use std::fmt;
use std::sync::Arc;

use wgpu::{Adapter, Backend, Limits};

use crate::error::{Error, Result};

/// Cached adapter information for a GPU device.
#[derive(Clone)]
pub(crate) struct AdapterInfo {
    /// Adapter name (e.g. "NVIDIA GeForce RTX 4090")
    name: String,
    /// Backend type (Vulkan, Metal, DX12, etc.)
    backend: Backend,
    /// Device limits
    limits: Limits,
}

/// GPU device identifier.
///
/// The index maps to the order of adapters returned by enumeration. Part of
/// every [`crate::kernels::CompilationKey`], so kernels compiled against one
/// device are never reused on another.
#[derive(Clone)]
pub struct GpuDevice {
    /// Adapter enumeration index
    pub(crate) index: usize,
    /// Cached adapter info (populated once a client exists)
    info: Option<Arc<AdapterInfo>>,
}

impl GpuDevice {
    /// Create a device identifier for the specified adapter index.
    pub fn new(index: usize) -> Self {
        Self { index, info: None }
    }

    pub(crate) fn with_info(index: usize, info: Arc<AdapterInfo>) -> Self {
        Self {
            index,
            info: Some(info),
        }
    }

    /// The adapter enumeration index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The adapter name, or "unknown" before initialization.
    pub fn adapter_name(&self) -> String {
        self.info
            .as_ref()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// The backend type, or `None` before initialization.
    pub fn backend(&self) -> Option<Backend> {
        self.info.as_ref().map(|i| i.backend)
    }

    /// Device limits (defaults before initialization).
    pub fn limits(&self) -> Limits {
        self.info
            .as_ref()
            .map(|i| i.limits.clone())
            .unwrap_or_default()
    }

    /// Maximum compute workgroup size on this adapter.
    pub fn max_workgroup_size(&self) -> u32 {
        self.limits().max_compute_workgroup_size_x
    }
}

impl fmt::Debug for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuDevice")
            .field("index", &self.index)
            .field("adapter", &self.adapter_name())
            .finish()
    }
}

// ============================================================================
// Adapter Discovery
// ============================================================================

pub(crate) async fn query_adapter(index: usize) -> Result<(Adapter, Arc<AdapterInfo>)> {
    let instance = wgpu::Instance::default();

    let adapters: Vec<_> = instance.enumerate_adapters(wgpu::Backends::all()).await;
    if adapters.is_empty() {
        return Err(Error::Backend("no GPU adapter found".into()));
    }

    let adapter = if index < adapters.len() {
        let mut adapters = adapters;
        adapters.swap_remove(index)
    } else {
        instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| Error::Backend(format!("no GPU adapter for index {index}")))?
    };

    let wgpu_info = adapter.get_info();
    let info = Arc::new(AdapterInfo {
        name: wgpu_info.name,
        backend: wgpu_info.backend,
        limits: adapter.limits(),
    });

    Ok((adapter, info))
}

/// Query adapter information synchronously using pollster.
pub(crate) fn query_adapter_blocking(index: usize) -> Result<(Adapter, Arc<AdapterInfo>)> {
    pollster::block_on(query_adapter(index))
}

/// Check whether a GPU adapter is available on this system.
pub fn is_gpu_available() -> bool {
    query_adapter_blocking(0).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_identity() {
        let device = GpuDevice::new(0);
        assert_eq!(device.index(), 0);
        assert_eq!(device.adapter_name(), "unknown");
        assert!(device.backend().is_none());
    }

    #[test]
    fn test_device_with_adapter() {
        match query_adapter_blocking(0) {
            Ok((_, info)) => {
                let device = GpuDevice::with_info(0, info);
                println!("Adapter: {}", device.adapter_name());
                println!("Backend: {:?}", device.backend());
                assert!(!device.adapter_name().is_empty());
            }
            Err(e) => {
                println!("No GPU available, skipping test: {}", e);
            }
        }
    }
}
