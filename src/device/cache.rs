//! Global client cache for GPU devices

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use super::client::GpuClient;
use super::device::GpuDevice;
use crate::error::Result;

/// Global client cache: adapter index -> cached client
///
/// Ensures only one `wgpu::Device` exists per adapter index. All clients for
/// the same index share the same device, queue, and compile cache; this is
/// required because buffers belong to the device that created them, and it
/// is what makes kernel compilation once-per-process rather than
/// once-per-call.
static CLIENT_CACHE: OnceLock<Mutex<HashMap<usize, GpuClient>>> = OnceLock::new();

/// Get or create the cached client for a device.
pub(crate) fn get_or_create_client(device: &GpuDevice) -> Result<GpuClient> {
    let cache = CLIENT_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = cache.lock().unwrap_or_else(|e| e.into_inner());

    if let Some(client) = guard.get(&device.index) {
        return Ok(client.clone());
    }

    let client = GpuClient::new_uncached(device.clone())?;
    guard.insert(device.index, client.clone());
    Ok(client)
}
