//! GPU client: device, queue, and the compile cache
//!
//! `GpuClient` owns the `wgpu::Device` and `Queue` all work for one adapter
//! is submitted through, plus that adapter's [`CompileCache`]. It is `Clone`;
//! clones share the underlying device, queue, and cache.
//!
//! The host side of the library is synchronous: every submission is awaited
//! with a bounded poll before the next one is issued.

use std::sync::Arc;
use std::time::Duration;

use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, Buffer, BufferDescriptor,
    BufferUsages, Device, Queue,
};

use super::device::{GpuDevice, query_adapter_blocking};
use crate::error::{Error, Result};
use crate::kernels::CompileCache;

/// GPU client for kernel dispatch.
#[derive(Clone)]
pub struct GpuClient {
    pub(crate) device_id: GpuDevice,
    pub(crate) device: Arc<Device>,
    pub(crate) queue: Arc<Queue>,
    pub(crate) compile_cache: Arc<CompileCache>,
}

impl std::fmt::Debug for GpuClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuClient")
            .field("device", &self.device_id)
            .finish_non_exhaustive()
    }
}

impl GpuClient {
    /// Create a new client for an adapter index.
    ///
    /// Prefer [`super::get_or_create_client`]: buffers belong to the device
    /// that created them, so all work for one adapter must share one client.
    ///
    /// # Errors
    ///
    /// Returns `Error::Backend` if no suitable adapter is found or device
    /// creation fails.
    pub(crate) fn new_uncached(device: GpuDevice) -> Result<Self> {
        let (adapter, info) = query_adapter_blocking(device.index)?;

        let (wgpu_device, queue) = pollster::block_on(async {
            adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: Some("bulkr GPU device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                    trace: wgpu::Trace::Off,
                    experimental_features: wgpu::ExperimentalFeatures::default(),
                })
                .await
        })
        .map_err(|e| Error::Backend(format!("device request failed: {e:?}")))?;

        Ok(Self {
            device_id: GpuDevice::with_info(device.index, info),
            device: Arc::new(wgpu_device),
            queue: Arc::new(queue),
            compile_cache: Arc::new(CompileCache::new()),
        })
    }

    /// The device identity this client was created for.
    pub fn device(&self) -> &GpuDevice {
        &self.device_id
    }

    /// The adapter index, used in compilation keys.
    pub fn device_index(&self) -> usize {
        self.device_id.index
    }

    /// Reference to the wgpu device.
    #[inline]
    pub fn wgpu_device(&self) -> &Device {
        &self.device
    }

    /// Reference to the wgpu queue.
    #[inline]
    pub fn wgpu_queue(&self) -> &Queue {
        &self.queue
    }

    /// This adapter's compile cache.
    #[inline]
    pub fn compile_cache(&self) -> &CompileCache {
        &self.compile_cache
    }

    /// Create a storage buffer for kernel data.
    pub fn create_storage_buffer(&self, label: &str, size: u64) -> Buffer {
        self.device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    /// Create a staging buffer for host readback.
    pub fn create_staging_buffer(&self, label: &str, size: u64) -> Buffer {
        self.device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Create a uniform buffer for kernel parameters.
    pub fn create_uniform_buffer(&self, label: &str, size: u64) -> Buffer {
        self.device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Write typed data to a buffer.
    pub fn write_buffer<T: bytemuck::Pod>(&self, buffer: &Buffer, data: &[T]) {
        self.queue
            .write_buffer(buffer, 0, bytemuck::cast_slice(data));
    }

    /// Create a bind group from buffers bound in order.
    pub fn create_bind_group(&self, layout: &BindGroupLayout, buffers: &[&Buffer]) -> BindGroup {
        let entries: Vec<BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(i, buffer)| BindGroupEntry {
                binding: i as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        self.device.create_bind_group(&BindGroupDescriptor {
            label: Some("bulkr bind group"),
            layout,
            entries: &entries,
        })
    }

    /// Submit commands and block until they complete.
    pub fn submit_and_wait(&self, encoder: wgpu::CommandEncoder, op: &'static str) -> Result<()> {
        let submission = self.queue.submit(std::iter::once(encoder.finish()));
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(submission),
                timeout: Some(Duration::from_secs(60)),
            })
            .map_err(|e| Error::DeviceRuntime {
                op,
                detail: format!("poll failed: {e}"),
            })?;
        Ok(())
    }

    /// Block until all outstanding GPU work completes.
    pub fn synchronize(&self) {
        let _ = self.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: Some(Duration::from_secs(60)),
        });
    }

    /// Read a staging buffer back to the host (blocking).
    pub fn read_buffer<T: bytemuck::Pod>(
        &self,
        staging: &Buffer,
        output: &mut [T],
        op: &'static str,
    ) -> Result<()> {
        let slice = staging.slice(..);

        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: Some(Duration::from_secs(60)),
            })
            .map_err(|e| Error::DeviceRuntime {
                op,
                detail: format!("poll failed during buffer read: {e}"),
            })?;

        let map_result = receiver.recv().map_err(|_| Error::DeviceRuntime {
            op,
            detail: "map_async callback was not invoked".into(),
        })?;
        map_result.map_err(|e| Error::DeviceRuntime {
            op,
            detail: format!("map_async failed: {e}"),
        })?;

        {
            let data = slice.get_mapped_range();
            let src: &[T] = bytemuck::cast_slice(&data);
            output.copy_from_slice(&src[..output.len()]);
        }

        staging.unmap();
        Ok(())
    }
}
