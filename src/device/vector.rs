//! Device-resident vectors with host mapping discipline
//!
//! A [`DeviceVector`] owns a storage buffer of `len` elements. It is created
//! either from an explicit length (owned) or by wrapping a caller's mutable
//! slice (borrowed): the borrowed form uploads the slice's contents and
//! remembers the slice, and a later [`DeviceVector::map`] re-synchronizes the
//! caller's memory with the device-side mutations, which is how sort results
//! become visible through the caller's slice without any explicit caller
//! synchronization. Dropping a borrowed vector releases the device buffer but
//! never the host storage.
//!
//! While a [`MapGuard`] is live, host reads and writes go through it and the
//! device must not be touched through the vector; mutations are written back
//! to the device when the guard drops.

use std::ops::{Deref, DerefMut};

use wgpu::Buffer;

use super::client::GpuClient;
use crate::error::{Error, Result};
use crate::registry::DeviceType;

enum HostBinding<'a, T> {
    Owned,
    Borrowed(&'a mut [T]),
}

/// An owning handle to a device-resident contiguous buffer.
pub struct DeviceVector<'a, T: DeviceType> {
    client: GpuClient,
    buffer: Buffer,
    len: usize,
    host: HostBinding<'a, T>,
}

impl<T: DeviceType> DeviceVector<'static, T> {
    /// Allocate an owned, zero-initialized vector of `len` elements.
    pub fn with_len(client: &GpuClient, len: usize) -> Result<Self> {
        let buffer = create_data_buffer::<T>(client, len)?;
        Ok(Self {
            client: client.clone(),
            buffer,
            len,
            host: HostBinding::Owned,
        })
    }

    /// Allocate an owned vector holding a copy of `data`.
    pub fn from_slice(client: &GpuClient, data: &[T]) -> Result<Self> {
        let vector = Self::with_len(client, data.len())?;
        client.write_buffer(&vector.buffer, data);
        Ok(vector)
    }
}

impl<'a, T: DeviceType> DeviceVector<'a, T> {
    /// Wrap a caller-owned slice: upload its contents and remember it as the
    /// host side of this vector.
    pub fn from_host_slice(client: &GpuClient, slice: &'a mut [T]) -> Result<Self> {
        let buffer = create_data_buffer::<T>(client, slice.len())?;
        client.write_buffer(&buffer, slice);
        Ok(Self {
            client: client.clone(),
            buffer,
            len: slice.len(),
            host: HostBinding::Borrowed(slice),
        })
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the vector holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The underlying storage buffer.
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// The client whose device owns this vector's buffer.
    pub(crate) fn client(&self) -> &GpuClient {
        &self.client
    }

    /// Read the device contents into a fresh host vector.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        let mut out = vec![T::zeroed(); self.len];
        self.read_back(&mut out)?;
        Ok(out)
    }

    /// Materialize a host-visible view of the buffer.
    ///
    /// Blocks until all device work on the buffer has drained, then copies
    /// the device contents to the host side (the caller's slice for borrowed
    /// vectors). The returned guard dereferences to the element slice;
    /// mutations are uploaded back to the device when it drops.
    pub fn map(&mut self) -> Result<MapGuard<'_, 'a, T>> {
        let mut host = vec![T::zeroed(); self.len];
        self.read_back(&mut host)?;

        let staged = match &mut self.host {
            HostBinding::Borrowed(slice) => {
                slice.copy_from_slice(&host);
                Vec::new()
            }
            HostBinding::Owned => host,
        };

        Ok(MapGuard {
            vector: self,
            staged,
            written: false,
        })
    }

    fn read_back(&self, out: &mut [T]) -> Result<()> {
        let size = (out.len() * std::mem::size_of::<T>()) as u64;
        let staging = self.client.create_staging_buffer("bulkr staging", size);

        let mut encoder =
            self.client
                .wgpu_device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("device_vector_readback"),
                });
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &staging, 0, size);
        self.client.submit_and_wait(encoder, "map_buffer")?;

        self.client.read_buffer(&staging, out, "map_buffer")
    }
}

fn create_data_buffer<T: DeviceType>(client: &GpuClient, len: usize) -> Result<Buffer> {
    if len == 0 {
        return Err(Error::InvalidArgument {
            arg: "len",
            reason: "device vectors must hold at least one element".into(),
        });
    }
    let size = (len * std::mem::size_of::<T>()) as u64;
    // wgpu requires 4-byte-aligned buffer sizes.
    let aligned = size.div_ceil(4) * 4;
    Ok(client.create_storage_buffer("bulkr device vector", aligned))
}

/// RAII handle representing a host-visible view of a [`DeviceVector`].
pub struct MapGuard<'v, 'a, T: DeviceType> {
    vector: &'v mut DeviceVector<'a, T>,
    staged: Vec<T>,
    written: bool,
}

impl<T: DeviceType> Deref for MapGuard<'_, '_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match &self.vector.host {
            HostBinding::Borrowed(slice) => slice,
            HostBinding::Owned => &self.staged,
        }
    }
}

impl<T: DeviceType> DerefMut for MapGuard<'_, '_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.written = true;
        match &mut self.vector.host {
            HostBinding::Borrowed(slice) => slice,
            HostBinding::Owned => &mut self.staged,
        }
    }
}

impl<T: DeviceType> Drop for MapGuard<'_, '_, T> {
    fn drop(&mut self) {
        if self.written {
            let data: &[T] = self;
            self.vector.client.write_buffer(&self.vector.buffer, data);
            // Staged writes take effect at the next submission; flush with an
            // empty one so the upload lands before the guard is gone.
            let encoder = self
                .vector
                .client
                .wgpu_device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("map_guard_writeback"),
                });
            let _ = self.vector.client.submit_and_wait(encoder, "unmap");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::GpuDevice;

    fn test_client() -> Option<GpuClient> {
        match GpuClient::new_uncached(GpuDevice::new(0)) {
            Ok(client) => Some(client),
            Err(e) => {
                println!("No GPU available, skipping test: {}", e);
                None
            }
        }
    }

    #[test]
    fn test_owned_roundtrip() {
        let Some(client) = test_client() else { return };

        let data: Vec<u32> = vec![5, 3, 8, 1];
        let vector = DeviceVector::from_slice(&client, &data).unwrap();
        assert_eq!(vector.len(), 4);
        assert_eq!(vector.to_vec().unwrap(), data);
    }

    #[test]
    fn test_borrowed_map_restores_host_view() {
        let Some(client) = test_client() else { return };

        let mut data: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0];
        let expected = data.clone();
        let mut vector = DeviceVector::from_host_slice(&client, &mut data).unwrap();

        {
            let guard = vector.map().unwrap();
            assert_eq!(&guard[..], &expected[..]);
        }
        drop(vector);
        assert_eq!(data, expected);
    }

    #[test]
    fn test_map_guard_writes_back_on_drop() {
        let Some(client) = test_client() else { return };

        let mut vector = DeviceVector::<u32>::from_slice(&client, &[0, 0, 0, 0]).unwrap();
        {
            let mut guard = vector.map().unwrap();
            guard[2] = 42;
        }
        assert_eq!(vector.to_vec().unwrap(), vec![0, 0, 42, 0]);
    }

    #[test]
    fn test_zero_length_rejected() {
        let Some(client) = test_client() else { return };

        assert!(matches!(
            DeviceVector::<u32>::with_len(&client, 0),
            Err(Error::InvalidArgument { .. })
        ));
    }
}
