//! Host/device buffer management.
//!
//! A [`DeviceBuffer`] pairs a host-resident vector with a device region
//! allocated through a [`DeviceAllocator`]. The pairing is exclusive:
//! the buffer owns both sides, transfers between them are the explicit
//! [`DeviceBuffer::upload`] and [`DeviceBuffer::download`] calls, and
//! `download` is the synchronization point after which kernel output may
//! be read on the host.
//!
//! Release is `Drop`-driven so it happens on every exit path, including
//! early returns from failed stages. The device region is freed first,
//! then the host vector.
//!
//! [`HostAllocator`] backs device regions with host memory. It is always
//! available, makes the whole pipeline testable without hardware, and
//! counts its calls so tests can assert that planning failures never
//! reach the allocator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use num_complex::Complex32;
use stridekit_common::{ResourceError, Result};

// ── Transfer direction ────────────────────────────────────────────────

/// Direction of a host/device transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferDirection {
    HostToDevice,
    DeviceToHost,
}

impl TransferDirection {
    pub fn label(self) -> &'static str {
        match self {
            TransferDirection::HostToDevice => "host-to-device",
            TransferDirection::DeviceToHost => "device-to-host",
        }
    }
}

// ── DeviceRegion / DeviceAllocator ────────────────────────────────────

/// Opaque handle to a device-resident allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRegion {
    pub id: u64,
    pub bytes: usize,
}

/// Device memory capability: allocate, free, and transfer.
///
/// Allocation and transfer failures are [`ResourceError`]s and abort the
/// run. `free` is infallible by design so it can run from `Drop`.
pub trait DeviceAllocator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Allocate a zero-initialized device region.
    fn allocate(&self, bytes: usize) -> Result<DeviceRegion>;

    /// Release a region. Unknown regions are ignored with a warning.
    fn free(&self, region: &DeviceRegion);

    /// Synchronous host-to-device copy of the full region.
    fn upload(&self, host: &[u8], region: &DeviceRegion) -> Result<()>;

    /// Synchronous device-to-host copy of the full region. Blocks until
    /// the transfer, and any kernel work queued before it, is complete.
    fn download(&self, region: &DeviceRegion, host: &mut [u8]) -> Result<()>;
}

// ── HostAllocator ─────────────────────────────────────────────────────

/// Cumulative call counters for an allocator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    pub allocations: u64,
    pub frees: u64,
    pub uploads: u64,
    pub downloads: u64,
    pub live_bytes: usize,
}

#[derive(Default)]
struct HostAllocatorInner {
    regions: HashMap<u64, Vec<u8>>,
    next_id: u64,
    stats: AllocatorStats,
}

/// Allocator backing device regions with host memory.
#[derive(Default)]
pub struct HostAllocator {
    inner: Mutex<HostAllocatorInner>,
}

impl HostAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the call counters.
    pub fn stats(&self) -> AllocatorStats {
        self.inner.lock().expect("allocator lock poisoned").stats.clone()
    }

    /// Copy a region's current contents out, for kernel execution.
    pub(crate) fn clone_region(&self, region: &DeviceRegion) -> Result<Vec<u8>> {
        let inner = self.inner.lock().expect("allocator lock poisoned");
        match inner.regions.get(&region.id) {
            Some(bytes) => Ok(bytes.clone()),
            None => Err(ResourceError::UnknownRegion { id: region.id }.into()),
        }
    }

    /// Overwrite a region's contents, for kernel execution.
    pub(crate) fn write_region(&self, region: &DeviceRegion, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().expect("allocator lock poisoned");
        match inner.regions.get_mut(&region.id) {
            Some(stored) => {
                if stored.len() != bytes.len() {
                    return Err(ResourceError::SizeMismatch {
                        host: bytes.len(),
                        device: stored.len(),
                    }
                    .into());
                }
                stored.copy_from_slice(bytes);
                Ok(())
            }
            None => Err(ResourceError::UnknownRegion { id: region.id }.into()),
        }
    }
}

impl DeviceAllocator for HostAllocator {
    fn name(&self) -> &'static str {
        "host"
    }

    fn allocate(&self, bytes: usize) -> Result<DeviceRegion> {
        let mut inner = self.inner.lock().expect("allocator lock poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        inner.regions.insert(id, vec![0u8; bytes]);
        inner.stats.allocations += 1;
        inner.stats.live_bytes += bytes;
        Ok(DeviceRegion { id, bytes })
    }

    fn free(&self, region: &DeviceRegion) {
        let mut inner = self.inner.lock().expect("allocator lock poisoned");
        if inner.regions.remove(&region.id).is_some() {
            inner.stats.frees += 1;
            inner.stats.live_bytes -= region.bytes;
        } else {
            log::warn!("free of unknown device region {}", region.id);
        }
    }

    fn upload(&self, host: &[u8], region: &DeviceRegion) -> Result<()> {
        let mut inner = self.inner.lock().expect("allocator lock poisoned");
        let Some(stored) = inner.regions.get_mut(&region.id) else {
            return Err(ResourceError::UnknownRegion { id: region.id }.into());
        };
        if stored.len() != host.len() {
            return Err(ResourceError::SizeMismatch { host: host.len(), device: stored.len() }
                .into());
        }
        stored.copy_from_slice(host);
        inner.stats.uploads += 1;
        log::trace!(
            "{} transfer of {} bytes to region {}",
            TransferDirection::HostToDevice.label(),
            host.len(),
            region.id
        );
        Ok(())
    }

    fn download(&self, region: &DeviceRegion, host: &mut [u8]) -> Result<()> {
        let mut inner = self.inner.lock().expect("allocator lock poisoned");
        let Some(stored) = inner.regions.get(&region.id) else {
            return Err(ResourceError::UnknownRegion { id: region.id }.into());
        };
        if stored.len() != host.len() {
            return Err(ResourceError::SizeMismatch { host: host.len(), device: stored.len() }
                .into());
        }
        host.copy_from_slice(stored);
        inner.stats.downloads += 1;
        log::trace!(
            "{} transfer of {} bytes from region {}",
            TransferDirection::DeviceToHost.label(),
            host.len(),
            region.id
        );
        Ok(())
    }
}

// ── DeviceBuffer ──────────────────────────────────────────────────────

/// Paired host/device allocation of identical size.
///
/// Valid only between acquisition and drop; the device region is
/// released on drop before the host side.
pub struct DeviceBuffer {
    region: DeviceRegion,
    host: Vec<u8>,
    allocator: Arc<dyn DeviceAllocator>,
}

impl DeviceBuffer {
    /// Copy the host side to the device region.
    pub fn upload(&self) -> Result<()> {
        self.allocator.upload(&self.host, &self.region)
    }

    /// Copy the device region to the host side, blocking until complete.
    pub fn download(&mut self) -> Result<()> {
        self.allocator.download(&self.region, &mut self.host)
    }

    pub fn region(&self) -> &DeviceRegion {
        &self.region
    }

    pub fn len_bytes(&self) -> usize {
        self.host.len()
    }

    /// Host side viewed as `f32`.
    pub fn as_f32_slice(&self) -> &[f32] {
        bytemuck::cast_slice(&self.host)
    }

    /// Host side viewed as mutable `f32`.
    pub fn as_f32_mut_slice(&mut self) -> &mut [f32] {
        bytemuck::cast_slice_mut(&mut self.host)
    }

    /// Host side viewed as interleaved complex values.
    pub fn as_c32_slice(&self) -> &[Complex32] {
        bytemuck::cast_slice(&self.host)
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        // Device side first; the host vector follows when fields drop.
        self.allocator.free(&self.region);
    }
}

// ── BufferPool ────────────────────────────────────────────────────────

/// Acquisition counters for a [`BufferPool`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub acquired: u64,
    pub bytes_acquired: usize,
}

/// Pool handing out paired host/device buffers sized by a layout's
/// element count.
pub struct BufferPool {
    allocator: Arc<dyn DeviceAllocator>,
    stats: Mutex<PoolStats>,
}

impl BufferPool {
    pub fn new(allocator: Arc<dyn DeviceAllocator>) -> Self {
        Self { allocator, stats: Mutex::new(PoolStats::default()) }
    }

    pub fn allocator(&self) -> Arc<dyn DeviceAllocator> {
        Arc::clone(&self.allocator)
    }

    /// Acquire a zero-initialized buffer holding `elements` f32 values.
    pub fn acquire_f32(&self, elements: usize) -> Result<DeviceBuffer> {
        self.acquire_bytes(elements * std::mem::size_of::<f32>(), None)
    }

    /// Acquire a buffer initialized with the given host contents.
    pub fn acquire_f32_init(&self, initial: &[f32]) -> Result<DeviceBuffer> {
        self.acquire_bytes(std::mem::size_of_val(initial), Some(bytemuck::cast_slice(initial)))
    }

    fn acquire_bytes(&self, bytes: usize, initial: Option<&[u8]>) -> Result<DeviceBuffer> {
        let region = self.allocator.allocate(bytes)?;
        let host = match initial {
            Some(data) => data.to_vec(),
            None => vec![0u8; bytes],
        };

        let mut stats = self.stats.lock().expect("pool lock poisoned");
        stats.acquired += 1;
        stats.bytes_acquired += bytes;

        Ok(DeviceBuffer { region, host, allocator: Arc::clone(&self.allocator) })
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.lock().expect("pool lock poisoned").clone()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
