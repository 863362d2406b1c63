//! CUDA kernel provider using cudarc 0.17.
//!
//! The product path dispatches to cuBLAS `gemm_strided_batched`; the
//! transform path launches a naive NVRTC-compiled kernel (there is no
//! cudarc binding for the vendor FFT library). The context, stream, and
//! BLAS handle are acquired on construction and released when the
//! provider drops, so the session lifecycle is scoped rather than a
//! create/destroy pair the caller has to remember.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cudarc::cublas::sys::cublasOperation_t;
use cudarc::cublas::{CudaBlas, Gemm, GemmConfig, StridedBatchedConfig};
use cudarc::driver::{CudaContext, CudaFunction, CudaModule, CudaSlice, CudaStream, LaunchConfig, PushKernelArg};
use cudarc::nvrtc::compile_ptx;

use crate::device::{DeviceAllocator, DeviceBuffer, DeviceRegion, TransferDirection};
use crate::KernelProvider;
use stridekit_common::{
    GemmLayout, KernelError, Placement, ResourceError, Result, TransformDirection, TransformLayout,
};

// ── CudaAllocator ─────────────────────────────────────────────────────

#[derive(Default)]
struct CudaAllocatorInner {
    regions: HashMap<u64, CudaSlice<f32>>,
    next_id: u64,
}

/// Device allocator backed by a CUDA stream. Regions are `f32` slices;
/// byte sizes must be 4-aligned, which every layout guarantees.
pub struct CudaAllocator {
    stream: Arc<CudaStream>,
    inner: Mutex<CudaAllocatorInner>,
}

impl CudaAllocator {
    fn new(stream: Arc<CudaStream>) -> Self {
        Self { stream, inner: Mutex::new(CudaAllocatorInner::default()) }
    }

    /// Take ownership of a region's slice for a kernel dispatch.
    fn take(&self, region: &DeviceRegion) -> Result<CudaSlice<f32>> {
        let mut inner = self.inner.lock().expect("allocator lock poisoned");
        inner
            .regions
            .remove(&region.id)
            .ok_or_else(|| ResourceError::UnknownRegion { id: region.id }.into())
    }

    /// Return a slice taken with [`Self::take`].
    fn put_back(&self, region: &DeviceRegion, slice: CudaSlice<f32>) {
        let mut inner = self.inner.lock().expect("allocator lock poisoned");
        inner.regions.insert(region.id, slice);
    }
}

impl DeviceAllocator for CudaAllocator {
    fn name(&self) -> &'static str {
        "cuda"
    }

    fn allocate(&self, bytes: usize) -> Result<DeviceRegion> {
        let elements = bytes / std::mem::size_of::<f32>();
        let slice = self.stream.alloc_zeros::<f32>(elements).map_err(|e| {
            ResourceError::AllocationFailed { bytes, reason: format!("{e:?}") }
        })?;

        let mut inner = self.inner.lock().expect("allocator lock poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        inner.regions.insert(id, slice);
        Ok(DeviceRegion { id, bytes })
    }

    fn free(&self, region: &DeviceRegion) {
        let mut inner = self.inner.lock().expect("allocator lock poisoned");
        if inner.regions.remove(&region.id).is_none() {
            log::warn!("free of unknown device region {}", region.id);
        }
    }

    fn upload(&self, host: &[u8], region: &DeviceRegion) -> Result<()> {
        let mut inner = self.inner.lock().expect("allocator lock poisoned");
        let Some(slice) = inner.regions.get_mut(&region.id) else {
            return Err(ResourceError::UnknownRegion { id: region.id }.into());
        };
        let values: &[f32] = bytemuck::cast_slice(host);
        self.stream.memcpy_htod(values, slice).map_err(|e| ResourceError::TransferFailed {
            direction: TransferDirection::HostToDevice.label(),
            bytes: host.len(),
            reason: format!("{e:?}"),
        })?;
        Ok(())
    }

    fn download(&self, region: &DeviceRegion, host: &mut [u8]) -> Result<()> {
        let inner = self.inner.lock().expect("allocator lock poisoned");
        let Some(slice) = inner.regions.get(&region.id) else {
            return Err(ResourceError::UnknownRegion { id: region.id }.into());
        };
        let values: &mut [f32] = bytemuck::cast_slice_mut(host);
        self.stream.memcpy_dtoh(slice, values).map_err(|e| ResourceError::TransferFailed {
            direction: TransferDirection::DeviceToHost.label(),
            bytes: values.len() * 4,
            reason: format!("{e:?}"),
        })?;
        // The download is the synchronization point: block until every
        // previously queued kernel touching this data has finished.
        self.stream.synchronize().map_err(|e| ResourceError::TransferFailed {
            direction: TransferDirection::DeviceToHost.label(),
            bytes: values.len() * 4,
            reason: format!("sync failed: {e:?}"),
        })?;
        Ok(())
    }
}

// ── CudaKernel ────────────────────────────────────────────────────────

/// Kernel provider executing on a CUDA device.
pub struct CudaKernel {
    _ctx: Arc<CudaContext>,
    stream: Arc<CudaStream>,
    blas: CudaBlas,
    _module: Arc<CudaModule>,
    dft_function: CudaFunction,
    allocator: Arc<CudaAllocator>,
}

impl CudaKernel {
    /// Create a provider on device 0.
    pub fn new() -> Result<Self> {
        Self::new_with_device(0)
    }

    /// Create a provider on a specific device.
    pub fn new_with_device(device_id: usize) -> Result<Self> {
        log::info!("initializing CUDA kernel provider on device {device_id}");

        let ctx = CudaContext::new(device_id).map_err(|e| KernelError::GpuError {
            reason: format!("failed to create CUDA context for device {device_id}: {e:?}"),
        })?;
        let stream = ctx.default_stream();

        let blas = CudaBlas::new(stream.clone()).map_err(|e| KernelError::GpuError {
            reason: format!("failed to create cuBLAS handle: {e:?}"),
        })?;

        let ptx = compile_ptx(include_str!("kernels/stride_dft.cu")).map_err(|e| {
            KernelError::GpuError { reason: format!("failed to compile DFT PTX: {e:?}") }
        })?;
        let module = ctx.load_module(ptx).map_err(|e| KernelError::GpuError {
            reason: format!("failed to load DFT module: {e:?}"),
        })?;
        let dft_function = module.load_function("stride_dft_batched").map_err(|e| {
            KernelError::GpuError { reason: format!("failed to load DFT function: {e:?}") }
        })?;

        let allocator = Arc::new(CudaAllocator::new(stream.clone()));
        Ok(Self { _ctx: ctx, stream, blas, _module: module, dft_function, allocator })
    }

    fn operation_for(row_stride: usize) -> cublasOperation_t {
        // An untransposed column-major operand has unit row stride; a
        // transposed one has its contiguous dimension on the reduction
        // axis.
        if row_stride == 1 {
            cublasOperation_t::CUBLAS_OP_N
        } else {
            cublasOperation_t::CUBLAS_OP_T
        }
    }
}

/// Right-align extents into three slots, padding leading slots with 1.
fn pad3(extents: &[usize]) -> [i32; 3] {
    let mut out = [1i32; 3];
    let offset = 3 - extents.len();
    for (i, &e) in extents.iter().enumerate() {
        out[offset + i] = e as i32;
    }
    out
}

impl KernelProvider for CudaKernel {
    fn name(&self) -> &'static str {
        "cuda"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn allocator(&self) -> Arc<dyn DeviceAllocator> {
        Arc::clone(&self.allocator) as Arc<dyn DeviceAllocator>
    }

    fn gemm_strided_batched(
        &self,
        alpha: f32,
        a: &DeviceBuffer,
        b: &DeviceBuffer,
        beta: f32,
        c: &mut DeviceBuffer,
        layout: &GemmLayout,
    ) -> Result<()> {
        log::debug!(
            "cuda gemm: m={} n={} k={} batch={}",
            layout.m,
            layout.n,
            layout.k,
            layout.batch_count()
        );

        let a_slice = self.allocator.take(a.region())?;
        let b_slice = self.allocator.take(b.region())?;
        let mut c_slice = match self.allocator.take(c.region()) {
            Ok(slice) => slice,
            Err(e) => {
                self.allocator.put_back(a.region(), a_slice);
                self.allocator.put_back(b.region(), b_slice);
                return Err(e);
            }
        };

        let cfg = StridedBatchedConfig {
            gemm: GemmConfig {
                transa: Self::operation_for(layout.a.row_stride),
                transb: Self::operation_for(layout.b.row_stride),
                m: layout.m as i32,
                n: layout.n as i32,
                k: layout.k as i32,
                alpha,
                lda: layout.a.leading_dimension as i32,
                ldb: layout.b.leading_dimension as i32,
                beta,
                ldc: layout.c.leading_dimension as i32,
            },
            batch_size: layout.batch_count() as i32,
            stride_a: layout.a.batch_distance as i64,
            stride_b: layout.b.batch_distance as i64,
            stride_c: layout.c.batch_distance as i64,
        };

        let result = unsafe { self.blas.gemm_strided_batched(cfg, &a_slice, &b_slice, &mut c_slice) };

        self.allocator.put_back(a.region(), a_slice);
        self.allocator.put_back(b.region(), b_slice);
        self.allocator.put_back(c.region(), c_slice);

        result.map_err(|e| {
            KernelError::ExecutionFailed { reason: format!("cuBLAS gemm failed: {e:?}") }.into()
        })
    }

    fn dft_strided_batched(
        &self,
        input: &mut DeviceBuffer,
        output: Option<&mut DeviceBuffer>,
        layout: &TransformLayout,
        direction: TransformDirection,
    ) -> Result<()> {
        match (&output, layout.placement) {
            (None, Placement::OutOfPlace) | (Some(_), Placement::InPlace) => {
                return Err(KernelError::ExecutionFailed {
                    reason: "placement and output handle disagree".into(),
                }
                .into());
            }
            _ => {}
        }

        let in_logical = pad3(&layout.input.logical);
        let out_logical = pad3(&layout.output.logical);
        let in_embedded = pad3(&layout.input.embedded);
        let out_embedded = pad3(&layout.output.embedded);
        let sign = match direction {
            TransformDirection::Forward => -1.0f32,
            TransformDirection::Inverse => 1.0f32,
        };

        let in_slice = self.allocator.take(input.region())?;

        // The naive kernel reads every input element for every bin, so
        // in-place execution reads from a device-side snapshot.
        let (source, mut dest, dest_region) = match output {
            Some(out) => {
                let out_slice = match self.allocator.take(out.region()) {
                    Ok(slice) => slice,
                    Err(e) => {
                        self.allocator.put_back(input.region(), in_slice);
                        return Err(e);
                    }
                };
                (in_slice, out_slice, Some(out.region().clone()))
            }
            None => {
                let mut snapshot = match self.stream.alloc_zeros::<f32>(in_slice.len()) {
                    Ok(slice) => slice,
                    Err(e) => {
                        let bytes = in_slice.len() * std::mem::size_of::<f32>();
                        self.allocator.put_back(input.region(), in_slice);
                        return Err(ResourceError::AllocationFailed {
                            bytes,
                            reason: format!("{e:?}"),
                        }
                        .into());
                    }
                };
                if let Err(e) = self.stream.memcpy_dtod(&in_slice, &mut snapshot) {
                    self.allocator.put_back(input.region(), in_slice);
                    return Err(KernelError::GpuError {
                        reason: format!("snapshot copy failed: {e:?}"),
                    }
                    .into());
                }
                (snapshot, in_slice, None)
            }
        };

        let bins: i64 = layout.output.logical_len() as i64 * layout.batch_count() as i64;
        const BLOCK: u32 = 256;
        let grid = ((bins as u32).max(1)).div_ceil(BLOCK);
        let cfg = LaunchConfig { grid_dim: (grid, 1, 1), block_dim: (BLOCK, 1, 1), shared_mem_bytes: 0 };

        let in_distance = layout.input.batch_distance as i32;
        let out_distance = layout.output.batch_distance as i32;
        let batch_count = layout.batch_count() as i32;
        let in_components = layout.input.kind.components() as i32;

        let mut builder = self.stream.launch_builder(&self.dft_function);
        builder.arg(&source);
        builder.arg(&mut dest);
        builder.arg(&in_logical[0]);
        builder.arg(&in_logical[1]);
        builder.arg(&in_logical[2]);
        builder.arg(&out_logical[0]);
        builder.arg(&out_logical[1]);
        builder.arg(&out_logical[2]);
        builder.arg(&in_embedded[1]);
        builder.arg(&in_embedded[2]);
        builder.arg(&out_embedded[1]);
        builder.arg(&out_embedded[2]);
        builder.arg(&in_distance);
        builder.arg(&out_distance);
        builder.arg(&batch_count);
        builder.arg(&in_components);
        builder.arg(&sign);

        let result = unsafe { builder.launch(cfg) };

        match dest_region {
            Some(region) => {
                self.allocator.put_back(input.region(), source);
                self.allocator.put_back(&region, dest);
            }
            None => {
                // `dest` is the caller's region; the snapshot drops here.
                self.allocator.put_back(input.region(), dest);
            }
        }

        result.map_err(|e| {
            KernelError::ExecutionFailed { reason: format!("DFT launch failed: {e:?}") }.into()
        })
    }
}
