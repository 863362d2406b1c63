//! Kernel providers, buffer management, and output verification for
//! strided batched numeric operations.
//!
//! The numeric engine is injected behind the [`KernelProvider`] trait:
//! the crate never implements a fast kernel itself, only the addressing
//! the kernel consumes, the host/device buffers it reads and writes, a
//! CPU reference to validate against, and the comparison that turns both
//! outputs into a verdict.

use std::sync::{Arc, OnceLock};

use stridekit_common::{GemmLayout, KernelError, Result, TransformDirection, TransformLayout};

pub mod device;
pub mod host;
mod nd;
pub mod reference;
pub mod run;
pub mod verify;

#[cfg(feature = "cuda")]
pub mod cuda;

use device::{DeviceAllocator, DeviceBuffer};

/// Kernel provider trait: the capability of running a batched numeric
/// operation using the addressing in a layout descriptor.
pub trait KernelProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_available(&self) -> bool;

    /// The allocator whose regions this provider can execute on. Buffers
    /// handed to the provider must have been acquired through it.
    fn allocator(&self) -> Arc<dyn DeviceAllocator>;

    /// Compute `C := alpha * op(A) * op(B) + beta * C` per batch item.
    fn gemm_strided_batched(
        &self,
        alpha: f32,
        a: &DeviceBuffer,
        b: &DeviceBuffer,
        beta: f32,
        c: &mut DeviceBuffer,
        layout: &GemmLayout,
    ) -> Result<()>;

    /// Compute the batched discrete transform described by the layout.
    ///
    /// Passing `None` for `output` requests in-place execution: the
    /// result is written over `input` using the output descriptor's
    /// addressing.
    fn dft_strided_batched(
        &self,
        input: &mut DeviceBuffer,
        output: Option<&mut DeviceBuffer>,
        layout: &TransformLayout,
        direction: TransformDirection,
    ) -> Result<()>;
}

/// Kernel manager selecting the preferred available provider, GPU first.
pub struct KernelManager {
    providers: Vec<Box<dyn KernelProvider>>,
    selected: OnceLock<usize>,
}

impl KernelManager {
    pub fn new() -> Self {
        let mut providers: Vec<Box<dyn KernelProvider>> = vec![Box::new(host::HostKernel::new())];

        #[cfg(feature = "cuda")]
        {
            match cuda::CudaKernel::new() {
                Ok(kernel) if kernel.is_available() => {
                    log::info!("CUDA kernel available, adding to providers");
                    providers.insert(0, Box::new(kernel));
                }
                Ok(_) => log::debug!("CUDA kernel constructed but reports unavailable"),
                Err(e) => log::debug!("CUDA kernel not available: {e}"),
            }
        }

        Self { providers, selected: OnceLock::new() }
    }

    /// Select the preferred available provider, caching the choice.
    pub fn select_best(&self) -> Result<&dyn KernelProvider> {
        let selected = self.selected.get_or_init(|| {
            for (i, provider) in self.providers.iter().enumerate() {
                if provider.is_available() {
                    log::info!("selected kernel provider: {}", provider.name());
                    return i;
                }
            }
            self.providers.len()
        });

        match self.providers.get(*selected) {
            Some(provider) => Ok(provider.as_ref()),
            None => Err(KernelError::NoProvider.into()),
        }
    }

    /// Names of all providers that report themselves available.
    pub fn list_available_providers(&self) -> Vec<&'static str> {
        self.providers
            .iter()
            .filter(|p| p.is_available())
            .map(|p| p.name())
            .collect()
    }
}

impl Default for KernelManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Select a GPU provider, if one was compiled in and is usable.
#[cfg(feature = "cuda")]
pub fn select_gpu_kernel() -> Result<Box<dyn KernelProvider>> {
    let kernel = cuda::CudaKernel::new()?;
    if kernel.is_available() {
        Ok(Box::new(kernel))
    } else {
        Err(KernelError::NoProvider.into())
    }
}

#[cfg(not(feature = "cuda"))]
pub fn select_gpu_kernel() -> Result<Box<dyn KernelProvider>> {
    Err(KernelError::NoProvider.into())
}

pub use device::{AllocatorStats, BufferPool, HostAllocator, PoolStats, TransferDirection};
pub use host::HostKernel;
pub use run::{run_gemm, run_transform, GemmFill, RunReport};
pub use verify::{compare_f32, compare_logical, uniform_mean_departure, TolerancePolicy, Verdict};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_always_has_host_provider() {
        let manager = KernelManager::new();
        let provider = manager.select_best().unwrap();
        assert!(provider.is_available());
        assert!(manager.list_available_providers().contains(&provider.name()));
    }

    #[test]
    fn manager_selection_is_stable() {
        let manager = KernelManager::new();
        let first = manager.select_best().unwrap().name();
        for _ in 0..4 {
            assert_eq!(manager.select_best().unwrap().name(), first);
        }
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn gpu_selection_fails_without_cuda_feature() {
        assert!(select_gpu_kernel().is_err());
    }
}
