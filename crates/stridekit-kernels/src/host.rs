//! Host kernel provider.
//!
//! Executes batched products and transforms directly on the host-backed
//! allocator's regions, using the *physical* descriptor addressing
//! (leading dimensions, strides, batch distances) exactly the way an
//! accelerated engine would. Always available; serves as the injected
//! engine in environments without a GPU and as the dispatch target the
//! validation pipeline exercises in tests.

use std::sync::Arc;

use num_complex::Complex64;

use crate::device::{DeviceAllocator, DeviceBuffer, HostAllocator};
use crate::nd;
use crate::KernelProvider;
use stridekit_common::{
    GemmLayout, KernelError, Placement, Result, TransformDirection, TransformLayout,
};

/// Kernel provider executing on host memory.
pub struct HostKernel {
    allocator: Arc<HostAllocator>,
}

impl HostKernel {
    /// Create a provider with its own allocator.
    pub fn new() -> Self {
        Self { allocator: Arc::new(HostAllocator::new()) }
    }

    /// Create a provider over an existing allocator, sharing regions
    /// with other users of it.
    pub fn with_allocator(allocator: Arc<HostAllocator>) -> Self {
        Self { allocator }
    }

    fn check_len(buffer: &DeviceBuffer, required_f32: usize, operand: &str) -> Result<()> {
        let required = required_f32 * std::mem::size_of::<f32>();
        if buffer.len_bytes() < required {
            return Err(KernelError::ExecutionFailed {
                reason: format!(
                    "{operand} buffer too small: expected >= {required} bytes, got {}",
                    buffer.len_bytes()
                ),
            }
            .into());
        }
        Ok(())
    }
}

impl Default for HostKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelProvider for HostKernel {
    fn name(&self) -> &'static str {
        "host"
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
        Self::check_len(a, layout.a.total_elements(), "A")?;
        Self::check_len(b, layout.b.total_elements(), "B")?;
        Self::check_len(c, layout.c.total_elements(), "C")?;

        log::debug!(
            "host gemm: m={} n={} k={} batch={}",
            layout.m,
            layout.n,
            layout.k,
            layout.batch_count()
        );

        let a_bytes = self.allocator.clone_region(a.region())?;
        let b_bytes = self.allocator.clone_region(b.region())?;
        let mut c_bytes = self.allocator.clone_region(c.region())?;

        let av: &[f32] = bytemuck::cast_slice(&a_bytes);
        let bv: &[f32] = bytemuck::cast_slice(&b_bytes);
        let cv: &mut [f32] = bytemuck::cast_slice_mut(&mut c_bytes);

        for batch in 0..layout.batch_count() {
            for col in 0..layout.n {
                for row in 0..layout.m {
                    let mut acc = 0.0f32;
                    for p in 0..layout.k {
                        acc += av[layout.a.at(batch, row, p)] * bv[layout.b.at(batch, p, col)];
                    }
                    let idx = layout.c.at(batch, row, col);
                    cv[idx] = alpha * acc + beta * cv[idx];
                }
            }
        }

        self.allocator.write_region(c.region(), &c_bytes)
    }

    fn dft_strided_batched(
        &self,
        input: &mut DeviceBuffer,
        output: Option<&mut DeviceBuffer>,
        layout: &TransformLayout,
        direction: TransformDirection,
    ) -> Result<()> {
        Self::check_len(input, layout.input.len_f32(), "input")?;
        match (&output, layout.placement) {
            (None, Placement::OutOfPlace) => {
                return Err(KernelError::ExecutionFailed {
                    reason: "in-place execution requested against an out-of-place layout".into(),
                }
                .into());
            }
            (Some(_), Placement::InPlace) => {
                return Err(KernelError::ExecutionFailed {
                    reason: "separate output supplied for an in-place layout".into(),
                }
                .into());
            }
            _ => {}
        }
        if let Some(out) = &output {
            Self::check_len(out, layout.output.len_f32(), "output")?;
        }

        log::debug!(
            "host dft: extents={:?} batch={} direction={:?} in_place={}",
            layout.input.logical,
            layout.batch_count(),
            direction,
            output.is_none()
        );

        let in_bytes = self.allocator.clone_region(input.region())?;
        let mut out_bytes = match &output {
            Some(out) => self.allocator.clone_region(out.region())?,
            // In place: start from the input bytes so padding survives.
            None => in_bytes.clone(),
        };

        let iv: &[f32] = bytemuck::cast_slice(&in_bytes);
        let ov: &mut [f32] = bytemuck::cast_slice_mut(&mut out_bytes);

        let sign = match direction {
            TransformDirection::Forward => -1.0f64,
            TransformDirection::Inverse => 1.0f64,
        };
        let in_logical = &layout.input.logical;
        let in_components = layout.input.kind.components();

        // Per-dimension twiddle tables: twiddles[d][j] = exp(sign*i*2*pi*j/N_d).
        let twiddles: Vec<Vec<Complex64>> = in_logical
            .iter()
            .map(|&extent| {
                (0..extent)
                    .map(|j| {
                        Complex64::from_polar(
                            1.0,
                            sign * std::f64::consts::TAU * j as f64 / extent as f64,
                        )
                    })
                    .collect()
            })
            .collect();

        for batch in 0..layout.batch_count() {
            let mut values = Vec::with_capacity(layout.input.logical_len());
            nd::for_each_index(in_logical, |idx| {
                let offset = layout.input.at(batch, idx) * in_components;
                values.push(if in_components == 2 {
                    Complex64::new(iv[offset] as f64, iv[offset + 1] as f64)
                } else {
                    Complex64::new(iv[offset] as f64, 0.0)
                });
            });

            nd::for_each_index(&layout.output.logical, |bin| {
                let mut acc = Complex64::new(0.0, 0.0);
                let mut source = 0;
                nd::for_each_index(in_logical, |idx| {
                    let mut factor = Complex64::new(1.0, 0.0);
                    for (d, (&b, &i)) in bin.iter().zip(idx.iter()).enumerate() {
                        factor *= twiddles[d][(b * i) % in_logical[d]];
                    }
                    acc += values[source] * factor;
                    source += 1;
                });
                let offset = layout.output.at(batch, bin) * 2;
                ov[offset] = acc.re as f32;
                ov[offset + 1] = acc.im as f32;
            });
        }

        match output {
            Some(out) => self.allocator.write_region(out.region(), &out_bytes),
            None => self.allocator.write_region(input.region(), &out_bytes),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::BufferPool;
    use crate::reference;
    use stridekit_common::{plan_gemm, plan_transform, GemmSpec, TransformSpec};

    fn setup(kernel: &HostKernel) -> BufferPool {
        BufferPool::new(kernel.allocator())
    }

    fn assert_close(a: &[f32], b: &[f32], tol: f32) {
        assert_eq!(a.len(), b.len(), "length mismatch");
        for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            assert!((x - y).abs() <= tol, "mismatch at {i}: {x} vs {y} (tol {tol})");
        }
    }

    #[test]
    fn identity_product_with_accumulate() {
        // The classic unit case: A all ones, B identity, C ones,
        // alpha = beta = 1. Every output element is k + 1.
        let spec = GemmSpec::for_shape(5, 5, 5)
            .unwrap()
            .with_batch_count(3)
            .unwrap()
            .with_alpha_beta(1.0, 1.0);
        let layout = plan_gemm(&spec).unwrap();

        let kernel = HostKernel::new();
        let pool = setup(&kernel);

        let a_host = vec![1.0f32; layout.a.total_elements()];
        let mut b_host = vec![0.0f32; layout.b.total_elements()];
        for batch in 0..3 {
            let start = layout.b.offset_of(batch);
            stridekit_common::fill::fill_identity(
                &mut b_host[start..start + layout.b.batch_distance],
                5,
                5,
                layout.b.leading_dimension,
            );
        }
        let c_host = vec![1.0f32; layout.c.total_elements()];

        let a = pool.acquire_f32_init(&a_host).unwrap();
        let b = pool.acquire_f32_init(&b_host).unwrap();
        let mut c = pool.acquire_f32_init(&c_host).unwrap();
        a.upload().unwrap();
        b.upload().unwrap();
        c.upload().unwrap();

        kernel.gemm_strided_batched(1.0, &a, &b, 1.0, &mut c, &layout).unwrap();
        c.download().unwrap();

        let mut gold = c_host.clone();
        reference::gemm(&spec, &layout, &a_host, &b_host, &mut gold);

        // Derived from the reference, which lands on 6.0 for this case.
        assert_close(c.as_f32_slice(), &gold, 10.0 * f32::EPSILON);
        assert!((gold[0] - 6.0).abs() < 1e-6);
    }

    #[test]
    fn transposed_operands_match_reference() {
        let spec = GemmSpec::for_shape(3, 4, 5)
            .unwrap()
            .with_transpose(true, true)
            .with_batch_count(2)
            .unwrap()
            .with_alpha_beta(0.5, 0.25);
        let layout = plan_gemm(&spec).unwrap();

        let kernel = HostKernel::new();
        let pool = setup(&kernel);

        let a_host: Vec<f32> =
            (0..layout.a.total_elements()).map(|i| (i as f32 * 0.3).sin()).collect();
        let b_host: Vec<f32> =
            (0..layout.b.total_elements()).map(|i| (i as f32 * 0.7).cos()).collect();
        let c_host: Vec<f32> = (0..layout.c.total_elements()).map(|i| i as f32 * 0.01).collect();

        let a = pool.acquire_f32_init(&a_host).unwrap();
        let b = pool.acquire_f32_init(&b_host).unwrap();
        let mut c = pool.acquire_f32_init(&c_host).unwrap();
        a.upload().unwrap();
        b.upload().unwrap();
        c.upload().unwrap();

        kernel
            .gemm_strided_batched(spec.alpha, &a, &b, spec.beta, &mut c, &layout)
            .unwrap();
        c.download().unwrap();

        let mut gold = c_host.clone();
        reference::gemm(&spec, &layout, &a_host, &b_host, &mut gold);
        assert_close(c.as_f32_slice(), &gold, 1e-5);
    }

    #[test]
    fn gemm_rejects_undersized_buffer() {
        let spec = GemmSpec::for_shape(4, 4, 4).unwrap();
        let layout = plan_gemm(&spec).unwrap();
        let kernel = HostKernel::new();
        let pool = setup(&kernel);

        let a = pool.acquire_f32(8).unwrap(); // needs 16
        let b = pool.acquire_f32(16).unwrap();
        let mut c = pool.acquire_f32(16).unwrap();
        assert!(kernel.gemm_strided_batched(1.0, &a, &b, 1.0, &mut c, &layout).is_err());
    }

    #[test]
    fn out_of_place_r2c_length_9() {
        // Length-9 iota input: 5 half-spectrum bins, DC = 45.
        let spec = TransformSpec::real_to_complex(&[9])
            .unwrap()
            .with_placement(Placement::OutOfPlace);
        let layout = plan_transform(&spec).unwrap();

        let kernel = HostKernel::new();
        let pool = setup(&kernel);

        let mut input_host = vec![0.0f32; layout.input.len_f32()];
        stridekit_common::fill::fill_iota(&mut input_host);

        let mut input = pool.acquire_f32_init(&input_host).unwrap();
        let mut output = pool.acquire_f32(layout.output.len_f32()).unwrap();
        input.upload().unwrap();

        kernel
            .dft_strided_batched(
                &mut input,
                Some(&mut output),
                &layout,
                TransformDirection::Forward,
            )
            .unwrap();
        output.download().unwrap();

        let mut gold = vec![0.0f32; layout.output.len_f32()];
        reference::dft(&layout, TransformDirection::Forward, &input_host, &mut gold);

        let bins = output.as_c32_slice();
        assert_eq!(bins.len(), 5);
        assert!((bins[0].re - 45.0).abs() < 1e-3, "DC = {}", bins[0].re);
        assert_close(output.as_f32_slice(), &gold, 1e-3);
    }

    #[test]
    fn in_place_r2c_2d_batched() {
        let spec = TransformSpec::real_to_complex(&[4, 5]).unwrap().with_batch_count(3).unwrap();
        let layout = plan_transform(&spec).unwrap();

        let kernel = HostKernel::new();
        let pool = setup(&kernel);

        // Fill logical positions only; padding stays zero.
        let mut input_host = vec![0.0f32; layout.input.len_f32()];
        let mut next = 0.5f32;
        for batch in 0..3 {
            for i in 0..4 {
                for j in 0..5 {
                    input_host[layout.input.at(batch, &[i, j])] = next;
                    next = (next * 1.3).fract() + 0.1;
                }
            }
        }

        let mut data = pool.acquire_f32_init(&input_host).unwrap();
        data.upload().unwrap();

        kernel
            .dft_strided_batched(&mut data, None, &layout, TransformDirection::Forward)
            .unwrap();
        data.download().unwrap();

        let mut gold = vec![0.0f32; layout.output.len_f32()];
        reference::dft(&layout, TransformDirection::Forward, &input_host, &mut gold);

        // Compare the logical bins through the output descriptor.
        for batch in 0..3 {
            for i in 0..4 {
                for j in 0..3 {
                    let offset = layout.output.at(batch, &[i, j]) * 2;
                    let got = data.as_f32_slice();
                    assert!(
                        (got[offset] - gold[offset]).abs() < 1e-3
                            && (got[offset + 1] - gold[offset + 1]).abs() < 1e-3,
                        "bin ({batch}, {i}, {j}) mismatch"
                    );
                }
            }
        }
    }

    #[test]
    fn placement_and_handles_must_agree() {
        let kernel = HostKernel::new();
        let pool = setup(&kernel);

        let in_place = plan_transform(&TransformSpec::real_to_complex(&[8]).unwrap()).unwrap();
        let mut data = pool.acquire_f32(in_place.input.len_f32()).unwrap();
        let mut extra = pool.acquire_f32(in_place.output.len_f32()).unwrap();
        assert!(kernel
            .dft_strided_batched(
                &mut data,
                Some(&mut extra),
                &in_place,
                TransformDirection::Forward
            )
            .is_err());

        let out_of_place = plan_transform(
            &TransformSpec::real_to_complex(&[8])
                .unwrap()
                .with_placement(Placement::OutOfPlace),
        )
        .unwrap();
        let mut data = pool.acquire_f32(out_of_place.input.len_f32()).unwrap();
        assert!(kernel
            .dft_strided_batched(&mut data, None, &out_of_place, TransformDirection::Forward)
            .is_err());
    }

    #[test]
    fn c2c_matches_reference_both_directions() {
        for direction in [TransformDirection::Forward, TransformDirection::Inverse] {
            let spec = TransformSpec::complex_to_complex(&[4, 5], direction)
                .unwrap()
                .with_batch_count(2)
                .unwrap();
            let layout = plan_transform(&spec).unwrap();

            let kernel = HostKernel::new();
            let pool = setup(&kernel);

            let input_host: Vec<f32> =
                (0..layout.input.len_f32()).map(|i| (i as f32 * 0.17).sin()).collect();
            let mut data = pool.acquire_f32_init(&input_host).unwrap();
            data.upload().unwrap();

            kernel.dft_strided_batched(&mut data, None, &layout, direction).unwrap();
            data.download().unwrap();

            let mut gold = vec![0.0f32; layout.output.len_f32()];
            reference::dft(&layout, direction, &input_host, &mut gold);
            assert_close(data.as_f32_slice(), &gold, 1e-3);
        }
    }
}
