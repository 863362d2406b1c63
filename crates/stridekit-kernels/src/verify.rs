//! Output verification.
//!
//! Element-wise comparison of kernel output against the reference under
//! an absolute tolerance, producing a [`Verdict`] with the mismatch
//! count and the largest observed deviation. A failing verdict is data,
//! not an error: the run completed, only the numerical check failed.
//!
//! Also provides the coarser distribution check used when the pipeline
//! under test produces pseudo-random rather than deterministic output:
//! values normalized into `[0, 1]` should average close to 0.5.

use stridekit_common::ArrayLayout;

use crate::nd;

/// Tolerance rule deciding whether two computed values are equal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TolerancePolicy {
    /// Maximum accepted absolute deviation.
    pub absolute: f32,
}

impl TolerancePolicy {
    /// Policy for dense products: ten machine epsilons.
    pub fn gemm() -> Self {
        Self { absolute: 10.0 * f32::EPSILON }
    }

    /// Policy for transforms, scaled by the number of accumulated terms.
    pub fn transform(logical_len: usize) -> Self {
        Self { absolute: 10.0 * f32::EPSILON * logical_len.max(1) as f32 }
    }

    /// Explicit absolute bound.
    pub fn absolute(absolute: f32) -> Self {
        Self { absolute }
    }
}

/// Outcome of comparing a kernel's output against the reference.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Verdict {
    /// Number of elements whose deviation exceeded the tolerance.
    pub mismatch_count: usize,
    /// Largest absolute deviation observed over all compared elements.
    pub max_deviation: f32,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.mismatch_count == 0
    }

    fn record(&mut self, kernel: f32, reference: f32, tolerance: f32) {
        let deviation = (kernel - reference).abs();
        // A NaN on either side never compares equal.
        if !(deviation <= tolerance) {
            self.mismatch_count += 1;
        }
        if deviation > self.max_deviation || deviation.is_nan() {
            self.max_deviation = deviation;
        }
    }
}

/// Compare two equally sized value slices element-wise.
pub fn compare_f32(kernel: &[f32], reference: &[f32], policy: &TolerancePolicy) -> Verdict {
    assert_eq!(kernel.len(), reference.len(), "comparison length mismatch");
    let mut verdict = Verdict::default();
    for (&k, &r) in kernel.iter().zip(reference.iter()) {
        verdict.record(k, r, policy.absolute);
    }
    verdict
}

/// Compare only the logical elements of two buffers laid out by the
/// given descriptor, skipping padding.
pub fn compare_logical(
    kernel: &[f32],
    reference: &[f32],
    layout: &ArrayLayout,
    policy: &TolerancePolicy,
) -> Verdict {
    let components = layout.kind.components();
    let mut verdict = Verdict::default();
    for batch in 0..layout.batch_count {
        nd::for_each_index(&layout.logical, |idx| {
            let offset = layout.at(batch, idx) * components;
            for part in 0..components {
                verdict.record(kernel[offset + part], reference[offset + part], policy.absolute);
            }
        });
    }
    verdict
}

/// Check that values are plausibly uniform over `[min, max]`.
///
/// Normalizes each value into `[0, 1]` and compares the sample mean
/// against 0.5 with a fixed tolerance of 0.1. Returns 0.0 when the
/// sample looks uniform and the offending mean otherwise.
pub fn uniform_mean_departure(values: &[f32], min: f32, max: f32) -> f64 {
    const TOL: f64 = 0.1;

    if values.is_empty() {
        return 0.0;
    }
    let range = (max - min) as f64;
    let mut mean = 0.0f64;
    for &v in values {
        mean += (v as f64 - min as f64) / range;
    }
    mean /= values.len() as f64;

    if (mean - 0.5).abs() > TOL {
        mean
    } else {
        0.0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
