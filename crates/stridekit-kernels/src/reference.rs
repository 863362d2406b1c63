//! CPU reference engine.
//!
//! Ground truth for validation: straightforward, non-optimized
//! recomputation of each operation from the logical inputs. The code
//! reads operands through the layout's logical view only, so a stride or
//! padding bug in a kernel shows up as a mismatch instead of being
//! reproduced here.
//!
//! The transform is a direct discrete transform, quadratic in the batch
//! item size. Sizes in practice are at most dozens of elements, so
//! clarity wins over speed. Both directions are unnormalized, matching
//! vendor FFT convention: inverse(forward(x)) = N * x.
//!
//! Given identical inputs the engine is bit-for-bit reproducible; there
//! is no randomness here.

use num_complex::Complex64;

use crate::nd;
use stridekit_common::{GemmLayout, GemmSpec, TransformDirection, TransformLayout};

/// Reference batched dense product:
/// `C[i,j] = beta * C[i,j] + alpha * sum_p A'[i,p] * B'[p,j]`
/// where `A'`, `B'` are the logically transposed views.
///
/// `c` holds the initial output values on entry and the result on exit.
/// Slices must cover each operand's `total_elements()`.
pub fn gemm(spec: &GemmSpec, layout: &GemmLayout, a: &[f32], b: &[f32], c: &mut [f32]) {
    debug_assert!(a.len() >= layout.a.total_elements());
    debug_assert!(b.len() >= layout.b.total_elements());
    debug_assert!(c.len() >= layout.c.total_elements());

    for batch in 0..layout.batch_count() {
        for i in 0..layout.m {
            for j in 0..layout.n {
                let mut acc = 0.0f32;
                for p in 0..layout.k {
                    acc += a[layout.a.at(batch, i, p)] * b[layout.b.at(batch, p, j)];
                }
                let idx = layout.c.at(batch, i, j);
                c[idx] = spec.alpha * acc + spec.beta * c[idx];
            }
        }
    }
}

/// Reference batched discrete transform.
///
/// Reads the logical input elements of each batch item, computes every
/// logical output bin directly, and writes it through the output
/// descriptor. For real input only the half-spectrum bins described by
/// the output layout are produced. `output` must cover
/// `layout.output.len_f32()` values and keeps its padding untouched.
pub fn dft(
    layout: &TransformLayout,
    direction: TransformDirection,
    input: &[f32],
    output: &mut [f32],
) {
    debug_assert!(input.len() >= layout.input.len_f32());
    debug_assert!(output.len() >= layout.output.len_f32());

    let sign = match direction {
        TransformDirection::Forward => -1.0f64,
        TransformDirection::Inverse => 1.0f64,
    };
    let in_logical = &layout.input.logical;
    let in_components = layout.input.kind.components();
    let tau = std::f64::consts::TAU;

    for batch in 0..layout.batch_count() {
        // Gather the logical input values of this batch item, row-major.
        let mut values = Vec::with_capacity(layout.input.logical_len());
        nd::for_each_index(in_logical, |idx| {
            let offset = layout.input.at(batch, idx) * in_components;
            let value = if in_components == 2 {
                Complex64::new(input[offset] as f64, input[offset + 1] as f64)
            } else {
                Complex64::new(input[offset] as f64, 0.0)
            };
            values.push(value);
        });

        nd::for_each_index(&layout.output.logical, |bin| {
            let mut acc = Complex64::new(0.0, 0.0);
            let mut source = 0;
            nd::for_each_index(in_logical, |idx| {
                let mut angle = 0.0f64;
                for ((&b, &i), &extent) in bin.iter().zip(idx.iter()).zip(in_logical.iter()) {
                    angle += (b * i) as f64 / extent as f64;
                }
                acc += values[source] * Complex64::from_polar(1.0, sign * tau * angle);
                source += 1;
            });

            let offset = layout.output.at(batch, bin) * 2;
            output[offset] = acc.re as f32;
            output[offset + 1] = acc.im as f32;
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
