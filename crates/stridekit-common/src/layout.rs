//! Strided batched layout planning.
//!
//! # Layout model
//!
//! Every operand of a batched operation is addressed through a layout
//! descriptor: the physical (possibly padded) extents each logical
//! dimension is stored within, the element stride, and the distance
//! between consecutive batch items. The planner derives a complete,
//! self-consistent set of descriptors from a validated shape spec; the
//! descriptors are immutable afterwards and safe to share read-only.
//!
//! All offset arithmetic lives here. Kernels and reference code index
//! buffers exclusively through [`MatrixLayout::at`] and
//! [`ArrayLayout::at`], so a stride bug has exactly one place to hide.
//!
//! Matrices are column-major, matching dense-linear-algebra convention:
//! the leading dimension is the stride between successive entries of a
//! row. Multi-dimensional arrays are stored with the *last* extent
//! contiguous, matching the advanced transform interface convention.

use crate::error::ShapeError;
use crate::shape::{GemmSpec, Placement, TransformDomain, TransformSpec};

// ── ElementKind ───────────────────────────────────────────────────────

/// Scalar kind of an operand's elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// One `f32` per element.
    Real,
    /// Interleaved `(re, im)` pair, two `f32` per element.
    Complex,
}

impl ElementKind {
    /// Number of `f32` components per element.
    pub fn components(self) -> usize {
        match self {
            ElementKind::Real => 1,
            ElementKind::Complex => 2,
        }
    }
}

// ── MatrixLayout ──────────────────────────────────────────────────────

/// Physical addressing of one matrix operand of a batched product.
///
/// `row_stride`/`col_stride` address the *operated* view `op(X)`: entry
/// `op(X)[r, c]` of batch item `i` lives at
/// `offset_of(i) + r * row_stride + c * col_stride`. For an untransposed
/// column-major matrix this is `(1, leading_dimension)`; for a transposed
/// one the pair is swapped, so the contiguous stored dimension becomes
/// the reduction dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixLayout {
    /// Physical stride between successive entries of a row.
    pub leading_dimension: usize,
    /// Element step between `op(X)[r, c]` and `op(X)[r+1, c]`.
    pub row_stride: usize,
    /// Element step between `op(X)[r, c]` and `op(X)[r, c+1]`.
    pub col_stride: usize,
    /// Elements between the start of consecutive batch items.
    pub batch_distance: usize,
    /// Number of batch items.
    pub batch_count: usize,
}

impl MatrixLayout {
    /// Element offset of the start of a batch item.
    pub fn offset_of(&self, batch_index: usize) -> usize {
        batch_index * self.batch_distance
    }

    /// Element offset of `op(X)[row, col]` within one batch item.
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.row_stride + col * self.col_stride
    }

    /// Element offset of `op(X)[row, col]` of the given batch item.
    pub fn at(&self, batch_index: usize, row: usize, col: usize) -> usize {
        self.offset_of(batch_index) + self.index(row, col)
    }

    /// Total element count across all batch items.
    pub fn total_elements(&self) -> usize {
        self.batch_distance * self.batch_count
    }
}

// ── GemmLayout ────────────────────────────────────────────────────────

/// Complete layout of a batched product: one descriptor per operand role
/// plus the logical dimensions the kernels iterate over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GemmLayout {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub a: MatrixLayout,
    pub b: MatrixLayout,
    pub c: MatrixLayout,
}

impl GemmLayout {
    /// Assemble a layout from per-operand descriptors, checking that they
    /// agree on the batch count.
    pub fn new(
        m: usize,
        n: usize,
        k: usize,
        a: MatrixLayout,
        b: MatrixLayout,
        c: MatrixLayout,
    ) -> Result<Self, ShapeError> {
        for other in [b.batch_count, c.batch_count] {
            if other != a.batch_count {
                return Err(ShapeError::BatchCountMismatch { left: a.batch_count, right: other });
            }
        }
        Ok(Self { m, n, k, a, b, c })
    }

    pub fn batch_count(&self) -> usize {
        self.a.batch_count
    }
}

/// Plan the physical layout of a batched product.
///
/// Column-major addressing: an untransposed operand keeps its stored
/// rows as the leading dimension; a transposed operand's contiguous
/// dimension becomes the reduction dimension. The output `C` is never
/// transposed and always has leading dimension `m`.
///
/// # Errors
///
/// Re-validates the spec and fails with [`ShapeError`] before anything
/// is allocated.
pub fn plan_gemm(spec: &GemmSpec) -> Result<GemmLayout, ShapeError> {
    spec.validate()?;

    let (m, n, k) = (spec.m, spec.n, spec.k);
    let batch = spec.batch_count;

    // A stores m x k (or k x m when transposed).
    let a = if spec.transpose_a {
        let lda = k;
        MatrixLayout {
            leading_dimension: lda,
            row_stride: lda,
            col_stride: 1,
            batch_distance: lda * m,
            batch_count: batch,
        }
    } else {
        let lda = m;
        MatrixLayout {
            leading_dimension: lda,
            row_stride: 1,
            col_stride: lda,
            batch_distance: lda * k,
            batch_count: batch,
        }
    };

    // B stores k x n (or n x k when transposed).
    let b = if spec.transpose_b {
        let ldb = n;
        MatrixLayout {
            leading_dimension: ldb,
            row_stride: ldb,
            col_stride: 1,
            batch_distance: ldb * k,
            batch_count: batch,
        }
    } else {
        let ldb = k;
        MatrixLayout {
            leading_dimension: ldb,
            row_stride: 1,
            col_stride: ldb,
            batch_distance: ldb * n,
            batch_count: batch,
        }
    };

    let ldc = m;
    let c = MatrixLayout {
        leading_dimension: ldc,
        row_stride: 1,
        col_stride: ldc,
        batch_distance: ldc * n,
        batch_count: batch,
    };

    log::debug!(
        "planned gemm layout: m={m} n={n} k={k} batch={batch} lda={} ldb={} ldc={}",
        a.leading_dimension,
        b.leading_dimension,
        c.leading_dimension,
    );

    GemmLayout::new(m, n, k, a, b, c)
}

// ── ArrayLayout ───────────────────────────────────────────────────────

/// Physical addressing of one array operand of a batched transform.
///
/// `logical` are the extents the operation reads or writes; `embedded`
/// are the physical extents each dimension is stored within, which may
/// exceed the logical extent (padding, pitched placement). The last
/// dimension is contiguous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayLayout {
    pub logical: Vec<usize>,
    pub embedded: Vec<usize>,
    /// Stride, in elements, between consecutive innermost entries.
    pub element_stride: usize,
    /// Elements between the start of consecutive batch items.
    pub batch_distance: usize,
    pub batch_count: usize,
    pub kind: ElementKind,
}

impl ArrayLayout {
    /// Element offset of the start of a batch item.
    pub fn offset_of(&self, batch_index: usize) -> usize {
        batch_index * self.batch_distance
    }

    /// Element offset of a logical multi-index within one batch item.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if the index rank does not match the
    /// layout rank.
    pub fn index(&self, idx: &[usize]) -> usize {
        debug_assert_eq!(idx.len(), self.embedded.len(), "index rank mismatch");
        let mut flat = 0;
        for (&i, &extent) in idx.iter().zip(self.embedded.iter()) {
            flat = flat * extent + i;
        }
        flat * self.element_stride
    }

    /// Element offset of a logical multi-index of the given batch item.
    pub fn at(&self, batch_index: usize, idx: &[usize]) -> usize {
        self.offset_of(batch_index) + self.index(idx)
    }

    /// Product of the embedded extents.
    pub fn extent_product(&self) -> usize {
        self.embedded.iter().product()
    }

    /// Number of logical elements per batch item.
    pub fn logical_len(&self) -> usize {
        self.logical.iter().product()
    }

    /// Total element count across all batch items.
    pub fn total_elements(&self) -> usize {
        self.batch_distance * self.batch_count
    }

    /// Length of the `f32` buffer backing this operand.
    pub fn len_f32(&self) -> usize {
        self.total_elements() * self.kind.components()
    }

    /// Bytes per batch item, used to check in-place span compatibility.
    fn span_bytes(&self) -> usize {
        self.batch_distance * self.kind.components() * std::mem::size_of::<f32>()
    }
}

// ── TransformLayout ───────────────────────────────────────────────────

/// Complete layout of a batched transform: input and output descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformLayout {
    pub input: ArrayLayout,
    pub output: ArrayLayout,
    pub placement: Placement,
}

impl TransformLayout {
    /// Assemble a layout from per-operand descriptors, checking batch
    /// agreement and, for in-place placement, byte-span compatibility.
    pub fn new(
        input: ArrayLayout,
        output: ArrayLayout,
        placement: Placement,
    ) -> Result<Self, ShapeError> {
        if input.batch_count != output.batch_count {
            return Err(ShapeError::BatchCountMismatch {
                left: input.batch_count,
                right: output.batch_count,
            });
        }
        if placement == Placement::InPlace && input.span_bytes() != output.span_bytes() {
            return Err(ShapeError::InPlaceSpanMismatch {
                input: input.span_bytes(),
                output: output.span_bytes(),
            });
        }
        Ok(Self { input, output, placement })
    }

    pub fn batch_count(&self) -> usize {
        self.input.batch_count
    }

    pub fn is_real_to_complex(&self) -> bool {
        self.input.kind == ElementKind::Real
    }
}

/// Plan the physical layout of a batched transform.
///
/// Real-to-complex: the output's innermost embedded extent is
/// `floor(n/2) + 1` complex elements and its distance is derived from
/// that halved-plus-one embedding, never from the input distance. When
/// executing in place, the input's innermost dimension is padded to
/// `2 * (floor(n/2) + 1)` real elements so the complex result fits over
/// it. Complex-to-complex: input and output embeddings are identical.
///
/// # Errors
///
/// Re-validates the spec and fails with [`ShapeError`] before anything
/// is allocated.
pub fn plan_transform(spec: &TransformSpec) -> Result<TransformLayout, ShapeError> {
    spec.validate()?;

    let stride = 1;
    let (input_kind, output_kind) = match spec.domain {
        TransformDomain::RealToComplex => (ElementKind::Real, ElementKind::Complex),
        TransformDomain::ComplexToComplex => (ElementKind::Complex, ElementKind::Complex),
    };

    let input_embedded = match &spec.input_embed {
        Some(embed) => embed.clone(),
        None => spec.required_input_extents(),
    };
    let output_embedded = match &spec.output_embed {
        Some(embed) => embed.clone(),
        None => spec.required_output_extents(),
    };

    let input = ArrayLayout {
        logical: spec.extents.clone(),
        batch_distance: stride * input_embedded.iter().product::<usize>(),
        embedded: input_embedded,
        element_stride: stride,
        batch_count: spec.batch_count,
        kind: input_kind,
    };
    let output = ArrayLayout {
        logical: spec.output_extents(),
        batch_distance: stride * output_embedded.iter().product::<usize>(),
        embedded: output_embedded,
        element_stride: stride,
        batch_count: spec.batch_count,
        kind: output_kind,
    };

    log::debug!(
        "planned transform layout: extents={:?} batch={} inembed={:?} dist={} onembed={:?} dist={}",
        spec.extents,
        spec.batch_count,
        input.embedded,
        input.batch_distance,
        output.embedded,
        output.batch_distance,
    );

    TransformLayout::new(input, output, spec.placement)
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::TransformDirection;

    #[test]
    fn gemm_untransposed_strides() {
        let spec = GemmSpec::for_shape(5, 6, 7).unwrap().with_batch_count(3).unwrap();
        let layout = plan_gemm(&spec).unwrap();

        assert_eq!(layout.a.leading_dimension, 5);
        assert_eq!(layout.a.row_stride, 1);
        assert_eq!(layout.a.col_stride, 5);
        assert_eq!(layout.a.batch_distance, 5 * 7);

        assert_eq!(layout.b.leading_dimension, 7);
        assert_eq!(layout.b.batch_distance, 7 * 6);

        assert_eq!(layout.c.leading_dimension, 5);
        assert_eq!(layout.c.batch_distance, 5 * 6);
        assert_eq!(layout.c.total_elements(), 5 * 6 * 3);
    }

    #[test]
    fn gemm_transposed_strides() {
        let spec = GemmSpec::for_shape(5, 6, 7).unwrap().with_transpose(true, true);
        let layout = plan_gemm(&spec).unwrap();

        // A stored k x m: contiguous dimension is the reduction dimension.
        assert_eq!(layout.a.leading_dimension, 7);
        assert_eq!(layout.a.row_stride, 7);
        assert_eq!(layout.a.col_stride, 1);
        assert_eq!(layout.a.batch_distance, 7 * 5);

        // B stored n x k.
        assert_eq!(layout.b.leading_dimension, 6);
        assert_eq!(layout.b.row_stride, 6);
        assert_eq!(layout.b.col_stride, 1);
        assert_eq!(layout.b.batch_distance, 6 * 7);

        // C is never transposed.
        assert_eq!(layout.c.leading_dimension, 5);
        assert_eq!(layout.c.row_stride, 1);
    }

    #[test]
    fn gemm_matrix_indexing() {
        let spec = GemmSpec::for_shape(4, 4, 4).unwrap().with_batch_count(2).unwrap();
        let layout = plan_gemm(&spec).unwrap();

        // Column-major: element (r=2, c=3) of batch 1.
        assert_eq!(layout.c.at(1, 2, 3), 16 + 2 + 3 * 4);
        assert_eq!(layout.c.offset_of(1), 16);
    }

    #[test]
    fn gemm_planning_is_idempotent() {
        let spec = GemmSpec::for_shape(5, 5, 5)
            .unwrap()
            .with_batch_count(3)
            .unwrap()
            .with_transpose(true, false);
        assert_eq!(plan_gemm(&spec).unwrap(), plan_gemm(&spec).unwrap());
    }

    #[test]
    fn gemm_planner_revalidates() {
        let mut spec = GemmSpec::for_shape(5, 5, 5).unwrap();
        spec.k = 0;
        assert_eq!(plan_gemm(&spec), Err(ShapeError::NonPositiveExtent { name: "k" }));
    }

    #[test]
    fn transform_2d_in_place_padding() {
        // The 2-D advanced-interface case: logical 4 x 5, batch 3.
        let spec = TransformSpec::real_to_complex(&[4, 5]).unwrap().with_batch_count(3).unwrap();
        let layout = plan_transform(&spec).unwrap();

        assert_eq!(layout.input.embedded, vec![4, 6]);
        assert_eq!(layout.input.batch_distance, 24);
        assert_eq!(layout.input.kind, ElementKind::Real);

        assert_eq!(layout.output.embedded, vec![4, 3]);
        assert_eq!(layout.output.batch_distance, 12);
        assert_eq!(layout.output.kind, ElementKind::Complex);

        // Same byte span per batch item: 24 reals == 12 complex.
        assert_eq!(layout.input.len_f32(), layout.output.len_f32());
    }

    #[test]
    fn transform_2d_out_of_place_unpadded() {
        let spec = TransformSpec::real_to_complex(&[4, 5])
            .unwrap()
            .with_placement(Placement::OutOfPlace)
            .with_batch_count(3)
            .unwrap();
        let layout = plan_transform(&spec).unwrap();

        assert_eq!(layout.input.embedded, vec![4, 5]);
        assert_eq!(layout.input.batch_distance, 20);
        assert_eq!(layout.output.embedded, vec![4, 3]);
        assert_eq!(layout.output.batch_distance, 12);
    }

    #[test]
    fn transform_1d_half_spectrum() {
        let spec = TransformSpec::real_to_complex(&[9])
            .unwrap()
            .with_placement(Placement::OutOfPlace);
        let layout = plan_transform(&spec).unwrap();

        assert_eq!(layout.output.embedded, vec![5]);
        assert_eq!(layout.output.logical, vec![5]);
        assert_eq!(layout.input.batch_distance, 9);
        assert_eq!(layout.output.batch_distance, 5);
    }

    #[test]
    fn transform_complex_embeddings_match() {
        let spec = TransformSpec::complex_to_complex(&[4, 5], TransformDirection::Forward)
            .unwrap()
            .with_batch_count(3)
            .unwrap();
        let layout = plan_transform(&spec).unwrap();

        assert_eq!(layout.input.embedded, layout.output.embedded);
        assert_eq!(layout.input.batch_distance, layout.output.batch_distance);
        assert_eq!(layout.input.batch_distance, 20);
        assert_eq!(layout.input.kind, ElementKind::Complex);
        assert_eq!(layout.input.len_f32(), 2 * 20 * 3);
    }

    #[test]
    fn transform_explicit_embedding_honored() {
        let spec = TransformSpec::real_to_complex(&[4, 5])
            .unwrap()
            .with_placement(Placement::OutOfPlace)
            .with_embeddings(Some(vec![8, 16]), Some(vec![4, 8]))
            .unwrap();
        let layout = plan_transform(&spec).unwrap();

        assert_eq!(layout.input.batch_distance, 128);
        assert_eq!(layout.output.batch_distance, 32);
        // Logical extents are unaffected by the pitch.
        assert_eq!(layout.input.logical, vec![4, 5]);
        assert_eq!(layout.output.logical, vec![4, 3]);
    }

    #[test]
    fn transform_distance_covers_embedding() {
        let spec = TransformSpec::real_to_complex(&[2, 3, 5]).unwrap().with_batch_count(4).unwrap();
        let layout = plan_transform(&spec).unwrap();
        for operand in [&layout.input, &layout.output] {
            assert!(operand.batch_distance >= operand.element_stride * operand.extent_product());
        }
    }

    #[test]
    fn transform_planning_is_idempotent() {
        let spec = TransformSpec::complex_to_complex(&[4, 5], TransformDirection::Inverse)
            .unwrap()
            .with_batch_count(3)
            .unwrap();
        assert_eq!(plan_transform(&spec).unwrap(), plan_transform(&spec).unwrap());
    }

    #[test]
    fn transform_planner_revalidates() {
        let mut spec = TransformSpec::real_to_complex(&[9]).unwrap();
        spec.extents = vec![9, 0];
        assert_eq!(
            plan_transform(&spec),
            Err(ShapeError::NonPositiveExtent { name: "extents" })
        );
    }

    #[test]
    fn array_indexing_row_major_last_contiguous() {
        let spec = TransformSpec::real_to_complex(&[4, 5]).unwrap();
        let layout = plan_transform(&spec).unwrap();

        // Input embedded is {4, 6}: index [i, j] = i * 6 + j.
        assert_eq!(layout.input.index(&[0, 0]), 0);
        assert_eq!(layout.input.index(&[0, 4]), 4);
        assert_eq!(layout.input.index(&[1, 0]), 6);
        assert_eq!(layout.input.index(&[3, 4]), 22);
        assert_eq!(layout.input.at(2, &[1, 1]), 48 + 7);
    }

    #[test]
    fn batch_mismatch_rejected() {
        let spec = TransformSpec::real_to_complex(&[9]).unwrap();
        let layout = plan_transform(&spec).unwrap();
        let mut other = layout.output.clone();
        other.batch_count = 2;
        assert_eq!(
            TransformLayout::new(layout.input.clone(), other, Placement::OutOfPlace),
            Err(ShapeError::BatchCountMismatch { left: 1, right: 2 })
        );
    }

    #[test]
    fn in_place_span_mismatch_rejected() {
        // An output pitch that does not cover the padded input span.
        let spec = TransformSpec::real_to_complex(&[4, 5])
            .unwrap()
            .with_embeddings(None, Some(vec![4, 4]))
            .unwrap();
        assert!(matches!(
            plan_transform(&spec),
            Err(ShapeError::InPlaceSpanMismatch { .. })
        ));
    }
}
