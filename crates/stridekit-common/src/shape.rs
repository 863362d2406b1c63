//! Shape specifications for batched operations.
//!
//! A shape spec is the caller-facing description of *what* to compute:
//! logical dimensions, orientation flags, batch count, scalars. It is pure
//! data; the only behavior is construction-time validation. Layout
//! planning (see [`crate::layout`]) turns a spec into the physical
//! addressing the kernels consume.

use crate::error::ShapeError;

/// Maximum supported transform rank.
pub const MAX_RANK: usize = 3;

// ── GemmSpec ──────────────────────────────────────────────────────────

/// Description of a batched dense product
/// `C := alpha * op(A) * op(B) + beta * C`.
///
/// `op(X)` is `X` or `X^T` depending on the transpose flags. Matrices are
/// stored column-major, one batch item after another.
#[derive(Debug, Clone, PartialEq)]
pub struct GemmSpec {
    /// Rows of `op(A)` and of `C`.
    pub m: usize,
    /// Columns of `op(B)` and of `C`.
    pub n: usize,
    /// Inner (reduction) dimension.
    pub k: usize,
    /// Interpret A as transposed.
    pub transpose_a: bool,
    /// Interpret B as transposed.
    pub transpose_b: bool,
    /// Number of independent batch items.
    pub batch_count: usize,
    /// Scalar multiplier for the product.
    pub alpha: f32,
    /// Scalar multiplier for the existing output.
    pub beta: f32,
}

impl GemmSpec {
    /// Create a spec for the given dimensions with batch count 1, no
    /// transposes, `alpha = 1`, `beta = 0`.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError::NonPositiveExtent`] if any dimension is zero.
    pub fn for_shape(m: usize, n: usize, k: usize) -> Result<Self, ShapeError> {
        let spec = Self {
            m,
            n,
            k,
            transpose_a: false,
            transpose_b: false,
            batch_count: 1,
            alpha: 1.0,
            beta: 0.0,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Set the batch count.
    pub fn with_batch_count(mut self, batch_count: usize) -> Result<Self, ShapeError> {
        if batch_count == 0 {
            return Err(ShapeError::NonPositiveBatch);
        }
        self.batch_count = batch_count;
        Ok(self)
    }

    /// Set the transpose flags.
    pub fn with_transpose(mut self, transpose_a: bool, transpose_b: bool) -> Self {
        self.transpose_a = transpose_a;
        self.transpose_b = transpose_b;
        self
    }

    /// Set the alpha and beta scalars.
    pub fn with_alpha_beta(mut self, alpha: f32, beta: f32) -> Self {
        self.alpha = alpha;
        self.beta = beta;
        self
    }

    /// Check every invariant of the spec.
    ///
    /// Constructors already call this; the layout planner calls it again
    /// so that a hand-assembled spec with bad fields still fails before
    /// any allocation.
    pub fn validate(&self) -> Result<(), ShapeError> {
        for (name, value) in [("m", self.m), ("n", self.n), ("k", self.k)] {
            if value == 0 {
                return Err(ShapeError::NonPositiveExtent { name });
            }
        }
        if self.batch_count == 0 {
            return Err(ShapeError::NonPositiveBatch);
        }
        Ok(())
    }
}

// ── Transform enums ───────────────────────────────────────────────────

/// Element domain of a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformDomain {
    /// Real input, half-spectrum complex output.
    RealToComplex,
    /// Complex input and output.
    ComplexToComplex,
}

/// Direction of a transform. Real-to-complex transforms are forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformDirection {
    Forward,
    Inverse,
}

/// Whether the transform writes its output over its input buffer or into
/// a separate one. In-place real-to-complex execution pads the input's
/// innermost dimension so the complex output fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    InPlace,
    OutOfPlace,
}

// ── TransformSpec ─────────────────────────────────────────────────────

/// Description of a batched finite discrete transform of rank 1 to 3.
///
/// `extents` are the logical dimension sizes, slowest-varying first, the
/// innermost (contiguous) dimension last. Optional explicit embeddings
/// place each batch item inside a larger pitched allocation; when absent,
/// the physical extents are derived from the logical ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformSpec {
    pub extents: Vec<usize>,
    pub domain: TransformDomain,
    pub direction: TransformDirection,
    pub batch_count: usize,
    pub placement: Placement,
    /// Explicit physical extents for the input, if the caller places the
    /// data inside a pitched buffer.
    pub input_embed: Option<Vec<usize>>,
    /// Explicit physical extents for the output.
    pub output_embed: Option<Vec<usize>>,
}

impl TransformSpec {
    /// Forward real-to-complex transform over the given logical extents.
    ///
    /// Defaults: batch count 1, in-place placement, derived embeddings.
    pub fn real_to_complex(extents: &[usize]) -> Result<Self, ShapeError> {
        let spec = Self {
            extents: extents.to_vec(),
            domain: TransformDomain::RealToComplex,
            direction: TransformDirection::Forward,
            batch_count: 1,
            placement: Placement::InPlace,
            input_embed: None,
            output_embed: None,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Complex-to-complex transform over the given logical extents.
    ///
    /// Defaults: batch count 1, in-place placement, derived embeddings.
    pub fn complex_to_complex(
        extents: &[usize],
        direction: TransformDirection,
    ) -> Result<Self, ShapeError> {
        let spec = Self {
            extents: extents.to_vec(),
            domain: TransformDomain::ComplexToComplex,
            direction,
            batch_count: 1,
            placement: Placement::InPlace,
            input_embed: None,
            output_embed: None,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Set the batch count.
    pub fn with_batch_count(mut self, batch_count: usize) -> Result<Self, ShapeError> {
        if batch_count == 0 {
            return Err(ShapeError::NonPositiveBatch);
        }
        self.batch_count = batch_count;
        Ok(self)
    }

    /// Set the placement.
    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    /// Supply explicit physical embeddings for input and/or output.
    ///
    /// # Errors
    ///
    /// Fails if an embedding's rank differs from the transform rank or if
    /// any embedded extent is smaller than the physical extent the
    /// operation requires in that dimension.
    pub fn with_embeddings(
        mut self,
        input_embed: Option<Vec<usize>>,
        output_embed: Option<Vec<usize>>,
    ) -> Result<Self, ShapeError> {
        self.input_embed = input_embed;
        self.output_embed = output_embed;
        self.validate()?;
        Ok(self)
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.extents.len()
    }

    /// Logical extent of the innermost (contiguous) dimension.
    pub fn innermost_extent(&self) -> usize {
        *self.extents.last().expect("validated spec has at least one extent")
    }

    /// Number of half-spectrum bins along the innermost dimension for a
    /// real-to-complex transform: `floor(n/2) + 1`.
    pub fn half_spectrum_bins(&self) -> usize {
        self.innermost_extent() / 2 + 1
    }

    /// Logical extents of the output array. Identical to the input extents
    /// except for the halved-plus-one innermost dimension of a
    /// real-to-complex transform.
    pub fn output_extents(&self) -> Vec<usize> {
        let mut out = self.extents.clone();
        if self.domain == TransformDomain::RealToComplex {
            *out.last_mut().expect("validated spec has at least one extent") =
                self.half_spectrum_bins();
        }
        out
    }

    /// Minimum physical extents the input must provide per dimension.
    pub(crate) fn required_input_extents(&self) -> Vec<usize> {
        let mut req = self.extents.clone();
        if self.domain == TransformDomain::RealToComplex && self.placement == Placement::InPlace {
            // The complex result is written over the real input, so the
            // innermost dimension must hold 2*(n/2+1) real elements.
            *req.last_mut().expect("validated spec has at least one extent") =
                2 * self.half_spectrum_bins();
        }
        req
    }

    /// Minimum physical extents the output must provide per dimension.
    pub(crate) fn required_output_extents(&self) -> Vec<usize> {
        self.output_extents()
    }

    /// Check every invariant of the spec.
    pub fn validate(&self) -> Result<(), ShapeError> {
        let rank = self.extents.len();
        if rank == 0 || rank > MAX_RANK {
            return Err(ShapeError::UnsupportedRank { rank, max: MAX_RANK });
        }
        if self.extents.iter().any(|&e| e == 0) {
            return Err(ShapeError::NonPositiveExtent { name: "extents" });
        }
        if self.batch_count == 0 {
            return Err(ShapeError::NonPositiveBatch);
        }
        if self.domain == TransformDomain::RealToComplex
            && self.direction == TransformDirection::Inverse
        {
            return Err(ShapeError::DomainDirectionMismatch);
        }
        Self::check_embed(self.input_embed.as_deref(), &self.required_input_extents())?;
        Self::check_embed(self.output_embed.as_deref(), &self.required_output_extents())?;
        Ok(())
    }

    fn check_embed(embed: Option<&[usize]>, required: &[usize]) -> Result<(), ShapeError> {
        let Some(embed) = embed else {
            return Ok(());
        };
        if embed.len() != required.len() {
            return Err(ShapeError::EmbeddingRankMismatch {
                got: embed.len(),
                expected: required.len(),
            });
        }
        for (dim, (&got, &req)) in embed.iter().zip(required.iter()).enumerate() {
            if got < req {
                return Err(ShapeError::EmbeddingTooSmall { dim, got, required: req });
            }
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
