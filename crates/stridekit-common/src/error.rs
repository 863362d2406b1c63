//! Error taxonomy for the stridekit workspace.
//!
//! Three failure families exist, mirroring the stages of a run: shape
//! validation (`ShapeError`), buffer allocation and transfer
//! (`ResourceError`), and kernel dispatch (`KernelError`). All of them
//! terminate the run; a numerical mismatch is *not* an error and is
//! reported through a `Verdict` instead.

use thiserror::Error;

/// Convenience result type used across the workspace.
pub type Result<T> = std::result::Result<T, StridekitError>;

/// Top-level error type aggregating all failure families.
#[derive(Debug, Error)]
pub enum StridekitError {
    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),
}

/// Malformed shape specification, raised at construction or planning time,
/// always before any allocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("extent '{name}' must be greater than 0")]
    NonPositiveExtent { name: &'static str },

    #[error("batch count must be greater than 0")]
    NonPositiveBatch,

    #[error("unsupported transform rank {rank}, expected 1..={max}")]
    UnsupportedRank { rank: usize, max: usize },

    #[error("real-to-complex transforms are forward-only")]
    DomainDirectionMismatch,

    #[error("embedding has rank {got} but the transform has rank {expected}")]
    EmbeddingRankMismatch { got: usize, expected: usize },

    #[error(
        "embedded extent {got} in dimension {dim} is smaller than the \
         required physical extent {required}"
    )]
    EmbeddingTooSmall { dim: usize, got: usize, required: usize },

    #[error("operands disagree on batch count: {left} vs {right}")]
    BatchCountMismatch { left: usize, right: usize },

    #[error(
        "in-place placement requires input and output to span the same bytes \
         per batch item, got input {input} vs output {output}"
    )]
    InPlaceSpanMismatch { input: usize, output: usize },
}

/// Allocation or transfer failure in the buffer layer. Fatal for the run;
/// scoped release of already-acquired buffers still applies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("device allocation of {bytes} bytes failed: {reason}")]
    AllocationFailed { bytes: usize, reason: String },

    #[error("{direction} transfer of {bytes} bytes failed: {reason}")]
    TransferFailed { direction: &'static str, bytes: usize, reason: String },

    #[error("unknown device region {id}")]
    UnknownRegion { id: u64 },

    #[error("host/device size mismatch: host is {host} bytes, device region is {device} bytes")]
    SizeMismatch { host: usize, device: usize },
}

/// The injected numeric engine reported a non-success status. Fatal for
/// the current run and never retried here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("no available kernel provider")]
    NoProvider,

    #[error("kernel execution failed: {reason}")]
    ExecutionFailed { reason: String },

    #[error("GPU error: {reason}")]
    GpuError { reason: String },

    #[error("operation not supported by provider '{provider}': {reason}")]
    Unsupported { provider: &'static str, reason: String },
}
