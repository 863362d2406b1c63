//! Common types and layout arithmetic for stridekit
//!
//! This crate provides the foundational pieces shared across the stridekit
//! workspace: the error taxonomy, shape specifications for batched dense
//! products and finite discrete transforms, the pure layout planner that
//! turns those specifications into strided batched layout descriptors, and
//! seedable input-data generation.
//!
//! Nothing in this crate touches a device. Layout planning is pure
//! arithmetic so it can be tested exhaustively without an allocator or a
//! kernel in sight.

pub mod error;
pub mod fill;
pub mod layout;
pub mod shape;

pub use error::{KernelError, ResourceError, Result, ShapeError, StridekitError};
pub use fill::{DataGenerator, DEFAULT_SEED};
pub use layout::{
    plan_gemm, plan_transform, ArrayLayout, ElementKind, GemmLayout, MatrixLayout,
    TransformLayout,
};
pub use shape::{
    GemmSpec, Placement, TransformDirection, TransformDomain, TransformSpec, MAX_RANK,
};
