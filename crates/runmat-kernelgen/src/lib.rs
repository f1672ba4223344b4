//! RunMat Kernelgen: WGSL compute program generators
//!
//! Each generator turns tensor shapes into an immutable [`ComputeProgram`]:
//! work-group size, dispatch grid, bound variable names and the WGSL body of
//! `kernel_main()`. Compiling and launching the program is left to an
//! execution engine; [`preamble::assemble`] shows the helper environment the
//! bodies expect and [`host`] evaluates them on the CPU for parity checks.
//!
//! Kernels:
//! - [`BinaryOpProgram`]: elementwise `op(A[i], B[i])`.
//! - [`MatMulProgram`]: shared-memory tiled (batched) matrix multiply.
//! - [`ResizeBilinearProgram`]: NHWC bilinear resize with optional corner alignment.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod kernels;
pub mod preamble;
pub mod program;
pub mod shape;
pub mod template;

#[cfg(feature = "wgpu")]
pub mod backend;

pub use config::KernelConfig;
pub use dispatch::{
    compute_dispatch, compute_work_group_size, dispatch_size, DispatchLayout, DispatchSize,
    WorkGroupSize,
};
pub use error::{ProgramError, Result};
pub use kernels::{
    BinaryOpKind, BinaryOpProgram, MatMulInfo, MatMulProgram, OpBody, ResizeBilinearProgram, ADD,
    MUL,
};
pub use program::{program_key, ComputeProgram};
pub use shape::TensorShape;
