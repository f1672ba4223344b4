use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProgramError>;

/// Errors raised while building, assembling or host-evaluating a program.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProgramError {
    #[error("shape {shape:?} has a zero extent on axis {axis}")]
    ZeroExtent { axis: usize, shape: Vec<usize> },

    #[error("{context}: expected a rank-{expected} shape, got rank {actual}")]
    RankMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid dispatch layout: {0}")]
    InvalidLayout(String),

    #[error("{context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("work-group {size:?} exceeds limits (max {max_invocations} invocations, {max_dim} per dimension)")]
    InvalidWorkGroup {
        size: [u32; 3],
        max_invocations: u32,
        max_dim: u32,
    },

    #[error("dispatch axis {axis} needs {groups} work-groups, limit is {limit}")]
    DispatchTooLarge { axis: char, groups: u64, limit: u32 },

    #[error("{context}: {elements} elements cannot be addressed with 32-bit shader indices")]
    IndexOverflow {
        context: &'static str,
        elements: u128,
    },

    #[error("unresolved template placeholder @{0}@")]
    UnresolvedPlaceholder(String),

    #[error("rank {rank} tensors are not supported by the shader helpers (1..=4)")]
    UnsupportedRank { rank: usize },

    #[error("input count mismatch: program declares {expected} variables, got {actual} shapes")]
    InputCountMismatch { expected: usize, actual: usize },

    #[error("host evaluation failed: {0}")]
    HostEvaluation(String),

    #[error("invalid kernel configuration: {0}")]
    InvalidConfig(String),
}
