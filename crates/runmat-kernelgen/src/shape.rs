use std::fmt;
use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::error::{ProgramError, Result};

/// Logical tensor shape: one extent per dimension, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TensorShape(Vec<usize>);

impl TensorShape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total element count; a rank-0 shape holds one element.
    ///
    /// Saturates at `usize::MAX` instead of wrapping, so an unvalidated shape
    /// never reports fewer elements than it has.
    pub fn numel(&self) -> usize {
        self.0.iter().fold(1usize, |acc, &d| acc.saturating_mul(d))
    }

    /// Exact element count, or `None` if it does not fit in `usize`.
    pub fn checked_numel(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Row-major strides (last axis contiguous).
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.0.len()];
        for axis in (0..self.0.len().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * self.0[axis + 1];
        }
        strides
    }

    /// Rejects shapes with a zero extent.
    pub fn ensure_positive(&self) -> Result<()> {
        match self.0.iter().position(|&d| d == 0) {
            Some(axis) => Err(ProgramError::ZeroExtent {
                axis,
                shape: self.0.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Shader helpers index with `i32`, so every element must be reachable that way.
    pub fn ensure_addressable(&self, context: &'static str) -> Result<()> {
        let elements = self
            .0
            .iter()
            .try_fold(1u128, |acc, &d| acc.checked_mul(d as u128));
        match elements {
            Some(elements) if elements <= i32::MAX as u128 => Ok(()),
            // Past u128 there is no exact count left to report.
            elements => Err(ProgramError::IndexOverflow {
                context,
                elements: elements.unwrap_or(u128::MAX),
            }),
        }
    }

    pub fn ensure_rank(&self, context: &'static str, expected: usize) -> Result<()> {
        if self.rank() != expected {
            return Err(ProgramError::RankMismatch {
                context,
                expected,
                actual: self.rank(),
            });
        }
        Ok(())
    }
}

impl Index<usize> for TensorShape {
    type Output = usize;

    fn index(&self, axis: usize) -> &usize {
        &self.0[axis]
    }
}

impl From<Vec<usize>> for TensorShape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl From<&[usize]> for TensorShape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for TensorShape {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.to_vec())
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}
