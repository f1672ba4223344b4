//! Work-group sizing and dispatch-grid geometry.
//!
//! Shader dispatch is three dimensional while tensors are not rank bounded,
//! so a [`DispatchLayout`] folds logical axes into the x/y/z dispatch axes.
//! Every helper here is total: zero-element shapes still produce a
//! well-formed `1 x 1 x 1` grid, while the generators reject such shapes
//! before they get this far.

use serde::{Deserialize, Serialize};

use crate::config::KernelConfig;
use crate::error::{ProgramError, Result};
use crate::shape::TensorShape;

pub const AXIS_NAMES: [char; 3] = ['x', 'y', 'z'];

/// Threads per work-group along x, y and z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkGroupSize {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl WorkGroupSize {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    pub const fn from_array(size: [u32; 3]) -> Self {
        Self::new(size[0], size[1], size[2])
    }

    pub const fn as_array(&self) -> [u32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn invocations(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }

    /// Checks positivity and the invocation and per-dimension caps.
    pub fn validate(&self, config: &KernelConfig) -> Result<()> {
        let dims = self.as_array();
        let within_dims = dims
            .iter()
            .all(|&d| d >= 1 && d <= config.max_workgroup_dim);
        if !within_dims || self.invocations() > config.max_invocations as u64 {
            return Err(ProgramError::InvalidWorkGroup {
                size: dims,
                max_invocations: config.max_invocations,
                max_dim: config.max_workgroup_dim,
            });
        }
        Ok(())
    }
}

/// Number of work-groups launched along x, y and z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DispatchSize {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl DispatchSize {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    pub const fn as_array(&self) -> [u32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn total_workgroups(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

/// Logical output axes covered by each dispatch axis.
///
/// Axes sharing a bucket are folded together in the listed order (the
/// first listed axis is outermost), so their extents multiply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DispatchLayout {
    pub x: Vec<usize>,
    pub y: Vec<usize>,
    pub z: Vec<usize>,
}

impl DispatchLayout {
    pub fn new(x: Vec<usize>, y: Vec<usize>, z: Vec<usize>) -> Self {
        Self { x, y, z }
    }

    /// Every axis folded into dispatch-x, row-major.
    pub fn flat(rank: usize) -> Self {
        Self::new((0..rank).collect(), Vec::new(), Vec::new())
    }

    pub fn axes(&self) -> [&[usize]; 3] {
        [&self.x, &self.y, &self.z]
    }

    /// The layout must partition `0..rank`: each axis in exactly one bucket.
    pub fn validate(&self, rank: usize) -> Result<()> {
        let mut seen = vec![false; rank];
        for (bucket, name) in self.axes().iter().zip(AXIS_NAMES) {
            for &axis in bucket.iter() {
                if axis >= rank {
                    return Err(ProgramError::InvalidLayout(format!(
                        "axis {axis} in dispatch-{name} is out of range for rank {rank}"
                    )));
                }
                if seen[axis] {
                    return Err(ProgramError::InvalidLayout(format!(
                        "axis {axis} is mapped more than once"
                    )));
                }
                seen[axis] = true;
            }
        }
        if let Some(missing) = seen.iter().position(|covered| !covered) {
            return Err(ProgramError::InvalidLayout(format!(
                "axis {missing} is not covered by any dispatch axis"
            )));
        }
        Ok(())
    }

    /// Product of the extents folded into each dispatch axis, saturating at
    /// `u64::MAX` so an oversized shape trips the dispatch cap.
    pub fn coverage(&self, shape: &TensorShape) -> [u64; 3] {
        let mut coverage = [1u64; 3];
        for (slot, bucket) in coverage.iter_mut().zip(self.axes()) {
            *slot = bucket
                .iter()
                .fold(1u64, |acc, &axis| acc.saturating_mul(shape[axis] as u64));
        }
        coverage
    }
}

/// Ceil-divides `elements` by `workgroup`, never returning zero.
pub fn dispatch_size(elements: u64, workgroup: u32) -> u64 {
    let workgroup = workgroup.max(1) as u64;
    elements.div_ceil(workgroup).max(1)
}

/// Flat 1-D work-group for elementwise kernels.
///
/// `x = min(numel, max_invocations, max_workgroup_dim)`, at least 1.
pub fn compute_work_group_size(shape: &TensorShape, config: &KernelConfig) -> WorkGroupSize {
    let cap = config.max_invocations.min(config.max_workgroup_dim).max(1) as u64;
    let x = (shape.numel() as u64).clamp(1, cap) as u32;
    WorkGroupSize::new(x, 1, 1)
}

/// Dispatch grid covering `shape` under `layout` with work-group `wg`.
pub fn compute_dispatch(
    layout: &DispatchLayout,
    shape: &TensorShape,
    wg: WorkGroupSize,
    config: &KernelConfig,
) -> Result<DispatchSize> {
    layout.validate(shape.rank())?;
    let coverage = layout.coverage(shape);
    let groups = [
        dispatch_size(coverage[0], wg.x),
        dispatch_size(coverage[1], wg.y),
        dispatch_size(coverage[2], wg.z),
    ];
    let [x, y, z] = checked_groups(groups, config)?;
    Ok(DispatchSize::new(x, y, z))
}

/// Narrows per-axis group counts to `u32`, enforcing the dispatch cap.
pub(crate) fn checked_groups(groups: [u64; 3], config: &KernelConfig) -> Result<[u32; 3]> {
    let mut out = [1u32; 3];
    for ((slot, count), axis) in out.iter_mut().zip(groups).zip(AXIS_NAMES) {
        if count > config.max_dispatch_per_axis as u64 {
            return Err(ProgramError::DispatchTooLarge {
                axis,
                groups: count,
                limit: config.max_dispatch_per_axis,
            });
        }
        *slot = count as u32;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_group_is_capped_by_invocations() {
        let config = KernelConfig::default();
        let wg = compute_work_group_size(&TensorShape::from([4]), &config);
        assert_eq!(wg, WorkGroupSize::new(4, 1, 1));
        let wg = compute_work_group_size(&TensorShape::from([1000, 3]), &config);
        assert_eq!(wg, WorkGroupSize::new(256, 1, 1));
    }

    #[test]
    fn zero_elements_still_give_a_launchable_group() {
        let config = KernelConfig::default();
        let shape = TensorShape::from([0, 5]);
        let wg = compute_work_group_size(&shape, &config);
        assert_eq!(wg, WorkGroupSize::new(1, 1, 1));
        let dispatch =
            compute_dispatch(&DispatchLayout::flat(2), &shape, wg, &config).expect("dispatch");
        assert_eq!(dispatch, DispatchSize::new(1, 1, 1));
    }

    #[test]
    fn folded_axes_multiply() {
        let config = KernelConfig::default();
        let shape = TensorShape::from([2, 7, 9, 3]);
        let layout = DispatchLayout::new(vec![1], vec![2], vec![0, 3]);
        assert_eq!(layout.coverage(&shape), [7, 9, 6]);
        let dispatch =
            compute_dispatch(&layout, &shape, WorkGroupSize::new(4, 4, 4), &config).unwrap();
        assert_eq!(dispatch, DispatchSize::new(2, 3, 2));
    }

    #[test]
    fn layout_must_partition_axes() {
        let dup = DispatchLayout::new(vec![0, 1], vec![1], vec![]);
        assert!(matches!(dup.validate(2), Err(ProgramError::InvalidLayout(_))));
        let missing = DispatchLayout::new(vec![0], vec![], vec![]);
        assert!(matches!(
            missing.validate(2),
            Err(ProgramError::InvalidLayout(_))
        ));
        let out_of_range = DispatchLayout::new(vec![0], vec![3], vec![]);
        assert!(out_of_range.validate(2).is_err());
        assert!(DispatchLayout::flat(3).validate(3).is_ok());
    }

    #[test]
    fn oversized_dispatch_is_rejected() {
        let config = KernelConfig::default();
        let shape = TensorShape::from([70_000]);
        let err = compute_dispatch(
            &DispatchLayout::flat(1),
            &shape,
            WorkGroupSize::new(1, 1, 1),
            &config,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ProgramError::DispatchTooLarge {
                axis: 'x',
                groups: 70_000,
                limit: 65_535
            }
        );
    }

    #[test]
    fn oversized_shapes_saturate_into_the_dispatch_cap() {
        let config = KernelConfig::default();
        let shape = TensorShape::from([1 << 63, 1 << 63, 4]);
        let layout = DispatchLayout::flat(3);
        assert_eq!(layout.coverage(&shape), [u64::MAX, 1, 1]);
        let wg = compute_work_group_size(&shape, &config);
        assert_eq!(wg, WorkGroupSize::new(256, 1, 1));
        assert!(matches!(
            compute_dispatch(&layout, &shape, wg, &config),
            Err(ProgramError::DispatchTooLarge { axis: 'x', .. })
        ));
    }

    #[test]
    fn work_group_validation() {
        let config = KernelConfig::default();
        assert!(WorkGroupSize::new(16, 16, 1).validate(&config).is_ok());
        assert!(WorkGroupSize::new(32, 16, 1).validate(&config).is_err());
        assert!(WorkGroupSize::new(0, 1, 1).validate(&config).is_err());
    }
}
