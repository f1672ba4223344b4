use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{ProgramError, Result};

/// Conservative cap on invocations per work-group (WebGPU's guaranteed minimum).
pub const MAX_INVOCATIONS_PER_WORKGROUP: u32 = 256;
/// Conservative cap on any single work-group dimension.
pub const MAX_WORKGROUP_DIM: u32 = 256;
/// Square tile edge used by the shared-memory matmul.
pub const MATMUL_TILE: u32 = 16;
/// Fixed 1-D work-group used by the bilinear resize kernel.
pub const RESIZE_WORKGROUP: [u32; 3] = [64, 1, 1];
/// Per-axis limit on work-groups launched by a single dispatch.
pub const MAX_DISPATCH_WORKGROUPS: u32 = 65_535;

pub const ENV_MAX_INVOCATIONS: &str = "RUNMAT_KERNEL_MAX_INVOCATIONS";
pub const ENV_MATMUL_TILE: &str = "RUNMAT_MATMUL_TILE";

static GLOBAL_CONFIG: Lazy<KernelConfig> = Lazy::new(KernelConfig::from_env);

/// Tunables shared by every program generator.
///
/// The defaults are the named constants above. Two override points exist:
/// `max_invocations` feeds the flat work-group sizing used by elementwise
/// kernels and `matmul_tile` sets the square tile of the matmul kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct KernelConfig {
    pub max_invocations: u32,
    pub max_workgroup_dim: u32,
    pub matmul_tile: u32,
    pub resize_workgroup: [u32; 3],
    pub max_dispatch_per_axis: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_invocations: MAX_INVOCATIONS_PER_WORKGROUP,
            max_workgroup_dim: MAX_WORKGROUP_DIM,
            matmul_tile: MATMUL_TILE,
            resize_workgroup: RESIZE_WORKGROUP,
            max_dispatch_per_axis: MAX_DISPATCH_WORKGROUPS,
        }
    }
}

impl KernelConfig {
    /// Process-wide configuration: defaults plus env overrides, read once.
    pub fn global() -> &'static KernelConfig {
        &GLOBAL_CONFIG
    }

    /// Defaults with `RUNMAT_KERNEL_MAX_INVOCATIONS` and `RUNMAT_MATMUL_TILE` applied.
    /// Overrides that are unparsable or would produce an invalid config are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(value) = env_u32(ENV_MAX_INVOCATIONS) {
            let candidate = Self {
                max_invocations: value,
                ..config
            };
            match candidate.validate() {
                Ok(()) => config = candidate,
                Err(err) => log::warn!("ignoring {ENV_MAX_INVOCATIONS}={value}: {err}"),
            }
        }
        if let Some(value) = env_u32(ENV_MATMUL_TILE) {
            let candidate = Self {
                matmul_tile: value,
                ..config
            };
            match candidate.validate() {
                Ok(()) => config = candidate,
                Err(err) => log::warn!("ignoring {ENV_MATMUL_TILE}={value}: {err}"),
            }
        }
        config
    }

    pub fn with_max_invocations(mut self, max_invocations: u32) -> Self {
        self.max_invocations = max_invocations;
        self
    }

    pub fn with_matmul_tile(mut self, tile: u32) -> Self {
        self.matmul_tile = tile;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_invocations == 0 || self.max_workgroup_dim == 0 {
            return Err(ProgramError::InvalidConfig(
                "work-group limits must be positive".to_string(),
            ));
        }
        if self.max_dispatch_per_axis == 0 {
            return Err(ProgramError::InvalidConfig(
                "dispatch limit must be positive".to_string(),
            ));
        }
        let tile = self.matmul_tile as u64;
        if tile == 0
            || self.matmul_tile > self.max_workgroup_dim
            || tile * tile > self.max_invocations as u64
        {
            return Err(ProgramError::InvalidConfig(format!(
                "matmul tile {} does not fit a work-group of {} invocations",
                self.matmul_tile, self.max_invocations
            )));
        }
        let [x, y, z] = self.resize_workgroup;
        let total = x as u64 * y as u64 * z as u64;
        if total == 0
            || x.max(y).max(z) > self.max_workgroup_dim
            || total > self.max_invocations as u64
        {
            return Err(ProgramError::InvalidConfig(format!(
                "resize work-group {:?} exceeds {} invocations",
                self.resize_workgroup, self.max_invocations
            )));
        }
        Ok(())
    }
}

fn env_u32(name: &str) -> Option<u32> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<u32>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            log::warn!("ignoring {name}={raw:?}: expected a positive integer");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = KernelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.matmul_tile, 16);
        assert_eq!(config.max_invocations, 256);
    }

    #[test]
    fn tile_larger_than_invocation_budget_is_rejected() {
        let config = KernelConfig::default().with_matmul_tile(32);
        assert!(matches!(
            config.validate(),
            Err(ProgramError::InvalidConfig(_))
        ));
    }

    #[test]
    fn smaller_invocation_budget_must_still_fit_resize_group() {
        let config = KernelConfig::default().with_max_invocations(32);
        assert!(config.validate().is_err());
        let config = config.with_matmul_tile(4);
        let config = KernelConfig {
            resize_workgroup: [32, 1, 1],
            ..config
        };
        assert!(config.validate().is_ok());
    }
}
