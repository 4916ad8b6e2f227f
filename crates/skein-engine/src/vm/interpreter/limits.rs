//! Resource ceilings of an interpreter instance

use serde::Deserialize;

/// Resource limits for an instance
///
/// Clones inherit the ceilings unchanged. The step ceiling is cumulative:
/// a clone starts from the step count its parent had already consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Maximum executed steps (None = unlimited)
    pub max_steps: Option<u64>,

    /// Maximum allocation units (None = unlimited)
    pub max_allocations: Option<u64>,

    /// Maximum call depth (None = unlimited)
    pub max_frames: Option<usize>,
}

impl ResourceLimits {
    /// Create unlimited resource limits
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Create resource limits with a step budget
    pub fn with_step_budget(max_steps: u64) -> Self {
        Self {
            max_steps: Some(max_steps),
            ..Default::default()
        }
    }

    /// Create resource limits with an allocation budget
    pub fn with_allocation_limit(max_allocations: u64) -> Self {
        Self {
            max_allocations: Some(max_allocations),
            ..Default::default()
        }
    }

    /// Create resource limits with a call depth limit
    pub fn with_frame_limit(max_frames: usize) -> Self {
        Self {
            max_frames: Some(max_frames),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_limits_default() {
        let limits = ResourceLimits::default();

        assert!(limits.max_steps.is_none());
        assert!(limits.max_allocations.is_none());
        assert!(limits.max_frames.is_none());
        assert_eq!(limits, ResourceLimits::unlimited());
    }

    #[test]
    fn test_resource_limits_builders() {
        assert_eq!(ResourceLimits::with_step_budget(1000).max_steps, Some(1000));
        assert_eq!(
            ResourceLimits::with_allocation_limit(64).max_allocations,
            Some(64)
        );
        assert_eq!(ResourceLimits::with_frame_limit(8).max_frames, Some(8));
    }
}
