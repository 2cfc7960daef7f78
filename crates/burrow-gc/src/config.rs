//! Heap configuration.

use crate::error::HeapError;

/// Configuration for a [`Heap`](crate::Heap).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GcConfig {
    /// Cap on live object bytes. Allocation beyond it fails with
    /// `OutOfMemory`. `None` = unbounded.
    pub max_heap_bytes: Option<usize>,

    /// Request a cycle every time this many bytes have been allocated since
    /// the last one. `None` = cycles run only on `collect` / `request_cycle`.
    pub trigger_bytes: Option<usize>,
}

impl GcConfig {
    /// Check every field, reporting the first violation.
    pub fn validate(&self) -> Result<(), HeapError> {
        if self.max_heap_bytes == Some(0) {
            return Err(HeapError::InvalidConfig {
                reason: "max_heap_bytes must be positive".into(),
            });
        }
        if self.trigger_bytes == Some(0) {
            return Err(HeapError::InvalidConfig {
                reason: "trigger_bytes must be positive".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid_and_manual() {
        let config = GcConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.trigger_bytes, None);
    }

    #[test]
    fn zero_limits_are_rejected() {
        let config = GcConfig {
            trigger_bytes: Some(0),
            ..GcConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(HeapError::InvalidConfig { .. })
        ));
        let config = GcConfig {
            max_heap_bytes: Some(0),
            ..GcConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
