//! Search budget configuration

use std::time::Duration;

/// Configuration for a linearizability check
#[derive(Debug, Clone)]
pub struct CheckConfig {
    /// Wall-clock budget per check (default: unbounded)
    pub timeout: Option<Duration>,
    /// Maximum number of `step` evaluations per partition (default: unbounded)
    pub step_limit: Option<u64>,
    /// Skip configurations already known to fail (default: true)
    /// Disabling never changes the result, only the running time
    pub memoize: bool,
    /// Search partitions on separate threads (default: false)
    pub parallel: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            step_limit: None,
            memoize: true,
            parallel: false,
        }
    }
}

impl CheckConfig {
    /// Create a new config with a wall-clock budget
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Create a new config with a step budget
    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = Some(limit);
        self
    }

    pub fn with_memoization(mut self, enabled: bool) -> Self {
        self.memoize = enabled;
        self
    }

    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CheckConfig::default();
        assert!(config.timeout.is_none());
        assert!(config.step_limit.is_none());
        assert!(config.memoize);
        assert!(!config.parallel);
    }

    #[test]
    fn test_builders() {
        let config = CheckConfig::default()
            .with_timeout(Duration::from_secs(2))
            .with_step_limit(100)
            .with_memoization(false)
            .with_parallel(true);
        assert_eq!(config.timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.step_limit, Some(100));
        assert!(!config.memoize);
        assert!(config.parallel);
    }
}
