//! Probability-to-decision policy

use crate::config::DEFAULT_THRESHOLD;
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

/// Labels a record as fraud when its probability is strictly above the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionPolicy {
    threshold: f64,
}

impl DecisionPolicy {
    pub fn new(threshold: f64) -> Result<Self, PipelineError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(PipelineError::Config(format!(
                "decision threshold must be within [0, 1], got {threshold}"
            )));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Equality with the threshold resolves to 0.
    pub fn decide(&self, probability: f64) -> u8 {
        u8::from(probability > self.threshold)
    }
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_strict() {
        let policy = DecisionPolicy::default();
        assert_eq!(policy.decide(0.61), 0);
        assert_eq!(policy.decide(0.6100001), 1);
        assert_eq!(policy.decide(0.0), 0);
        assert_eq!(policy.decide(1.0), 1);
    }

    #[test]
    fn test_decision_is_monotonic() {
        let policy = DecisionPolicy::default();
        let mut previous = 0;
        for i in 0..=1000 {
            let label = policy.decide(i as f64 / 1000.0);
            assert!(label >= previous);
            previous = label;
        }
    }

    #[test]
    fn test_out_of_range_threshold_is_rejected() {
        assert!(DecisionPolicy::new(1.5).is_err());
        assert!(DecisionPolicy::new(f64::NAN).is_err());
        assert_eq!(DecisionPolicy::new(0.5).unwrap().threshold(), 0.5);
    }
}
