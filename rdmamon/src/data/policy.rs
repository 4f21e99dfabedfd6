//! Threshold evaluation against the configured ceilings.
//!
//! Both checks are pure functions of the value handed in: no hysteresis,
//! no debounce. A value exactly at the ceiling is not a violation.

use crate::config::InterceptionConfig;
use crate::data::model::GlobalResourceCounts;
use crate::verbs::{Resource, Verb};

pub struct ThresholdPolicy {
    config: InterceptionConfig,
}

impl ThresholdPolicy {
    pub fn new(config: InterceptionConfig) -> Self {
        Self { config }
    }

    /// True iff the resource's ceiling is enabled and the live count is
    /// strictly above it.
    pub fn evaluate_resource(&self, resource: Resource, current_count: u64) -> bool {
        let ceiling = self.config.resource_ceiling(resource);
        ceiling > 0 && current_count > ceiling
    }

    /// True iff the verb's frequency ceiling is enabled and the rate is
    /// strictly above it.
    pub fn evaluate_frequency(&self, verb: Verb, rate: f64) -> bool {
        let ceiling = self.config.frequency_ceiling(verb);
        ceiling > 0 && rate > ceiling as f64
    }

    /// Combined verdict for one verb: create-class verbs are flagged when
    /// either their resource's count ceiling or their own frequency ceiling
    /// is exceeded; all other verbs by frequency only.
    pub fn evaluate_verb(&self, verb: Verb, global: &GlobalResourceCounts, rate: f64) -> bool {
        let over_count = verb
            .creates()
            .map_or(false, |resource| self.evaluate_resource(resource, global.get(resource)));
        over_count || self.evaluate_frequency(verb, rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(text: &str) -> ThresholdPolicy {
        ThresholdPolicy::new(InterceptionConfig::parse(text))
    }

    #[test]
    fn resource_ceiling_is_boundary_exclusive() {
        let policy = policy("QP_COUNT 10\n");
        assert!(!policy.evaluate_resource(Resource::QueuePair, 9));
        assert!(!policy.evaluate_resource(Resource::QueuePair, 10));
        assert!(policy.evaluate_resource(Resource::QueuePair, 11));
    }

    #[test]
    fn frequency_ceiling_is_boundary_exclusive() {
        let policy = policy("MR_REG 100\n");
        assert!(!policy.evaluate_frequency(Verb::MrReg, 99.9));
        assert!(!policy.evaluate_frequency(Verb::MrReg, 100.0));
        assert!(policy.evaluate_frequency(Verb::MrReg, 100.1));
    }

    #[test]
    fn zero_ceiling_never_flags() {
        let policy = policy("");
        assert!(!policy.evaluate_resource(Resource::MemoryRegion, u64::MAX));
        assert!(!policy.evaluate_frequency(Verb::CmSendReq, f64::MAX));
    }

    #[test]
    fn create_verbs_flag_on_either_ceiling() {
        let policy = policy("QP_COUNT 10\nQP_CREATE 5\n");
        let under = GlobalResourceCounts::new([8, 0, 0, 0]);
        let over = GlobalResourceCounts::new([11, 0, 0, 0]);

        // Count ceiling alone.
        assert!(policy.evaluate_verb(Verb::QpCreate, &over, 1.0));
        // Frequency ceiling alone.
        assert!(policy.evaluate_verb(Verb::QpCreate, &under, 6.0));
        // Neither.
        assert!(!policy.evaluate_verb(Verb::QpCreate, &under, 5.0));
    }

    #[test]
    fn non_resource_verbs_ignore_counts() {
        let policy = policy("QP_COUNT 1\nQP_DESTROY 10\n");
        let over = GlobalResourceCounts::new([100, 0, 0, 0]);
        // QP_DESTROY has no live count of its own; only its rate matters.
        assert!(!policy.evaluate_verb(Verb::QpDestroy, &over, 10.0));
        assert!(policy.evaluate_verb(Verb::QpDestroy, &over, 10.5));
    }
}
