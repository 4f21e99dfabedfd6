//! Windowed rate derivation from the monotonically-increasing counter
//! tables.
//!
//! Counters never decrease except when destroys outpace creates on a live
//! resource count; a decrease yields a zero rate rather than a negative
//! one. Previous samples are seeded at zero, which matches the counters
//! themselves starting at zero when the probes attach.

use std::collections::HashMap;

use rdmamon_common::{NUM_RESOURCES, NUM_VERBS};

use crate::data::model::{CgroupCounts, GlobalResourceCounts};
use crate::verbs::{Resource, Verb};

/// Rates computed for one tick, in events per second.
#[derive(Debug, Default)]
pub struct TickRates {
    resource_rates: [f64; NUM_RESOURCES],
    cgroup_rates: HashMap<u64, [f64; NUM_VERBS]>,
}

impl TickRates {
    /// Creation rate for a resource, derived from the global live-count
    /// delta.
    pub fn resource_rate(&self, resource: Resource) -> f64 {
        self.resource_rates[resource.index()]
    }

    /// Call rate of one verb within one cgroup.
    pub fn verb_rate(&self, cgroup_id: u64, verb: Verb) -> f64 {
        self.cgroup_rates
            .get(&cgroup_id)
            .map_or(0.0, |rates| rates[verb.index()])
    }
}

/// Holds the previous tick's snapshots and turns the current ones into
/// per-tick rates. Owned exclusively by the sampling thread; no locking.
#[derive(Debug, Default)]
pub struct RateSampler {
    prev_global: GlobalResourceCounts,
    prev_cgroups: HashMap<u64, CgroupCounts>,
}

impl RateSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute rates for this tick and store the snapshots for the next
    /// one. `interval_secs` is the elapsed wall-clock time since the
    /// previous sample.
    pub fn sample(
        &mut self,
        global: GlobalResourceCounts,
        cgroups: &[(u64, CgroupCounts)],
        interval_secs: f64,
    ) -> TickRates {
        let mut rates = TickRates::default();
        if interval_secs <= 0.0 {
            self.prev_global = global;
            return rates;
        }

        for resource in Resource::ALL {
            rates.resource_rates[resource.index()] =
                delta_rate(self.prev_global.get(resource), global.get(resource), interval_secs);
        }
        self.prev_global = global;

        for &(cgroup_id, counts) in cgroups {
            let prev = self
                .prev_cgroups
                .get(&cgroup_id)
                .copied()
                .unwrap_or_default();
            let mut verb_rates = [0.0; NUM_VERBS];
            for verb in Verb::ALL {
                verb_rates[verb.index()] =
                    delta_rate(prev.get(verb), counts.get(verb), interval_secs);
            }
            rates.cgroup_rates.insert(cgroup_id, verb_rates);
            self.prev_cgroups.insert(cgroup_id, counts);
        }

        rates
    }
}

fn delta_rate(prev: u64, current: u64, interval_secs: f64) -> f64 {
    if current > prev {
        (current - prev) as f64 / interval_secs
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdmamon_common::NUM_VERBS;

    fn counts(qp: u64) -> GlobalResourceCounts {
        GlobalResourceCounts::new([qp, 0, 0, 0])
    }

    fn cgroup_with(verb: Verb, count: u64) -> CgroupCounts {
        let mut c = [0u64; NUM_VERBS];
        c[verb.index()] = count;
        CgroupCounts::new(c)
    }

    #[test]
    fn rate_is_delta_over_interval() {
        let mut sampler = RateSampler::new();
        sampler.sample(counts(100), &[], 1.0);
        let rates = sampler.sample(counts(160), &[], 2.0);
        assert_eq!(rates.resource_rate(Resource::QueuePair), 30.0);
    }

    #[test]
    fn decrease_yields_zero_not_negative() {
        let mut sampler = RateSampler::new();
        sampler.sample(counts(100), &[], 1.0);
        let rates = sampler.sample(counts(90), &[], 1.0);
        assert_eq!(rates.resource_rate(Resource::QueuePair), 0.0);

        // The lower value becomes the new baseline.
        let rates = sampler.sample(counts(95), &[], 1.0);
        assert_eq!(rates.resource_rate(Resource::QueuePair), 5.0);
    }

    #[test]
    fn cgroup_rates_use_per_tick_deltas_not_cumulative_counts() {
        let mut sampler = RateSampler::new();
        // 50 MR registrations per one-second tick, cumulative 50..250.
        for tick in 1..=5u64 {
            let stats = [(7u64, cgroup_with(Verb::MrReg, tick * 50))];
            let rates = sampler.sample(GlobalResourceCounts::default(), &stats, 1.0);
            assert_eq!(rates.verb_rate(7, Verb::MrReg), 50.0, "tick {tick}");
        }
    }

    #[test]
    fn unknown_cgroup_has_zero_rate() {
        let mut sampler = RateSampler::new();
        let rates = sampler.sample(GlobalResourceCounts::default(), &[], 1.0);
        assert_eq!(rates.verb_rate(99, Verb::QpCreate), 0.0);
    }

    #[test]
    fn zero_interval_produces_no_rates() {
        let mut sampler = RateSampler::new();
        let rates = sampler.sample(counts(1000), &[], 0.0);
        assert_eq!(rates.resource_rate(Resource::QueuePair), 0.0);
    }
}
