use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Local;

use crate::config::InterceptionConfig;
use crate::data::model::{EventPayload, EventRecord};
use crate::data::policy::ThresholdPolicy;
use crate::data::sampler::RateSampler;
use crate::ebpf::loader::Probes;
use crate::report::Reporter;

/// Bounded wait on the event ring buffer. Short enough that the sampling
/// cadence and the shutdown flag are never starved.
const EVENT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// The monitor loop: drains the event stream continuously and, once per
/// configured interval, samples the counter tables, evaluates thresholds
/// and prints the report.
pub struct App {
    probes: Probes,
    policy: ThresholdPolicy,
    sampler: RateSampler,
    reporter: Reporter,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl App {
    pub fn new(
        probes: Probes,
        config: InterceptionConfig,
        interval: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            probes,
            policy: ThresholdPolicy::new(config),
            sampler: RateSampler::new(),
            reporter: Reporter::new(),
            interval,
            shutdown,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        println!("RDMA Control Path Monitor Started");
        println!("==================================================\n");

        let mut last_tick = Instant::now();
        while !self.shutdown.load(Ordering::Relaxed) {
            for event in self.probes.drain_events(EVENT_POLL_TIMEOUT) {
                log_event(&event);
            }

            let elapsed = last_tick.elapsed();
            if elapsed >= self.interval {
                last_tick = Instant::now();
                self.tick(elapsed.as_secs_f64());
            }
        }

        // Drain whatever the ring buffer still holds before letting the
        // probe handles drop.
        for event in self.probes.drain_events(Duration::ZERO) {
            log_event(&event);
        }

        println!("==================================================");
        println!(
            "[{}] RDMA Control Path Monitor Stopped",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        println!("==================================================");
        Ok(())
    }

    /// One sampling cycle. Counter-read failures leave this cycle blank
    /// rather than aborting the monitor.
    fn tick(&mut self, elapsed_secs: f64) {
        let global = match self.probes.read_global_counts() {
            Ok(counts) => counts,
            Err(e) => {
                log::warn!("resource count read failed, skipping cycle: {e:#}");
                return;
            }
        };
        let cgroups = match self.probes.cgroup_stats() {
            Ok(stats) => stats,
            Err(e) => {
                log::warn!("cgroup stats read failed: {e:#}");
                Vec::new()
            }
        };

        let rates = self.sampler.sample(global, &cgroups, elapsed_secs);
        let snapshot = self.reporter.snapshot(global, &cgroups, &rates, &self.policy);
        let text = Reporter::render(&snapshot);
        if !text.is_empty() {
            print!("{text}");
        }
    }
}

/// Individual event records carry context for debugging but drive no
/// decisions; the stream is lossy under pressure.
fn log_event(event: &EventRecord) {
    match &event.payload {
        EventPayload::Qp { qpn, dest_qpn, gid } => log::debug!(
            "{} pid={} comm={} cgroup={} qpn={qpn} dqpn={dest_qpn} gid={gid}",
            event.verb.name(),
            event.pid,
            event.comm,
            event.cgroup_id,
        ),
        EventPayload::Mr { va, len, rkey } => log::debug!(
            "{} pid={} comm={} cgroup={} va={va:#x} len={len} rkey={rkey:#x}",
            event.verb.name(),
            event.pid,
            event.comm,
            event.cgroup_id,
        ),
        EventPayload::Cm { cm_id, qpn, src, dst } => log::debug!(
            "{} pid={} comm={} cgroup={} cm_id={cm_id} qpn={qpn} src={src} dst={dst}",
            event.verb.name(),
            event.pid,
            event.comm,
            event.cgroup_id,
        ),
        EventPayload::None => log::debug!(
            "{} pid={} comm={} cgroup={}",
            event.verb.name(),
            event.pid,
            event.comm,
            event.cgroup_id,
        ),
    }
}
