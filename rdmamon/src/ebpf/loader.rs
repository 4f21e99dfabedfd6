//! Handle to the kernel-side instrumentation layer.
//!
//! Loads the externally-built BPF object, attaches its kprobes and the CM
//! tracepoint, and wraps the four maps the collector consumes: the global
//! resource-count array, the per-cgroup stats hash, the event ring buffer
//! and the interception-config slot.

use std::os::fd::AsRawFd;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use aya::maps::{Array, HashMap as BpfHashMap, MapData, RingBuf};
use aya::programs::{KProbe, TracePoint};
use aya::Ebpf;
use rdmamon_common::{RawCgroupCounts, RawInterceptConfig, RawResourceCounts};

use crate::config::InterceptionConfig;
use crate::data::model::{CgroupCounts, EventRecord, GlobalResourceCounts};

/// Program name in the BPF object and the kernel function it probes.
/// Mirrors the probe set of the instrumentation object: mlx5 control-path
/// entry points plus the two GID resolution paths.
const KPROBES: &[(&str, &str)] = &[
    ("ib_create_qp", "mlx5_ib_create_qp"),
    ("ib_modify_qp", "mlx5_ib_modify_qp"),
    ("ib_destroy_qp", "mlx5_ib_destroy_qp"),
    ("ib_alloc_pd", "mlx5_ib_alloc_pd"),
    ("ib_dealloc_pd", "mlx5_ib_dealloc_pd"),
    ("ib_create_cq", "mlx5_ib_create_cq"),
    ("ib_destroy_cq", "mlx5_ib_destroy_cq"),
    ("ib_reg_mr", "mlx5_ib_reg_user_mr"),
    ("ib_dereg_mr", "mlx5_ib_dereg_mr"),
    ("ib_gid_query1", "rdma_get_gid_attr"),
    ("ib_gid_query2", "rdma_read_gid_attr_ndev_rcu"),
];

pub struct Probes {
    // Dropping this detaches every program, so it must live as long as the
    // map handles below.
    _ebpf: Ebpf,
    resource_counts: Array<MapData, RawResourceCounts>,
    cgroup_stats: BpfHashMap<MapData, u64, RawCgroupCounts>,
    events: RingBuf<MapData>,
    intercept_config: Array<MapData, RawInterceptConfig>,
}

impl Probes {
    /// Load the BPF object and attach all probes. Failure here is the one
    /// fatal condition in the collector: without the maps there is nothing
    /// to monitor.
    pub fn load(object_path: &Path) -> Result<Self> {
        bump_memlock_rlimit();

        let mut ebpf = Ebpf::load_file(object_path)
            .with_context(|| format!("loading BPF object {}", object_path.display()))?;

        for &(prog_name, kernel_fn) in KPROBES {
            let kprobe: &mut KProbe = ebpf
                .program_mut(prog_name)
                .with_context(|| format!("program {prog_name} not found in BPF object"))?
                .try_into()?;
            kprobe.load()?;
            kprobe
                .attach(kernel_fn, 0)
                .with_context(|| format!("attaching kprobe to {kernel_fn}"))?;
        }

        let tracepoint: &mut TracePoint = ebpf
            .program_mut("cm_send_req")
            .context("program cm_send_req not found in BPF object")?
            .try_into()?;
        tracepoint.load()?;
        tracepoint
            .attach("rdma_cma", "cm_send_req")
            .context("attaching rdma_cma:cm_send_req tracepoint")?;

        let resource_counts = Array::try_from(
            ebpf.take_map("resource_counts")
                .context("map resource_counts not found")?,
        )?;
        let cgroup_stats = BpfHashMap::try_from(
            ebpf.take_map("cgroup_stats")
                .context("map cgroup_stats not found")?,
        )?;
        let events = RingBuf::try_from(ebpf.take_map("rb").context("map rb not found")?)?;
        let intercept_config = Array::try_from(
            ebpf.take_map("intercept_config_map")
                .context("map intercept_config_map not found")?,
        )?;

        log::info!(
            "attached {} kprobes and 1 tracepoint from {}",
            KPROBES.len(),
            object_path.display()
        );

        Ok(Self {
            _ebpf: ebpf,
            resource_counts,
            cgroup_stats,
            events,
            intercept_config,
        })
    }

    /// Point-in-time snapshot of the global live resource counts.
    pub fn read_global_counts(&self) -> Result<GlobalResourceCounts> {
        let raw = self
            .resource_counts
            .get(&0, 0)
            .context("reading resource_counts map")?;
        Ok(raw.into())
    }

    /// Unordered snapshot of the per-cgroup verb counters. Entries that
    /// fail to read mid-iteration (deleted or torn) are skipped, not fatal.
    pub fn cgroup_stats(&self) -> Result<Vec<(u64, CgroupCounts)>> {
        let mut stats = Vec::new();
        for entry in self.cgroup_stats.iter() {
            match entry {
                Ok((cgroup_id, counts)) => stats.push((cgroup_id, counts.into())),
                Err(e) => log::debug!("skipping unreadable cgroup_stats entry: {e}"),
            }
        }
        Ok(stats)
    }

    /// Wait up to `timeout` for ring-buffer data, then drain whatever is
    /// available without blocking. Records the kernel dropped under
    /// pressure are simply absent; the counter tables stay authoritative.
    pub fn drain_events(&mut self, timeout: Duration) -> Vec<EventRecord> {
        let mut pollfd = libc::pollfd {
            fd: self.events.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let ready = unsafe { libc::poll(&mut pollfd, 1, timeout.as_millis() as i32) };
        if ready <= 0 {
            // Timeout, or EINTR from a termination signal; the caller's
            // loop re-checks its shutdown flag either way.
            return Vec::new();
        }

        let mut records = Vec::new();
        while let Some(item) = self.events.next() {
            match EventRecord::parse(&item) {
                Some(event) => records.push(event),
                None => log::debug!("discarding malformed event record ({} bytes)", item.len()),
            }
        }
        records
    }

    /// Mirror the threshold config into the instrumentation layer's config
    /// slot so probe-side enforcement can consult it directly.
    pub fn push_config(&mut self, config: &InterceptionConfig) -> Result<()> {
        self.intercept_config
            .set(0, config.to_raw(), 0)
            .context("writing intercept_config_map")
    }
}

/// Lift RLIMIT_MEMLOCK so map creation does not fail on kernels that still
/// account BPF memory against it. Best effort; newer kernels use cgroup
/// accounting instead.
fn bump_memlock_rlimit() {
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        log::debug!("setrlimit(RLIMIT_MEMLOCK) failed with {ret}");
    }
}
