//! Snapshot assembly and rendering.
//!
//! The reporter asks the threshold policy for verdicts and renders them; it
//! makes no policy decisions of its own. The global resource section is
//! change-triggered so steady state does not flood the output; the
//! per-cgroup section is emitted on every tick that has data.

use chrono::Local;

use crate::data::model::{CgroupCounts, GlobalResourceCounts};
use crate::data::policy::ThresholdPolicy;
use crate::data::sampler::TickRates;
use crate::verbs::{Resource, Verb};

const SEPARATOR: &str = "==================================================";
const LIMIT_MARKER: &str = " [LIMIT EXCEEDED]";

#[derive(Debug)]
pub struct ResourceRow {
    pub resource: Resource,
    pub count: u64,
    pub rate: f64,
    pub flagged: bool,
}

#[derive(Debug)]
pub struct VerbRow {
    pub verb: Verb,
    pub count: u64,
    pub rate: f64,
    pub flagged: bool,
}

#[derive(Debug)]
pub struct CgroupSection {
    pub cgroup_id: u64,
    pub rows: Vec<VerbRow>,
}

/// One tick's structured report. `global` is `None` when no resource count
/// changed since the last emitted global section.
#[derive(Debug)]
pub struct Snapshot {
    pub global: Option<Vec<ResourceRow>>,
    pub cgroups: Vec<CgroupSection>,
}

pub struct Reporter {
    last_emitted: Option<GlobalResourceCounts>,
}

impl Reporter {
    pub fn new() -> Self {
        Self { last_emitted: None }
    }

    /// Assemble the snapshot for this tick and record the global counts if
    /// the global section was included.
    pub fn snapshot(
        &mut self,
        global: GlobalResourceCounts,
        cgroups: &[(u64, CgroupCounts)],
        rates: &TickRates,
        policy: &ThresholdPolicy,
    ) -> Snapshot {
        let emit_global = self.last_emitted != Some(global);
        let global_rows = emit_global.then(|| {
            self.last_emitted = Some(global);
            Resource::ALL
                .into_iter()
                .map(|resource| ResourceRow {
                    resource,
                    count: global.get(resource),
                    rate: rates.resource_rate(resource),
                    flagged: policy.evaluate_resource(resource, global.get(resource)),
                })
                .collect()
        });

        let mut sections: Vec<CgroupSection> = cgroups
            .iter()
            .filter(|(_, counts)| counts.any_nonzero())
            .map(|&(cgroup_id, counts)| CgroupSection {
                cgroup_id,
                rows: Verb::ALL
                    .into_iter()
                    .filter(|&verb| counts.get(verb) > 0)
                    .map(|verb| {
                        let rate = rates.verb_rate(cgroup_id, verb);
                        VerbRow {
                            verb,
                            count: counts.get(verb),
                            rate,
                            flagged: policy.evaluate_verb(verb, &global, rate),
                        }
                    })
                    .collect(),
            })
            .collect();
        sections.sort_by_key(|s| s.cgroup_id);

        Snapshot {
            global: global_rows,
            cgroups: sections,
        }
    }

    /// Render a snapshot for display. Empty snapshots render to an empty
    /// string so quiet ticks print nothing.
    pub fn render(snapshot: &Snapshot) -> String {
        let mut out = String::new();
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");

        if let Some(rows) = &snapshot.global {
            out.push_str(SEPARATOR);
            out.push('\n');
            out.push_str(&format!("[{timestamp}] RDMA Resource Counts:\n"));
            out.push_str(SEPARATOR);
            out.push('\n');
            for row in rows {
                out.push_str(&format!(
                    "{:<24} {:>8}  ({:.1}/s){}\n",
                    format!("{}:", row.resource.display_name()),
                    row.count,
                    row.rate,
                    if row.flagged { LIMIT_MARKER } else { "" },
                ));
            }
            out.push_str(SEPARATOR);
            out.push_str("\n\n");
        }

        if !snapshot.cgroups.is_empty() {
            out.push_str(&format!("[{timestamp}] Per-Cgroup RDMA Statistics:\n"));
            out.push_str(SEPARATOR);
            out.push('\n');
            for section in &snapshot.cgroups {
                out.push_str(&format!("CGROUP ID: {}\n", section.cgroup_id));
                for row in &section.rows {
                    out.push_str(&format!(
                        "  {:<25}: {:>8}  ({:.1}/s){}\n",
                        row.verb.name(),
                        row.count,
                        row.rate,
                        if row.flagged { LIMIT_MARKER } else { "" },
                    ));
                }
                out.push('\n');
            }
            out.push_str(SEPARATOR);
            out.push_str("\n\n");
        }

        out
    }
}
