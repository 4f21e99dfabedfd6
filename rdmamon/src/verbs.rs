//! Closed enumerations of the observed control-path verbs and countable
//! resource kinds, plus the stable name tables used for both display and
//! threshold-config matching.

use rdmamon_common as raw;

/// A countable RDMA object kind with a current live count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    QueuePair,
    ProtectionDomain,
    CompletionQueue,
    MemoryRegion,
}

impl Resource {
    pub const ALL: [Resource; raw::NUM_RESOURCES] = [
        Resource::QueuePair,
        Resource::ProtectionDomain,
        Resource::CompletionQueue,
        Resource::MemoryRegion,
    ];

    /// Slot in the per-resource ceiling table and in the raw counts struct.
    pub const fn index(self) -> usize {
        match self {
            Resource::QueuePair => 0,
            Resource::ProtectionDomain => 1,
            Resource::CompletionQueue => 2,
            Resource::MemoryRegion => 3,
        }
    }

    /// Name matched against threshold-config lines.
    pub fn config_name(self) -> &'static str {
        match self {
            Resource::QueuePair => "QP_COUNT",
            Resource::ProtectionDomain => "PD_COUNT",
            Resource::CompletionQueue => "CQ_COUNT",
            Resource::MemoryRegion => "MR_COUNT",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Resource::QueuePair => "QP (Queue Pairs)",
            Resource::ProtectionDomain => "PD (Protection Domains)",
            Resource::CompletionQueue => "CQ (Completion Queues)",
            Resource::MemoryRegion => "MR (Memory Regions)",
        }
    }

    pub fn from_config_name(name: &str) -> Option<Resource> {
        Resource::ALL.into_iter().find(|r| r.config_name() == name)
    }
}

/// One control-path operation kind. Verb counts are cumulative; they only
/// ever increase while the instrumentation layer runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    QpCreate,
    QpModify,
    QpDestroy,
    PdAlloc,
    PdDealloc,
    CqCreate,
    CqDestroy,
    MrReg,
    MrDereg,
    CmSendReq,
    GidQuery,
}

impl Verb {
    pub const ALL: [Verb; raw::NUM_VERBS] = [
        Verb::QpCreate,
        Verb::QpModify,
        Verb::QpDestroy,
        Verb::PdAlloc,
        Verb::PdDealloc,
        Verb::CqCreate,
        Verb::CqDestroy,
        Verb::MrReg,
        Verb::MrDereg,
        Verb::CmSendReq,
        Verb::GidQuery,
    ];

    /// Slot in the per-verb ceiling table and in the raw cgroup counts
    /// array. Matches the tag the instrumentation layer writes.
    pub const fn index(self) -> usize {
        match self {
            Verb::QpCreate => raw::VERB_QP_CREATE as usize,
            Verb::QpModify => raw::VERB_QP_MODIFY as usize,
            Verb::QpDestroy => raw::VERB_QP_DESTROY as usize,
            Verb::PdAlloc => raw::VERB_PD_ALLOC as usize,
            Verb::PdDealloc => raw::VERB_PD_DEALLOC as usize,
            Verb::CqCreate => raw::VERB_CQ_CREATE as usize,
            Verb::CqDestroy => raw::VERB_CQ_DESTROY as usize,
            Verb::MrReg => raw::VERB_MR_REG as usize,
            Verb::MrDereg => raw::VERB_MR_DEREG as usize,
            Verb::CmSendReq => raw::VERB_CM_SEND_REQ as usize,
            Verb::GidQuery => raw::VERB_GID_QUERY as usize,
        }
    }

    /// Name used both for display and for threshold-config matching.
    pub fn name(self) -> &'static str {
        match self {
            Verb::QpCreate => "QP_CREATE",
            Verb::QpModify => "QP_MODIFY",
            Verb::QpDestroy => "QP_DESTROY",
            Verb::PdAlloc => "PD_ALLOC",
            Verb::PdDealloc => "PD_DEALLOC",
            Verb::CqCreate => "CQ_CREATE",
            Verb::CqDestroy => "CQ_DESTROY",
            Verb::MrReg => "MR_REG",
            Verb::MrDereg => "MR_DEREG",
            Verb::CmSendReq => "CM_SEND_REQ",
            Verb::GidQuery => "GID_QUERY",
        }
    }

    pub fn from_config_name(name: &str) -> Option<Verb> {
        Verb::ALL.into_iter().find(|v| v.name() == name)
    }

    /// Decode the tag carried by a raw event record.
    pub fn from_tag(tag: u32) -> Option<Verb> {
        Verb::ALL.into_iter().find(|v| v.index() == tag as usize)
    }

    /// The resource whose live count this verb raises, if it is a
    /// create-class verb. Destroy/modify/CM/GID verbs have none and are
    /// evaluated by frequency only.
    pub fn creates(self) -> Option<Resource> {
        match self {
            Verb::QpCreate => Some(Resource::QueuePair),
            Verb::PdAlloc => Some(Resource::ProtectionDomain),
            Verb::CqCreate => Some(Resource::CompletionQueue),
            Verb::MrReg => Some(Resource::MemoryRegion),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_unique_across_both_tables() {
        // Resource and verb names share one config namespace; a collision
        // would make config matching ambiguous.
        let mut seen = HashSet::new();
        for r in Resource::ALL {
            assert!(seen.insert(r.config_name()), "duplicate {}", r.config_name());
        }
        for v in Verb::ALL {
            assert!(seen.insert(v.name()), "duplicate {}", v.name());
        }
        assert_eq!(seen.len(), Resource::ALL.len() + Verb::ALL.len());
    }

    #[test]
    fn verb_tags_round_trip() {
        for v in Verb::ALL {
            assert_eq!(Verb::from_tag(v.index() as u32), Some(v));
        }
        assert_eq!(Verb::from_tag(rdmamon_common::NUM_VERBS as u32), None);
    }

    #[test]
    fn create_verbs_cover_every_resource() {
        let created: Vec<_> = Verb::ALL.iter().filter_map(|v| v.creates()).collect();
        assert_eq!(created.len(), Resource::ALL.len());
        for r in Resource::ALL {
            assert!(created.contains(&r));
        }
    }
}
