#![cfg_attr(not(feature = "userspace"), no_std)]

//! Structs shared between the kernel-side RDMA instrumentation object and
//! the user-space collector. Field layout must match the BPF object's map
//! value types byte for byte.

/// Length of the kernel `comm` field.
pub const TASK_COMM_LEN: usize = 16;

/// Length of a raw `sockaddr_storage`-style address blob carried by
/// connection-management events.
pub const CM_ADDR_LEN: usize = 28;

/// Number of distinct control-path verbs counted per cgroup.
pub const NUM_VERBS: usize = 11;

/// Number of countable resource kinds (QP, PD, CQ, MR).
pub const NUM_RESOURCES: usize = 4;

/// Verb tags as written by the instrumentation layer into
/// [`RawEvent::kind`] and used as indices into [`RawCgroupCounts::counts`].
pub const VERB_QP_CREATE: u32 = 0;
pub const VERB_QP_MODIFY: u32 = 1;
pub const VERB_QP_DESTROY: u32 = 2;
pub const VERB_PD_ALLOC: u32 = 3;
pub const VERB_PD_DEALLOC: u32 = 4;
pub const VERB_CQ_CREATE: u32 = 5;
pub const VERB_CQ_DESTROY: u32 = 6;
pub const VERB_MR_REG: u32 = 7;
pub const VERB_MR_DEREG: u32 = 8;
pub const VERB_CM_SEND_REQ: u32 = 9;
pub const VERB_GID_QUERY: u32 = 10;

/// Live resource counts, maintained globally by the instrumentation layer
/// with atomic add/sub (decrements clamp at zero). Singleton value of the
/// `resource_counts` array map.
#[repr(C)]
#[derive(Clone, Copy, Default)]
#[cfg_attr(feature = "userspace", derive(Debug, PartialEq, Eq))]
pub struct RawResourceCounts {
    pub qp_count: u64,
    pub pd_count: u64,
    pub cq_count: u64,
    pub mr_count: u64,
}

/// Cumulative per-verb call counts for one cgroup. Value type of the
/// `cgroup_stats` hash map, keyed by cgroup id.
#[repr(C)]
#[derive(Clone, Copy)]
#[cfg_attr(feature = "userspace", derive(Debug))]
pub struct RawCgroupCounts {
    pub counts: [u64; NUM_VERBS],
}

impl Default for RawCgroupCounts {
    fn default() -> Self {
        Self {
            counts: [0; NUM_VERBS],
        }
    }
}

/// Threshold ceilings pushed down into the `intercept_config_map` array map
/// so enforcement co-located with the probes can consult them. A ceiling of
/// zero disables that entry.
#[repr(C)]
#[derive(Clone, Copy)]
#[cfg_attr(feature = "userspace", derive(Debug, PartialEq, Eq))]
pub struct RawInterceptConfig {
    /// Max live count per resource kind, indexed QP/PD/CQ/MR.
    pub max_resource_count: [u64; NUM_RESOURCES],
    /// Max calls per second per verb, indexed by verb tag.
    pub max_frequency: [u64; NUM_VERBS],
}

impl Default for RawInterceptConfig {
    fn default() -> Self {
        Self {
            max_resource_count: [0; NUM_RESOURCES],
            max_frequency: [0; NUM_VERBS],
        }
    }
}

/// One observed control-path call, submitted to the `rb` ring buffer.
/// Delivery is best effort: records are dropped when the buffer is full.
/// Only the payload sub-struct matching `kind` carries meaningful data.
#[repr(C)]
#[derive(Clone, Copy)]
#[cfg_attr(feature = "userspace", derive(Debug))]
pub struct RawEvent {
    pub pid: i32,
    /// Verb tag, one of the `VERB_*` constants.
    pub kind: u32,
    pub comm: [u8; TASK_COMM_LEN],
    pub cgroup_id: u64,
    pub qp: RawQpPayload,
    pub mr: RawMrPayload,
    pub cm: RawCmPayload,
}

/// QP create/modify payload: local and destination QPN plus the 16-byte GID.
#[repr(C)]
#[derive(Clone, Copy)]
#[cfg_attr(feature = "userspace", derive(Debug))]
pub struct RawQpPayload {
    pub qpn: u32,
    pub dest_qpn: u32,
    pub gid: [u8; 16],
}

/// MR register payload.
#[repr(C)]
#[derive(Clone, Copy)]
#[cfg_attr(feature = "userspace", derive(Debug))]
pub struct RawMrPayload {
    pub va: u64,
    pub rkey: u64,
    pub len: u64,
}

/// CM send-request payload with raw source/destination sockaddr bytes.
#[repr(C)]
#[derive(Clone, Copy)]
#[cfg_attr(feature = "userspace", derive(Debug))]
pub struct RawCmPayload {
    pub cm_id: u32,
    pub qpn: u32,
    pub srcaddr: [u8; CM_ADDR_LEN],
    pub dstaddr: [u8; CM_ADDR_LEN],
}

#[cfg(feature = "userspace")]
unsafe impl aya::Pod for RawResourceCounts {}

#[cfg(feature = "userspace")]
unsafe impl aya::Pod for RawCgroupCounts {}

#[cfg(feature = "userspace")]
unsafe impl aya::Pod for RawInterceptConfig {}

#[cfg(feature = "userspace")]
unsafe impl aya::Pod for RawEvent {}
