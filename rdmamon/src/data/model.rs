//! User-space view of the counter tables and event records maintained by
//! the instrumentation layer.

use rdmamon_common::{
    RawCgroupCounts, RawEvent, RawResourceCounts, CM_ADDR_LEN, NUM_RESOURCES, NUM_VERBS,
};

use crate::verbs::{Resource, Verb};

/// Snapshot of the live resource counts. Individual counters are updated
/// atomically on the kernel side but the snapshot as a whole may be torn
/// across fields; each field is only consistent with itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GlobalResourceCounts {
    counts: [u64; NUM_RESOURCES],
}

impl GlobalResourceCounts {
    pub fn new(counts: [u64; NUM_RESOURCES]) -> Self {
        Self { counts }
    }

    pub fn get(&self, resource: Resource) -> u64 {
        self.counts[resource.index()]
    }
}

impl From<RawResourceCounts> for GlobalResourceCounts {
    fn from(raw: RawResourceCounts) -> Self {
        Self {
            counts: [raw.qp_count, raw.pd_count, raw.cq_count, raw.mr_count],
        }
    }
}

/// Cumulative per-verb call counts for one cgroup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CgroupCounts {
    counts: [u64; NUM_VERBS],
}

impl CgroupCounts {
    pub fn new(counts: [u64; NUM_VERBS]) -> Self {
        Self { counts }
    }

    pub fn get(&self, verb: Verb) -> u64 {
        self.counts[verb.index()]
    }

    pub fn any_nonzero(&self) -> bool {
        self.counts.iter().any(|&c| c > 0)
    }
}

impl From<RawCgroupCounts> for CgroupCounts {
    fn from(raw: RawCgroupCounts) -> Self {
        Self { counts: raw.counts }
    }
}

/// One decoded event record from the ring buffer. Consumed once and
/// discarded; all threshold decisions come from the counter tables, not
/// from these (delivery is best effort).
#[derive(Clone, Debug)]
pub struct EventRecord {
    pub pid: i32,
    pub comm: String,
    pub cgroup_id: u64,
    pub verb: Verb,
    pub payload: EventPayload,
}

#[derive(Clone, Debug)]
pub enum EventPayload {
    /// QP create/modify: local and destination QPN, GID in wire format.
    Qp {
        qpn: u32,
        dest_qpn: u32,
        gid: String,
    },
    /// MR register: virtual address, length, rkey.
    Mr { va: u64, len: u64, rkey: u64 },
    /// CM send-request: connection id, QPN, decoded endpoint addresses.
    Cm {
        cm_id: u32,
        qpn: u32,
        src: String,
        dst: String,
    },
    None,
}

impl EventRecord {
    /// Decode a raw ring-buffer record. Returns `None` for truncated
    /// records or unknown verb tags rather than failing the drain.
    pub fn parse(buf: &[u8]) -> Option<EventRecord> {
        if buf.len() < std::mem::size_of::<RawEvent>() {
            return None;
        }
        let raw = unsafe { std::ptr::read_unaligned(buf.as_ptr() as *const RawEvent) };
        let verb = Verb::from_tag(raw.kind)?;

        let payload = match verb {
            Verb::QpCreate | Verb::QpModify => EventPayload::Qp {
                qpn: raw.qp.qpn,
                dest_qpn: raw.qp.dest_qpn,
                gid: wire_gid(&raw.qp.gid),
            },
            Verb::MrReg => EventPayload::Mr {
                va: raw.mr.va,
                len: raw.mr.len,
                rkey: raw.mr.rkey,
            },
            Verb::CmSendReq => EventPayload::Cm {
                cm_id: raw.cm.cm_id,
                qpn: raw.cm.qpn,
                src: format_sockaddr(&raw.cm.srcaddr),
                dst: format_sockaddr(&raw.cm.dstaddr),
            },
            _ => EventPayload::None,
        };

        Some(EventRecord {
            pid: raw.pid,
            comm: comm_str(&raw.comm),
            cgroup_id: raw.cgroup_id,
            verb,
            payload,
        })
    }
}

fn comm_str(comm: &[u8]) -> String {
    let end = comm.iter().position(|&b| b == 0).unwrap_or(comm.len());
    String::from_utf8_lossy(&comm[..end]).into_owned()
}

/// 16-byte GID rendered as the 32-hex-digit RDMA wire format.
pub fn wire_gid(gid: &[u8; 16]) -> String {
    let mut out = String::with_capacity(32);
    for b in gid {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Decode a raw sockaddr blob into "ip:port". Unknown address families
/// fall back to a hex dump of the first 8 bytes.
fn format_sockaddr(addr: &[u8; CM_ADDR_LEN]) -> String {
    let family = u16::from_ne_bytes([addr[0], addr[1]]);
    let port = u16::from_be_bytes([addr[2], addr[3]]);
    match family as i32 {
        libc::AF_INET => {
            let ip = std::net::Ipv4Addr::new(addr[4], addr[5], addr[6], addr[7]);
            format!("{ip}:{port}")
        }
        libc::AF_INET6 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&addr[8..24]);
            format!("[{}]:{port}", std::net::Ipv6Addr::from(octets))
        }
        _ => addr[..8].iter().map(|b| format!("{b:02x}")).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdmamon_common::VERB_MR_REG;

    fn raw_event(kind: u32) -> RawEvent {
        let mut comm = [0u8; 16];
        comm[..4].copy_from_slice(b"perf");
        RawEvent {
            pid: 1234,
            kind,
            comm,
            cgroup_id: 42,
            qp: rdmamon_common::RawQpPayload {
                qpn: 7,
                dest_qpn: 9,
                gid: [0xfe; 16],
            },
            mr: rdmamon_common::RawMrPayload {
                va: 0xdead_0000,
                rkey: 0x77,
                len: 4096,
            },
            cm: rdmamon_common::RawCmPayload {
                cm_id: 1,
                qpn: 7,
                srcaddr: [0; CM_ADDR_LEN],
                dstaddr: [0; CM_ADDR_LEN],
            },
        }
    }

    fn as_bytes(raw: &RawEvent) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(
                raw as *const RawEvent as *const u8,
                std::mem::size_of::<RawEvent>(),
            )
        }
    }

    #[test]
    fn parse_mr_register_event() {
        let raw = raw_event(VERB_MR_REG);
        let event = EventRecord::parse(as_bytes(&raw)).unwrap();
        assert_eq!(event.pid, 1234);
        assert_eq!(event.comm, "perf");
        assert_eq!(event.cgroup_id, 42);
        assert_eq!(event.verb, Verb::MrReg);
        match event.payload {
            EventPayload::Mr { va, len, rkey } => {
                assert_eq!(va, 0xdead_0000);
                assert_eq!(len, 4096);
                assert_eq!(rkey, 0x77);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn truncated_and_unknown_records_are_dropped() {
        let raw = raw_event(VERB_MR_REG);
        let bytes = as_bytes(&raw);
        assert!(EventRecord::parse(&bytes[..bytes.len() - 1]).is_none());

        let bad = raw_event(99);
        assert!(EventRecord::parse(as_bytes(&bad)).is_none());
    }

    #[test]
    fn gid_wire_format_is_32_hex_digits() {
        let mut gid = [0u8; 16];
        gid[0] = 0xfe;
        gid[15] = 0x01;
        let s = wire_gid(&gid);
        assert_eq!(s.len(), 32);
        assert!(s.starts_with("fe"));
        assert!(s.ends_with("01"));
    }

    #[test]
    fn ipv4_sockaddr_renders_ip_and_port() {
        let mut addr = [0u8; CM_ADDR_LEN];
        addr[..2].copy_from_slice(&(libc::AF_INET as u16).to_ne_bytes());
        addr[2..4].copy_from_slice(&4791u16.to_be_bytes());
        addr[4..8].copy_from_slice(&[10, 0, 0, 2]);
        assert_eq!(format_sockaddr(&addr), "10.0.0.2:4791");
    }
}
