// BSD routing table from a routing-socket RIB dump
//
// A NET_RT_DUMP sysctl returns back-to-back rt_msghdr messages. Each header
// is followed by the sockaddrs named in rtm_addrs, in RTAX_* order, each
// padded to the platform's sockaddr alignment. Header layouts differ per
// BSD, so decoding goes through an explicit RibSchema.

use super::{NetRoute, RouteFlag};
use crate::codec::{bytes_to_ipv4, bytes_to_mac, read_array};
use crate::error::{SnapshotError, SnapshotResult};

pub const RTAX_DST: usize = 0;
pub const RTAX_GATEWAY: usize = 1;
pub const RTAX_NETMASK: usize = 2;
pub const RTAX_GENMASK: usize = 3;
pub const RTAX_IFP: usize = 4;
pub const RTAX_IFA: usize = 5;
pub const RTAX_MAX: usize = 8;

const AF_INET: u8 = 2;
const AF_LINK: u8 = 18;

const RTM_ADD: u8 = 0x1;
const RTM_GET: u8 = 0x4;

/// Where a message's header length comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLen {
    /// sizeof(struct rt_msghdr)
    Fixed(usize),
    /// Offset of an rtm_hdrlen field (OpenBSD)
    Field(usize),
}

/// Byte layout of one platform's rt_msghdr
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RibSchema {
    pub version: u8,
    pub header_len: HeaderLen,
    pub index_offset: usize,
    pub flags_offset: usize,
    pub addrs_offset: usize,
    pub seq_offset: usize,
    pub errno_offset: usize,
    pub sockaddr_align: usize,
}

const LONG: usize = std::mem::size_of::<usize>();

impl RibSchema {
    /// darwin-xnu: 14 u_int32_t metrics, 4-byte sockaddr alignment
    pub const DARWIN: RibSchema = RibSchema {
        version: 5,
        header_len: HeaderLen::Fixed(92),
        index_offset: 4,
        flags_offset: 8,
        addrs_offset: 12,
        seq_offset: 20,
        errno_offset: 24,
        sockaddr_align: 4,
    };

    /// FreeBSD: u_long rtm_inits followed by 14 u_long metrics
    pub const FREEBSD: RibSchema = RibSchema {
        version: 5,
        header_len: HeaderLen::Fixed(32 + 15 * LONG),
        index_offset: 4,
        flags_offset: 8,
        addrs_offset: 12,
        seq_offset: 20,
        errno_offset: 24,
        sockaddr_align: LONG,
    };

    /// NetBSD: 64-bit metrics, sockaddrs rounded to uint64_t
    pub const NETBSD: RibSchema = RibSchema {
        version: 4,
        header_len: HeaderLen::Fixed(120),
        index_offset: 4,
        flags_offset: 8,
        addrs_offset: 12,
        seq_offset: 20,
        errno_offset: 24,
        sockaddr_align: 8,
    };

    /// OpenBSD carries its own header length at offset 4
    pub const OPENBSD: RibSchema = RibSchema {
        version: 5,
        header_len: HeaderLen::Field(4),
        index_offset: 6,
        flags_offset: 16,
        addrs_offset: 12,
        seq_offset: 28,
        errno_offset: 32,
        sockaddr_align: LONG,
    };

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    pub fn native() -> &'static RibSchema {
        &Self::DARWIN
    }

    #[cfg(target_os = "freebsd")]
    pub fn native() -> &'static RibSchema {
        &Self::FREEBSD
    }

    #[cfg(target_os = "netbsd")]
    pub fn native() -> &'static RibSchema {
        &Self::NETBSD
    }

    #[cfg(target_os = "openbsd")]
    pub fn native() -> &'static RibSchema {
        &Self::OPENBSD
    }

    fn roundup(&self, len: usize) -> usize {
        if len == 0 {
            return self.sockaddr_align;
        }
        len.div_ceil(self.sockaddr_align) * self.sockaddr_align
    }
}

/// Link-layer address (sockaddr_dl)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAddr {
    pub index: u16,
    pub name: String,
    pub addr: Vec<u8>,
}

/// One decoded address slot of a routing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RibAddr {
    Inet4([u8; 4]),
    Link(LinkAddr),
    Other { family: u8 },
}

/// Owned copy of one routing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMessage {
    pub index: u16,
    pub flags: i32,
    pub seq: i32,
    pub errno: i32,
    pub addrs: [Option<RibAddr>; RTAX_MAX],
}

fn malformed(offset: usize, reason: impl Into<String>) -> SnapshotError {
    SnapshotError::MalformedRibMessage {
        offset,
        reason: reason.into(),
    }
}

fn ne_u16(buf: &[u8], offset: usize) -> Option<u16> {
    read_array::<2>(buf, offset).map(u16::from_ne_bytes)
}

fn ne_i32(buf: &[u8], offset: usize) -> Option<i32> {
    read_array::<4>(buf, offset).map(i32::from_ne_bytes)
}

/// Split a RIB dump into route messages.
///
/// Messages of another version or of a non-route type are skipped.
pub fn parse_rib(buf: &[u8], schema: &RibSchema) -> SnapshotResult<Vec<RouteMessage>> {
    let mut messages = Vec::new();
    let mut offset = 0;

    while offset < buf.len() {
        let rest = &buf[offset..];
        let msglen = ne_u16(rest, 0)
            .ok_or_else(|| malformed(offset, "truncated message length"))? as usize;
        if msglen < 4 || msglen > rest.len() {
            return Err(malformed(
                offset,
                format!("message length {msglen} with {} bytes left", rest.len()),
            ));
        }

        let msg = &rest[..msglen];
        let (version, kind) = (msg[2], msg[3]);
        if version != schema.version {
            tracing::trace!(offset, version, "skipping routing message of another version");
        } else if !(RTM_ADD..=RTM_GET).contains(&kind) {
            tracing::trace!(offset, kind, "skipping non-route message");
        } else {
            messages.push(parse_message(msg, offset, schema)?);
        }

        offset += msglen;
    }

    Ok(messages)
}

fn parse_message(msg: &[u8], base: usize, schema: &RibSchema) -> SnapshotResult<RouteMessage> {
    let truncated = || malformed(base, "truncated header");

    let header_len = match schema.header_len {
        HeaderLen::Fixed(len) => len,
        HeaderLen::Field(offset) => ne_u16(msg, offset).ok_or_else(truncated)? as usize,
    };
    if header_len > msg.len() {
        return Err(malformed(
            base,
            format!("header length {header_len} exceeds message length {}", msg.len()),
        ));
    }

    let index = ne_u16(msg, schema.index_offset).ok_or_else(truncated)?;
    let flags = ne_i32(msg, schema.flags_offset).ok_or_else(truncated)?;
    let present = ne_i32(msg, schema.addrs_offset).ok_or_else(truncated)?;
    let seq = ne_i32(msg, schema.seq_offset).ok_or_else(truncated)?;
    let errno = ne_i32(msg, schema.errno_offset).ok_or_else(truncated)?;

    let mut addrs: [Option<RibAddr>; RTAX_MAX] = Default::default();
    let mut cursor = header_len;

    for (slot, addr) in addrs.iter_mut().enumerate() {
        if present & (1 << slot) == 0 {
            continue;
        }
        let sa = msg
            .get(cursor..)
            .filter(|rest| !rest.is_empty())
            .ok_or_else(|| malformed(base + cursor, format!("missing sockaddr for slot {slot}")))?;
        let sa_len = sa[0] as usize;
        if sa_len > sa.len() {
            return Err(malformed(
                base + cursor,
                format!("sockaddr length {sa_len} overruns message"),
            ));
        }

        let body = &sa[..sa_len];
        *addr = Some(match slot {
            RTAX_NETMASK | RTAX_GENMASK => decode_mask(body),
            _ => decode_sockaddr(body).ok_or_else(|| {
                malformed(base + cursor, format!("truncated sockaddr in slot {slot}"))
            })?,
        });
        cursor += schema.roundup(sa_len);
    }

    Ok(RouteMessage {
        index,
        flags,
        seq,
        errno,
        addrs,
    })
}

/// Masks carry no reliable family and are truncated after the last
/// non-zero byte; missing bytes are zero.
fn decode_mask(body: &[u8]) -> RibAddr {
    let mut ip = [0u8; 4];
    if let Some(bytes) = body.get(4..) {
        let n = bytes.len().min(4);
        ip[..n].copy_from_slice(&bytes[..n]);
    }
    RibAddr::Inet4(ip)
}

fn decode_sockaddr(body: &[u8]) -> Option<RibAddr> {
    let Some(&family) = body.get(1) else {
        return Some(RibAddr::Other { family: 0 });
    };

    match family {
        AF_INET => read_array::<4>(body, 4).map(RibAddr::Inet4),
        AF_LINK => {
            let index = ne_u16(body, 2)?;
            let name_len = *body.get(5)? as usize;
            let addr_len = *body.get(6)? as usize;
            let data = body.get(8..)?;
            let name = data.get(..name_len)?;
            let addr = data.get(name_len..name_len + addr_len)?;
            Some(RibAddr::Link(LinkAddr {
                index,
                name: String::from_utf8_lossy(name).into_owned(),
                addr: addr.to_vec(),
            }))
        }
        other => Some(RibAddr::Other { family: other }),
    }
}

/// Normalize route messages.
///
/// `interface_name` maps the message's interface index to a name when the
/// message does not carry one.
pub fn messages_to_routes<F>(
    messages: &[RouteMessage],
    interface_name: F,
) -> SnapshotResult<Vec<NetRoute>>
where
    F: Fn(u16) -> Option<String>,
{
    let mut routes = Vec::with_capacity(messages.len());

    for msg in messages {
        let destination = match &msg.addrs[RTAX_DST] {
            None => String::new(),
            Some(RibAddr::Inet4(ip)) => bytes_to_ipv4(*ip, false),
            Some(_) => "unk".to_string(),
        };

        // The kernel marks many entries with transient errors; only the
        // default route is kept when that happens.
        if msg.errno != 0 && destination != "0.0.0.0" {
            tracing::trace!(destination = %destination, errno = msg.errno, "dropping route message with error");
            continue;
        }

        let netmask = match &msg.addrs[RTAX_NETMASK] {
            None => "0".to_string(),
            Some(RibAddr::Inet4(ip)) => bytes_to_ipv4(*ip, false),
            Some(_) => "unk".to_string(),
        };

        let gateway = match &msg.addrs[RTAX_GATEWAY] {
            Some(RibAddr::Inet4(ip)) => bytes_to_ipv4(*ip, false),
            Some(RibAddr::Link(link)) => format_link_gateway(link)?,
            _ => "unk".to_string(),
        };

        routes.push(NetRoute {
            metric: msg.seq as u32,
            destination: format!("{destination}/{netmask}"),
            gateway,
            flags: RouteFlag::from_bsd_mask(msg.flags).to_table_string(),
            iface: resolve_iface(msg, &interface_name),
        });
    }

    Ok(routes)
}

fn format_link_gateway(link: &LinkAddr) -> SnapshotResult<String> {
    if !link.name.is_empty() {
        return Ok(link.name.clone());
    }
    let mut gateway = format!("link#{}", link.index);
    if !link.addr.is_empty() {
        gateway.push('@');
        gateway.push_str(&bytes_to_mac(&link.addr)?);
    }
    Ok(gateway)
}

fn resolve_iface<F>(msg: &RouteMessage, interface_name: &F) -> String
where
    F: Fn(u16) -> Option<String>,
{
    if let Some(RibAddr::Link(link)) = &msg.addrs[RTAX_IFP] {
        if !link.name.is_empty() {
            return link.name.clone();
        }
    }
    if let Some(name) = interface_name(msg.index) {
        return name;
    }
    match &msg.addrs[RTAX_IFA] {
        Some(RibAddr::Inet4(ip)) => bytes_to_ipv4(*ip, false),
        _ => String::new(),
    }
}

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd"
))]
pub use backend::RibRouteBackend;

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd"
))]
mod backend {
    use super::{RibSchema, messages_to_routes, parse_rib};
    use crate::error::SnapshotResult;
    use crate::fetch::GrowthPolicy;
    use crate::native::bsd;
    use crate::routes::{NetRoute, RouteBackend};

    /// Route backend reading the kernel RIB through sysctl
    #[derive(Debug, Clone, Default)]
    pub struct RibRouteBackend {
        policy: GrowthPolicy,
    }

    impl RibRouteBackend {
        pub fn new(policy: GrowthPolicy) -> Self {
            RibRouteBackend { policy }
        }
    }

    impl RouteBackend for RibRouteBackend {
        fn retrieve(&self) -> SnapshotResult<Vec<NetRoute>> {
            let rib = bsd::fetch_inet_rib(&self.policy)?;
            let messages = parse_rib(&rib, RibSchema::native())?;
            tracing::debug!(bytes = rib.len(), messages = messages.len(), "parsed routing socket dump");
            messages_to_routes(&messages, bsd::interface_name)
        }
    }
}
