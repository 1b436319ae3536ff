// Windows routing table from the IP Helper forwarding table
//
// The table is copied out of the OS allocation as raw bytes and decoded here
// with the 64-bit MIB_IPFORWARD_TABLE2 layout, so the decoder runs (and is
// tested) on every platform.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::{Ipv4Addr, Ipv6Addr};

use super::{NetRoute, RouteFlag};
use crate::codec::{prefix_len_to_netmask, read_array};
use crate::error::{SnapshotError, SnapshotResult};

pub const AF_INET: u16 = 2;
pub const AF_INET6: u16 = 23;

/// NumEntries plus padding up to the 8-byte aligned row array
pub const TABLE_HEADER_LEN: usize = 8;
/// sizeof(MIB_IPFORWARD_ROW2)
pub const ROW_LEN: usize = 104;
/// sizeof(SOCKADDR_INET)
const SOCKADDR_INET_LEN: usize = 28;

const OFF_LUID: usize = 0;
const OFF_INDEX: usize = 8;
const OFF_PREFIX: usize = 12;
const OFF_PREFIX_LEN: usize = 40;
const OFF_NEXT_HOP: usize = 44;
const OFF_SITE_PREFIX_LEN: usize = 72;
const OFF_VALID_LIFETIME: usize = 76;
const OFF_PREFERRED_LIFETIME: usize = 80;
const OFF_METRIC: usize = 84;
const OFF_PROTOCOL: usize = 88;
const OFF_LOOPBACK: usize = 92;
const OFF_AUTOCONF: usize = 93;
const OFF_PUBLISH: usize = 94;
const OFF_IMMORTAL: usize = 95;
const OFF_AGE: usize = 96;
const OFF_ORIGIN: usize = 100;

/// Decoded SOCKADDR_INET
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockAddrInet {
    V4(Ipv4Addr),
    V6 { addr: Ipv6Addr, scope_id: u32 },
    Unknown { family: u16 },
}

impl SockAddrInet {
    fn decode(raw: &[u8; SOCKADDR_INET_LEN]) -> Self {
        let family = u16::from_le_bytes([raw[0], raw[1]]);
        match family {
            AF_INET => SockAddrInet::V4(Ipv4Addr::new(raw[4], raw[5], raw[6], raw[7])),
            AF_INET6 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&raw[8..24]);
                SockAddrInet::V6 {
                    addr: Ipv6Addr::from(octets),
                    scope_id: u32::from_le_bytes([raw[24], raw[25], raw[26], raw[27]]),
                }
            }
            family => SockAddrInet::Unknown { family },
        }
    }

    pub fn is_unspecified(&self) -> bool {
        match self {
            SockAddrInet::V4(addr) => addr.is_unspecified(),
            SockAddrInet::V6 { addr, .. } => addr.is_unspecified(),
            SockAddrInet::Unknown { .. } => false,
        }
    }

    /// Next-hop rendering: dotted IPv4, IPv6 with `%scope` when scoped
    pub fn to_gateway_string(&self) -> String {
        match self {
            SockAddrInet::V4(addr) => addr.to_string(),
            SockAddrInet::V6 { addr, scope_id: 0 } => addr.to_string(),
            SockAddrInet::V6 { addr, scope_id } => format!("{addr}%{scope_id}"),
            SockAddrInet::Unknown { .. } => "unk".to_string(),
        }
    }
}

/// Owned copy of one MIB_IPFORWARD_ROW2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRow {
    pub interface_luid: u64,
    pub interface_index: u32,
    pub destination: SockAddrInet,
    pub prefix_length: u8,
    pub next_hop: SockAddrInet,
    pub site_prefix_length: u8,
    pub valid_lifetime: u32,
    pub preferred_lifetime: u32,
    pub metric: u32,
    pub protocol: i32,
    pub loopback: bool,
    pub autoconfigure_address: bool,
    pub publish: bool,
    pub immortal: bool,
    pub age: u32,
    pub origin: i32,
}

fn le_u32(row: &[u8], offset: usize) -> u32 {
    read_array::<4>(row, offset).map_or(0, u32::from_le_bytes)
}

fn le_i32(row: &[u8], offset: usize) -> i32 {
    read_array::<4>(row, offset).map_or(0, i32::from_le_bytes)
}

fn sockaddr_at(row: &[u8], offset: usize) -> SockAddrInet {
    read_array::<SOCKADDR_INET_LEN>(row, offset)
        .map_or(SockAddrInet::Unknown { family: 0 }, |raw| SockAddrInet::decode(&raw))
}

impl ForwardRow {
    /// Decode one row; `row` must be exactly [`ROW_LEN`] bytes
    fn decode(row: &[u8]) -> Self {
        ForwardRow {
            interface_luid: read_array::<8>(row, OFF_LUID).map_or(0, u64::from_le_bytes),
            interface_index: le_u32(row, OFF_INDEX),
            destination: sockaddr_at(row, OFF_PREFIX),
            prefix_length: row[OFF_PREFIX_LEN],
            next_hop: sockaddr_at(row, OFF_NEXT_HOP),
            site_prefix_length: row[OFF_SITE_PREFIX_LEN],
            valid_lifetime: le_u32(row, OFF_VALID_LIFETIME),
            preferred_lifetime: le_u32(row, OFF_PREFERRED_LIFETIME),
            metric: le_u32(row, OFF_METRIC),
            protocol: le_i32(row, OFF_PROTOCOL),
            loopback: row[OFF_LOOPBACK] != 0,
            autoconfigure_address: row[OFF_AUTOCONF] != 0,
            publish: row[OFF_PUBLISH] != 0,
            immortal: row[OFF_IMMORTAL] != 0,
            age: le_u32(row, OFF_AGE),
            origin: le_i32(row, OFF_ORIGIN),
        }
    }

    /// `<prefix>/<netmask>`
    pub fn destination_string(&self) -> String {
        let network = match self.destination {
            SockAddrInet::V4(addr) => addr.to_string(),
            _ => "unk".to_string(),
        };
        let netmask = match prefix_len_to_netmask(self.prefix_length) {
            Some(mask) => Ipv4Addr::from(mask).to_string(),
            None => "unk".to_string(),
        };
        format!("{network}/{netmask}")
    }
}

/// Decode a MIB_IPFORWARD_TABLE2 copied out as bytes
pub fn decode_forward_table(buf: &[u8]) -> SnapshotResult<Vec<ForwardRow>> {
    let count = read_array::<4>(buf, 0)
        .map(u32::from_le_bytes)
        .ok_or_else(|| SnapshotError::MalformedTable {
            reason: format!("{} bytes is too short for the table header", buf.len()),
        })? as usize;

    let needed = count
        .checked_mul(ROW_LEN)
        .and_then(|rows| rows.checked_add(TABLE_HEADER_LEN))
        .ok_or_else(|| SnapshotError::MalformedTable {
            reason: format!("row count {count} overflows"),
        })?;
    if buf.len() < needed {
        return Err(SnapshotError::MalformedTable {
            reason: format!("{count} rows need {needed} bytes, table has {}", buf.len()),
        });
    }

    Ok(buf[TABLE_HEADER_LEN..needed]
        .chunks_exact(ROW_LEN)
        .map(ForwardRow::decode)
        .collect())
}

/// What a route needs to know about its interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRecord {
    pub alias: String,
    pub oper_up: bool,
}

/// Resolve an interface LUID to its alias and operational state
pub trait InterfaceResolver {
    fn resolve(&self, luid: u64) -> SnapshotResult<InterfaceRecord>;
}

/// Normalize forwarding rows. Each LUID is resolved at most once per call.
pub fn rows_to_routes<R>(rows: &[ForwardRow], resolver: &R) -> SnapshotResult<Vec<NetRoute>>
where
    R: InterfaceResolver + ?Sized,
{
    let mut interfaces: HashMap<u64, InterfaceRecord> = HashMap::new();
    let mut routes = Vec::with_capacity(rows.len());

    for row in rows {
        let interface = match interfaces.entry(row.interface_luid) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(resolver.resolve(row.interface_luid)?),
        };

        let flags = RouteFlag::from_forward_row(
            interface.oper_up,
            row.publish,
            row.prefix_length,
            row.next_hop.is_unspecified(),
            row.immortal,
            row.autoconfigure_address,
        );

        routes.push(NetRoute {
            metric: row.metric,
            destination: row.destination_string(),
            gateway: row.next_hop.to_gateway_string(),
            flags: flags.to_table_string(),
            iface: interface.alias.clone(),
        });
    }

    tracing::debug!(
        rows = rows.len(),
        interfaces = interfaces.len(),
        "normalized forwarding table"
    );
    Ok(routes)
}

#[cfg(windows)]
pub use backend::ForwardTableBackend;

#[cfg(windows)]
mod backend {
    use super::{decode_forward_table, rows_to_routes};
    use crate::error::SnapshotResult;
    use crate::native::win32;
    use crate::routes::{NetRoute, RouteBackend};

    /// Route backend over `GetIpForwardTable2`
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ForwardTableBackend;

    impl RouteBackend for ForwardTableBackend {
        fn retrieve(&self) -> SnapshotResult<Vec<NetRoute>> {
            let table = win32::ipv4_forward_table()?;
            let rows = decode_forward_table(&table)?;
            rows_to_routes(&rows, &win32::IfEntryResolver)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn sockaddr_v4(ip: [u8; 4]) -> [u8; SOCKADDR_INET_LEN] {
        let mut raw = [0u8; SOCKADDR_INET_LEN];
        raw[0..2].copy_from_slice(&AF_INET.to_le_bytes());
        raw[4..8].copy_from_slice(&ip);
        raw
    }

    fn sockaddr_v6(ip: Ipv6Addr, scope_id: u32) -> [u8; SOCKADDR_INET_LEN] {
        let mut raw = [0u8; SOCKADDR_INET_LEN];
        raw[0..2].copy_from_slice(&AF_INET6.to_le_bytes());
        raw[8..24].copy_from_slice(&ip.octets());
        raw[24..28].copy_from_slice(&scope_id.to_le_bytes());
        raw
    }

    struct RowSpec {
        luid: u64,
        prefix: [u8; SOCKADDR_INET_LEN],
        prefix_length: u8,
        next_hop: [u8; SOCKADDR_INET_LEN],
        metric: u32,
        publish: bool,
        immortal: bool,
    }

    impl RowSpec {
        fn encode(&self) -> [u8; ROW_LEN] {
            let mut row = [0u8; ROW_LEN];
            row[OFF_LUID..OFF_LUID + 8].copy_from_slice(&self.luid.to_le_bytes());
            row[OFF_INDEX..OFF_INDEX + 4].copy_from_slice(&7u32.to_le_bytes());
            row[OFF_PREFIX..OFF_PREFIX + SOCKADDR_INET_LEN].copy_from_slice(&self.prefix);
            row[OFF_PREFIX_LEN] = self.prefix_length;
            row[OFF_NEXT_HOP..OFF_NEXT_HOP + SOCKADDR_INET_LEN].copy_from_slice(&self.next_hop);
            row[OFF_METRIC..OFF_METRIC + 4].copy_from_slice(&self.metric.to_le_bytes());
            row[OFF_PROTOCOL..OFF_PROTOCOL + 4].copy_from_slice(&3i32.to_le_bytes());
            row[OFF_PUBLISH] = self.publish as u8;
            row[OFF_IMMORTAL] = self.immortal as u8;
            row[OFF_AGE..OFF_AGE + 4].copy_from_slice(&120u32.to_le_bytes());
            row
        }
    }

    fn table(rows: &[RowSpec]) -> Vec<u8> {
        let mut buf = vec![0u8; TABLE_HEADER_LEN];
        buf[0..4].copy_from_slice(&(rows.len() as u32).to_le_bytes());
        for row in rows {
            buf.extend_from_slice(&row.encode());
        }
        buf
    }

    fn default_route() -> RowSpec {
        RowSpec {
            luid: 0x0006_0000_0100_0000,
            prefix: sockaddr_v4([0, 0, 0, 0]),
            prefix_length: 0,
            next_hop: sockaddr_v4([192, 168, 1, 1]),
            metric: 25,
            publish: true,
            immortal: false,
        }
    }

    fn loopback_host() -> RowSpec {
        RowSpec {
            luid: 0x0018_0000_0000_0000,
            prefix: sockaddr_v4([127, 0, 0, 1]),
            prefix_length: 32,
            next_hop: sockaddr_v4([0, 0, 0, 0]),
            metric: 256,
            publish: true,
            immortal: true,
        }
    }

    struct StubResolver {
        known: HashMap<u64, InterfaceRecord>,
        calls: RefCell<Vec<u64>>,
    }

    impl StubResolver {
        fn new() -> Self {
            let mut known = HashMap::new();
            known.insert(
                0x0006_0000_0100_0000,
                InterfaceRecord {
                    alias: "Ethernet".to_string(),
                    oper_up: true,
                },
            );
            known.insert(
                0x0018_0000_0000_0000,
                InterfaceRecord {
                    alias: "Loopback Pseudo-Interface 1".to_string(),
                    oper_up: true,
                },
            );
            StubResolver {
                known,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl InterfaceResolver for StubResolver {
        fn resolve(&self, luid: u64) -> SnapshotResult<InterfaceRecord> {
            self.calls.borrow_mut().push(luid);
            self.known
                .get(&luid)
                .cloned()
                .ok_or(SnapshotError::InterfaceLookupFailed { luid, code: 1168 })
        }
    }

    #[test]
    fn test_decode_all_row_fields() {
        let rows = decode_forward_table(&table(&[default_route()])).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.interface_luid, 0x0006_0000_0100_0000);
        assert_eq!(row.interface_index, 7);
        assert_eq!(row.destination, SockAddrInet::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(row.next_hop, SockAddrInet::V4(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(row.metric, 25);
        assert_eq!(row.protocol, 3);
        assert_eq!(row.age, 120);
        assert!(row.publish);
        assert!(!row.loopback);
    }

    #[test]
    fn test_normalized_routes() {
        let rows = decode_forward_table(&table(&[default_route(), loopback_host()])).unwrap();
        let routes = rows_to_routes(&rows, &StubResolver::new()).unwrap();

        assert_eq!(routes[0].destination, "0.0.0.0/0.0.0.0");
        assert_eq!(routes[0].gateway, "192.168.1.1");
        assert_eq!(routes[0].iface, "Ethernet");
        assert_eq!(routes[0].flags, "U");
        assert_eq!(routes[0].metric, 25);

        assert_eq!(routes[1].destination, "127.0.0.1/255.255.255.255");
        assert_eq!(routes[1].gateway, "0.0.0.0");
        assert_eq!(routes[1].flags, "U,H,G,S");
    }

    #[test]
    fn test_interface_lookups_are_memoized() {
        let mut second = default_route();
        second.prefix = sockaddr_v4([10, 0, 0, 0]);
        second.prefix_length = 8;
        let rows =
            decode_forward_table(&table(&[default_route(), second, loopback_host()])).unwrap();

        let resolver = StubResolver::new();
        rows_to_routes(&rows, &resolver).unwrap();
        assert_eq!(
            *resolver.calls.borrow(),
            vec![0x0006_0000_0100_0000, 0x0018_0000_0000_0000]
        );
    }

    #[test]
    fn test_unknown_interface_fails_call() {
        let mut orphan = default_route();
        orphan.luid = 42;
        let rows = decode_forward_table(&table(&[default_route(), orphan])).unwrap();
        let err = rows_to_routes(&rows, &StubResolver::new()).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::InterfaceLookupFailed { luid: 42, .. }
        ));
    }

    #[test]
    fn test_ipv6_next_hop_formatting() {
        let link_local: Ipv6Addr = "fe80::1".parse().unwrap();
        let mut row = default_route();
        row.next_hop = sockaddr_v6(link_local, 12);
        let rows = decode_forward_table(&table(&[row])).unwrap();
        assert_eq!(rows[0].next_hop.to_gateway_string(), "fe80::1%12");

        let global = SockAddrInet::V6 {
            addr: "2001:db8::1".parse().unwrap(),
            scope_id: 0,
        };
        assert_eq!(global.to_gateway_string(), "2001:db8::1");
    }

    #[test]
    fn test_unknown_family_is_unk() {
        let mut row = default_route();
        row.next_hop = [0u8; SOCKADDR_INET_LEN];
        row.prefix = [0u8; SOCKADDR_INET_LEN];
        let rows = decode_forward_table(&table(&[row])).unwrap();
        let routes = rows_to_routes(&rows, &StubResolver::new()).unwrap();
        assert_eq!(routes[0].gateway, "unk");
        assert_eq!(routes[0].destination, "unk/0.0.0.0");
    }

    #[test]
    fn test_down_interface_is_not_up() {
        let mut resolver = StubResolver::new();
        if let Some(record) = resolver.known.get_mut(&0x0006_0000_0100_0000) {
            record.oper_up = false;
        }
        let rows = decode_forward_table(&table(&[default_route()])).unwrap();
        let routes = rows_to_routes(&rows, &resolver).unwrap();
        assert_eq!(routes[0].flags, "");
    }

    #[test]
    fn test_truncated_table_is_malformed() {
        let mut buf = table(&[default_route(), loopback_host()]);
        buf.truncate(buf.len() - 1);
        assert!(matches!(
            decode_forward_table(&buf),
            Err(SnapshotError::MalformedTable { .. })
        ));
        assert!(matches!(
            decode_forward_table(&[1, 0]),
            Err(SnapshotError::MalformedTable { .. })
        ));
    }

    #[test]
    fn test_empty_table() {
        assert!(decode_forward_table(&table(&[])).unwrap().is_empty());
    }
}
