// Windows resolver configuration from IP Helper and the DNS API

use std::net::Ipv4Addr;

use crate::codec::read_array;
use crate::error::{SnapshotError, SnapshotResult};

pub const AUTOMATIC_LABEL: &str = "Automatic";

/// DNS_ERROR_NO_DNS_SERVERS from winerror.h
pub const DNS_ERROR_NO_DNS_SERVERS: i32 = 9852;

/// Normalize raw NameServer strings, which may be comma or space separated
pub fn join_name_servers<S: AsRef<str>>(raw: &[S]) -> String {
    raw.iter()
        .flat_map(|s| s.as_ref().split(|c: char| c == ',' || c.is_whitespace()))
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode an `IP4_ARRAY { AddrCount: u32, AddrArray: [IP4_ADDRESS] }`.
///
/// Addresses are stored in network byte order.
pub fn decode_ip4_array(buf: &[u8]) -> SnapshotResult<Vec<Ipv4Addr>> {
    if buf.is_empty() {
        return Ok(Vec::new());
    }
    let count = read_array::<4>(buf, 0)
        .map(u32::from_le_bytes)
        .ok_or_else(|| SnapshotError::MalformedTable {
            reason: format!("IP4_ARRAY of {} bytes has no count", buf.len()),
        })? as usize;

    (0..count)
        .map(|i| {
            read_array::<4>(buf, 4 + i * 4)
                .map(Ipv4Addr::from)
                .ok_or_else(|| SnapshotError::MalformedTable {
                    reason: format!("IP4_ARRAY declares {count} addresses in {} bytes", buf.len()),
                })
        })
        .collect()
}

#[cfg(windows)]
pub use backend::IpHelperDnsBackend;

#[cfg(windows)]
mod backend {
    use super::{AUTOMATIC_LABEL, DNS_ERROR_NO_DNS_SERVERS, decode_ip4_array, join_name_servers};
    use crate::dns::{DnsBackend, DnsServers};
    use crate::error::{SnapshotError, SnapshotResult};
    use crate::fetch::GrowthPolicy;
    use crate::native::win32;

    /// DNS backend over `GetInterfaceDnsSettings` and `DnsQueryConfig`
    #[derive(Debug, Clone, Default)]
    pub struct IpHelperDnsBackend {
        policy: GrowthPolicy,
    }

    impl IpHelperDnsBackend {
        pub fn new(policy: GrowthPolicy) -> Self {
            IpHelperDnsBackend { policy }
        }

        fn per_interface(&self) -> SnapshotResult<DnsServers> {
            let mut servers = DnsServers::new();
            for interface in win32::up_interfaces()? {
                let raw = win32::interface_name_servers(interface.guid)?;
                let joined = join_name_servers(&raw);
                if joined.is_empty() {
                    tracing::trace!(alias = %interface.alias, "interface has no name servers");
                    continue;
                }
                servers.insert(interface.alias, joined);
            }
            Ok(servers)
        }

        fn system_wide(&self) -> SnapshotResult<DnsServers> {
            let joined = match win32::dns_server_list(&self.policy) {
                Ok(buf) => decode_ip4_array(&buf)?
                    .iter()
                    .map(|addr| addr.to_string())
                    .collect::<Vec<_>>()
                    .join(" "),
                Err(SnapshotError::NativeCallFailed { code, .. })
                    if code == DNS_ERROR_NO_DNS_SERVERS =>
                {
                    String::new()
                }
                Err(e) => return Err(e),
            };

            let mut servers = DnsServers::new();
            servers.insert(AUTOMATIC_LABEL.to_string(), joined);
            Ok(servers)
        }
    }

    impl DnsBackend for IpHelperDnsBackend {
        fn retrieve(&self, manual_sets: bool) -> SnapshotResult<DnsServers> {
            let servers = if manual_sets {
                self.per_interface()?
            } else {
                self.system_wide()?
            };
            tracing::debug!(manual_sets, sources = servers.len(), "collected resolver configuration");
            Ok(servers)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_mixed_separators() {
        let raw = ["10.0.0.1,10.0.0.2", " 192.168.1.1  8.8.8.8 ", ""];
        assert_eq!(join_name_servers(&raw), "10.0.0.1 10.0.0.2 192.168.1.1 8.8.8.8");
        assert_eq!(join_name_servers::<&str>(&[]), "");
    }

    #[test]
    fn test_decode_ip4_array() {
        let mut buf = 2u32.to_le_bytes().to_vec();
        buf.extend_from_slice(&[8, 8, 8, 8]);
        buf.extend_from_slice(&[1, 0, 0, 1]);
        let addrs = decode_ip4_array(&buf).unwrap();
        assert_eq!(addrs, vec![Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(1, 0, 0, 1)]);
    }

    #[test]
    fn test_decode_empty_and_short_arrays() {
        assert!(decode_ip4_array(&[]).unwrap().is_empty());
        assert!(decode_ip4_array(&0u32.to_le_bytes()).unwrap().is_empty());

        let mut short = 3u32.to_le_bytes().to_vec();
        short.extend_from_slice(&[8, 8, 8, 8]);
        assert!(matches!(
            decode_ip4_array(&short),
            Err(SnapshotError::MalformedTable { .. })
        ));
        assert!(matches!(
            decode_ip4_array(&[1, 0]),
            Err(SnapshotError::MalformedTable { .. })
        ));
    }
}
