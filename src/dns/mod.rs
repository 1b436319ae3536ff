// DNS module - resolver configuration snapshots per platform

pub mod iphlp;
pub mod resolv;

use std::collections::BTreeMap;

use crate::config::Config;
use crate::error::{SnapshotError, SnapshotResult};
use crate::routes::UnsupportedBackend;

/// Source label -> space-separated nameserver addresses.
///
/// An empty value means the source was queried and had no servers.
pub type DnsServers = BTreeMap<String, String>;

/// Point-in-time resolver configuration source
pub trait DnsBackend {
    /// `manual_sets` selects per-interface settings over the system-wide
    /// list where a platform distinguishes them.
    fn retrieve(&self, manual_sets: bool) -> SnapshotResult<DnsServers>;
}

impl DnsBackend for UnsupportedBackend {
    fn retrieve(&self, _manual_sets: bool) -> SnapshotResult<DnsServers> {
        Err(SnapshotError::UnsupportedPlatform)
    }
}

#[cfg(unix)]
pub type NativeDnsBackend = resolv::ResolvConfBackend;

#[cfg(windows)]
pub type NativeDnsBackend = iphlp::IpHelperDnsBackend;

#[cfg(not(any(unix, windows)))]
pub type NativeDnsBackend = UnsupportedBackend;

/// The DNS backend compiled for this target
pub fn native_dns_backend(config: &Config) -> NativeDnsBackend {
    #[cfg(target_os = "linux")]
    return resolv::ResolvConfBackend::new(
        &config.sources.resolv_conf,
        config
            .sources
            .daemon_probe
            .then(|| resolv::DaemonProbe::from_sources(&config.sources)),
    );

    #[cfg(all(unix, not(target_os = "linux")))]
    return resolv::ResolvConfBackend::new(&config.sources.resolv_conf, None);

    #[cfg(windows)]
    return iphlp::IpHelperDnsBackend::new(config.fetch.clone());

    #[cfg(not(any(unix, windows)))]
    return {
        let _ = config;
        UnsupportedBackend
    };
}
