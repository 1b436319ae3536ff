// Routes module - normalized routing table model and per-platform backends

pub mod flags;
pub mod forward_table;
pub mod lookup;
pub mod procfs;
pub mod rib;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{SnapshotError, SnapshotResult};

pub use flags::RouteFlag;

/// One row of the normalized routing table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetRoute {
    pub metric: u32,
    /// `<network>/<netmask>`, both dotted decimal
    #[serde(rename = "dest")]
    pub destination: String,
    pub gateway: String,
    pub flags: String,
    pub iface: String,
}

impl NetRoute {
    /// Single table row, e.g. `0.0.0.0/0.0.0.0\tvia 10.0.0.1\tdev eth0\tflags U,G\tmetric 100`
    pub fn to_table_string(&self) -> String {
        format!(
            "{}\tvia {}\tdev {}\tflags {}\tmetric {}",
            self.destination, self.gateway, self.iface, self.flags, self.metric
        )
    }

    pub fn to_json(&self) -> SnapshotResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Point-in-time routing table source
pub trait RouteBackend {
    /// Read the IPv4 routing table. Any failure discards the whole snapshot.
    fn retrieve(&self) -> SnapshotResult<Vec<NetRoute>>;
}

/// Backend for targets without a native implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedBackend;

impl RouteBackend for UnsupportedBackend {
    fn retrieve(&self) -> SnapshotResult<Vec<NetRoute>> {
        Err(SnapshotError::UnsupportedPlatform)
    }
}

#[cfg(target_os = "linux")]
pub type NativeRouteBackend = procfs::ProcRouteBackend;

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd"
))]
pub type NativeRouteBackend = rib::RibRouteBackend;

#[cfg(windows)]
pub type NativeRouteBackend = forward_table::ForwardTableBackend;

#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    windows
)))]
pub type NativeRouteBackend = UnsupportedBackend;

/// The route backend compiled for this target
pub fn native_route_backend(config: &Config) -> NativeRouteBackend {
    #[cfg(target_os = "linux")]
    return procfs::ProcRouteBackend::new(&config.sources.route_file);

    #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd"
    ))]
    return rib::RibRouteBackend::new(config.fetch.clone());

    #[cfg(windows)]
    return {
        let _ = config;
        forward_table::ForwardTableBackend
    };

    #[cfg(not(any(
        target_os = "linux",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        windows
    )))]
    return {
        let _ = config;
        UnsupportedBackend
    };
}
