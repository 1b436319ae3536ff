// Snapshot envelopes - a retrieve() result stamped with host and time

use serde::{Deserialize, Serialize};

use crate::dns::{DnsBackend, DnsServers};
use crate::error::SnapshotResult;
use crate::routes::{NetRoute, RouteBackend};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSnapshot {
    pub hostname: String,
    pub timestamp: String,
    pub routes: Vec<NetRoute>,
}

impl RouteSnapshot {
    pub fn capture<B: RouteBackend + ?Sized>(backend: &B) -> SnapshotResult<Self> {
        let routes = backend.retrieve()?;
        Ok(RouteSnapshot {
            hostname: local_hostname(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            routes,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsSnapshot {
    pub hostname: String,
    pub timestamp: String,
    pub servers: DnsServers,
}

impl DnsSnapshot {
    pub fn capture<B: DnsBackend + ?Sized>(backend: &B, manual_sets: bool) -> SnapshotResult<Self> {
        let servers = backend.retrieve(manual_sets)?;
        Ok(DnsSnapshot {
            hostname: local_hostname(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            servers,
        })
    }
}

/// Host name, or `unknown` if it cannot be read or is not UTF-8
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}
