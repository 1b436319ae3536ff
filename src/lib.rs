// netsnap - point-in-time snapshots of a host's routing table and resolver configuration

pub mod api;
pub mod codec;
pub mod config;
pub mod dns;
pub mod error;
pub mod fetch;
mod native;
pub mod routes;
pub mod snapshot;

pub use dns::{DnsBackend, DnsServers, native_dns_backend};
pub use error::{SnapshotError, SnapshotResult};
pub use routes::{NetRoute, RouteBackend, RouteFlag, native_route_backend};
