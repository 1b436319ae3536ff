// Error taxonomy for route and DNS snapshots
// Every variant aborts the whole retrieve() call: a caller gets a complete
// snapshot or an error, never a partial table.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the snapshot backends
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("native call {call} failed with code {code}")]
    NativeCallFailed { call: &'static str, code: i32 },

    #[error("{call} still reported an insufficient buffer after {attempts} attempt(s) ({size} bytes)")]
    TableTooLarge {
        call: &'static str,
        attempts: u32,
        size: usize,
    },

    #[error("malformed route row at line {line}: {reason}")]
    MalformedRouteRow { line: usize, reason: String },

    #[error("failed to decode hex {field} at line {line}: {source}")]
    HexDecode {
        line: usize,
        field: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    #[error("malformed routing message at offset {offset}: {reason}")]
    MalformedRibMessage { offset: usize, reason: String },

    #[error("malformed forwarding table: {reason}")]
    MalformedTable { reason: String },

    #[error("failed to resolve interface {luid:#018x} (code {code})")]
    InterfaceLookupFailed { luid: u64, code: i32 },

    #[error("{} is not accessible: {source}", path.display())]
    ResolvConfUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("resolver daemon probe failed: {reason}")]
    ResolverDaemon { reason: String },

    #[error("not a valid hardware address: expected 6 bytes, got {len}")]
    InvalidHardwareAddress { len: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("this platform has no native backend")]
    UnsupportedPlatform,
}

/// Result type alias using SnapshotError
pub type SnapshotResult<T> = Result<T, SnapshotError>;

impl SnapshotError {
    /// Stable identifier for the error variant, used in API responses
    pub fn kind(&self) -> &'static str {
        match self {
            SnapshotError::NativeCallFailed { .. } => "NativeCallFailed",
            SnapshotError::TableTooLarge { .. } => "TableTooLarge",
            SnapshotError::MalformedRouteRow { .. } => "MalformedRouteRow",
            SnapshotError::HexDecode { .. } => "HexDecodeError",
            SnapshotError::MalformedRibMessage { .. } => "MalformedRibMessage",
            SnapshotError::MalformedTable { .. } => "MalformedTable",
            SnapshotError::InterfaceLookupFailed { .. } => "InterfaceLookupFailed",
            SnapshotError::ResolvConfUnavailable { .. } => "ResolvConfUnavailable",
            SnapshotError::ResolverDaemon { .. } => "ResolverDaemon",
            SnapshotError::InvalidHardwareAddress { .. } => "InvalidHardwareAddress",
            SnapshotError::Io(_) => "Io",
            SnapshotError::Serialization(_) => "Serialization",
            SnapshotError::UnsupportedPlatform => "UnsupportedPlatform",
        }
    }

    /// Convert error to user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            SnapshotError::NativeCallFailed { call, code } => {
                format!("The operating system rejected {} (code {}).", call, code)
            }
            SnapshotError::TableTooLarge { call, .. } => {
                format!("The table returned by {} kept growing; giving up.", call)
            }
            SnapshotError::MalformedRouteRow { .. } | SnapshotError::HexDecode { .. } => {
                "The kernel routing table has an unexpected format.".to_string()
            }
            SnapshotError::MalformedRibMessage { .. } | SnapshotError::MalformedTable { .. } => {
                "The kernel returned a routing table that could not be decoded.".to_string()
            }
            SnapshotError::InterfaceLookupFailed { .. } => {
                "A route refers to a network interface that could not be resolved.".to_string()
            }
            SnapshotError::ResolvConfUnavailable { path, .. } => {
                format!("Cannot read {}. Check that it exists and is readable.", path.display())
            }
            SnapshotError::ResolverDaemon { .. } => {
                "A resolver daemon is running but its configuration could not be queried."
                    .to_string()
            }
            SnapshotError::InvalidHardwareAddress { .. } => {
                "A route carries a link-layer address that is not a MAC address.".to_string()
            }
            SnapshotError::Io(_) => {
                "File system error. Check permissions.".to_string()
            }
            SnapshotError::Serialization(_) => {
                "Data format error. This might be a bug, please report it.".to_string()
            }
            SnapshotError::UnsupportedPlatform => {
                "Route and DNS inspection is not supported on this platform.".to_string()
            }
        }
    }
}
