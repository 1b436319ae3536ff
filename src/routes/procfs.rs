// Linux routing table from /proc/net/route
//
// Each data row has 11 tab-separated fields:
//   Iface Destination Gateway Flags RefCnt Use Metric Mask MTU Window IRTT
// Addresses are 8 hex digits holding the little-endian in-kernel value.
// The header row splits into 12 fields because of a double tab after Mask.

use std::path::{Path, PathBuf};

use super::{NetRoute, RouteBackend, RouteFlag};
use crate::codec::bytes_to_ipv4;
use crate::error::{SnapshotError, SnapshotResult};

pub const ROUTE_FILE_PATH: &str = "/proc/net/route";

const SEPARATOR: char = '\t';
const TOTAL_FIELDS: usize = 11;
const HEADER_FIELDS: usize = 12;

const FIELD_IFACE: usize = 0;
const FIELD_DESTINATION: usize = 1;
const FIELD_GATEWAY: usize = 2;
const FIELD_FLAGS: usize = 3;
const FIELD_METRIC: usize = 6;
const FIELD_MASK: usize = 7;

/// Route backend reading the procfs routing table
#[derive(Debug, Clone)]
pub struct ProcRouteBackend {
    path: PathBuf,
}

impl ProcRouteBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        ProcRouteBackend {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Default for ProcRouteBackend {
    fn default() -> Self {
        ProcRouteBackend::new(ROUTE_FILE_PATH)
    }
}

impl RouteBackend for ProcRouteBackend {
    fn retrieve(&self) -> SnapshotResult<Vec<NetRoute>> {
        // Read the whole file at once so the kernel renders one consistent table
        let contents = std::fs::read_to_string(&self.path)?;
        let routes = parse_route_table(&contents)?;
        tracing::debug!(path = %self.path.display(), routes = routes.len(), "parsed procfs routing table");
        Ok(routes)
    }
}

/// Parse the full contents of `/proc/net/route`, header included
pub fn parse_route_table(contents: &str) -> SnapshotResult<Vec<NetRoute>> {
    let mut lines = contents.lines().enumerate();

    match lines.next() {
        Some((_, header)) => {
            let fields = header.split(SEPARATOR).count();
            if fields != HEADER_FIELDS {
                return Err(SnapshotError::MalformedRouteRow {
                    line: 1,
                    reason: format!("expected a {HEADER_FIELDS}-field header, found {fields} fields"),
                });
            }
        }
        None => return Ok(Vec::new()),
    }

    let mut routes = Vec::new();
    for (index, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        routes.push(parse_route_row(line, index + 1)?);
    }

    Ok(routes)
}

/// Parse one data row; `line` is 1-based and only used for error reporting
fn parse_route_row(row: &str, line: usize) -> SnapshotResult<NetRoute> {
    let fields: Vec<&str> = row.split(SEPARATOR).collect();
    if fields.len() != TOTAL_FIELDS {
        return Err(SnapshotError::MalformedRouteRow {
            line,
            reason: format!("expected {TOTAL_FIELDS} fields, found {}", fields.len()),
        });
    }

    let metric_field = fields[FIELD_METRIC].trim();
    let metric = metric_field
        .parse::<u32>()
        .map_err(|e| SnapshotError::MalformedRouteRow {
            line,
            reason: format!("invalid metric {metric_field:?}: {e}"),
        })?;

    let destination = decode_hex_addr(fields[FIELD_DESTINATION], line, "destination")?;
    let netmask = decode_hex_addr(fields[FIELD_MASK], line, "netmask")?;
    let gateway = decode_hex_addr(fields[FIELD_GATEWAY], line, "gateway")?;
    let flags = decode_hex_flags(fields[FIELD_FLAGS], line)?;

    Ok(NetRoute {
        metric,
        destination: format!(
            "{}/{}",
            bytes_to_ipv4(destination, true),
            bytes_to_ipv4(netmask, true)
        ),
        gateway: bytes_to_ipv4(gateway, true),
        flags: RouteFlag::from_linux_mask(flags).to_table_string(),
        iface: fields[FIELD_IFACE].to_string(),
    })
}

fn decode_hex_addr(field: &str, line: usize, name: &'static str) -> SnapshotResult<[u8; 4]> {
    let mut bytes = [0u8; 4];
    hex::decode_to_slice(field.trim(), &mut bytes).map_err(|source| SnapshotError::HexDecode {
        line,
        field: name,
        source,
    })?;
    Ok(bytes)
}

fn decode_hex_flags(field: &str, line: usize) -> SnapshotResult<u32> {
    let field = field.trim();
    // The kernel prints flags as %04X; pad to whole bytes before decoding
    let padded = format!("{:0>8}", field);
    if padded.len() > 8 {
        return Err(SnapshotError::HexDecode {
            line,
            field: "flags",
            source: hex::FromHexError::InvalidStringLength,
        });
    }
    let mut bytes = [0u8; 4];
    hex::decode_to_slice(&padded, &mut bytes).map_err(|source| SnapshotError::HexDecode {
        line,
        field: "flags",
        source,
    })?;
    Ok(u32::from_be_bytes(bytes))
}
