// Address codec - fixed-width byte arrays to dotted-decimal and MAC strings

use crate::error::{SnapshotError, SnapshotResult};
use std::net::Ipv4Addr;

/// Format four address bytes as dotted decimal.
///
/// `little_endian_raw` marks bytes taken from a little-endian-packed kernel
/// field (the hex columns of `/proc/net/route`); those are reversed first.
pub fn bytes_to_ipv4(mut b: [u8; 4], little_endian_raw: bool) -> String {
    if little_endian_raw {
        b.reverse();
    }
    Ipv4Addr::from(b).to_string()
}

/// Inverse of [`bytes_to_ipv4`] for the same `little_endian_raw` flag
pub fn ipv4_to_bytes(s: &str, little_endian_raw: bool) -> Option<[u8; 4]> {
    let mut b = s.parse::<Ipv4Addr>().ok()?.octets();
    if little_endian_raw {
        b.reverse();
    }
    Some(b)
}

/// Format a link-layer address as six lowercase hex octets
pub fn bytes_to_mac(b: &[u8]) -> SnapshotResult<String> {
    if b.len() != 6 {
        return Err(SnapshotError::InvalidHardwareAddress { len: b.len() });
    }
    Ok(b.iter()
        .map(|octet| format!("{:02x}", octet))
        .collect::<Vec<_>>()
        .join(":"))
}

/// Netmask bytes for an IPv4 prefix length, `None` above 32
pub fn prefix_len_to_netmask(len: u8) -> Option<[u8; 4]> {
    let mask = match len {
        0 => 0,
        1..=32 => u32::MAX << (32 - u32::from(len)),
        _ => return None,
    };
    Some(mask.to_be_bytes())
}

/// Prefix length of a contiguous netmask, `None` for non-contiguous masks
pub fn netmask_to_prefix_len(mask: Ipv4Addr) -> Option<u8> {
    let bits = u32::from(mask);
    let ones = bits.leading_ones();
    if bits.checked_shl(ones).unwrap_or(0) != 0 {
        return None;
    }
    Some(ones as u8)
}

/// Bounds-checked fixed-size read out of a native buffer
pub(crate) fn read_array<const N: usize>(buf: &[u8], offset: usize) -> Option<[u8; N]> {
    let end = offset.checked_add(N)?;
    buf.get(offset..end)?.try_into().ok()
}
