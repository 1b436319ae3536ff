// IP Helper and DNS API wrappers
//
// Tables allocated by the OS are held in guards that free them on drop;
// everything callers see is copied out first.

use std::mem::{offset_of, size_of};

use windows::Win32::Foundation::{ERROR_MORE_DATA, NO_ERROR, WIN32_ERROR};
use windows::Win32::NetworkManagement::Dns::{DnsConfigDnsServerList, DnsQueryConfig};
use windows::Win32::NetworkManagement::IpHelper::{
    DNS_INTERFACE_SETTINGS, DNS_INTERFACE_SETTINGS_VERSION1, FreeInterfaceDnsSettings,
    FreeMibTable, GetIfEntry2, GetIfTable2, GetInterfaceDnsSettings, GetIpForwardTable2,
    MIB_IF_ROW2, MIB_IF_TABLE2, MIB_IPFORWARD_ROW2, MIB_IPFORWARD_TABLE2,
};
use windows::Win32::NetworkManagement::Ndis::{IfOperStatusUp, NET_LUID_LH};
use windows::Win32::Networking::WinSock::AF_INET;
use windows::core::{GUID, PCWSTR, PWSTR};

use crate::error::{SnapshotError, SnapshotResult};
use crate::fetch::{GrowthPolicy, QueryOutcome, fetch_with_growth};
use crate::routes::forward_table::{InterfaceRecord, InterfaceResolver};

fn check(call: &'static str, status: WIN32_ERROR) -> SnapshotResult<()> {
    if status == NO_ERROR {
        Ok(())
    } else {
        Err(SnapshotError::NativeCallFailed {
            call,
            code: status.0 as i32,
        })
    }
}

/// Owns a table returned by one of the `Get*Table2` calls
struct MibTable<T>(*mut T);

impl<T> Drop for MibTable<T> {
    fn drop(&mut self) {
        if !self.0.is_null() {
            // Safety: the pointer came from an IP Helper table call and is freed once.
            unsafe { FreeMibTable(self.0 as *const _) };
        }
    }
}

fn wide_to_string(wide: &[u16]) -> String {
    let end = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..end])
}

/// Copy the IPv4 forwarding table out as raw bytes
pub fn ipv4_forward_table() -> SnapshotResult<Vec<u8>> {
    let mut table = std::ptr::null_mut::<MIB_IPFORWARD_TABLE2>();
    // Safety: `table` is a valid out-pointer.
    let status = unsafe { GetIpForwardTable2(AF_INET, &mut table) };
    let table = MibTable(table);
    check("GetIpForwardTable2", status)?;

    // Safety: the call succeeded, so the pointer is either null or a valid table.
    let header = unsafe { table.0.as_ref() }.ok_or_else(|| SnapshotError::MalformedTable {
        reason: "GetIpForwardTable2 returned no table".to_string(),
    })?;
    let len = offset_of!(MIB_IPFORWARD_TABLE2, Table)
        + header.NumEntries as usize * size_of::<MIB_IPFORWARD_ROW2>();

    // Safety: the table allocation spans the header plus NumEntries rows.
    let bytes = unsafe { std::slice::from_raw_parts(table.0 as *const u8, len) }.to_vec();
    tracing::trace!(rows = header.NumEntries, bytes = len, "copied forwarding table");
    Ok(bytes)
}

/// Resolves LUIDs with `GetIfEntry2`
#[derive(Debug, Clone, Copy, Default)]
pub struct IfEntryResolver;

impl InterfaceResolver for IfEntryResolver {
    fn resolve(&self, luid: u64) -> SnapshotResult<InterfaceRecord> {
        let mut row = MIB_IF_ROW2 {
            InterfaceLuid: NET_LUID_LH { Value: luid },
            ..Default::default()
        };
        // Safety: `row` is initialised with the LUID to look up.
        let status = unsafe { GetIfEntry2(&mut row) };
        if status != NO_ERROR {
            return Err(SnapshotError::InterfaceLookupFailed {
                luid,
                code: status.0 as i32,
            });
        }
        Ok(InterfaceRecord {
            alias: wide_to_string(&row.Alias),
            oper_up: row.OperStatus == IfOperStatusUp,
        })
    }
}

/// An operationally up interface
pub struct UpInterface {
    pub guid: GUID,
    pub alias: String,
}

pub fn up_interfaces() -> SnapshotResult<Vec<UpInterface>> {
    let mut table = std::ptr::null_mut::<MIB_IF_TABLE2>();
    // Safety: `table` is a valid out-pointer.
    let status = unsafe { GetIfTable2(&mut table) };
    let table = MibTable(table);
    check("GetIfTable2", status)?;

    // Safety: the call succeeded, so the pointer is either null or a valid table.
    let Some(header) = (unsafe { table.0.as_ref() }) else {
        return Ok(Vec::new());
    };
    // Safety: the table holds NumEntries contiguous rows.
    let rows = unsafe { std::slice::from_raw_parts(header.Table.as_ptr(), header.NumEntries as usize) };

    Ok(rows
        .iter()
        .filter(|row| row.OperStatus == IfOperStatusUp)
        .map(|row| UpInterface {
            guid: row.InterfaceGuid,
            alias: wide_to_string(&row.Alias),
        })
        .collect())
}

/// Settings filled by `GetInterfaceDnsSettings`, released on drop
struct DnsSettings(DNS_INTERFACE_SETTINGS);

impl Drop for DnsSettings {
    fn drop(&mut self) {
        // Safety: only constructed after a successful GetInterfaceDnsSettings.
        unsafe { FreeInterfaceDnsSettings(&mut self.0) };
    }
}

fn pwstr_to_string(s: PWSTR) -> Option<String> {
    if s.is_null() {
        return None;
    }
    // Safety: non-null strings in DNS_INTERFACE_SETTINGS are NUL-terminated.
    unsafe { s.to_string() }.ok()
}

/// Raw NameServer and ProfileNameServer strings of one interface
pub fn interface_name_servers(guid: GUID) -> SnapshotResult<Vec<String>> {
    let mut raw = DNS_INTERFACE_SETTINGS {
        Version: DNS_INTERFACE_SETTINGS_VERSION1,
        ..Default::default()
    };
    // Safety: `raw` carries the version the API expects.
    let status = unsafe { GetInterfaceDnsSettings(guid, &mut raw) };
    check("GetInterfaceDnsSettings", status)?;
    let settings = DnsSettings(raw);

    Ok([settings.0.NameServer, settings.0.ProfileNameServer]
        .into_iter()
        .filter_map(pwstr_to_string)
        .collect())
}

/// System-wide DNS server list as a raw `IP4_ARRAY`
pub fn dns_server_list(policy: &GrowthPolicy) -> SnapshotResult<Vec<u8>> {
    fetch_with_growth("DnsQueryConfig", policy, |buf| {
        let mut len = buf.len() as u32;
        // Safety: `buf` is writable for `len` bytes.
        let status = unsafe {
            DnsQueryConfig(
                DnsConfigDnsServerList,
                0,
                PCWSTR::null(),
                None,
                Some(buf.as_mut_ptr().cast()),
                &mut len,
            )
        };
        match status {
            NO_ERROR => QueryOutcome::Filled(len as usize),
            ERROR_MORE_DATA => QueryOutcome::BufferTooSmall {
                required: Some(len as usize),
            },
            other => QueryOutcome::Failed(other.0 as i32),
        }
    })
}
