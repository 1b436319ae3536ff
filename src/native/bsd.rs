// sysctl RIB dump and interface names on the BSDs

use std::ffi::CStr;

use crate::error::{SnapshotError, SnapshotResult};
use crate::fetch::{GrowthPolicy, QueryOutcome, fetch_with_growth};

/// `NET_RT_DUMP` from `net/route.h`, identical on every BSD
const NET_RT_DUMP: libc::c_int = 1;

fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Dump the IPv4 routing table as raw routing messages
pub fn fetch_inet_rib(policy: &GrowthPolicy) -> SnapshotResult<Vec<u8>> {
    let mut mib = [
        libc::CTL_NET,
        libc::PF_ROUTE,
        0,
        libc::AF_INET,
        NET_RT_DUMP,
        0,
    ];

    // Sizing call; the table may still grow before the second call
    let mut needed: libc::size_t = 0;
    let rc = unsafe {
        libc::sysctl(
            mib.as_mut_ptr(),
            mib.len() as libc::c_uint,
            std::ptr::null_mut(),
            &mut needed,
            std::ptr::null_mut(),
            0,
        )
    };
    if rc != 0 {
        return Err(SnapshotError::NativeCallFailed {
            call: "sysctl",
            code: last_errno(),
        });
    }
    tracing::trace!(needed, "sysctl reported routing table size");

    fetch_with_growth("sysctl", &policy.starting_at(needed), |buf| {
        let mut len: libc::size_t = buf.len();
        let rc = unsafe {
            libc::sysctl(
                mib.as_mut_ptr(),
                mib.len() as libc::c_uint,
                buf.as_mut_ptr().cast(),
                &mut len,
                std::ptr::null_mut(),
                0,
            )
        };
        if rc == 0 {
            return QueryOutcome::Filled(len);
        }
        match last_errno() {
            libc::ENOMEM => QueryOutcome::BufferTooSmall { required: None },
            code => QueryOutcome::Failed(code),
        }
    })
}

/// Interface name for a kernel interface index, if it still exists
pub fn interface_name(index: u16) -> Option<String> {
    if index == 0 {
        return None;
    }
    let mut buf = [0 as libc::c_char; libc::IF_NAMESIZE];
    let ptr = unsafe { libc::if_indextoname(libc::c_uint::from(index), buf.as_mut_ptr()) };
    if ptr.is_null() {
        return None;
    }
    let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
    Some(name.to_string_lossy().into_owned())
}
