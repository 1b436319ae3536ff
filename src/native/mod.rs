// Native acquisition calls - the only unsafe code in the crate
// Each wrapper copies what it needs into owned values before returning.

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd"
))]
pub mod bsd;

#[cfg(windows)]
pub mod win32;
