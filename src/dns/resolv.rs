// Unix resolver configuration: /etc/resolv.conf plus a resolver daemon probe
//
// When systemd-resolved runs, resolv.conf usually only names its stub
// listener, so the daemon's own status output is captured as well.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;

use super::{DnsBackend, DnsServers};
use crate::config::SourceConfig;
use crate::error::{SnapshotError, SnapshotResult};

pub const RESOLV_CONF_PATH: &str = "/etc/resolv.conf";
pub const RESOLV_CONF_LABEL: &str = "resolv.conf";
pub const PROC_DIR: &str = "/proc";
pub const RESOLVER_DAEMON: &str = "systemd-resolved";
pub const STATUS_COMMAND: [&str; 2] = ["resolvectl", "status"];

/// Longest command name the kernel keeps in `/proc/<pid>/comm`
const TASK_COMM_MAX: usize = 15;

static IPV4_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9]+\.[0-9]+\.[0-9]+\.[0-9]+").expect("IPv4 token pattern is valid")
});

/// Every dotted-decimal token in `text`, in order of appearance
pub fn extract_ipv4_tokens(text: &str) -> Vec<&str> {
    IPV4_TOKEN.find_iter(text).map(|m| m.as_str()).collect()
}

/// First address of each non-comment line, space-joined
pub fn parse_resolv_conf(contents: &str) -> String {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| IPV4_TOKEN.find(line).map(|m| m.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Detects a running resolver daemon and asks it for its servers
#[derive(Debug, Clone)]
pub struct DaemonProbe {
    pub proc_dir: PathBuf,
    pub daemon: String,
    pub status_command: Vec<String>,
}

impl Default for DaemonProbe {
    fn default() -> Self {
        DaemonProbe {
            proc_dir: PathBuf::from(PROC_DIR),
            daemon: RESOLVER_DAEMON.to_string(),
            status_command: STATUS_COMMAND.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl DaemonProbe {
    pub fn from_sources(sources: &SourceConfig) -> Self {
        DaemonProbe {
            proc_dir: sources.proc_dir.clone(),
            daemon: sources.resolver_daemon.clone(),
            status_command: sources.status_command.clone(),
        }
    }

    /// Daemon name as the kernel reports it in `comm`
    pub fn comm_name(&self) -> &str {
        let mut end = self.daemon.len().min(TASK_COMM_MAX);
        while !self.daemon.is_char_boundary(end) {
            end -= 1;
        }
        &self.daemon[..end]
    }

    /// Scan `<proc_dir>/<pid>/comm` for the daemon name.
    ///
    /// Processes exit during the scan; entries that vanish or cannot be
    /// read are skipped.
    pub fn daemon_running(&self) -> SnapshotResult<bool> {
        let expected = self.comm_name();
        for entry in std::fs::read_dir(&self.proc_dir)? {
            let Ok(entry) = entry else {
                continue;
            };
            let file_name = entry.file_name();
            let Some(pid) = file_name.to_str() else {
                continue;
            };
            if pid.is_empty() || !pid.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }

            let Ok(comm) = std::fs::read_to_string(entry.path().join("comm")) else {
                continue;
            };
            if comm.trim_end() == expected {
                tracing::debug!(pid, daemon = %self.daemon, "resolver daemon is running");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Run the status command and collect the addresses it prints
    pub fn query(&self) -> SnapshotResult<String> {
        let (program, args) =
            self.status_command
                .split_first()
                .ok_or_else(|| SnapshotError::ResolverDaemon {
                    reason: "no status command configured".to_string(),
                })?;

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| SnapshotError::ResolverDaemon {
                reason: format!("failed to execute {}: {}", program, e),
            })?;

        if !output.status.success() {
            return Err(SnapshotError::ResolverDaemon {
                reason: format!("{} exited with {}", program, output.status),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let servers = extract_ipv4_tokens(&stdout);
        if servers.is_empty() {
            return Err(SnapshotError::ResolverDaemon {
                reason: format!("{} reported no IPv4 servers", program),
            });
        }
        Ok(servers.join(" "))
    }
}

/// DNS backend for Unix hosts
#[derive(Debug, Clone)]
pub struct ResolvConfBackend {
    resolv_conf: PathBuf,
    daemon: Option<DaemonProbe>,
}

impl ResolvConfBackend {
    pub fn new(resolv_conf: impl AsRef<Path>, daemon: Option<DaemonProbe>) -> Self {
        ResolvConfBackend {
            resolv_conf: resolv_conf.as_ref().to_path_buf(),
            daemon,
        }
    }
}

impl Default for ResolvConfBackend {
    fn default() -> Self {
        ResolvConfBackend::new(RESOLV_CONF_PATH, None)
    }
}

impl DnsBackend for ResolvConfBackend {
    // There is only one resolver configuration on Unix; `manual_sets` does not apply.
    fn retrieve(&self, _manual_sets: bool) -> SnapshotResult<DnsServers> {
        let mut servers = DnsServers::new();

        if let Some(probe) = &self.daemon {
            if probe.daemon_running()? {
                servers.insert(probe.daemon.clone(), probe.query()?);
            }
        }

        let contents = std::fs::read_to_string(&self.resolv_conf).map_err(|source| {
            SnapshotError::ResolvConfUnavailable {
                path: self.resolv_conf.clone(),
                source,
            }
        })?;
        servers.insert(RESOLV_CONF_LABEL.to_string(), parse_resolv_conf(&contents));

        tracing::debug!(sources = servers.len(), "collected resolver configuration");
        Ok(servers)
    }
}
