// Configuration management for netsnap
// Supports CLI arguments, config file (TOML), and environment variables

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::Level;

use crate::fetch::GrowthPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "netsnap.toml";

/// netsnap - Point-in-time snapshots of the routing table and resolver configuration
#[derive(Parser, Debug, Clone)]
#[command(name = "netsnap")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, env = "NETSNAP_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(short, long, env = "NETSNAP_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the IPv4 routing table
    Routes {
        /// Print a JSON snapshot instead of table rows
        #[arg(long)]
        json: bool,
    },

    /// Print the resolver configuration
    Dns {
        /// Per-interface settings instead of the system-wide list (Windows)
        #[arg(long)]
        manual: bool,

        /// Print a JSON snapshot instead of label lines
        #[arg(long)]
        json: bool,
    },

    /// Show the route a destination would take
    Lookup {
        /// Destination IPv4 address
        address: Ipv4Addr,
    },

    /// Serve snapshots over HTTP
    Serve {
        /// Bind address
        #[arg(long, env = "NETSNAP_BIND")]
        bind: Option<String>,

        /// HTTP port
        #[arg(short, long, env = "NETSNAP_PORT")]
        port: Option<u16>,
    },
}

/// Configuration file structure (TOML format)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    /// Where the backends read their native state
    #[serde(default)]
    pub sources: SourceConfig,

    /// Buffer growth for native table queries
    #[serde(default)]
    pub fetch: GrowthPolicy,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// procfs routing table
    #[serde(default = "default_route_file")]
    pub route_file: PathBuf,

    #[serde(default = "default_resolv_conf")]
    pub resolv_conf: PathBuf,

    /// Directory scanned for the resolver daemon
    #[serde(default = "default_proc_dir")]
    pub proc_dir: PathBuf,

    /// Look for a resolver daemon before reading resolv.conf (Linux)
    #[serde(default = "default_true")]
    pub daemon_probe: bool,

    /// Process name of the resolver daemon
    #[serde(default = "default_resolver_daemon")]
    pub resolver_daemon: String,

    /// Command printing the daemon's servers, program first
    #[serde(default = "default_status_command")]
    pub status_command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (default: 127.0.0.1)
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_route_file() -> PathBuf {
    PathBuf::from(crate::routes::procfs::ROUTE_FILE_PATH)
}
fn default_resolv_conf() -> PathBuf {
    PathBuf::from(crate::dns::resolv::RESOLV_CONF_PATH)
}
fn default_proc_dir() -> PathBuf {
    PathBuf::from(crate::dns::resolv::PROC_DIR)
}
fn default_true() -> bool {
    true
}
fn default_resolver_daemon() -> String {
    crate::dns::resolv::RESOLVER_DAEMON.to_string()
}
fn default_status_command() -> Vec<String> {
    crate::dns::resolv::STATUS_COMMAND
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            route_file: default_route_file(),
            resolv_conf: default_resolv_conf(),
            proc_dir: default_proc_dir(),
            daemon_probe: default_true(),
            resolver_daemon: default_resolver_daemon(),
            status_command: default_status_command(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

impl ConfigFile {
    /// Read `path`, or `netsnap.toml` in the working directory if it exists
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match Self::locate(path) {
            Some(path) => Self::read(&path),
            None => Ok(ConfigFile::default()),
        }
    }

    /// The file `load` would read, if any
    pub fn locate(path: Option<&Path>) -> Option<PathBuf> {
        match path {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                default_path.exists().then_some(default_path)
            }
        }
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", path.display(), e))?;
        Ok(toml::from_str::<ConfigFile>(&content)?)
    }
}

/// Merged configuration from all sources
#[derive(Debug, Clone)]
pub struct Config {
    pub sources: SourceConfig,
    pub fetch: GrowthPolicy,
    pub server: ServerConfig,
    pub log_level: Level,
    /// Config file the values were read from
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let file = ConfigFile::default();
        Config {
            sources: file.sources,
            fetch: file.fetch,
            server: file.server,
            log_level: Level::WARN,
            config_path: None,
        }
    }
}

impl Config {
    /// Merge parsed CLI arguments over the config file and defaults.
    /// Priority: CLI args (or their env vars) > Config file > Defaults
    pub fn from_args(cli_args: &CliArgs) -> anyhow::Result<Self> {
        let config_path = ConfigFile::locate(cli_args.config.as_deref());
        let config_file = match &config_path {
            Some(path) => ConfigFile::read(path)?,
            None => ConfigFile::default(),
        };
        let mut config = Self::merge(cli_args, config_file)?;
        config.config_path = config_path;
        Ok(config)
    }

    fn merge(cli_args: &CliArgs, config_file: ConfigFile) -> anyhow::Result<Self> {
        let log_level = parse_log_level(
            cli_args
                .log_level
                .as_deref()
                .unwrap_or(&config_file.logging.level),
        )?;

        let mut server = config_file.server;
        if let Command::Serve { bind, port } = &cli_args.command {
            if let Some(bind) = bind {
                server.bind_address = bind.clone();
            }
            if let Some(port) = port {
                server.port = *port;
            }
        }

        Ok(Config {
            sources: config_file.sources,
            fetch: config_file.fetch,
            server,
            log_level,
            config_path: None,
        })
    }
}

pub fn parse_log_level(level_str: &str) -> anyhow::Result<Level> {
    match level_str.to_lowercase().as_str() {
        "error" => Ok(Level::ERROR),
        "warn" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        _ => Err(anyhow::anyhow!("Invalid log level: {}", level_str)),
    }
}
