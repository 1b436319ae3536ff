use clap::Parser;
use std::net::{Ipv4Addr, SocketAddr};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use netsnap::config::{CliArgs, Command, Config};
use netsnap::routes::lookup::RouteLookup;
use netsnap::snapshot::{DnsSnapshot, RouteSnapshot};
use netsnap::{RouteBackend, native_dns_backend, native_route_backend};

fn main() -> ExitCode {
    let cli_args = CliArgs::parse();

    match run(cli_args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli_args: CliArgs) -> anyhow::Result<()> {
    let config = Config::from_args(&cli_args)?;
    init_logging(&config, cli_args.log_level.is_some());
    if let Some(path) = &config.config_path {
        tracing::debug!("Loaded configuration from: {}", path.display());
    }

    match cli_args.command {
        Command::Routes { json } => print_routes(&config, json),
        Command::Dns { manual, json } => print_dns(&config, manual, json),
        Command::Lookup { address } => print_lookup(&config, address),
        Command::Serve { .. } => serve(config),
    }
}

/// Logs go to stderr so stdout carries only the table or JSON.
/// An explicit --log-level wins over RUST_LOG, which wins over the config file.
fn init_logging(config: &Config, level_from_cli: bool) {
    let configured =
        EnvFilter::default().add_directive(LevelFilter::from_level(config.log_level).into());
    let filter = if level_from_cli {
        configured
    } else {
        EnvFilter::try_from_default_env().unwrap_or(configured)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_routes(config: &Config, json: bool) -> anyhow::Result<()> {
    let snapshot = RouteSnapshot::capture(&native_route_backend(config))?;
    tracing::info!(routes = snapshot.routes.len(), "routing table captured");

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        for route in &snapshot.routes {
            println!("{}", route.to_table_string());
        }
    }
    Ok(())
}

fn print_dns(config: &Config, manual: bool, json: bool) -> anyhow::Result<()> {
    let snapshot = DnsSnapshot::capture(&native_dns_backend(config), manual)?;
    tracing::info!(sources = snapshot.servers.len(), "resolver configuration captured");

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        for (label, servers) in &snapshot.servers {
            println!("{}: {}", label, servers);
        }
    }
    Ok(())
}

fn print_lookup(config: &Config, address: Ipv4Addr) -> anyhow::Result<()> {
    let routes = native_route_backend(config).retrieve()?;
    match RouteLookup::new(&routes).lookup(address) {
        Some(route) => {
            println!("{}", route.to_table_string());
            Ok(())
        }
        None => Err(anyhow::anyhow!("No route found to {}", address)),
    }
}

fn serve(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.port)
        .parse()
        .map_err(|e| {
            anyhow::anyhow!(
                "Invalid bind address {}:{}: {}",
                config.server.bind_address,
                config.server.port,
                e
            )
        })?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let app = netsnap::api::rest::create_api_router(config).into_make_service();

        tracing::info!("Server listening on http://{}", addr);
        tracing::info!("API endpoints:");
        tracing::info!("  GET  http://{}/api/routes", addr);
        tracing::info!("  GET  http://{}/api/dns?manual=false", addr);
        tracing::info!("  GET  http://{}/api/lookup/{{addr}}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok::<(), anyhow::Error>(())
    })
}
