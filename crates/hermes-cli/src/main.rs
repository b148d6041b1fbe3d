//! hermesctl - operator front-end for Hermes endpoint configuration
//!
//! Synthesizes per-device link configuration from the global readout map and
//! inspects the endpoint address book.

mod config;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use hermes_core::{
    synthesize, DeviceConfig, Endpoint, EndpointTable, LinkConfig, MacAddr, StreamDescriptor,
};
use hermes_ctrl::{HermesSession, MockTransport, DEFAULT_FILTER_CONTROL};
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "hermesctl")]
#[command(about = "Hermes readout endpoint configuration tool")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "hermes.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Synthesize per-device link configuration from a readout map
    Synth {
        /// Readout map JSON file
        #[arg(short, long)]
        map: PathBuf,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Replay the synthesized configuration against a mock device and
    /// report what would be programmed
    DryRun {
        /// Readout map JSON file
        #[arg(short, long)]
        map: PathBuf,
    },
    /// Print the transmitter and receiver endpoint tables
    Addrbook,
    /// Validate the endpoint tables and exit
    Check,
}

/// On-disk readout map
#[derive(Debug, Deserialize)]
struct ReadoutMap {
    streams: Vec<StreamDescriptor>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = config::load_config(&args.config)?;

    match args.command {
        Command::Synth { map, output } => cmd_synth(&config, &map, output.as_deref()),
        Command::DryRun { map } => cmd_dry_run(&config, &map),
        Command::Addrbook => cmd_addrbook(&config),
        Command::Check => cmd_check(&config),
    }
}

fn load_map(path: &Path) -> Result<ReadoutMap> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read readout map {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse readout map {}", path.display()))
}

fn cmd_synth(config: &config::Config, map_path: &Path, output: Option<&Path>) -> Result<()> {
    let map = load_map(map_path)?;
    let devices = synthesize(&map.streams, &config.address_table)?;
    info!(
        streams = map.streams.len(),
        devices = devices.len(),
        "Synthesized device configuration"
    );

    let records: Vec<_> = devices.values().collect();
    let rendered = serde_json::to_string_pretty(&records)?;
    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "Wrote device configuration");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

/// One link's endpoints as they would be written to the UDP core
fn link_endpoints(device: &DeviceConfig, link: &LinkConfig) -> Result<(Endpoint, Endpoint)> {
    let parse_mac = |mac: &str| -> Result<MacAddr> {
        mac.parse()
            .map_err(|v: String| anyhow!("{}: invalid MAC '{v}'", device.name))
    };
    let parse_ip = |ip: &str| -> Result<Ipv4Addr> {
        ip.parse()
            .map_err(|_| anyhow!("{}: invalid IP '{ip}'", device.name))
    };
    let src = Endpoint {
        mac: parse_mac(&link.src_mac)?,
        ip: parse_ip(&link.src_ip)?,
        port: device.port,
    };
    let dst = Endpoint {
        mac: parse_mac(&link.dst_mac)?,
        ip: parse_ip(&link.dst_ip)?,
        port: device.port,
    };
    Ok((src, dst))
}

fn cmd_dry_run(config: &config::Config, map_path: &Path) -> Result<()> {
    let map = load_map(map_path)?;
    let devices = synthesize(&map.streams, &config.address_table)?;

    for device in devices.values() {
        // Two links is the maximum any stream map can address
        let mut session = HermesSession::open(MockTransport::wib(2, 8))
            .context("failed to open mock session")?;
        for link in device.links.values() {
            let (src, dst) = link_endpoints(device, link)?;
            let index = u32::from(link.link_index);
            session.config_mux(
                index,
                u32::from(device.geo.det_id),
                u32::from(device.geo.crate_id),
                u32::from(device.geo.slot_id),
            )?;
            session.config_udp(index, &src, &dst, DEFAULT_FILTER_CONTROL)?;
            println!(
                "{}: link {} {} ({}) -> {} ({})",
                device.name, link.link_index, src.ip, src.mac, dst.ip, dst.mac
            );
        }
    }
    info!(devices = devices.len(), "Dry run complete");
    Ok(())
}

fn cmd_addrbook(config: &config::Config) -> Result<()> {
    let tx = EndpointTable::load(&config.tx_endpoints)?;
    let rx = EndpointTable::load(&config.rx_endpoints)?;

    println!("Transmitters:");
    for (name, ep) in tx.iter() {
        println!("  {name}  mac=0x{:012x}  ip={}  port={}", ep.mac.0, ep.ip, ep.port);
    }
    println!("Receivers:");
    for (name, ep) in rx.iter() {
        println!("  {name}  mac=0x{:012x}  ip={}  port={}", ep.mac.0, ep.ip, ep.port);
    }
    Ok(())
}

fn cmd_check(config: &config::Config) -> Result<()> {
    let tx = EndpointTable::load(&config.tx_endpoints)
        .with_context(|| format!("tx endpoints {}", config.tx_endpoints.display()))?;
    let rx = EndpointTable::load(&config.rx_endpoints)
        .with_context(|| format!("rx endpoints {}", config.rx_endpoints.display()))?;
    info!(tx = tx.len(), rx = rx.len(), "Endpoint tables are valid");
    Ok(())
}
