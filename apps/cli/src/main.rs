//! Orsay Scout - command-line TV finder.
//!
//! Runs the same discovery engine the installer wizard uses, without a GUI:
//! one discovery run, a single-address probe, or the ranked interface list.

mod config;

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orsay_core::network::list_interfaces;
use orsay_core::{
    BroadcastEventBridge, DiscoveredDevice, DiscoveryCoordinator, DiscoveryEvent, ErrorCode,
    InterfaceInfo, IpDetector, LocalIpDetector, VendorProfile,
};
use tokio::signal;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::CliConfig;

/// Orsay Scout - find Samsung Orsay TVs on the local network.
#[derive(Parser, Debug)]
#[command(name = "orsay-scout")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "ORSAY_LOG_LEVEL", global = true)]
    log_level: log::LevelFilter,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search the local network (SSDP, then subnet port scan).
    Discover {
        /// Local address to discover from (overrides config file).
        #[arg(short = 'i', long)]
        local_ip: Option<Ipv4Addr>,

        /// Skip the subnet port scan.
        #[arg(long)]
        no_port_scan: bool,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Check whether one address is an Orsay TV.
    Probe {
        /// Address of the TV.
        ip: String,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List local network interfaces, best candidate first.
    Interfaces {
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::debug!("Orsay Scout v{}", env!("CARGO_PKG_VERSION"));

    let config = CliConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        Command::Discover {
            local_ip,
            no_port_scan,
            json,
        } => discover(config, local_ip, no_port_scan, json).await,
        Command::Probe { ip, json } => probe(&ip, json).await,
        Command::Interfaces { json } => interfaces(json),
    }
}

async fn discover(
    mut config: CliConfig,
    local_ip: Option<Ipv4Addr>,
    no_port_scan: bool,
    json: bool,
) -> Result<ExitCode> {
    // Apply CLI overrides
    if let Some(ip) = local_ip {
        config.local_ip = Some(ip);
    }
    if no_port_scan {
        config.port_scan = false;
    }

    let local_ip = match config.local_ip {
        Some(ip) => ip,
        None => LocalIpDetector::new().detect().context(
            "Failed to auto-detect local IP address. \
             Please specify --local-ip or set ORSAY_LOCAL_IP.",
        )?,
    };
    let options = config.to_options();
    log::info!(
        "Configuration: local_ip={}, subnet=/{}, port_scan={}",
        local_ip,
        options.subnet_mask,
        options.enable_port_scan
    );

    let bridge = BroadcastEventBridge::default();
    let mut events = bridge.stream();
    let event_logger = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(DiscoveryEvent::DeviceFound { device }) => log::info!(
                    "Found {} ({}%, {})",
                    device.display_text(),
                    device.confidence,
                    device.method
                ),
                Ok(DiscoveryEvent::ProgressChanged { progress }) => {
                    log::debug!("[{:>3}%] {}", progress.percent, progress.message)
                }
                Err(e) => log::debug!("Event stream lagged: {}", e),
            }
        }
    });

    let coordinator = DiscoveryCoordinator::new(VendorProfile::default(), Arc::new(bridge));
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let result = coordinator
        .start(&local_ip.to_string(), &options, &cancel)
        .await;

    // Dropping the coordinator closes the event channel.
    drop(coordinator);
    if let Err(e) = event_logger.await {
        log::debug!("Event logger stopped: {}", e);
    }

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            log::error!("Discovery failed [{}]: {}", e.code(), e);
            return Ok(ExitCode::FAILURE);
        }
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialize result")?
        );
    } else {
        if outcome.was_cancelled() {
            println!("Discovery cancelled; partial results:");
        }
        print_devices(&outcome.devices);
    }

    Ok(ExitCode::SUCCESS)
}

async fn probe(ip: &str, json: bool) -> Result<ExitCode> {
    let coordinator = DiscoveryCoordinator::with_defaults();
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let device = coordinator.probe(ip, &cancel).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&device).context("Failed to serialize result")?
        );
    } else {
        match &device {
            Some(device) => print_devices(std::slice::from_ref(device)),
            None => println!("No Orsay TV found at {}", ip),
        }
    }

    Ok(if device.is_some() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn interfaces(json: bool) -> Result<ExitCode> {
    let interfaces = list_interfaces().context("Failed to list network interfaces")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&interfaces).context("Failed to serialize interfaces")?
        );
    } else {
        print_interfaces(&interfaces);
    }

    Ok(ExitCode::SUCCESS)
}

fn print_devices(devices: &[DiscoveredDevice]) {
    if devices.is_empty() {
        println!("No Orsay TVs found.");
        return;
    }

    println!(
        "{:<16} {:>5}  {:<17} {:<12} NAME",
        "ADDRESS", "CONF", "METHOD", "MODEL"
    );
    for device in devices {
        println!(
            "{:<16} {:>4}%  {:<17} {:<12} {}",
            device.address,
            device.confidence,
            device.method.to_string(),
            device.version_info().unwrap_or("-"),
            device.friendly_name.as_deref().unwrap_or("-")
        );
    }
}

fn print_interfaces(interfaces: &[InterfaceInfo]) {
    if interfaces.is_empty() {
        println!("No IPv4 interfaces found.");
        return;
    }

    println!("  {:<16} {:<24} {:<9} SCORE", "ADDRESS", "NAME", "KIND");
    for iface in interfaces {
        println!(
            "{} {:<16} {:<24} {:<9} {}",
            if iface.is_preferred { "*" } else { " " },
            iface.ip.to_string(),
            iface.name,
            iface.kind.to_string(),
            iface.score
        );
    }
}

/// Cancels `cancel` on the first Ctrl+C.
async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            log::warn!("Ctrl+C received, cancelling...");
            cancel.cancel();
        }
        Err(e) => log::warn!("Failed to install Ctrl+C handler: {}", e),
    }
}
