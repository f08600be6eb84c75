use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use spp_link::transport::{
    DiscoveryConfig, RfcommConfig, RfcommConnector, SerialConfig, SerialConnector, TcpConnector,
    DEFAULT_BAUD_RATE, DEFAULT_RFCOMM_CHANNEL,
};
use spp_link::{ConnectionManager, LinkConfig, TransportConnector};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Bluetooth RFCOMM socket, address is a MAC
    Rfcomm,
    /// Serial TTY, address is a device path
    Serial,
    /// TCP socket, address is host:port
    Tcp,
}

/// Keep a persistent link to a serial port profile peripheral
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Transport to use
    #[arg(short, long, value_enum, default_value_t = Mode::Rfcomm)]
    transport: Mode,

    /// Peripheral address (MAC, device path or host:port)
    #[arg(required_unless_present = "scan")]
    address: Option<String>,

    /// RFCOMM channel
    #[arg(long, default_value_t = DEFAULT_RFCOMM_CHANNEL)]
    channel: u8,

    /// Serial baud rate
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Also run Bluetooth discovery for this many seconds when scanning
    #[arg(long)]
    discover_secs: Option<u64>,

    /// List peripherals and exit
    #[arg(long)]
    scan: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    match args.transport {
        Mode::Rfcomm => {
            let config = RfcommConfig {
                channel: args.channel,
                discovery: DiscoveryConfig {
                    scan_duration: args.discover_secs.map(Duration::from_secs),
                    ..Default::default()
                },
            };
            run(RfcommConnector::new(config), &args).await
        }
        Mode::Serial => {
            let config = SerialConfig {
                baud_rate: args.baud,
            };
            run(SerialConnector::new(config), &args).await
        }
        Mode::Tcp => run(TcpConnector::new(), &args).await,
    }
}

async fn run<C: TransportConnector>(connector: C, args: &Args) -> Result<()> {
    let link = ConnectionManager::new(connector, LinkConfig::default());

    if args.scan {
        let devices = link.scan().await?;
        info!("Found {} device(s) via {}", devices.len(), link.transport_name());
        for device in devices {
            println!("{}", serde_json::to_string(&device)?);
        }
        return Ok(());
    }

    let address = args
        .address
        .as_deref()
        .context("an address is required unless --scan is given")?;

    let mut events = link.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{}", event.to_json());
        }
    });

    if let Err(e) = link.connect(address).await {
        // No last known address yet, so there is nothing to recover towards
        error!("Initial connect failed: {}", e);
        link.shutdown().await;
        printer.await.ok();
        return Err(e.into());
    }

    if let Some(peer) = link.connected_address().await {
        info!("Link up to {} via {}", peer, link.transport_name());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line() => match line? {
                Some(line) => {
                    let mut payload = line.into_bytes();
                    payload.push(b'\n');
                    if let Err(e) = link.write(&payload).await {
                        warn!("Write failed [{}]: {}", e.code(), e);
                    }
                }
                None => break,
            },
        }
    }

    link.disconnect().await;
    link.shutdown().await;
    printer.await.ok();
    Ok(())
}
