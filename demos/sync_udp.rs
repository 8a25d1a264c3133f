//! Keep one ArduCor light on a UDP controller at a given color.
//!
//! Run with: cargo run --example sync_udp -- --controller 192.168.1.40 --color 255,0,0

use std::time::Duration;

use clap::Parser;
use lightsync_rs::{
    Color, Controller, LightId, LightState, SyncConfig, SyncService, TransportKind, UdpBackend,
};

#[derive(Parser)]
#[command(name = "sync-udp")]
#[command(about = "Drive an ArduCor light over UDP until it matches", long_about = None)]
struct Cli {
    /// Controller IP address
    #[arg(short, long)]
    controller: String,

    /// Light index on the controller
    #[arg(short, long, default_value = "1")]
    index: u32,

    /// Main color as r,g,b
    #[arg(long, default_value = "255,255,255")]
    color: Color,

    /// Brightness (0-100)
    #[arg(short, long, default_value = "100", value_parser = clap::value_parser!(u8).range(0..=100))]
    brightness: u8,

    /// Turn the light off instead
    #[arg(long)]
    off: bool,

    /// Optional JSON file with sync timings
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Seconds to run before shutting down
    #[arg(long, default_value = "40")]
    run_for: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SyncConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => SyncConfig::default(),
    };

    let mut service = SyncService::new(config.clone())?;
    let mut udp = UdpBackend::bind("0.0.0.0:10008", service.handle(), config.watchdog()).await?;
    udp.add_controller(&cli.controller);
    service.dispatcher_mut().register(udp);
    service.on_status(|engine, in_sync| {
        println!("{engine:?}: {}", if in_sync { "in sync" } else { "syncing" });
    });

    let controller = Controller::new(&cli.controller, TransportKind::Udp);
    let desired = LightState::new(LightId::new(controller, cli.index))
        .with_on(!cli.off)
        .with_color(cli.color)
        .with_brightness(cli.brightness);

    let handle = service.handle();
    handle.upsert(desired)?;

    let stopper = handle.clone();
    let run_for = Duration::from_secs(cli.run_for);
    tokio::spawn(async move {
        tokio::time::sleep(run_for).await;
        let _ = stopper.shutdown();
    });

    service.run().await;
    Ok(())
}
