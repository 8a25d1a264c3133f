//! Show the bridge requests the Hue engine would issue for a canned bridge
//! state, without touching the network.
//!
//! Run with: cargo run --example hue_plan -- --color 0,0,255 --timeout 30

use std::time::{Duration, Instant};

use clap::Parser;
use futures::channel::mpsc::unbounded;
use lightsync_rs::{
    BackendReport, Color, HueBridgeBackend, LightId, LightState, SyncConfig, SyncEvent,
    SyncService, TransportKind,
};

const LIGHTS: &str = r#"{
    "1": {"state": {"on": false, "bri": 127, "hue": 0, "sat": 254, "colormode": "hs", "reachable": true}},
    "2": {"state": {"on": true, "bri": 200, "ct": 366, "colormode": "ct", "reachable": true}}
}"#;

const SCHEDULES: &str = r#"{
    "4": {"name": "Corluma_timeout_1", "status": "disabled", "localtime": "PT00:09:45"}
}"#;

#[derive(Parser)]
#[command(name = "hue-plan")]
#[command(about = "Print the requests a Hue sync session would send", long_about = None)]
struct Cli {
    /// Target color as r,g,b
    #[arg(long, default_value = "255,0,0")]
    color: Color,

    /// Target brightness (0-100)
    #[arg(short, long, default_value = "80", value_parser = clap::value_parser!(u8).range(0..=100))]
    brightness: u8,

    /// Idle timeout in minutes, 0 to disable
    #[arg(short, long, default_value = "30")]
    timeout: u32,

    /// Simulated seconds to step through
    #[arg(long, default_value = "3")]
    seconds: u64,
}

fn main() -> Result<(), lightsync_rs::Error> {
    let cli = Cli::parse();
    let config = SyncConfig::default();
    let start = Instant::now();

    let (outbox, mut requests) = unbounded();
    let mut hue = HueBridgeBackend::new(outbox, config.watchdog(), start);
    let bridge = hue.add_bridge("001788fffe000001", "demo-user");

    let mut service = SyncService::new(config)?;
    service.dispatcher_mut().register(hue);

    for report in [
        BackendReport::HueLights { bridge: bridge.clone(), body: LIGHTS.into() },
        BackendReport::HueSchedules { bridge: bridge.clone(), body: SCHEDULES.into() },
    ] {
        let event = SyncEvent::Received { transport: TransportKind::Hue, report };
        service.handle_event(event, start);
    }

    for index in [1, 2] {
        let desired = LightState::new(LightId::new(bridge.clone(), index))
            .with_on(true)
            .with_color(cli.color)
            .with_brightness(cli.brightness)
            .with_timeout(cli.timeout);
        service.handle_event(SyncEvent::Upsert(desired), start);
    }

    let end = start + Duration::from_secs(cli.seconds);
    let mut now = start;
    while let Some(deadline) = service.next_deadline() {
        if deadline > end {
            break;
        }
        now = deadline;
        service.on_timer(now);
        while let Ok(Some(request)) = requests.try_next() {
            let body = request.body.map(|b| b.to_string()).unwrap_or_default();
            println!(
                "+{:>5} ms  {} {} {body}",
                now.duration_since(start).as_millis(),
                request.method,
                request.path
            );
        }
    }
    println!("stopped at +{} ms", now.duration_since(start).as_millis());
    Ok(())
}
