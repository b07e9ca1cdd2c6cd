use indoor_bridge::producer::Scenario;
use indoor_bridge::{
    logging, BridgeConfig, CallbackObserver, LocationManager, RegionType,
};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on a replay before the demo gives up waiting
const REPLAY_TIMEOUT: Duration = Duration::from_secs(120);

fn usage(program: &str) {
    eprintln!("Usage: {} [--json-logs] [--fast] [scenario.json [config.json]]", program);
    eprintln!("   Replays the bundled lobby walk when no scenario is given");
}

fn printing_observer() -> CallbackObserver {
    CallbackObserver::new()
        .with_locations(|locations| {
            for location in locations {
                let floor = location
                    .floor
                    .map_or_else(|| "-".to_string(), |f| f.level.to_string());
                println!(
                    "location   lat={:.6} lon={:.6} accuracy={:.1} m floor={} t={}",
                    location.coordinate.latitude,
                    location.coordinate.longitude,
                    location.accuracy_m,
                    floor,
                    location.timestamp_ms
                );
            }
        })
        .with_enter_region(|region| {
            let name = region.name.as_deref().unwrap_or(&region.identifier);
            println!("enter      {} ({:?})", name, region.region_type());
        })
        .with_exit_region(|region| {
            let name = region.name.as_deref().unwrap_or(&region.identifier);
            if region.region_type() == RegionType::Geofence {
                println!("exit       {} (geofence)", name);
            } else {
                println!("exit       {} ({:?})", name, region.region_type());
            }
        })
        .with_status(|status| println!("status     {:?} (code {})", status, status.code()))
        .with_calibration(|quality| println!("calibration {:?}", quality))
        .with_heading(|heading| println!("heading    {:.1} deg", heading.true_heading_deg))
        .with_attitude(|attitude| {
            let (roll, pitch, yaw) = attitude.quaternion.euler_angles();
            println!(
                "attitude   roll={:.1} pitch={:.1} yaw={:.1} deg",
                roll.to_degrees(),
                pitch.to_degrees(),
                yaw.to_degrees()
            );
        })
        .with_extra_info(|info| {
            println!("extra info {}", serde_json::Value::Object(info.clone()));
        })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map_or("indoor-bridge", |s| s.as_str());

    let mut json_logs = false;
    let mut fast = false;
    let mut paths = Vec::new();
    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--json-logs" => json_logs = true,
            "--fast" => fast = true,
            "-h" | "--help" => {
                usage(program);
                return Ok(());
            }
            other if other.starts_with("--") => {
                usage(program);
                return Err(format!("Unknown option '{}'", other).into());
            }
            path => paths.push(path.to_string()),
        }
    }
    if paths.len() > 2 {
        usage(program);
        return Err("Invalid arguments".into());
    }

    if json_logs {
        logging::init_json();
    } else {
        logging::init();
    }

    let scenario = match paths.first() {
        Some(path) => Scenario::from_file(path)?,
        None => Scenario::demo()?,
    };
    let config = match paths.get(1) {
        Some(path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::default(),
    };

    let (geofences, producer) = scenario.into_parts();
    let producer = producer.with_time_scale(if fast { 0.0 } else { 1.0 });
    let monitor = producer.monitor();

    println!("indoor-bridge {}", LocationManager::version_string());
    let manager = LocationManager::with_producer(config, producer)?;
    for geofence in geofences {
        manager.register_geofence(geofence)?;
    }
    manager.add_observer(Arc::new(printing_observer()));

    manager.start()?;
    if !monitor.wait(REPLAY_TIMEOUT) {
        eprintln!("Replay did not finish within {:?}", REPLAY_TIMEOUT);
    }
    manager.stop();

    println!("{}", serde_json::to_string_pretty(&manager.stats())?);
    for failure in manager.take_observer_failures() {
        eprintln!("observer failure: {}", serde_json::to_string(&failure)?);
    }
    manager.shutdown();
    Ok(())
}
