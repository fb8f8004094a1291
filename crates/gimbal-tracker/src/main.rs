//! # Gimbal Tracker
//!
//! Main entry point for the gimbal fusion tracker.
//! Wires the fusion core to its producers (camera detections and the GPS
//! relay) and to the actuation loop that turns results into step commands.
//! Until hardware adapters are attached, both producers are driven by a
//! simulated subject.

mod actuation;
mod config;
mod error;
mod simulation;

use crate::actuation::Actuator;
use crate::config::TrackerSettings;
use crate::simulation::{Jitter, SimulatedWorld, parse_relay_message};

use chrono::Utc;
use gimbal_core::{EventPayload, FixRole, FusionEvent, ObservationSource};
use gimbal_fusion::FusionCore;
use gimbal_telemetry::FusionMetrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting gimbal tracker v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = TrackerSettings::load()?;
    info!("Configuration loaded");
    info!("   Output rate: {} Hz", settings.output_rate_hz);
    info!(
        "   Timeouts: vision {}s, gps {}s",
        settings.fusion.visual_timeout_secs, settings.fusion.gps_timeout_secs
    );
    info!("   Target: {}", settings.fusion.target_id);

    let core = FusionCore::new(settings.fusion.clone())?;
    let metrics = Arc::new(FusionMetrics::new()?);
    let actuator = Actuator::new(settings.actuation.clone());
    let world = SimulatedWorld::new(
        settings.simulation.clone(),
        (settings.fusion.horizontal_fov_deg, settings.fusion.vertical_fov_deg),
        (settings.fusion.gimbal_height_m, settings.fusion.target_height_m),
    );
    info!(
        "Simulated subject orbiting {:.0}m around ({:.5}, {:.5})",
        world.config().orbit_radius_m,
        world.config().base_latitude,
        world.config().base_longitude
    );

    let started = Instant::now();
    let seed = settings.simulation.seed;

    // Producers stop first so the consumer sees their final observations
    let (producers_tx, producers_rx) = watch::channel(false);
    let (consumer_tx, consumer_rx) = watch::channel(false);

    let producers = vec![
        tokio::spawn(run_vision(
            core.clone(),
            world.clone(),
            metrics.clone(),
            settings.vision_rate_hz,
            Jitter::new(seed),
            started,
            producers_rx.clone(),
        )),
        tokio::spawn(run_gps(
            core.clone(),
            world.clone(),
            metrics.clone(),
            settings.gps_rate_hz,
            Jitter::new(seed.wrapping_add(1)),
            started,
            producers_rx,
        )),
    ];

    let events = tokio::spawn(log_events(
        core.subscribe(),
        metrics.clone(),
        consumer_rx.clone(),
    ));
    let actuation = tokio::spawn(run_actuation(
        core.clone(),
        actuator,
        world,
        metrics,
        settings.output_rate_hz,
        Duration::from_secs(settings.metrics_log_interval_secs),
        consumer_rx,
    ));

    info!("Tracker running, Ctrl+C to stop");
    shutdown_signal().await;

    let _ = producers_tx.send(true);
    for handle in producers {
        handle.await?;
    }
    let _ = consumer_tx.send(true);
    actuation.await?;
    events.await?;

    let snapshot = core.snapshot();
    info!(
        "Final mode {}, {} vision / {} gps accepted, {} mode changes",
        snapshot.mode,
        snapshot.stats.vision_accepted,
        snapshot.stats.gps_accepted,
        snapshot.stats.mode_changes
    );
    debug!("Final snapshot: {}", serde_json::to_string(&snapshot)?);
    info!("Shutdown complete");
    Ok(())
}

/// Initialize logging with tracing
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,gimbal_fusion=debug,gimbal_tracker=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(filter)
        .init();
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        }
    }
}

fn ticker(rate_hz: f64) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / rate_hz));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Camera producer: one detection attempt per frame
async fn run_vision(
    core: FusionCore,
    world: SimulatedWorld,
    metrics: Arc<FusionMetrics>,
    rate_hz: f64,
    mut jitter: Jitter,
    started: Instant,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = ticker(rate_hz);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => break,
        }

        let elapsed = started.elapsed().as_secs_f64();
        match world.camera_frame(elapsed, Utc::now(), &mut jitter) {
            Ok(Some(observation)) => {
                let accepted = core.ingest_vision(observation).is_ok();
                metrics.record_ingest(ObservationSource::Vision, accepted);
            }
            Ok(None) => trace!("No detection this frame"),
            Err(e) => warn!("Simulated frame failed: {}", e),
        }
    }
    info!("Vision producer stopped");
}

/// GPS relay producer: one base/remote pair per tick, through relay JSON
async fn run_gps(
    core: FusionCore,
    world: SimulatedWorld,
    metrics: Arc<FusionMetrics>,
    rate_hz: f64,
    mut jitter: Jitter,
    started: Instant,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = ticker(rate_hz);
    let mut sequence = 0u64;
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => break,
        }

        sequence += 1;
        let elapsed = started.elapsed().as_secs_f64();
        let messages = match world.relay_messages(elapsed, Utc::now(), sequence, &mut jitter) {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Simulated relay failed: {}", e);
                continue;
            }
        };

        let parsed = parse_relay_message(&messages.0)
            .and_then(|base| Ok((base, parse_relay_message(&messages.1)?)));
        let (base, remote) = match parsed {
            Ok(((FixRole::Base, base), (FixRole::Remote, remote))) => (base, remote),
            Ok(_) => {
                warn!("Relay pair arrived with unexpected roles");
                metrics.record_ingest(ObservationSource::Gps, false);
                continue;
            }
            Err(e) => {
                warn!("Unparseable relay message: {}", e);
                metrics.record_ingest(ObservationSource::Gps, false);
                continue;
            }
        };

        match core.ingest_gps(base, remote) {
            Ok(relative) => {
                trace!(
                    "Relay #{}: {:.1}m at {:.1} deg",
                    sequence, relative.distance_m, relative.bearing_deg
                );
                metrics.record_ingest(ObservationSource::Gps, true);
            }
            Err(_) => metrics.record_ingest(ObservationSource::Gps, false),
        }
    }
    info!("GPS producer stopped");
}

/// Actuation consumer: poll the core and move the gimbal
async fn run_actuation(
    core: FusionCore,
    actuator: Actuator,
    world: SimulatedWorld,
    metrics: Arc<FusionMetrics>,
    rate_hz: f64,
    export_every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = ticker(rate_hz);
    let mut last_export = Instant::now();
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => break,
        }

        let compute_started = Instant::now();
        let result = core.compute(Utc::now());
        metrics.observe_compute(compute_started.elapsed().as_secs_f64());
        metrics.record_result(&result);

        let command = actuator.command(&result);
        if !command.is_zero() {
            debug!(
                "{} pan {:.1} tilt {:.1} conf {:.2} -> {}",
                result.mode, result.pan_offset_deg, result.tilt_offset_deg, result.confidence, command
            );
            let (pan, tilt) = actuator.degrees(command);
            world.move_gimbal(pan, tilt);
        }

        if last_export.elapsed() >= export_every {
            match metrics.export() {
                Ok(text) => debug!("Metrics:\n{}", text),
                Err(e) => warn!("Metrics export failed: {}", e),
            }
            last_export = Instant::now();
        }
    }
    info!("Actuation loop stopped");
}

/// Log engine events and count mode changes
async fn log_events(
    mut events: broadcast::Receiver<FusionEvent>,
    metrics: Arc<FusionMetrics>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            received = events.recv() => received,
            _ = shutdown.changed() => break,
        };

        match event {
            Ok(event) => {
                if let EventPayload::ModeChange(change) = &event.payload {
                    metrics.record_mode_change();
                    info!("Mode change event: {} -> {}", change.from, change.to);
                } else {
                    debug!("Event {:?} at {}", event.event_type, event.timestamp);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Event logger lagged, {} events skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
