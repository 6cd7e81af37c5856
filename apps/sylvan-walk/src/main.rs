//! Sylvan headless walk-through
//!
//! Moves a viewer across procedurally generated terrain and logs how the
//! streaming world keeps up. Useful for eyeballing worker throughput and
//! residency churn without a renderer.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p sylvan-walk -- [OPTIONS]
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use std::time::{Duration, Instant};

use glam::Vec3;
use sylvan_core::DistanceMetric;
use sylvan_world::{WorldConfig, WorldManager};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Simulated frame interval.
const TICK: Duration = Duration::from_millis(16);

/// How often (in ticks) to log residency stats.
const REPORT_INTERVAL: u32 = 60;

/// Walk parameters (from CLI or defaults).
#[derive(Debug, Clone)]
struct WalkParams {
    seed: u64,
    view_distance: i32,
    workers: usize,
    ticks: u32,
    /// World units per tick.
    speed: f32,
    metric: DistanceMetric,
}

impl Default for WalkParams {
    fn default() -> Self {
        Self {
            seed: 42,
            view_distance: sylvan_core::constants::DEFAULT_VIEW_DISTANCE,
            workers: 4,
            ticks: 600,
            speed: 2.0,
            metric: DistanceMetric::Chebyshev,
        }
    }
}

impl WalkParams {
    /// Parse walk parameters from command line arguments.
    fn from_args() -> Self {
        let mut params = Self::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1).map(String::as_str);
            let consumed = match (args[i].as_str(), value) {
                ("--seed", Some(v)) => v.parse().map(|v| params.seed = v).is_ok(),
                ("--view-distance", Some(v)) => {
                    v.parse().map(|v| params.view_distance = v).is_ok()
                }
                ("--workers", Some(v)) => v.parse().map(|v| params.workers = v).is_ok(),
                ("--ticks", Some(v)) => v.parse().map(|v| params.ticks = v).is_ok(),
                ("--speed", Some(v)) => v.parse().map(|v| params.speed = v).is_ok(),
                ("--euclidean", _) => {
                    params.metric = DistanceMetric::Euclidean;
                    false
                }
                (other, _) => {
                    warn!(arg = other, "ignoring unrecognized argument");
                    false
                }
            };
            if consumed {
                i += 1;
            }
            i += 1;
        }

        params
    }

    fn world_config(&self) -> WorldConfig {
        let mut config = WorldConfig {
            view_distance: self.view_distance,
            metric: self.metric,
            workers: self.workers,
            ..Default::default()
        };
        config.generator.noise.seed = self.seed;
        config
    }
}

/// Viewer position after `tick` ticks: a slow spiral outwards from the origin.
fn viewer_at(tick: u32, speed: f32) -> Vec3 {
    let t = tick as f32 * speed;
    let angle = t / 200.0;
    let radius = t * 0.5;
    Vec3::new(radius * angle.cos(), 0.0, radius * angle.sin())
}

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let params = WalkParams::from_args();
    info!(?params, "starting walk");

    let mut world = WorldManager::new(params.world_config())?;
    let started = Instant::now();
    let mut committed = 0_usize;
    let mut failed = 0_usize;

    for tick in 0..params.ticks {
        let report = world.update(viewer_at(tick, params.speed));
        committed += report.committed.len();
        failed += report.failed.len();

        if tick % REPORT_INTERVAL == 0 {
            let stats = world.stats();
            info!(
                tick,
                center = ?report.center,
                resident = stats.resident,
                ready = stats.ready,
                pending = stats.pending,
                in_flight = stats.in_flight,
                memory_kib = stats.memory_bytes / 1024,
                "streaming"
            );
        }
        std::thread::sleep(TICK);
    }

    // Let the last view block finish so the summary reflects a settled world.
    let final_position = viewer_at(params.ticks, params.speed);
    while !world.is_settled() {
        let report = world.update(final_position);
        committed += report.committed.len();
        failed += report.failed.len();
        std::thread::sleep(TICK);
    }

    let stats = world.stats();
    info!(
        elapsed = ?started.elapsed(),
        committed,
        failed,
        resident = stats.resident,
        memory_kib = stats.memory_bytes / 1024,
        "walk finished"
    );

    world.shutdown();
    Ok(())
}

fn print_help() {
    eprintln!(
        "Sylvan headless walk-through

USAGE:
    cargo run -p sylvan-walk -- [OPTIONS]

OPTIONS:
    --seed <N>              World generation seed (default: 42)
    --view-distance <N>     Chunk radius kept resident (default: 4)
    --workers <N>           Generation worker threads (default: 4)
    --ticks <N>             Number of simulated frames (default: 600)
    --speed <F>             World units moved per frame (default: 2.0)
    --euclidean             Use a circular view instead of a square one
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
