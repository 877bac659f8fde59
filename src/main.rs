//! Headless terrain streaming fly-through.
//!
//! Usage: cargo run --release -- [OPTIONS]
//!
//! Options:
//!   --terrain <PATH>  Terrain file to stream (default: synthetic terrain in memory)
//!   --write <PATH>    Save the synthetic terrain to PATH before streaming it
//!   --config <PATH>   Terrain config JSON (default: built-in defaults)
//!   --frames <N>      Frames to simulate (default: 240)
//!   --speed <U>       Camera speed in world units per frame (default: 8.0)
//!   --size <TEXELS>   Synthetic grid size (default: 1024)
//!   --max-lod <N>     Synthetic coarsest LOD (default: 4)
//!   --tile <TEXELS>   Synthetic atlas tile size (default: 64)
//!   --seed <SEED>     Synthetic noise seed (default: 12345)
//!   --stats-json      Print the final frame's statistics as JSON

use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use glam::Vec3;

use heightstream::core::camera::Camera;
use heightstream::core::{logging, Result};
use heightstream::physics::HeadlessPhysics;
use heightstream::render::{CpuAtlas, ModelState, ModelTable, RenderModelId, TerrainId, TerrainRegistry};
use heightstream::streaming::TerrainSource;
use heightstream::terrain::{
    FrameInput, SyntheticParams, SyntheticTerrain, TerrainConfig, TerrainHeader, TerrainProcessor,
};

const TERRAIN_ID: TerrainId = TerrainId(1);

struct FlightPlan {
    frames: u32,
    speed: f32,
    stats_json: bool,
}

fn main() -> ExitCode {
    logging::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let config = match parse_str_arg(&args, "--config") {
        Some(path) => TerrainConfig::load_sync(Path::new(&path))?,
        None => TerrainConfig::default(),
    };
    let plan = FlightPlan {
        frames: parse_u32_arg(&args, "--frames").unwrap_or(240),
        speed: parse_f32_arg(&args, "--speed").unwrap_or(8.0),
        stats_json: args.iter().any(|a| a == "--stats-json"),
    };

    if let Some(path) = parse_str_arg(&args, "--terrain") {
        log::info!("Streaming terrain file {}", path);
        let source = TerrainSource::open_path(Path::new(&path))?;
        return fly(source, config, &plan);
    }

    let header = TerrainHeader::new(
        parse_u32_arg(&args, "--size").unwrap_or(1024),
        64,
        parse_u32_arg(&args, "--tile").unwrap_or(64),
        parse_u32_arg(&args, "--max-lod").unwrap_or(4),
        200.0,
    );
    let params = SyntheticParams {
        seed: parse_u32_arg(&args, "--seed").unwrap_or(12345),
        ..Default::default()
    };

    let start = Instant::now();
    let synthetic = SyntheticTerrain::new(header, params);
    let writer = synthetic.writer()?;
    log::info!("Generated synthetic terrain in {:.2?}", start.elapsed());

    if let Some(path) = parse_str_arg(&args, "--write") {
        let path = PathBuf::from(path);
        writer.save(&path)?;
        log::info!("Saved synthetic terrain to {}", path.display());
        return fly(TerrainSource::open_path(&path)?, config, &plan);
    }

    fly(TerrainSource::from_bytes(writer.to_bytes()?)?, config, &plan)
}

/// Fly a camera diagonally across the terrain and stream it
fn fly<S: Read + Seek>(source: TerrainSource<S>, config: TerrainConfig, plan: &FlightPlan) -> Result<()> {
    let extent = source.data().header.size as f32 * config.units_per_texel;
    let altitude = source.data().header.max_height * 1.5;

    let atlas = CpuAtlas::new(config.atlas_size);
    let mut processor = TerrainProcessor::open(TERRAIN_ID, source, atlas, HeadlessPhysics::new(), config)?;

    let mut models = ModelTable::new();
    models.set(TERRAIN_ID, ModelState::Ready(RenderModelId(1)));
    let mut registry = TerrainRegistry::new();

    let direction = Vec3::new(1.0, 0.0, 1.0).normalize();
    let start = Instant::now();
    let mut total_loads = 0u64;
    let mut peak_instances = 0usize;

    for frame in 0..plan.frames {
        let travelled = (frame as f32 * plan.speed) % (extent * std::f32::consts::SQRT_2);
        let position = direction * travelled + Vec3::new(0.0, altitude, 0.0);
        let camera = Camera::look_at(position, position + direction * 100.0 - Vec3::Y * 30.0, Vec3::Y);

        processor.update(&FrameInput::from_camera(&camera, Vec3::ZERO), &models, &mut registry)?;

        let stats = processor.stats();
        total_loads += stats.loads as u64;
        peak_instances = peak_instances.max(stats.instances);
        if frame % 30 == 0 {
            log::info!(
                "Frame {:4}: {:4} instances, {:4}/{} resident, {:2} loads, {} colliders ({} pooled)",
                frame,
                stats.instances,
                stats.resident,
                stats.capacity,
                stats.loads,
                stats.physics_bound,
                stats.physics_pooled
            );
        }
    }

    let elapsed = start.elapsed();
    log::info!(
        "{} frames in {:.2?} ({:.2?}/frame), {} chunk loads, peak {} instances",
        plan.frames,
        elapsed,
        elapsed / plan.frames.max(1),
        total_loads,
        peak_instances
    );

    if plan.stats_json {
        let json = serde_json::to_string_pretty(processor.stats())
            .map_err(|e| heightstream::core::Error::Config(e.to_string()))?;
        println!("{}", json);
    }

    processor.shutdown(&mut registry);
    Ok(())
}

fn parse_f32_arg(args: &[String], flag: &str) -> Option<f32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
