use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use rust_vslam_backend::config::SystemConfig;
use rust_vslam_backend::io::read_trajectory;
use rust_vslam_backend::system::MappingSystem;

/// Close observations are assumed within this depth (meters).
const MAXIMUM_DEPTH_CLOSE: f64 = 5.0;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rust_vslam_backend=info".parse()?),
        )
        .init();

    // replay <poses.txt> [config.yaml] [output.txt]
    let poses_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "data/kitti/poses/00.txt".to_string());
    let config = match std::env::args().nth(2) {
        Some(path) => {
            info!("Loading configuration from {}", path);
            SystemConfig::from_file(&path)?
        }
        None => SystemConfig::default(),
    };
    let output = std::env::args().nth(3).map(PathBuf::from);

    println!("Loading poses from: {}", poses_path);
    let poses = read_trajectory(&poses_path)?;
    println!("Loaded {} poses", poses.len());

    let mut system = MappingSystem::new(config);
    let mut local_maps = 0;
    for pose in poses {
        let outcome = system.process_frame(pose, MAXIMUM_DEPTH_CLOSE, Vec::new())?;
        if let Some(local_map) = outcome.local_map {
            local_maps += 1;
            info!("Frame {} finalized local map {}", outcome.frame, local_map);
        }
    }

    system.request_optimization()?;
    system.shutdown();

    let path = system.save_trajectory(output.as_deref())?;
    println!(
        "Created {} local maps, ran {} optimizations, trajectory saved to {}",
        local_maps,
        system.shared_state().optimizations_completed(),
        path.display()
    );

    Ok(())
}
