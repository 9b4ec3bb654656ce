/// Drape Terminal - garment preview
///
/// Shows a t-shirt or hoodie with the decals of a design file, rendered in
/// true color with half-block characters. With `--snapshot` a single
/// still frame is written to PNG instead, for cart thumbnails.
///
/// Controls:
///   - WASD / Arrow Keys: Orbit the camera
///   - +/-: Zoom
///   - Space: Toggle auto-rotation
///   - G: Switch garment
///   - C: Cycle color presets
///   - P: Save a snapshot
///   - R: Retry a garment that failed to load
///   - Q/ESC: Quit
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use drape_core::{
    AssetRegistry, Camera, DesignInput, DirectorySource, FileFetcher, GarmentType, MemorySource, Side,
    ThreadedBackend, Viewer, ViewerConfig, ViewerInput,
};
use drape_terminal::{capture, demo, TerminalApp};
use env_logger::Env;
use log::{error, info};

#[derive(Parser, Debug)]
#[command(name = "drape-terminal")]
#[command(author, version, about = "Preview garment designs in the terminal", long_about = None)]
struct Cli {
    /// Design JSON as saved by the editor or stored in the cart
    #[arg(short, long)]
    design: Option<PathBuf>,

    /// Viewer configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Garment shown when the design does not name one
    #[arg(short, long, default_value = "tshirt")]
    garment: GarmentType,

    /// Directory holding the garment models; built-in block garments are
    /// used when omitted
    #[arg(short, long)]
    assets: Option<PathBuf>,

    /// Render one frame to this PNG and exit
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Side facing the camera in snapshots
    #[arg(long, default_value = "front")]
    view: Side,

    /// Snapshot width in pixels
    #[arg(long, default_value_t = 480)]
    width: usize,

    /// Snapshot height in pixels
    #[arg(long, default_value_t = 480)]
    height: usize,

    /// Seconds to wait for decal images before a snapshot is taken anyway
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Start with auto-rotation off
    #[arg(long)]
    no_auto_rotate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Log lines would tear the interactive canvas, so stay quiet there
    // unless RUST_LOG asks otherwise
    let default_filter = if cli.snapshot.is_some() { "info" } else { "error" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();

    let config = ViewerConfig::load_or_default(cli.config.as_deref())?;
    let registry = Arc::new(build_registry(&cli, &config)?);

    let mut input = load_input(&cli)?;
    if cli.no_auto_rotate || cli.snapshot.is_some() {
        input.auto_rotate = false;
    }

    // Relative image paths in a design resolve next to the design file
    let image_root = cli
        .design
        .as_deref()
        .and_then(|path| path.parent())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let backend = ThreadedBackend::new(Arc::new(FileFetcher::new(image_root)));

    let mut viewer = Viewer::new(registry, config.viewer.clone(), backend);
    viewer.set_input(input);

    match &cli.snapshot {
        Some(path) => {
            let mut camera = Camera::with_settings(cli.width as u32, cli.height as u32, config.viewer.camera.clone());
            if cli.view == Side::Back {
                camera.orbit(std::f32::consts::PI, 0.0);
            }
            let snapshot = capture(
                &mut viewer,
                &camera,
                cli.width,
                cli.height,
                Duration::from_secs(cli.timeout),
            );
            snapshot
                .save_png(path)
                .with_context(|| format!("failed to write snapshot {}", path.display()))?;
            info!("wrote {}x{} snapshot to {}", cli.width, cli.height, path.display());
        }
        None => {
            let mut app = TerminalApp::new(viewer, PathBuf::from("drape-snapshot.png"))?;
            app.run()?;
        }
    }

    Ok(())
}

fn build_registry(cli: &Cli, config: &ViewerConfig) -> Result<AssetRegistry> {
    let registry = match &cli.assets {
        Some(root) => {
            let registry = AssetRegistry::new(DirectorySource::new(root), config);
            for (garment, result) in registry.preload() {
                if let Err(err) = result {
                    error!("preloading {garment}: {err}");
                }
            }
            registry
        }
        None => {
            let registry = AssetRegistry::new(MemorySource::new(), config);
            for garment in GarmentType::all() {
                registry.insert(demo::garment(*garment)?);
            }
            registry
        }
    };
    Ok(registry)
}

fn load_input(cli: &Cli) -> Result<ViewerInput> {
    let Some(path) = &cli.design else {
        return Ok(ViewerInput {
            garment: cli.garment,
            ..ViewerInput::default()
        });
    };

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read design {}", path.display()))?;
    let design = DesignInput::from_json(&json)
        .with_context(|| format!("invalid design {}", path.display()))?;
    let input = design.into_viewer_input(cli.garment)?;
    info!(
        "design: {} on {}, {} decal layers",
        input.color,
        input.garment,
        input.decals.len()
    );
    Ok(input)
}
