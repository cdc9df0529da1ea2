use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use world_simulator::config::SimulationConfig;
use world_simulator::observers::ObserverEvent;
use world_simulator::persistence::FileSaveStore;
use world_simulator::runner::Runner;
use world_simulator::world::WorldSeed;

#[derive(Parser, Debug)]
#[command(name = "world-simulator", about = "Headless settlement simulator")]
struct Args {
    /// RON config file; missing file falls back to built-in defaults
    #[arg(long, default_value = "config/simulation.ron")]
    config: PathBuf,

    /// World seed override
    #[arg(long)]
    seed: Option<u64>,

    /// World width in units
    #[arg(long)]
    width: Option<f32>,

    /// World height in units
    #[arg(long)]
    height: Option<f32>,

    /// Starting population (excluding the player)
    #[arg(long)]
    population: Option<usize>,

    /// Autosave interval in seconds
    #[arg(long)]
    autosave_secs: Option<f64>,

    /// Directory for save blobs
    #[arg(long, default_value = "saves")]
    save_dir: PathBuf,

    /// Log filter, e.g. "info,world_simulator=debug"
    #[arg(long, default_value = "info")]
    log_filter: String,
}

fn main() {
    let args = Args::parse();

    println!("🚀 Starting world simulator (headless)");

    let mut config = SimulationConfig::load_or_default(&args.config);
    // RUST_LOG wins over the flag; the string feeds the app's LogPlugin
    config.log_filter = EnvFilter::try_from_default_env()
        .map(|filter| filter.to_string())
        .unwrap_or_else(|_| args.log_filter.clone());
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(width) = args.width {
        config.world_width = width;
    }
    if let Some(height) = args.height {
        config.world_height = height;
    }
    if let Some(population) = args.population {
        config.initial_population = population;
    }
    if let Some(autosave_secs) = args.autosave_secs {
        config.autosave_secs = autosave_secs;
    }

    let seed = WorldSeed::flat(config.world_width, config.world_height, config.tile_size);
    let mut runner = Runner::new(config);
    runner.initialize_world_resources(&seed);
    runner.initialize();

    match FileSaveStore::new(&args.save_dir) {
        Ok(store) => runner.set_save_store(Arc::new(store)),
        Err(e) => eprintln!("⚠️ Save store unavailable, running without saves: {}", e),
    }

    // Console heartbeat so a headless run shows signs of life
    runner.on(ObserverEvent::SimEvent, |value| {
        if value["event"] == "agent_died" || value["event"] == "crisis_warning" {
            println!("📣 {}", value);
        }
    });

    runner.start();
    println!("✅ Simulation running (50 ms fast tick); Ctrl-C to quit");
    runner.run();
}
