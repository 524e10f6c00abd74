use std::path::PathBuf;

#[derive(Debug, clap::Parser)]
#[command(about = "Headless venue crowd simulator")]
pub struct Args {
    /// Path to scenario file
    #[arg(default_value = "scenarios/default.toml")]
    pub scenario: PathBuf,
    /// Run the capacity sweep instead of a single simulation
    #[arg(long)]
    pub sweep: bool,
    /// Simulated duration in seconds
    #[arg(short, long, default_value_t = 600.0)]
    pub duration: f32,
    /// Override the scenario RNG seed
    #[arg(long)]
    pub seed: Option<u64>,
    /// Ignite a fire at the given world position
    #[arg(long, num_args = 2, value_names = ["X", "Y"])]
    pub fire: Option<Vec<f32>>,
    /// Simulated time of the ignition in seconds
    #[arg(long, default_value_t = 60.0)]
    pub fire_time: f32,
}
