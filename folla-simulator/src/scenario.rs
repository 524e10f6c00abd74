use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const fn f_one() -> f32 {
    1.0
}

const fn usize_one() -> usize {
    1
}

/// Scenario data: venue geometry plus simulation config, as loaded from a
/// single TOML record.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Scenario {
    pub venue: VenueLayout,
    #[serde(default)]
    pub config: SimulationConfig,
}

impl Scenario {
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let size = self.venue.size;
        if size.x <= 0.0 || size.y <= 0.0 {
            return Err(ScenarioError::BadDimensions {
                width: size.x,
                height: size.y,
            });
        }
        if self.venue.entrances.is_empty() || self.venue.exits.is_empty() {
            return Err(ScenarioError::MissingGeometry);
        }
        if self.config.speed_min > self.config.speed_max {
            return Err(ScenarioError::SpeedRange {
                min: self.config.speed_min,
                max: self.config.speed_max,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ScenarioError {
    #[error("venue dimensions must be positive (got {width} x {height})")]
    BadDimensions { width: f32, height: f32 },
    #[error("need at least one entrance and one exit")]
    MissingGeometry,
    #[error("speed_min {min} exceeds speed_max {max}")]
    SpeedRange { min: f32, max: f32 },
}

/// Venue geometry, immutable during a run.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct VenueLayout {
    /// World dimensions (width, height) in meters
    pub size: Vec2,
    #[serde(default)]
    pub walls: Vec<WallConfig>,
    #[serde(default)]
    pub entrances: Vec<EntranceConfig>,
    #[serde(default)]
    pub exits: Vec<ExitConfig>,
    #[serde(default)]
    pub attractors: Vec<AttractorConfig>,
}

/// Axis-aligned rectangular obstacle.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct WallConfig {
    pub id: String,
    /// Minimum corner in world coordinates
    pub min: Vec2,
    /// Extent (width, height) in meters
    pub size: Vec2,
}

impl WallConfig {
    pub fn max(&self) -> Vec2 {
        self.min + self.size
    }
}

/// Spawn strip: a horizontal segment centered on `pos`.
#[derive(Debug, Clone, Deserialize)]
pub struct EntranceConfig {
    pub id: String,
    pub pos: Vec2,
    #[serde(default = "f_one")]
    pub width: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExitConfig {
    pub id: String,
    pub pos: Vec2,
    #[serde(default = "f_one")]
    pub width: f32,
    /// Nominal flow capacity in persons per second, for external reporting
    #[serde(default = "f_one")]
    pub flow_capacity: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttractorConfig {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub pos: Vec2,
    #[serde(default = "f_one")]
    pub radius: f32,
    /// Selection weight in [0, 1]; zero removes it from the draw
    pub weight: f32,
    /// Dwell time once served, in seconds
    pub service_time: f32,
    #[serde(default)]
    pub queueing: bool,
    #[serde(default = "usize_one")]
    pub queue_capacity: usize,
}

/// Crowd arrival curve.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrivalMode {
    /// Everyone at t = 0
    Burst,
    #[default]
    Linear,
    Gaussian,
}

/// Scalar simulation parameters. Every field has a default so scenario
/// files only spell out what they change.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Participant count (N)
    pub agent_count: usize,
    pub arrival_mode: ArrivalMode,
    /// Arrival window in minutes
    pub arrival_duration: f32,
    /// Walking speed distribution (m/s)
    pub speed_min: f32,
    pub speed_mean: f32,
    pub speed_max: f32,
    /// Personal-space radius (m); also sizes the neighbor hash cells
    pub personal_space: f32,
    /// Scale on agent-agent repulsion
    pub avoidance: f32,
    pub queues_enabled: bool,
    /// Timed evacuation trigger; fire ignition always triggers
    pub evacuation_enabled: bool,
    /// Trigger time in minutes
    pub evacuation_time: f32,
    pub panic_speed_multiplier: f32,
    /// Density thresholds in persons per m²
    pub warning_density: f32,
    pub danger_density: f32,
    /// Heatmap cell side in meters
    pub cell_size: f32,
    pub seed: u64,
    pub sweep: SweepConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            agent_count: 200,
            arrival_mode: ArrivalMode::Linear,
            arrival_duration: 5.0,
            speed_min: 0.6,
            speed_mean: 1.34,
            speed_max: 2.0,
            personal_space: 0.5,
            avoidance: 1.0,
            queues_enabled: true,
            evacuation_enabled: false,
            evacuation_time: 10.0,
            panic_speed_multiplier: 1.3,
            warning_density: 4.0,
            danger_density: 6.0,
            cell_size: 2.0,
            seed: 0,
            sweep: SweepConfig::default(),
        }
    }
}

/// Bounds and pass criteria for the capacity sweep.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub min_n: usize,
    pub max_n: usize,
    pub step: usize,
    /// p95 egress limit in minutes
    pub p95_egress_limit: f32,
    /// Share of sim time above the warning density, in percent
    pub warning_time_limit: f32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            min_n: 100,
            max_n: 1000,
            step: 100,
            p95_egress_limit: 8.0,
            warning_time_limit: 10.0,
        }
    }
}
