use glam::{vec2, Vec2};

use crate::{
    scenario::{ArrivalMode, EntranceConfig, SimulationConfig},
    util,
};

/// Cumulative share of the crowd that should have arrived by `t` seconds.
pub fn arrival_fraction(mode: ArrivalMode, t: f32, duration_secs: f32) -> f32 {
    match mode {
        ArrivalMode::Burst => 1.0,
        ArrivalMode::Linear => {
            if duration_secs <= 0.0 {
                1.0
            } else {
                (t / duration_secs).clamp(0.0, 1.0)
            }
        }
        ArrivalMode::Gaussian => {
            if duration_secs <= 0.0 {
                1.0
            } else {
                util::normal_cdf(t, 0.5 * duration_secs, 0.2 * duration_secs)
            }
        }
    }
}

/// Arrival-curve bookkeeping: how many agents exist vs. how many the
/// curve says should exist by now.
#[derive(Debug, Default)]
pub struct SpawnController {
    pub spawned: usize,
}

impl SpawnController {
    pub fn reset(&mut self) {
        self.spawned = 0;
    }

    /// Number of agents to create this tick.
    pub fn due(&self, config: &SimulationConfig, t: f32) -> usize {
        let duration = config.arrival_duration * 60.0;
        let target = arrival_fraction(config.arrival_mode, t, duration)
            * config.agent_count as f32;
        (target.floor() as usize)
            .min(config.agent_count)
            .saturating_sub(self.spawned)
    }
}

/// A spawn position on the entrance strip: jittered along the strip and
/// slightly in depth.
pub fn sample_entrance(entrance: &EntranceConfig, rng: &mut fastrand::Rng) -> Vec2 {
    let along = (rng.f32() - 0.5) * 0.8 * entrance.width;
    let depth = (rng.f32() - 0.5) * 0.5;
    entrance.pos + vec2(along, depth)
}
