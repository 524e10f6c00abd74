use log::info;
use rayon::prelude::*;
use serde::Serialize;

use crate::{
    scenario::{Scenario, ScenarioError},
    Simulator,
};

/// Fixed timestep for sweep runs. (seconds)
pub const SWEEP_DT: f32 = 0.05;

/// Safety evaluation of one abbreviated run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepPoint {
    pub n: usize,
    pub peak_density: f32,
    /// 95th percentile egress time, in minutes
    pub p95_egress_min: f32,
    /// Share of sim time spent above the warning density, in percent
    pub time_above_warning_pct: f32,
    pub passed: bool,
}

/// Run abbreviated simulations across the configured N range and grade
/// each against the three safety criteria. The runs are independent, so
/// they fan out across threads; results come back in N order.
pub fn run(scenario: &Scenario) -> Result<Vec<SweepPoint>, ScenarioError> {
    scenario.validate()?;

    let sweep = &scenario.config.sweep;
    let ns: Vec<usize> = (sweep.min_n..=sweep.max_n)
        .step_by(sweep.step.max(1))
        .collect();
    info!(
        "sweep: N in [{}, {}] step {} ({} runs)",
        sweep.min_n,
        sweep.max_n,
        sweep.step,
        ns.len()
    );

    let points = ns
        .par_iter()
        .map(|&n| {
            let point = run_single(scenario, n);
            info!(
                "sweep N={:5}: peak={:5.2} p/m2, p95={:5.1} min, warn={:5.1}% -> {}",
                point.n,
                point.peak_density,
                point.p95_egress_min,
                point.time_above_warning_pct,
                if point.passed { "pass" } else { "FAIL" },
            );
            point
        })
        .collect();

    Ok(points)
}

/// Largest swept N that satisfied all criteria.
pub fn safe_max_n(points: &[SweepPoint]) -> Option<usize> {
    points
        .iter()
        .filter(|point| point.passed)
        .map(|point| point.n)
        .max()
}

fn run_single(base: &Scenario, n: usize) -> SweepPoint {
    let mut scenario = base.clone();
    scenario.config.agent_count = n;
    scenario.config.evacuation_enabled = true;
    scenario.config.evacuation_time = scenario.config.arrival_duration + 2.0;

    let evac_secs = scenario.config.evacuation_time * 60.0;
    let duration = (scenario.config.arrival_duration + 10.0) * 60.0;
    let danger = scenario.config.danger_density;
    let sweep = scenario.config.sweep.clone();

    let mut sim = Simulator::new(scenario);
    sim.start();
    while sim.time() < duration {
        sim.tick(SWEEP_DT);
        // everyone is out and the evacuation window has passed
        if sim.time() > evac_secs + 60.0 && sim.active_agents() == 0 {
            break;
        }
    }

    let metrics = sim.metrics();
    let sim_time = sim.time().max(f32::EPSILON);
    let peak_density = metrics.peak_density;
    let p95_egress_min = metrics.p95_egress() / 60.0;
    let time_above_warning_pct = metrics.time_above_warning / sim_time * 100.0;

    let passed = peak_density <= danger
        && p95_egress_min <= sweep.p95_egress_limit
        && time_above_warning_pct <= sweep.warning_time_limit;

    SweepPoint {
        n,
        peak_density,
        p95_egress_min,
        time_above_warning_pct,
        passed,
    }
}
