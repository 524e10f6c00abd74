mod args;

use std::{
    fs::{self, File},
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
};

use args::Args;
use clap::Parser;
use log::{info, warn};
use serde::Serialize;

use folla_simulator::{scenario::Scenario, sweep, Simulator, MAX_DT};

static SIG_INT: AtomicBool = AtomicBool::new(false);

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_module("folla", log::LevelFilter::Info)
        .filter_module("folla_simulator", log::LevelFilter::Info)
        .init();

    if cfg!(debug_assertions) {
        warn!("Debug build");
    }

    let args = Args::parse();

    let mut scenario: Scenario = toml::from_str(&fs::read_to_string(&args.scenario)?)?;
    info!("Loaded scenario file: {}", args.scenario.display());
    if let Some(seed) = args.seed {
        scenario.config.seed = seed;
    }

    ctrlc::set_handler(|| SIG_INT.store(true, Ordering::SeqCst))?;

    if args.sweep {
        let points = sweep::run(&scenario)?;
        match sweep::safe_max_n(&points) {
            Some(n) => info!("Safe max N: {n}"),
            None => info!("No N in the swept range passed"),
        }
        export_json("sweep", &points)?;
        return Ok(());
    }

    if let Err(err) = scenario.validate() {
        // a plain run is allowed to proceed; it just won't spawn anyone
        warn!("Scenario: {err}");
    }

    let agent_count = scenario.config.agent_count;
    let fire = args.fire.as_ref().map(|at| (at[0], at[1]));
    let mut fire_pending = fire.is_some();

    let mut sim = Simulator::new(scenario);
    sim.start();

    let mut steps: u64 = 0;
    while sim.time() < args.duration {
        if SIG_INT.load(Ordering::SeqCst) {
            info!("Interrupted at t={:.1} s", sim.time());
            break;
        }

        if fire_pending && sim.time() >= args.fire_time {
            let (x, y) = fire.unwrap_or_default();
            sim.start_fire(x, y);
            fire_pending = false;
        }

        sim.tick(MAX_DT);
        steps += 1;

        if steps % 400 == 0 {
            let report = sim.get_metrics();
            info!(
                "t={:6.1} s, active: {:5}, exited: {:5}, peak: {:.2} p/m2",
                sim.time(),
                report.active,
                report.exited,
                report.peak_density,
            );
        }

        if agent_count > 0 && sim.spawned() >= agent_count && sim.active_agents() == 0 {
            info!("All agents exited at t={:.1} s", sim.time());
            break;
        }
    }

    let report = sim.get_metrics();
    info!(
        "Run complete: t={:.1} s, exited {}/{}, peak {:.2} p/m2, p95 egress {:.1} s",
        sim.time(),
        report.exited,
        report.spawned,
        report.peak_density,
        report.p95_egress,
    );
    export_json("run", &sim.get_frame())?;

    Ok(())
}

fn export_json<T: Serialize>(tag: &str, value: &T) -> anyhow::Result<PathBuf> {
    fs::create_dir_all("logs")?;
    let stamp = chrono::Local::now().format("%Y-%m-%d_%H%M%S").to_string();
    let path: PathBuf = ["logs", &format!("{stamp}_{tag}.json")].iter().collect();

    let mut file = File::create(&path)?;
    serde_json::to_writer(&mut file, value)?;
    info!("Exported {}", path.display());
    Ok(path)
}
