pub mod agent;
pub mod field;
pub mod fire;
pub mod firefighter;
pub mod metrics;
pub mod navigation;
pub mod neighbor_grid;
pub mod queue;
pub mod scenario;
pub mod smoke;
pub mod spawn;
pub mod sweep;
pub mod util;

use fastrand_contrib::RngExt;
use glam::{vec2, Vec2};
use log::info;
use ndarray::Array2;
use serde::Serialize;

use agent::{Agent, AgentState};
use field::Field;
use fire::FireGrid;
use firefighter::Firefighter;
use metrics::{Metrics, MetricsReport};
use neighbor_grid::NeighborGrid;
use queue::AttractorQueue;
use scenario::{Scenario, SimulationConfig, VenueLayout};
use smoke::SmokeGrid;
use spawn::SpawnController;

/// Upper bound on a single integration step. (seconds)
pub const MAX_DT: f32 = 0.05;

/// Simulation kernel. Owns every entity and advances the whole world in
/// fixed phase order on each [`tick`](Simulator::tick); all reads go
/// through immutable snapshots. Reproducible for a given scenario and
/// seed.
pub struct Simulator {
    pub scenario: Scenario,
    pub field: Field,
    fire: FireGrid,
    smoke: SmokeGrid,
    agents: Vec<Agent>,
    queues: Vec<AttractorQueue>,
    firefighters: Vec<Firefighter>,
    blocked_exits: Vec<usize>,
    neighbor_grid: NeighborGrid,
    density: Array2<f32>,
    metrics: Metrics,
    spawner: SpawnController,
    rng: fastrand::Rng,
    query_buf: Vec<u32>,
    time: f32,
    running: bool,
    evacuating: bool,
}

impl Simulator {
    pub fn new(scenario: Scenario) -> Self {
        let field = Field::from_layout(&scenario.venue);
        let mut sim = Simulator {
            fire: FireGrid::new(field.shape),
            smoke: SmokeGrid::new(field.shape),
            neighbor_grid: NeighborGrid::new(field.size, 1.0),
            density: Array2::zeros((1, 1)),
            queues: vec![AttractorQueue::default(); scenario.venue.attractors.len()],
            agents: Vec::new(),
            firefighters: Vec::new(),
            blocked_exits: Vec::new(),
            metrics: Metrics::default(),
            spawner: SpawnController::default(),
            rng: fastrand::Rng::with_seed(scenario.config.seed),
            query_buf: Vec::new(),
            time: 0.0,
            running: false,
            evacuating: false,
            field,
            scenario,
        };
        sim.rebuild_buffers();
        sim.metrics.reset(sim.scenario.venue.attractors.len());

        let venue = &sim.scenario.venue;
        info!(
            "simulator ready: {:.0}x{:.0} m venue, {} walls, {} entrances, {} exits, {} attractors",
            venue.size.x,
            venue.size.y,
            venue.walls.len(),
            venue.entrances.len(),
            venue.exits.len(),
            venue.attractors.len(),
        );
        sim
    }

    /// Drop all run state (agents, fire, smoke, queues, firefighters,
    /// metrics) and reseed the RNG. The layout, config, and any blocked
    /// exits survive.
    pub fn reset(&mut self) {
        self.agents.clear();
        self.firefighters.clear();
        for queue in &mut self.queues {
            queue.clear();
        }
        self.fire.clear();
        self.smoke.clear();
        self.neighbor_grid.clear();
        self.density.fill(0.0);
        self.metrics.reset(self.scenario.venue.attractors.len());
        self.spawner.reset();
        self.rng = fastrand::Rng::with_seed(self.scenario.config.seed);
        self.time = 0.0;
        self.running = false;
        self.evacuating = false;
    }

    pub fn update_config(&mut self, config: SimulationConfig) {
        self.scenario.config = config;
        self.rebuild_buffers();
    }

    /// Swap the venue geometry. Invalidates every path and position, so
    /// the run is reset.
    pub fn update_layout(&mut self, layout: VenueLayout) {
        self.scenario.venue = layout;
        self.field = Field::from_layout(&self.scenario.venue);
        self.fire = FireGrid::new(self.field.shape);
        self.smoke = SmokeGrid::new(self.field.shape);
        self.queues = vec![AttractorQueue::default(); self.scenario.venue.attractors.len()];
        self.rebuild_buffers();
        self.reset();
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_evacuating(&self) -> bool {
        self.evacuating
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn firefighters(&self) -> &[Firefighter] {
        &self.firefighters
    }

    pub fn fire(&self) -> &FireGrid {
        &self.fire
    }

    pub fn smoke(&self) -> &SmokeGrid {
        &self.smoke
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn active_agents(&self) -> usize {
        self.agents.iter().filter(|agent| agent.active()).count()
    }

    pub fn spawned(&self) -> usize {
        self.spawner.spawned
    }

    /// Advance the world by `dt` seconds, clamped to [`MAX_DT`]. No-op
    /// while paused.
    pub fn tick(&mut self, dt: f32) {
        if !self.running {
            return;
        }
        let dt = dt.min(MAX_DT);
        if dt <= 0.0 {
            return;
        }

        let evac_enabled = self.scenario.config.evacuation_enabled;
        let evac_at = self.scenario.config.evacuation_time * 60.0;
        if evac_enabled && !self.evacuating && self.time >= evac_at {
            self.trigger_evacuation();
        }

        self.fire.spread(dt, &self.field.passable);
        self.smoke.step(dt, &self.fire.burning);
        self.update_firefighters(dt);
        self.spawn_arrivals();
        self.rebuild_neighbor_grid();

        for at in 0..self.agents.len() {
            if self.agents[at].active() {
                self.update_agent(at, dt);
            }
        }

        self.service_queues();
        self.compute_density();

        let warning = self.scenario.config.warning_density;
        let danger = self.scenario.config.danger_density;
        self.metrics
            .observe_density(&self.density, warning, danger, dt);
        self.metrics
            .observe_queues(self.queues.iter().map(|queue| queue.waiting.len()));

        self.time += dt;
    }

    /// Ignite the cell under `(x, y)` and trigger the evacuation. Ignition
    /// of impassable cells is ignored.
    pub fn start_fire(&mut self, x: f32, y: f32) {
        let (r, c) = self.field.cell_of(vec2(x, y));
        if !self.field.passable[(r, c)] {
            return;
        }
        if self.fire.ignite(r, c, self.time) {
            // burning cells carry full smoke from the very first snapshot
            self.smoke.pin(r, c);
            info!("fire ignited at ({x:.1}, {y:.1}), t={:.1} s", self.time);
            self.trigger_evacuation();
        }
    }

    /// Replace the set of blocked exits, re-planning every exit-bound
    /// agent whose target just became unavailable.
    pub fn set_blocked_exits(&mut self, ids: Vec<usize>) {
        let mut ids = ids;
        ids.sort_unstable();
        ids.dedup();
        self.blocked_exits = ids;

        for at in 0..self.agents.len() {
            if !matches!(
                self.agents[at].state,
                AgentState::SeekingExit | AgentState::Evacuating
            ) {
                continue;
            }
            let stale = match self.agents[at].target_exit {
                Some(exit) => self.blocked_exits.contains(&exit),
                None => true,
            };
            if stale {
                self.plan_to_exit(at);
            }
        }
    }

    pub fn get_metrics(&self) -> MetricsReport {
        MetricsReport {
            peak_density: self.metrics.peak_density,
            time_above_warning: self.metrics.time_above_warning,
            time_above_danger: self.metrics.time_above_danger,
            spawned: self.spawner.spawned,
            active: self.active_agents(),
            exited: self.metrics.egress_times.len(),
            mean_egress: self.metrics.mean_egress(),
            p95_egress: self.metrics.p95_egress(),
            queue_lengths: self.metrics.queue_lengths.clone(),
            max_queue_lengths: self.metrics.max_queue_lengths.clone(),
        }
    }

    pub fn get_frame(&self) -> FrameSnapshot {
        let agents = self
            .agents
            .iter()
            .filter(|agent| agent.active())
            .map(AgentView::from)
            .collect();
        let firefighters = self
            .firefighters
            .iter()
            .map(FirefighterView::from)
            .collect();
        let fire_active = self.fire.started_at.is_some();

        FrameSnapshot {
            time: self.time,
            running: self.running,
            evacuating: self.evacuating,
            agents,
            density: self.density.clone(),
            density_rows: self.density.nrows(),
            density_cols: self.density.ncols(),
            metrics: self.get_metrics(),
            fire: fire_active.then(|| self.fire.burning.clone()),
            fire_rows: self.field.shape.0,
            fire_cols: self.field.shape.1,
            smoke: (fire_active || self.smoke.has_smoke).then(|| self.smoke.intensity.clone()),
            firefighters,
            blocked_exits: self.blocked_exits.clone(),
        }
    }

    fn rebuild_buffers(&mut self) {
        let personal_space = self.scenario.config.personal_space.max(0.05);
        self.neighbor_grid = NeighborGrid::new(self.field.size, 2.0 * personal_space);

        let cell = self.density_cell_size();
        let rows = (self.field.size.y / cell).ceil().max(1.0) as usize;
        let cols = (self.field.size.x / cell).ceil().max(1.0) as usize;
        self.density = Array2::zeros((rows, cols));
    }

    fn density_cell_size(&self) -> f32 {
        let cell = self.scenario.config.cell_size;
        if cell.is_finite() && cell > 0.0 {
            cell
        } else {
            1.0
        }
    }

    fn trigger_evacuation(&mut self) {
        if self.evacuating {
            return;
        }
        self.evacuating = true;
        info!("evacuation triggered at t={:.1} s", self.time);

        for queue in &mut self.queues {
            queue.clear();
        }
        let panic = self.scenario.config.panic_speed_multiplier;
        for at in 0..self.agents.len() {
            if !self.agents[at].active() {
                continue;
            }
            let agent = &mut self.agents[at];
            agent.target_attractor = None;
            agent.state = AgentState::Evacuating;
            agent.speed *= panic;
            self.plan_to_exit(at);
        }
    }

    fn update_firefighters(&mut self, dt: f32) {
        if let Some(started) = self.fire.started_at {
            if self.firefighters.is_empty()
                && self.time >= started + firefighter::RESPONSE_DELAY
                && !self.scenario.venue.entrances.is_empty()
            {
                let entrances = &self.scenario.venue.entrances;
                for crew in 0..firefighter::CREW_SIZE {
                    let pos = entrances[crew % entrances.len()].pos;
                    self.firefighters.push(Firefighter::new(crew as u32, pos));
                }
                info!("firefighters deployed at t={:.1} s", self.time);
            }
        }

        let walls = &self.scenario.venue.walls;
        for ff in &mut self.firefighters {
            ff.update(dt, &mut self.fire, &self.field, walls);
        }
    }

    fn spawn_arrivals(&mut self) {
        if self.scenario.venue.entrances.is_empty() {
            return;
        }
        let due = self.spawner.due(&self.scenario.config, self.time);
        for _ in 0..due {
            self.spawn_one();
        }
    }

    fn spawn_one(&mut self) {
        let entrance_count = self.scenario.venue.entrances.len();
        let pick = self.rng.usize(..entrance_count);
        let pos = spawn::sample_entrance(&self.scenario.venue.entrances[pick], &mut self.rng);

        let radius = 0.22 + self.rng.f32() * 0.06;
        // tolerate inverted speed bounds instead of panicking in clamp
        let speed_lo = self.scenario.config.speed_min.min(self.scenario.config.speed_max);
        let speed_hi = self.scenario.config.speed_min.max(self.scenario.config.speed_max);
        let speed_mean = self.scenario.config.speed_mean;
        let speed = self
            .rng
            .f32_normal_approx(speed_mean, (speed_hi - speed_lo) / 4.0)
            .clamp(speed_lo, speed_hi);

        let size = self.field.size;
        let mut agent = Agent::new(self.agents.len() as u32, pos, radius, speed, self.time);
        agent.pos.x = agent.pos.x.clamp(radius, size.x - radius);
        agent.pos.y = agent.pos.y.clamp(radius, size.y - radius);

        if self.evacuating {
            agent.state = AgentState::Evacuating;
            agent.speed *= self.scenario.config.panic_speed_multiplier;
        } else if let Some(target) = self.pick_attractor() {
            agent.state = AgentState::SeekingAttractor;
            agent.target_attractor = Some(target);
        }

        self.agents.push(agent);
        let at = self.agents.len() - 1;
        if let Some(target) = self.agents[at].target_attractor {
            let goal = self.scenario.venue.attractors[target].pos;
            let path = navigation::plan(&self.field, self.agents[at].pos, goal);
            self.agents[at].set_path(path);
        } else {
            self.plan_to_exit(at);
        }
        self.spawner.spawned += 1;
    }

    /// Weighted draw over attractors, skipping any whose queue is full.
    /// None when nothing is drawable; the agent then heads for an exit.
    fn pick_attractor(&mut self) -> Option<usize> {
        let attractors = &self.scenario.venue.attractors;
        let mut candidates: Vec<usize> = (0..attractors.len())
            .filter(|&at| attractors[at].weight > 0.0)
            .collect();

        loop {
            let total: f32 = candidates
                .iter()
                .map(|&at| self.scenario.venue.attractors[at].weight)
                .sum();
            if candidates.is_empty() || total <= 0.0 {
                return None;
            }

            let mut draw = self.rng.f32() * total;
            let mut slot = candidates.len() - 1;
            for (candidate_slot, &at) in candidates.iter().enumerate() {
                draw -= self.scenario.venue.attractors[at].weight;
                if draw <= 0.0 {
                    slot = candidate_slot;
                    break;
                }
            }

            let chosen = candidates[slot];
            let config = &self.scenario.venue.attractors[chosen];
            let full = self.scenario.config.queues_enabled
                && config.queueing
                && self.queues[chosen].occupancy() >= config.queue_capacity;
            if full {
                candidates.remove(slot);
                continue;
            }
            return Some(chosen);
        }
    }

    fn rebuild_neighbor_grid(&mut self) {
        self.neighbor_grid.clear();
        for agent in &self.agents {
            if agent.active() {
                self.neighbor_grid.insert(agent.id, agent.pos);
            }
        }
    }

    fn update_agent(&mut self, at: usize, dt: f32) {
        let now = self.time;

        // service completion first, so the fresh exit path is walked on
        // this same tick
        if self.agents[at].state == AgentState::AtAttractor && now >= self.agents[at].at_until {
            if let Some(target) = self.agents[at].target_attractor.take() {
                self.queues[target].serving = self.queues[target].serving.saturating_sub(1);
            }
            self.agents[at].state = AgentState::SeekingExit;
            self.plan_to_exit(at);
        }

        let (pos, radius) = {
            let agent = &self.agents[at];
            (agent.pos, agent.radius)
        };
        let smoke = self.smoke.at(pos.y.floor() as i32, pos.x.floor() as i32);

        let agent = &self.agents[at];
        let mut force = (agent.desired_velocity(smoke) - agent.vel) / agent::STEER_TAU;
        force += self.repulsion_from_neighbors(at);
        force += agent::wall_repulsion(pos, radius, &self.scenario.venue.walls);
        force += agent::fire_repulsion(pos, &self.fire);

        let size = self.field.size;
        {
            let agent = &mut self.agents[at];
            agent.vel += force * dt;
            agent.vel = agent.vel.clamp_length_max(agent::SPEED_CAP * agent.speed);
            agent.pos += agent.vel * dt;
            agent.pos.x = agent.pos.x.clamp(agent.radius, size.x - agent.radius);
            agent.pos.y = agent.pos.y.clamp(agent.radius, size.y - agent.radius);
        }
        {
            let Agent {
                pos, vel, radius, ..
            } = &mut self.agents[at];
            agent::resolve_wall_collisions(pos, vel, *radius, &self.scenario.venue.walls);
        }

        if let Some(waypoint) = self.agents[at].current_waypoint() {
            if self.agents[at].pos.distance(waypoint) < agent::WAYPOINT_RADIUS {
                self.agents[at].path_index += 1;
                if self.agents[at].current_waypoint().is_none() {
                    self.on_path_end(at);
                }
            }
        }

        if matches!(
            self.agents[at].state,
            AgentState::SeekingExit | AgentState::Evacuating
        ) && self.reached_open_exit(at)
        {
            let agent = &mut self.agents[at];
            agent.state = AgentState::Exited;
            agent.exit_time = Some(now);
            let elapsed = now - agent.spawn_time;
            self.metrics.record_egress(elapsed);
            return;
        }

        if self.agents[at].vel.length() < agent::STUCK_SPEED {
            self.agents[at].stuck_time += dt;
            if self.agents[at].stuck_time > agent::STUCK_LIMIT {
                self.agents[at].stuck_time = 0.0;
                self.replan(at);
            }
        } else {
            self.agents[at].stuck_time = 0.0;
        }
    }

    fn repulsion_from_neighbors(&mut self, at: usize) -> Vec2 {
        let (pos, radius, id) = {
            let agent = &self.agents[at];
            (agent.pos, agent.radius, agent.id)
        };
        let avoidance = self.scenario.config.avoidance;
        let personal_space = self.scenario.config.personal_space;
        let range = 6.0 * radius + 1.5;

        let mut ids = std::mem::take(&mut self.query_buf);
        ids.clear();
        self.neighbor_grid.query(pos, range, &mut ids);

        let mut force = Vec2::ZERO;
        for &other_id in &ids {
            if other_id == id {
                continue;
            }
            let other = &self.agents[other_id as usize];
            let delta = pos - other.pos;
            let dist = delta.length();
            if dist <= f32::EPSILON || dist > range {
                continue;
            }
            let overlap = (radius + other.radius) - dist;
            if overlap > -2.0 * personal_space {
                force += agent::REPULSION_STRENGTH
                    * avoidance
                    * (overlap / agent::REPULSION_FALLOFF).exp()
                    * (delta / dist);
            }
        }

        self.query_buf = ids;
        force
    }

    /// End-of-path event: attractor arrivals join the queue or go
    /// straight into service; exit-bound agents simply wait for the
    /// absorption check.
    fn on_path_end(&mut self, at: usize) {
        if self.agents[at].state != AgentState::SeekingAttractor {
            return;
        }
        match self.agents[at].target_attractor {
            Some(target) => {
                let config = &self.scenario.venue.attractors[target];
                if self.scenario.config.queues_enabled && config.queueing {
                    self.queues[target].waiting.push_back(self.agents[at].id);
                    self.agents[at].state = AgentState::Queuing;
                } else {
                    self.queues[target].serving += 1;
                    self.agents[at].state = AgentState::AtAttractor;
                    self.agents[at].at_until = self.time + config.service_time;
                }
            }
            None => {
                self.agents[at].state = AgentState::SeekingExit;
                self.plan_to_exit(at);
            }
        }
    }

    fn service_queues(&mut self) {
        for target in 0..self.queues.len() {
            let config = &self.scenario.venue.attractors[target];
            if !(self.scenario.config.queues_enabled && config.queueing) {
                continue;
            }
            while self.queues[target].serving < 1 {
                let Some(id) = self.queues[target].waiting.pop_front() else {
                    break;
                };
                let at = id as usize;
                if self.agents[at].state != AgentState::Queuing {
                    continue;
                }
                self.agents[at].state = AgentState::AtAttractor;
                self.agents[at].at_until = self.time + config.service_time;
                self.queues[target].serving += 1;
            }
        }
    }

    fn compute_density(&mut self) {
        self.density.fill(0.0);
        let cell = self.density_cell_size();
        let weight = 1.0 / (cell * cell);
        let (rows, cols) = self.density.dim();

        for agent in &self.agents {
            if !agent.active() {
                continue;
            }
            let r = ((agent.pos.y / cell) as usize).min(rows - 1);
            let c = ((agent.pos.x / cell) as usize).min(cols - 1);
            self.density[(r, c)] += weight;
        }
    }

    fn plan_to_exit(&mut self, at: usize) {
        let pos = self.agents[at].pos;
        let choice = self.nearest_open_exit(pos);
        self.agents[at].target_exit = choice;
        let path = match choice {
            Some(exit) => {
                navigation::plan(&self.field, pos, self.scenario.venue.exits[exit].pos)
            }
            None => Vec::new(),
        };
        self.agents[at].set_path(path);
    }

    /// Nearest non-blocked exit by squared distance; when every exit is
    /// blocked, fall back to the full set so agents still move somewhere.
    fn nearest_open_exit(&self, pos: Vec2) -> Option<usize> {
        let nearest = |skip_blocked: bool| {
            let mut best = None;
            let mut best_dist = f32::MAX;
            for (at, exit) in self.scenario.venue.exits.iter().enumerate() {
                if skip_blocked && self.blocked_exits.contains(&at) {
                    continue;
                }
                let dist = pos.distance_squared(exit.pos);
                if dist < best_dist {
                    best_dist = dist;
                    best = Some(at);
                }
            }
            best
        };
        nearest(true).or_else(|| nearest(false))
    }

    fn reached_open_exit(&self, at: usize) -> bool {
        let agent = &self.agents[at];
        self.scenario
            .venue
            .exits
            .iter()
            .enumerate()
            .filter(|(exit, _)| !self.blocked_exits.contains(exit))
            .any(|(_, exit)| {
                let reach = exit.width / 2.0 + agent.radius + agent::EXIT_SLACK;
                agent.pos.distance_squared(exit.pos) <= reach * reach
            })
    }

    fn replan(&mut self, at: usize) {
        match self.agents[at].state {
            AgentState::SeekingAttractor => {
                if let Some(target) = self.agents[at].target_attractor {
                    let goal = self.scenario.venue.attractors[target].pos;
                    let path = navigation::plan(&self.field, self.agents[at].pos, goal);
                    self.agents[at].set_path(path);
                }
            }
            AgentState::SeekingExit | AgentState::Evacuating => self.plan_to_exit(at),
            _ => {}
        }
    }
}

/// Read-only view of the world, taken after a tick completes.
#[derive(Debug, Clone, Serialize)]
pub struct FrameSnapshot {
    pub time: f32,
    pub running: bool,
    pub evacuating: bool,
    pub agents: Vec<AgentView>,
    pub density: Array2<f32>,
    pub density_rows: usize,
    pub density_cols: usize,
    pub metrics: MetricsReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fire: Option<Array2<bool>>,
    pub fire_rows: usize,
    pub fire_cols: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoke: Option<Array2<f32>>,
    pub firefighters: Vec<FirefighterView>,
    pub blocked_exits: Vec<usize>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct AgentView {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub radius: f32,
    pub state: AgentState,
}

impl From<&Agent> for AgentView {
    fn from(agent: &Agent) -> Self {
        AgentView {
            id: agent.id,
            x: agent.pos.x,
            y: agent.pos.y,
            vx: agent.vel.x,
            vy: agent.vel.y,
            radius: agent.radius,
            state: agent.state,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FirefighterView {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub extinguishing: bool,
    pub target_row: Option<usize>,
    pub target_col: Option<usize>,
}

impl From<&Firefighter> for FirefighterView {
    fn from(ff: &Firefighter) -> Self {
        FirefighterView {
            id: ff.id,
            x: ff.pos.x,
            y: ff.pos.y,
            extinguishing: ff.extinguishing(),
            target_row: ff.target.map(|(r, _)| r),
            target_col: ff.target.map(|(_, c)| c),
        }
    }
}
