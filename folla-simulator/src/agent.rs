use glam::Vec2;
use serde::Serialize;

use crate::{fire::FireGrid, scenario::WallConfig, util};

/// Behavioural state of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    SeekingAttractor,
    Queuing,
    AtAttractor,
    SeekingExit,
    Evacuating,
    Exited,
}

/// Relaxation time of the steering force. (seconds)
pub const STEER_TAU: f32 = 0.5;
/// Agent-agent repulsion magnitude and falloff.
pub const REPULSION_STRENGTH: f32 = 2.0;
pub const REPULSION_FALLOFF: f32 = 0.15;
/// Wall repulsion magnitude, falloff, and cutoff distance. (meters)
pub const WALL_STRENGTH: f32 = 3.0;
pub const WALL_FALLOFF: f32 = 0.1;
pub const WALL_RANGE: f32 = 1.5;
/// Fire repulsion magnitude and falloff; scan window in cells.
pub const FIRE_STRENGTH: f32 = 10.0;
pub const FIRE_FALLOFF: f32 = 0.4;
pub const FIRE_WINDOW: i32 = 6;
/// Distance at which a waypoint counts as reached. (meters)
pub const WAYPOINT_RADIUS: f32 = 0.6;
/// Speed below which stuck time accumulates, and the re-plan threshold.
pub const STUCK_SPEED: f32 = 0.05;
pub const STUCK_LIMIT: f32 = 2.5;
/// Velocity cap as a multiple of desired speed.
pub const SPEED_CAP: f32 = 1.5;
/// Extra slack on the exit absorption radius. (meters)
pub const EXIT_SLACK: f32 = 0.3;

/// Simulated pedestrian.
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: u32,
    pub pos: Vec2,
    pub vel: Vec2,
    /// Body radius in [0.22, 0.28] m
    pub radius: f32,
    /// Preferred walking speed (m/s); scaled up once on evacuation
    pub speed: f32,
    pub state: AgentState,
    pub target_attractor: Option<usize>,
    pub target_exit: Option<usize>,
    pub path: Vec<Vec2>,
    pub path_index: usize,
    pub spawn_time: f32,
    pub exit_time: Option<f32>,
    /// Service end when `state == AtAttractor`
    pub at_until: f32,
    pub stuck_time: f32,
}

impl Agent {
    pub fn new(id: u32, pos: Vec2, radius: f32, speed: f32, spawn_time: f32) -> Self {
        Agent {
            id,
            pos,
            vel: Vec2::ZERO,
            radius,
            speed,
            state: AgentState::SeekingExit,
            target_attractor: None,
            target_exit: None,
            path: Vec::new(),
            path_index: 0,
            spawn_time,
            exit_time: None,
            at_until: 0.0,
            stuck_time: 0.0,
        }
    }

    pub fn active(&self) -> bool {
        self.state != AgentState::Exited
    }

    pub fn current_waypoint(&self) -> Option<Vec2> {
        self.path.get(self.path_index).copied()
    }

    pub fn set_path(&mut self, path: Vec<Vec2>) {
        self.path = path;
        self.path_index = 0;
    }

    /// Velocity the agent is steering toward: full desired speed along the
    /// current waypoint, throttled by local smoke.
    pub fn desired_velocity(&self, smoke: f32) -> Vec2 {
        let Some(waypoint) = self.current_waypoint() else {
            return Vec2::ZERO;
        };
        let direction = (waypoint - self.pos).normalize_or_zero();
        direction * self.speed * smoke_factor(smoke)
    }
}

/// Speed multiplier under local smoke intensity `s`; bounded to
/// [0.35, 1.0] so agents keep crawling through dense smoke.
pub fn smoke_factor(s: f32) -> f32 {
    if s > 0.15 {
        (1.0 - s * 0.65).max(0.35)
    } else {
        1.0
    }
}

/// Exponential repulsion away from every wall within [`WALL_RANGE`].
pub fn wall_repulsion(pos: Vec2, radius: f32, walls: &[WallConfig]) -> Vec2 {
    let mut force = Vec2::ZERO;
    for wall in walls {
        let closest = util::closest_point_on_rect(pos, wall.min, wall.max());
        let delta = pos - closest;
        let dist = delta.length();
        if dist <= f32::EPSILON || dist >= WALL_RANGE {
            continue;
        }
        force += WALL_STRENGTH * ((radius - dist) / WALL_FALLOFF).exp() * (delta / dist);
    }
    force
}

/// Strong short-range repulsion away from burning cells in a
/// ±[`FIRE_WINDOW`] cell neighborhood.
pub fn fire_repulsion(pos: Vec2, fire: &FireGrid) -> Vec2 {
    if fire.burning_count == 0 {
        return Vec2::ZERO;
    }

    let r_0 = pos.y.floor() as i32;
    let c_0 = pos.x.floor() as i32;
    let mut force = Vec2::ZERO;

    for r in r_0 - FIRE_WINDOW..=r_0 + FIRE_WINDOW {
        for c in c_0 - FIRE_WINDOW..=c_0 + FIRE_WINDOW {
            if !fire.is_burning(r, c) {
                continue;
            }
            let center = glam::vec2(c as f32 + 0.5, r as f32 + 0.5);
            let delta = pos - center;
            let dist = delta.length();
            if dist <= f32::EPSILON {
                continue;
            }
            force += FIRE_STRENGTH * (-dist / FIRE_FALLOFF).exp() * (delta / dist);
        }
    }
    force
}

/// Push a penetrating body out of wall rectangles along the shortest
/// axis, zeroing any velocity component still pointing into the wall.
pub fn resolve_wall_collisions(pos: &mut Vec2, vel: &mut Vec2, radius: f32, walls: &[WallConfig]) {
    for wall in walls {
        let min = wall.min;
        let max = wall.max();

        let closest = util::closest_point_on_rect(*pos, min, max);
        if pos.distance_squared(closest) >= radius * radius {
            continue;
        }

        let push_left = pos.x - (min.x - radius);
        let push_right = (max.x + radius) - pos.x;
        let push_down = pos.y - (min.y - radius);
        let push_up = (max.y + radius) - pos.y;
        let shortest = push_left.min(push_right).min(push_down).min(push_up);

        if shortest == push_left {
            pos.x = min.x - radius;
            vel.x = vel.x.min(0.0);
        } else if shortest == push_right {
            pos.x = max.x + radius;
            vel.x = vel.x.max(0.0);
        } else if shortest == push_down {
            pos.y = min.y - radius;
            vel.y = vel.y.min(0.0);
        } else {
            pos.y = max.y + radius;
            vel.y = vel.y.max(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_float_eq::*;
    use glam::{vec2, Vec2};

    use crate::scenario::WallConfig;

    use super::*;

    fn wall() -> Vec<WallConfig> {
        vec![WallConfig {
            id: "w".into(),
            min: vec2(2.0, 2.0),
            size: vec2(2.0, 1.0),
        }]
    }

    #[test]
    fn test_smoke_factor_bounds() {
        assert_eq!(smoke_factor(0.0), 1.0);
        assert_eq!(smoke_factor(0.15), 1.0);
        assert_float_absolute_eq!(smoke_factor(0.2), 0.87, 1e-6);
        assert_float_absolute_eq!(smoke_factor(1.0), 0.35, 1e-6);
        // never below the floor, never above the desired speed
        for i in 0..=100 {
            let f = smoke_factor(i as f32 / 100.0);
            assert!((0.35..=1.0).contains(&f));
        }
    }

    #[test]
    fn test_desired_velocity_follows_waypoint() {
        let mut agent = Agent::new(0, vec2(1.0, 1.0), 0.25, 1.2, 0.0);
        assert_eq!(agent.desired_velocity(0.0), Vec2::ZERO);

        agent.set_path(vec![vec2(5.0, 1.0)]);
        let v = agent.desired_velocity(0.0);
        assert_float_absolute_eq!(v.x, 1.2, 1e-6);
        assert_float_absolute_eq!(v.y, 0.0, 1e-6);

        let slowed = agent.desired_velocity(1.0);
        assert_float_absolute_eq!(slowed.x, 1.2 * 0.35, 1e-6);
    }

    #[test]
    fn test_wall_repulsion_points_away() {
        let force = wall_repulsion(vec2(1.5, 2.5), 0.25, &wall());
        assert!(force.x < 0.0);
        assert_float_absolute_eq!(force.y, 0.0, 1e-6);

        // out of range
        assert_eq!(wall_repulsion(vec2(0.4, 2.5), 0.25, &wall()), Vec2::ZERO);
    }

    #[test]
    fn test_pushout_shortest_axis() {
        let walls = wall();

        // overlapping the left face
        let mut pos = vec2(1.9, 2.5);
        let mut vel = vec2(1.0, 0.5);
        resolve_wall_collisions(&mut pos, &mut vel, 0.25, &walls);
        assert_float_absolute_eq!(pos.x, 1.75, 1e-6);
        assert_eq!(pos.y, 2.5);
        assert_eq!(vel.x, 0.0);
        assert_eq!(vel.y, 0.5);

        // overlapping the top face
        let mut pos = vec2(3.0, 1.85);
        let mut vel = vec2(0.0, 2.0);
        resolve_wall_collisions(&mut pos, &mut vel, 0.25, &walls);
        assert_eq!(pos.x, 3.0);
        assert_float_absolute_eq!(pos.y, 1.75, 1e-6);
        assert_eq!(vel.y, 0.0);

        // clear of the wall: untouched
        let mut pos = vec2(0.5, 0.5);
        let mut vel = vec2(1.0, 1.0);
        resolve_wall_collisions(&mut pos, &mut vel, 0.25, &walls);
        assert_eq!(pos, vec2(0.5, 0.5));
        assert_eq!(vel, vec2(1.0, 1.0));
    }
}
