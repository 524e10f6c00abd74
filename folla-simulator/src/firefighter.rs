use glam::Vec2;

use crate::{
    agent::{self, WAYPOINT_RADIUS},
    field::Field,
    fire::FireGrid,
    navigation,
    scenario::WallConfig,
};

/// Crew size deployed per incident.
pub const CREW_SIZE: usize = 3;
/// Delay between first ignition and deployment. (seconds)
pub const RESPONSE_DELAY: f32 = 30.0;
/// Movement speed and steering time constant.
pub const MOVE_SPEED: f32 = 1.6;
pub const STEER_TAU: f32 = 0.3;
/// Time to knock out the targeted cell. (seconds)
pub const EXTINGUISH_TIME: f32 = 1.5;
pub const RADIUS: f32 = 0.3;
/// Burning neighbors under this accumulator level are put out together
/// with the target cell.
pub const YOUNG_ACCUM: f32 = 0.6;
/// Velocity damping while holding position.
pub const HOLD_DAMPING: f32 = 0.8;

const NEIGHBORS_8: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Responder sub-agent. Plans to the nearest burning cell, holds there
/// for [`EXTINGUISH_TIME`], then knocks out the cell and its young
/// neighborhood. Ignores social forces; wall pushout still applies.
#[derive(Debug, Clone)]
pub struct Firefighter {
    pub id: u32,
    pub pos: Vec2,
    pub vel: Vec2,
    pub target: Option<(usize, usize)>,
    pub path: Vec<Vec2>,
    pub path_index: usize,
    pub extinguish_timer: f32,
}

impl Firefighter {
    pub fn new(id: u32, pos: Vec2) -> Self {
        Firefighter {
            id,
            pos,
            vel: Vec2::ZERO,
            target: None,
            path: Vec::new(),
            path_index: 0,
            extinguish_timer: 0.0,
        }
    }

    pub fn extinguishing(&self) -> bool {
        self.extinguish_timer > 0.0
    }

    pub fn update(&mut self, dt: f32, fire: &mut FireGrid, field: &Field, walls: &[WallConfig]) {
        if self.extinguish_timer > 0.0 {
            self.vel *= HOLD_DAMPING;
            self.pos += self.vel * dt;
            self.extinguish_timer -= dt;
            if self.extinguish_timer <= 0.0 {
                self.extinguish_timer = 0.0;
                if let Some((r, c)) = self.target.take() {
                    douse(r, c, fire);
                }
            }
            self.settle(field, walls);
            return;
        }

        let target_burning = self
            .target
            .is_some_and(|(r, c)| fire.is_burning(r as i32, c as i32));
        if !target_burning {
            let Some((r, c)) = fire.nearest_burning(self.pos) else {
                self.target = None;
                self.vel *= HOLD_DAMPING;
                self.pos += self.vel * dt;
                self.settle(field, walls);
                return;
            };
            self.target = Some((r, c));
            self.path = navigation::plan(field, self.pos, field.cell_center(r, c));
            self.path_index = 0;
        }

        match self.path.get(self.path_index).copied() {
            Some(waypoint) => {
                let desired = (waypoint - self.pos).normalize_or_zero() * MOVE_SPEED;
                self.vel += (desired - self.vel) / STEER_TAU * dt;
                self.pos += self.vel * dt;
                if self.pos.distance(waypoint) < WAYPOINT_RADIUS {
                    self.path_index += 1;
                    if self.path_index >= self.path.len() {
                        self.extinguish_timer = EXTINGUISH_TIME;
                    }
                }
            }
            None => self.extinguish_timer = EXTINGUISH_TIME,
        }

        self.settle(field, walls);
    }

    fn settle(&mut self, field: &Field, walls: &[WallConfig]) {
        self.pos.x = self.pos.x.clamp(RADIUS, field.size.x - RADIUS);
        self.pos.y = self.pos.y.clamp(RADIUS, field.size.y - RADIUS);
        agent::resolve_wall_collisions(&mut self.pos, &mut self.vel, RADIUS, walls);
    }
}

/// Knock out the target cell, take every young burning neighbor with it,
/// and cool the rest of the 8-neighborhood back to zero accumulation.
fn douse(r: usize, c: usize, fire: &mut FireGrid) {
    fire.extinguish(r, c);

    for (dr, dc) in NEIGHBORS_8 {
        let nr = r as i32 + dr;
        let nc = c as i32 + dc;
        if nr < 0 || nc < 0 {
            continue;
        }
        if fire.is_burning(nr, nc) && fire.accum_at(nr as usize, nc as usize) < YOUNG_ACCUM {
            fire.extinguish(nr as usize, nc as usize);
        }
        fire.reset_accum(nr, nc);
    }
}

#[cfg(test)]
mod tests {
    use glam::vec2;

    use crate::{
        field::Field,
        fire::FireGrid,
        scenario::VenueLayout,
    };

    use super::{Firefighter, EXTINGUISH_TIME};

    fn open_field() -> Field {
        Field::from_layout(&VenueLayout {
            size: vec2(20.0, 20.0),
            ..Default::default()
        })
    }

    #[test]
    fn test_walks_to_fire_and_extinguishes() {
        let field = open_field();
        let mut fire = FireGrid::new(field.shape);
        fire.ignite(10, 10, 0.0);
        fire.ignite(10, 11, 0.0);

        let mut ff = Firefighter::new(0, vec2(2.0, 10.0));
        let dt = 0.05;
        let mut extinguished_at = None;
        for step in 0..4000 {
            ff.update(dt, &mut fire, &field, &[]);
            if fire.burning_count == 0 {
                extinguished_at = Some(step as f32 * dt);
                break;
            }
        }

        let elapsed = extinguished_at.expect("fire should be out");
        // ~8.5 m of travel at 1.6 m/s plus the extinguish hold; the young
        // neighbor goes out with the target cell
        assert!(elapsed > EXTINGUISH_TIME);
        assert!(elapsed < 30.0, "took {elapsed}s");
        assert!(!ff.extinguishing());
    }

    #[test]
    fn test_idle_without_fire() {
        let field = open_field();
        let mut fire = FireGrid::new(field.shape);
        let mut ff = Firefighter::new(0, vec2(5.0, 5.0));

        for _ in 0..100 {
            ff.update(0.05, &mut fire, &field, &[]);
        }
        assert_eq!(ff.target, None);
        assert!(ff.pos.distance(vec2(5.0, 5.0)) < 0.01);
    }

    #[test]
    fn test_retargets_when_target_goes_out() {
        let field = open_field();
        let mut fire = FireGrid::new(field.shape);
        fire.ignite(10, 10, 0.0);
        fire.ignite(18, 18, 0.0);

        let mut ff = Firefighter::new(0, vec2(9.0, 9.0));
        ff.update(0.05, &mut fire, &field, &[]);
        assert_eq!(ff.target, Some((10, 10)));

        fire.extinguish(10, 10);
        ff.update(0.05, &mut fire, &field, &[]);
        assert_eq!(ff.target, Some((18, 18)));
    }
}
