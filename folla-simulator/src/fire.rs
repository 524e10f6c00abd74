use glam::{vec2, Vec2};
use ndarray::Array2;

/// Ignition accumulation per second of exposure to a burning neighbor.
pub const SPREAD_RATE: f32 = 0.18;

const CARDINALS: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Cellular fire automaton at 1 m resolution. Only passable cells burn;
/// spread observes the burning map as it stood at the start of the call.
pub struct FireGrid {
    pub burning: Array2<bool>,
    accum: Array2<f32>,
    pub burning_count: usize,
    /// Sim time of the first ignition
    pub started_at: Option<f32>,
    front: Vec<(usize, usize)>,
}

impl FireGrid {
    pub fn new(shape: (usize, usize)) -> Self {
        FireGrid {
            burning: Array2::from_elem(shape, false),
            accum: Array2::zeros(shape),
            burning_count: 0,
            started_at: None,
            front: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.burning.fill(false);
        self.accum.fill(0.0);
        self.burning_count = 0;
        self.started_at = None;
        self.front.clear();
    }

    pub fn is_burning(&self, r: i32, c: i32) -> bool {
        if r < 0 || c < 0 {
            return false;
        }
        *self.burning.get((r as usize, c as usize)).unwrap_or(&false)
    }

    pub fn accum_at(&self, r: usize, c: usize) -> f32 {
        *self.accum.get((r, c)).unwrap_or(&0.0)
    }

    /// Set a cell alight. Returns false if it was already burning.
    pub fn ignite(&mut self, r: usize, c: usize, now: f32) -> bool {
        if self.burning.get((r, c)).copied().unwrap_or(true) {
            return false;
        }
        self.burning[(r, c)] = true;
        self.accum[(r, c)] = 0.0;
        self.burning_count += 1;
        self.started_at.get_or_insert(now);
        true
    }

    pub fn extinguish(&mut self, r: usize, c: usize) {
        if self.burning.get((r, c)).copied().unwrap_or(false) {
            self.burning[(r, c)] = false;
            self.accum[(r, c)] = 0.0;
            self.burning_count -= 1;
        }
    }

    pub fn reset_accum(&mut self, r: i32, c: i32) {
        if r < 0 || c < 0 {
            return;
        }
        if let Some(a) = self.accum.get_mut((r as usize, c as usize)) {
            *a = 0.0;
        }
    }

    /// Propagate into passable 4-neighbors of every burning cell. A
    /// neighbor ignites once its accumulator reaches 1.
    pub fn spread(&mut self, dt: f32, passable: &Array2<bool>) {
        if self.burning_count == 0 {
            return;
        }

        let mut front = std::mem::take(&mut self.front);
        front.clear();
        for ((r, c), &burning) in self.burning.indexed_iter() {
            if burning {
                front.push((r, c));
            }
        }

        for &(r, c) in &front {
            for (dr, dc) in CARDINALS {
                let nr = r as i32 + dr;
                let nc = c as i32 + dc;
                if nr < 0 || nc < 0 {
                    continue;
                }
                let next = (nr as usize, nc as usize);
                if !passable.get(next).copied().unwrap_or(false) || self.burning[next] {
                    continue;
                }

                let accum = &mut self.accum[next];
                *accum += dt * SPREAD_RATE;
                if *accum >= 1.0 {
                    *accum = 0.0;
                    self.burning[next] = true;
                    self.burning_count += 1;
                }
            }
        }

        self.front = front;
    }

    /// Burning cell whose center is closest to `from` (squared distance).
    pub fn nearest_burning(&self, from: Vec2) -> Option<(usize, usize)> {
        let mut best = None;
        let mut best_dist = f32::MAX;
        for ((r, c), &burning) in self.burning.indexed_iter() {
            if !burning {
                continue;
            }
            let center = vec2(c as f32 + 0.5, r as f32 + 0.5);
            let dist = from.distance_squared(center);
            if dist < best_dist {
                best_dist = dist;
                best = Some((r, c));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use assert_float_eq::*;
    use glam::vec2;
    use ndarray::Array2;

    use super::{FireGrid, SPREAD_RATE};

    fn open_passable() -> Array2<bool> {
        Array2::from_elem((10, 10), true)
    }

    #[test]
    fn test_ignite_and_extinguish_track_count() {
        let mut fire = FireGrid::new((10, 10));
        assert!(fire.ignite(4, 4, 12.5));
        assert!(!fire.ignite(4, 4, 13.0));
        assert_eq!(fire.burning_count, 1);
        assert_eq!(fire.started_at, Some(12.5));

        fire.extinguish(4, 4);
        assert_eq!(fire.burning_count, 0);
        // start time survives extinguishing
        assert_eq!(fire.started_at, Some(12.5));
    }

    #[test]
    fn test_spread_ignites_after_accumulation() {
        let passable = open_passable();
        let mut fire = FireGrid::new((10, 10));
        fire.ignite(5, 5, 0.0);

        let dt = 0.05;
        let ticks_to_ignite = (1.0 / (SPREAD_RATE * dt)).ceil() as usize;
        for _ in 0..ticks_to_ignite - 1 {
            fire.spread(dt, &passable);
        }
        assert_eq!(fire.burning_count, 1);
        assert_float_absolute_eq!(
            fire.accum_at(5, 6),
            (ticks_to_ignite - 1) as f32 * dt * SPREAD_RATE,
            1e-3
        );

        fire.spread(dt, &passable);
        // all four cardinal neighbors cross the threshold together
        assert_eq!(fire.burning_count, 5);
        assert!(fire.is_burning(4, 5));
        assert!(fire.is_burning(6, 5));
        assert!(fire.is_burning(5, 4));
        assert!(fire.is_burning(5, 6));
        // diagonals never accumulate
        assert!(!fire.is_burning(4, 4));
        assert_eq!(fire.accum_at(4, 4), 0.0);
    }

    #[test]
    fn test_spread_skips_impassable_cells() {
        let mut passable = open_passable();
        passable[(5, 6)] = false;

        let mut fire = FireGrid::new((10, 10));
        fire.ignite(5, 5, 0.0);
        for _ in 0..200 {
            fire.spread(0.05, &passable);
        }

        assert!(!fire.is_burning(5, 6));
        assert!(fire.is_burning(5, 4));
    }

    #[test]
    fn test_new_ignitions_do_not_spread_in_the_same_call() {
        let passable = open_passable();
        let mut fire = FireGrid::new((10, 10));
        fire.ignite(5, 5, 0.0);

        // one giant step ignites the cardinals, but cells two steps out
        // have seen no burning neighbor yet
        fire.spread(6.0, &passable);
        assert!(fire.is_burning(5, 6));
        assert!(!fire.is_burning(5, 7));
        assert_eq!(fire.accum_at(5, 7), 0.0);
    }

    #[test]
    fn test_nearest_burning() {
        let mut fire = FireGrid::new((10, 10));
        assert_eq!(fire.nearest_burning(vec2(0.0, 0.0)), None);

        fire.ignite(2, 2, 0.0);
        fire.ignite(8, 8, 0.0);
        assert_eq!(fire.nearest_burning(vec2(1.0, 1.0)), Some((2, 2)));
        assert_eq!(fire.nearest_burning(vec2(9.0, 9.0)), Some((8, 8)));
    }
}
