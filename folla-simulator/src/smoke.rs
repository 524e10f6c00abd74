use ndarray::Array2;

/// Inflow rate from each neighbor, per second.
pub const DIFFUSION: f32 = 0.06;
/// Exponential decay rate, per second.
pub const DECAY: f32 = 0.018;

const CARDINALS: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Smoke intensity layer in [0, 1], aligned with the fire grid. Burning
/// cells are pinned at 1; everything else diffuses and decays. The next
/// buffer is allocated once and swapped each step.
pub struct SmokeGrid {
    pub intensity: Array2<f32>,
    next: Array2<f32>,
    pub has_smoke: bool,
}

impl SmokeGrid {
    pub fn new(shape: (usize, usize)) -> Self {
        SmokeGrid {
            intensity: Array2::zeros(shape),
            next: Array2::zeros(shape),
            has_smoke: false,
        }
    }

    pub fn clear(&mut self) {
        self.intensity.fill(0.0);
        self.next.fill(0.0);
        self.has_smoke = false;
    }

    /// Zero outside the grid.
    pub fn at(&self, r: i32, c: i32) -> f32 {
        if r < 0 || c < 0 {
            return 0.0;
        }
        *self.intensity.get((r as usize, c as usize)).unwrap_or(&0.0)
    }

    /// Force a cell to full intensity (used on ignition so snapshots never
    /// show a burning cell without smoke).
    pub fn pin(&mut self, r: usize, c: usize) {
        if let Some(v) = self.intensity.get_mut((r, c)) {
            *v = 1.0;
            self.has_smoke = true;
        }
    }

    pub fn step(&mut self, dt: f32, burning: &Array2<bool>) {
        let decay = 1.0 - DECAY * dt;
        let (rows, cols) = self.intensity.dim();
        let mut any = false;

        for r in 0..rows {
            for c in 0..cols {
                let value = if burning[(r, c)] {
                    1.0
                } else {
                    let mut inflow = 0.0;
                    for (dr, dc) in CARDINALS {
                        inflow += self.at(r as i32 + dr, c as i32 + dc);
                    }
                    (self.intensity[(r, c)] + inflow * DIFFUSION * dt).clamp(0.0, 1.0) * decay
                };

                if value > 0.01 {
                    any = true;
                }
                self.next[(r, c)] = value;
            }
        }

        std::mem::swap(&mut self.intensity, &mut self.next);
        self.has_smoke = any;
    }
}

#[cfg(test)]
mod tests {
    use assert_float_eq::*;
    use ndarray::Array2;

    use super::{SmokeGrid, DECAY, DIFFUSION};

    #[test]
    fn test_burning_cells_pin_at_one() {
        let mut burning = Array2::from_elem((5, 5), false);
        burning[(2, 2)] = true;

        let mut smoke = SmokeGrid::new((5, 5));
        smoke.step(0.05, &burning);

        assert_eq!(smoke.at(2, 2), 1.0);
        assert!(smoke.has_smoke);
    }

    #[test]
    fn test_neighbors_receive_inflow_and_decay() {
        let mut burning = Array2::from_elem((5, 5), false);
        burning[(2, 2)] = true;

        let mut smoke = SmokeGrid::new((5, 5));
        let dt = 0.1;
        smoke.step(dt, &burning);
        smoke.step(dt, &burning);

        // after the first step only (2,2) is smoky, so its neighbor gets
        // one unit of inflow on the second step
        let expected = (1.0 * DIFFUSION * dt) * (1.0 - DECAY * dt);
        assert_float_absolute_eq!(smoke.at(2, 3), expected, 1e-6);
        assert_float_absolute_eq!(smoke.at(1, 2), expected, 1e-6);
        // diagonals see nothing yet
        assert_eq!(smoke.at(1, 1), 0.0);
    }

    #[test]
    fn test_smoke_lingers_after_extinguish() {
        let mut burning = Array2::from_elem((3, 3), false);
        burning[(1, 1)] = true;

        let mut smoke = SmokeGrid::new((3, 3));
        smoke.step(0.05, &burning);

        burning[(1, 1)] = false;
        smoke.step(0.05, &burning);
        let after_one = smoke.at(1, 1);
        assert!(after_one < 1.0 && after_one > 0.99);
        assert!(smoke.has_smoke);
    }

    #[test]
    fn test_isolated_cell_decays_to_nothing() {
        // no neighbors to feed back, so only the decay term acts
        let burning = Array2::from_elem((1, 1), false);
        let mut smoke = SmokeGrid::new((1, 1));
        smoke.pin(0, 0);

        for _ in 0..6000 {
            smoke.step(0.05, &burning);
        }
        assert!(smoke.at(0, 0) < 0.01);
        assert!(!smoke.has_smoke);
    }

    #[test]
    fn test_intensity_stays_clamped() {
        let mut burning = Array2::from_elem((3, 3), false);
        burning[(0, 0)] = true;
        burning[(0, 2)] = true;
        burning[(2, 0)] = true;
        burning[(2, 2)] = true;

        let mut smoke = SmokeGrid::new((3, 3));
        for _ in 0..500 {
            smoke.step(0.05, &burning);
        }
        for &v in smoke.intensity.iter() {
            assert!((0.0..=1.0).contains(&v), "out of range: {v}");
        }
    }
}
