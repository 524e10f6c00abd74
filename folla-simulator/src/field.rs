use glam::{vec2, Vec2};
use ndarray::Array2;

use crate::scenario::VenueLayout;

/// Passability raster over the venue at 1 m resolution. Pure function of
/// the layout; rebuilt only when the layout changes.
pub struct Field {
    /// World dimensions in meters
    pub size: Vec2,
    /// Grid shape (rows, cols) = (ceil height, ceil width)
    pub shape: (usize, usize),
    /// False wherever a wall rectangle covers the cell
    pub passable: Array2<bool>,
}

impl Default for Field {
    fn default() -> Self {
        Field {
            size: Vec2::ZERO,
            shape: (0, 0),
            passable: Array2::default((0, 0)),
        }
    }
}

impl Field {
    pub fn from_layout(layout: &VenueLayout) -> Self {
        let rows = layout.size.y.ceil().max(1.0) as usize;
        let cols = layout.size.x.ceil().max(1.0) as usize;
        let mut passable = Array2::from_elem((rows, cols), true);

        for wall in &layout.walls {
            let max = wall.max();
            let r_0 = wall.min.y.floor() as i32;
            let c_0 = wall.min.x.floor() as i32;
            let r_1 = max.y.floor() as i32;
            let c_1 = max.x.floor() as i32;

            for r in r_0.max(0)..=r_1.min(rows as i32 - 1) {
                for c in c_0.max(0)..=c_1.min(cols as i32 - 1) {
                    passable[(r as usize, c as usize)] = false;
                }
            }
        }

        Field {
            size: layout.size,
            shape: (rows, cols),
            passable,
        }
    }

    /// Cell containing a world position, clamped into the grid.
    pub fn cell_of(&self, pos: Vec2) -> (usize, usize) {
        let r = (pos.y.floor() as i32).clamp(0, self.shape.0 as i32 - 1) as usize;
        let c = (pos.x.floor() as i32).clamp(0, self.shape.1 as i32 - 1) as usize;
        (r, c)
    }

    pub fn cell_center(&self, r: usize, c: usize) -> Vec2 {
        vec2(c as f32 + 0.5, r as f32 + 0.5)
    }

    /// False outside the grid.
    pub fn is_passable(&self, r: i32, c: i32) -> bool {
        if r < 0 || c < 0 || r >= self.shape.0 as i32 || c >= self.shape.1 as i32 {
            return false;
        }
        self.passable[(r as usize, c as usize)]
    }
}

#[cfg(test)]
mod tests {
    use glam::vec2;

    use crate::scenario::{VenueLayout, WallConfig};

    use super::Field;

    fn layout_with_wall(min: (f32, f32), size: (f32, f32)) -> VenueLayout {
        VenueLayout {
            size: vec2(10.0, 8.0),
            walls: vec![WallConfig {
                id: "w".into(),
                min: vec2(min.0, min.1),
                size: vec2(size.0, size.1),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_shape_rounds_up() {
        let layout = VenueLayout {
            size: vec2(10.5, 7.2),
            ..Default::default()
        };
        let field = Field::from_layout(&layout);
        assert_eq!(field.shape, (8, 11));
        assert!(field.passable.iter().all(|&p| p));
    }

    #[test]
    fn test_wall_covers_inclusive_cell_range() {
        let field = Field::from_layout(&layout_with_wall((2.5, 3.5), (1.0, 0.2)));

        // min corner floors to (3, 2), max corner (3.5, 3.7) floors to (3, 3)
        assert!(!field.is_passable(3, 2));
        assert!(!field.is_passable(3, 3));
        assert!(field.is_passable(3, 1));
        assert!(field.is_passable(3, 4));
        assert!(field.is_passable(2, 2));
        assert!(field.is_passable(4, 3));
    }

    #[test]
    fn test_build_is_pure() {
        let layout = layout_with_wall((1.0, 1.0), (3.0, 2.0));
        let a = Field::from_layout(&layout);
        let b = Field::from_layout(&layout);
        assert_eq!(a.passable, b.passable);
    }

    #[test]
    fn test_out_of_bounds_is_impassable() {
        let field = Field::from_layout(&layout_with_wall((0.0, 0.0), (1.0, 1.0)));
        assert!(!field.is_passable(-1, 0));
        assert!(!field.is_passable(0, -1));
        assert!(!field.is_passable(8, 0));
        assert!(!field.is_passable(0, 10));
    }

    #[test]
    fn test_cell_of_clamps() {
        let field = Field::from_layout(&layout_with_wall((0.0, 0.0), (1.0, 1.0)));
        assert_eq!(field.cell_of(vec2(-2.0, 3.2)), (3, 0));
        assert_eq!(field.cell_of(vec2(99.0, 99.0)), (7, 9));
    }
}
