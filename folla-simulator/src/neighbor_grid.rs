use glam::Vec2;
use ndarray::Array2;
use thin_vec::ThinVec;

use crate::util::Index;

/// Uniform spatial hash over agent positions. Cleared and rebuilt every
/// tick; bucket capacity is kept across rebuilds.
pub struct NeighborGrid {
    data: Array2<ThinVec<u32>>,
    unit: f32,
    shape: (usize, usize),
}

impl NeighborGrid {
    pub fn new(size: Vec2, unit: f32) -> Self {
        let unit = unit.max(f32::EPSILON);
        let shape = (size / unit).ceil();
        let shape = ((shape.y as usize).max(1), (shape.x as usize).max(1));
        let data = Array2::from_elem(shape, ThinVec::new());

        NeighborGrid { data, unit, shape }
    }

    pub fn clear(&mut self) {
        for bucket in self.data.iter_mut() {
            bucket.clear();
        }
    }

    pub fn insert(&mut self, id: u32, pos: Vec2) {
        let ix = (pos / self.unit).as_ivec2();
        let ix = Index::new(ix.x, ix.y);
        if let Some(bucket) = self.data.get_mut(ix) {
            if !bucket.has_capacity() {
                bucket.reserve(16);
            }
            bucket.push(id);
        }
    }

    /// Append every id within a `ceil(radius / unit)` halo of `pos` onto
    /// `out`. The caller filters by exact distance.
    pub fn query(&self, pos: Vec2, radius: f32, out: &mut Vec<u32>) {
        let halo = (radius / self.unit).ceil() as i32;
        let center = (pos / self.unit).as_ivec2();

        for y in center.y - halo..=center.y + halo {
            for x in center.x - halo..=center.x + halo {
                if let Some(bucket) = self.data.get(Index::new(x, y)) {
                    out.extend_from_slice(bucket);
                }
            }
        }
    }
}
