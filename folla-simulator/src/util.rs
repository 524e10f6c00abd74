use glam::Vec2;
use num_traits::PrimInt;

/// Index struct for [`ndarray::Array2`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Index {
    pub y: i32,
    pub x: i32,
}

impl Index {
    pub fn new<T: PrimInt>(x: T, y: T) -> Self {
        Index {
            x: x.to_i32().unwrap(),
            y: y.to_i32().unwrap(),
        }
    }
}

unsafe impl ndarray::NdIndex<ndarray::Ix2> for Index {
    fn index_checked(&self, dim: &ndarray::Ix2, strides: &ndarray::Ix2) -> Option<isize> {
        if self.x.is_negative() || self.y.is_negative() {
            None
        } else {
            (self.y as usize, self.x as usize).index_checked(dim, strides)
        }
    }

    fn index_unchecked(&self, strides: &ndarray::Ix2) -> isize {
        (self.y as usize, self.x as usize).index_unchecked(strides)
    }
}

/// Cumulative distribution function of N(mean, sd), via the
/// Abramowitz-Stegun erf approximation (7.1.26).
pub fn normal_cdf(x: f32, mean: f32, sd: f32) -> f32 {
    if sd <= 0.0 {
        return if x >= mean { 1.0 } else { 0.0 };
    }
    let z = (x - mean) / (sd * std::f32::consts::SQRT_2);
    0.5 * (1.0 + erf(z))
}

fn erf(x: f32) -> f32 {
    const P: f32 = 0.327_591_1;
    const A1: f32 = 0.254_829_592;
    const A2: f32 = -0.284_496_736;
    const A3: f32 = 1.421_413_741;
    const A4: f32 = -1.453_152_027;
    const A5: f32 = 1.061_405_429;

    let sign = x.signum();
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

/// Closest point on an axis-aligned rectangle to `point`.
pub fn closest_point_on_rect(point: Vec2, min: Vec2, max: Vec2) -> Vec2 {
    point.clamp(min, max)
}
