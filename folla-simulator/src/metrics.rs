use ndarray::Array2;
use serde::Serialize;

/// Running crowd-safety accumulators. None of these ever go backwards:
/// the peak is a running max and egress times are append-only.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Metrics {
    pub peak_density: f32,
    pub time_above_warning: f32,
    pub time_above_danger: f32,
    /// Spawn-to-exit durations, in arrival order
    pub egress_times: Vec<f32>,
    /// Queue lengths as of the last tick
    pub queue_lengths: Vec<usize>,
    /// Running per-attractor maxima
    pub max_queue_lengths: Vec<usize>,
}

impl Metrics {
    pub fn reset(&mut self, attractor_count: usize) {
        self.peak_density = 0.0;
        self.time_above_warning = 0.0;
        self.time_above_danger = 0.0;
        self.egress_times.clear();
        self.queue_lengths = vec![0; attractor_count];
        self.max_queue_lengths = vec![0; attractor_count];
    }

    pub fn observe_density(&mut self, density: &Array2<f32>, warning: f32, danger: f32, dt: f32) {
        let mut max = 0.0f32;
        for &cell in density.iter() {
            max = max.max(cell);
        }
        self.peak_density = self.peak_density.max(max);
        if max >= warning {
            self.time_above_warning += dt;
        }
        if max >= danger {
            self.time_above_danger += dt;
        }
    }

    pub fn observe_queues(&mut self, lengths: impl Iterator<Item = usize>) {
        for (at, len) in lengths.enumerate() {
            if let Some(current) = self.queue_lengths.get_mut(at) {
                *current = len;
            }
            if let Some(max) = self.max_queue_lengths.get_mut(at) {
                *max = (*max).max(len);
            }
        }
    }

    pub fn record_egress(&mut self, elapsed: f32) {
        self.egress_times.push(elapsed);
    }

    pub fn mean_egress(&self) -> f32 {
        if self.egress_times.is_empty() {
            return 0.0;
        }
        self.egress_times.iter().sum::<f32>() / self.egress_times.len() as f32
    }

    /// 95th percentile egress time in seconds, 0 when nobody has exited.
    pub fn p95_egress(&self) -> f32 {
        if self.egress_times.is_empty() {
            return 0.0;
        }
        let mut sorted = self.egress_times.clone();
        sorted.sort_by(f32::total_cmp);
        let at = ((0.95 * sorted.len() as f32).ceil() as usize).max(1) - 1;
        sorted[at]
    }
}

/// Derived metric summary exposed through frame snapshots and exports.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub peak_density: f32,
    pub time_above_warning: f32,
    pub time_above_danger: f32,
    pub spawned: usize,
    pub active: usize,
    pub exited: usize,
    pub mean_egress: f32,
    pub p95_egress: f32,
    pub queue_lengths: Vec<usize>,
    pub max_queue_lengths: Vec<usize>,
}

#[cfg(test)]
mod tests {
    use assert_float_eq::*;
    use ndarray::Array2;

    use super::Metrics;

    #[test]
    fn test_peak_density_never_decreases() {
        let mut metrics = Metrics::default();
        metrics.reset(0);

        let mut density = Array2::zeros((2, 2));
        density[(0, 0)] = 3.0;
        metrics.observe_density(&density, 4.0, 6.0, 0.05);
        assert_eq!(metrics.peak_density, 3.0);
        assert_eq!(metrics.time_above_warning, 0.0);

        density[(0, 0)] = 1.0;
        metrics.observe_density(&density, 4.0, 6.0, 0.05);
        assert_eq!(metrics.peak_density, 3.0);

        density[(1, 1)] = 7.0;
        metrics.observe_density(&density, 4.0, 6.0, 0.05);
        assert_eq!(metrics.peak_density, 7.0);
        assert_float_absolute_eq!(metrics.time_above_warning, 0.05, 1e-6);
        assert_float_absolute_eq!(metrics.time_above_danger, 0.05, 1e-6);
    }

    #[test]
    fn test_p95_index_formula() {
        let mut metrics = Metrics::default();
        metrics.reset(0);
        assert_eq!(metrics.p95_egress(), 0.0);

        metrics.record_egress(10.0);
        // n = 1: ceil(0.95) - 1 = 0
        assert_eq!(metrics.p95_egress(), 10.0);

        for t in 1..=19 {
            metrics.record_egress(t as f32);
        }
        // n = 20: ceil(19) - 1 = 18 -> 19th smallest of 1..=19,10
        assert_eq!(metrics.p95_egress(), 18.0);
    }

    #[test]
    fn test_queue_running_max() {
        let mut metrics = Metrics::default();
        metrics.reset(2);

        metrics.observe_queues([3, 1].into_iter());
        metrics.observe_queues([2, 4].into_iter());
        assert_eq!(metrics.queue_lengths, vec![2, 4]);
        assert_eq!(metrics.max_queue_lengths, vec![3, 4]);
    }
}
