use std::collections::VecDeque;

const NUM_PROGRESS_SAMPLES: usize = 5;
const PROGRESS_SAMPLE_TIME_DELTA: f64 = 1.0;

/// Estimates when an encode will finish from a sliding window of progress samples.
#[derive(Debug, Clone, Default)]
pub struct EtaEstimator {
    /// (progress in 0..=1, timestamp) pairs, oldest first.
    progress_samples: VecDeque<(f64, f64)>,
    start_time: Option<f64>,
    estimated_completion_time: Option<f64>,
}

impl EtaEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    /// Records `progress` (0..=1) at `current_time` seconds. Samples closer together than a second are dropped.
    pub fn update(&mut self, progress: f64, current_time: f64) {
        if let Some((_, sample_time)) = self.progress_samples.back() {
            if current_time - sample_time <= PROGRESS_SAMPLE_TIME_DELTA {
                return;
            }
        }

        let start_time = *self.start_time.get_or_insert(current_time);
        let oldest_sample = if self.progress_samples.len() >= NUM_PROGRESS_SAMPLES {
            self.progress_samples.pop_front()
        } else {
            self.progress_samples.front().copied()
        };
        self.progress_samples.push_back((progress, current_time));

        if let Some((old_progress, old_sample_time)) = oldest_sample {
            let estimate =
                (current_time - old_sample_time) / (progress - old_progress) + start_time;
            if estimate.is_finite() {
                self.estimated_completion_time = Some(estimate);
            }
        }
    }

    pub fn time_remaining(&self, current_time: f64) -> Option<f64> {
        self.estimated_completion_time
            .map(|completion| (completion - current_time).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_estimate_from_one_sample() {
        let mut eta = EtaEstimator::new();
        eta.update(0.0, 10.0);
        assert_eq!(eta.time_remaining(10.0), None);
        assert_eq!(eta.start_time(), Some(10.0));
    }

    #[test]
    fn linear_progress() {
        let mut eta = EtaEstimator::new();
        eta.update(0.0, 0.0);
        eta.update(0.25, 2.0);
        assert_eq!(eta.time_remaining(2.0), Some(6.0));
        assert_eq!(eta.time_remaining(20.0), Some(0.0));
    }

    #[test]
    fn close_samples_are_ignored() {
        let mut eta = EtaEstimator::new();
        eta.update(0.0, 0.0);
        eta.update(0.5, 0.5);
        assert_eq!(eta.time_remaining(0.5), None);
    }

    #[test]
    fn stalled_progress_keeps_previous_estimate() {
        let mut eta = EtaEstimator::new();
        eta.update(0.0, 0.0);
        eta.update(0.25, 2.0);
        eta.update(0.0, 4.0);
        assert_eq!(eta.time_remaining(2.0), Some(6.0));
    }

    #[test]
    fn reset_forgets_everything() {
        let mut eta = EtaEstimator::new();
        eta.update(0.0, 0.0);
        eta.update(0.5, 2.0);
        eta.reset();
        assert_eq!(eta.start_time(), None);
        assert_eq!(eta.time_remaining(2.0), None);
    }
}
