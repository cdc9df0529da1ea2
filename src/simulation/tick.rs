/// Simulation clock and tick timing metrics
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::simulation::commands::{TIME_SCALE_MAX, TIME_SCALE_MIN};

/// Scaled simulation time. Wall deltas are multiplied by the time scale
/// before they reach the scheduler, so every cadence sees skewed time.
#[derive(Debug, Clone, Copy)]
pub struct SimClock {
    pub sim_time: f64,
    time_scale: f32,
}

impl Default for SimClock {
    fn default() -> Self {
        Self {
            sim_time: 0.0,
            time_scale: 1.0,
        }
    }
}

impl SimClock {
    /// Advance by a wall-clock delta; returns the scaled delta applied
    pub fn advance(&mut self, wall_dt: Duration) -> f64 {
        let scaled = wall_dt.as_secs_f64() * self.time_scale as f64;
        self.sim_time += scaled;
        scaled
    }

    pub fn set_time_scale(&mut self, multiplier: f32) {
        self.time_scale = multiplier.clamp(TIME_SCALE_MIN, TIME_SCALE_MAX);
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }
}

/// Rolling tick duration statistics
#[derive(Debug)]
pub struct TickMetrics {
    durations: VecDeque<Duration>,
    max_samples: usize,
    current_start: Option<Instant>,
}

impl Default for TickMetrics {
    fn default() -> Self {
        Self {
            durations: VecDeque::with_capacity(64),
            max_samples: 64,
            current_start: None,
        }
    }
}

impl TickMetrics {
    pub fn start_tick(&mut self) {
        self.current_start = Some(Instant::now());
    }

    pub fn end_tick(&mut self) {
        if let Some(start) = self.current_start.take() {
            self.durations.push_back(start.elapsed());
            while self.durations.len() > self.max_samples {
                self.durations.pop_front();
            }
        }
    }

    pub fn average_duration(&self) -> Duration {
        if self.durations.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.durations.iter().sum();
        total / self.durations.len() as u32
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.durations.iter().max().copied()
    }

    pub fn last_duration(&self) -> Option<Duration> {
        self.durations.back().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_scales_deltas() {
        let mut clock = SimClock::default();
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.sim_time, 2.0);

        clock.set_time_scale(3.0);
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.sim_time, 8.0);
    }

    #[test]
    fn test_time_scale_clamped() {
        let mut clock = SimClock::default();
        clock.set_time_scale(50.0);
        assert_eq!(clock.time_scale(), TIME_SCALE_MAX);
        clock.set_time_scale(0.0);
        assert_eq!(clock.time_scale(), TIME_SCALE_MIN);
    }

    #[test]
    fn test_metrics_record_durations() {
        let mut metrics = TickMetrics::default();
        metrics.start_tick();
        std::thread::sleep(Duration::from_millis(1));
        metrics.end_tick();

        assert!(metrics.last_duration().unwrap() >= Duration::from_millis(1));
        assert!(metrics.average_duration() > Duration::ZERO);
        assert!(metrics.max_duration().is_some());
    }
}
