//! Tick budget tracking
//!
//! Keeps a rolling window of step durations against the tick interval so
//! the scheduler can report overruns and periodic statistics.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::constants::tick::STATS_LOG_INTERVAL_SECS;

/// Samples kept in the rolling window
const WINDOW: usize = 256;
/// Samples needed before the status leaves `Healthy`
const MIN_SAMPLES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    /// Average step below 70% of the interval
    Healthy,
    /// Average step between 70% and 100%
    Strained,
    /// Average step exceeds the interval; the effective tick rate is dropping
    Overloaded,
}

#[derive(Debug)]
pub struct PerformanceMonitor {
    samples: VecDeque<Duration>,
    budget: Duration,
    status: BudgetStatus,
    overruns: u64,
    total_ticks: u64,
    last_report: Instant,
}

impl PerformanceMonitor {
    pub fn new(tick_rate: u32) -> Self {
        Self {
            samples: VecDeque::with_capacity(WINDOW),
            budget: Duration::from_secs_f64(1.0 / f64::from(tick_rate.max(1))),
            status: BudgetStatus::Healthy,
            overruns: 0,
            total_ticks: 0,
            last_report: Instant::now(),
        }
    }

    /// Record one step; returns true if it overran the interval
    pub fn record(&mut self, step: Duration) -> bool {
        if self.samples.len() == WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(step);
        self.total_ticks += 1;

        let overran = step > self.budget;
        if overran {
            self.overruns += 1;
        }
        self.update_status();
        overran
    }

    fn update_status(&mut self) {
        if self.samples.len() < MIN_SAMPLES {
            return;
        }
        let usage = self.budget_usage();
        self.status = if usage < 0.7 {
            BudgetStatus::Healthy
        } else if usage <= 1.0 {
            BudgetStatus::Strained
        } else {
            BudgetStatus::Overloaded
        };
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn status(&self) -> BudgetStatus {
        self.status
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        self.samples.iter().sum::<Duration>() / self.samples.len() as u32
    }

    /// Percentile over the window, `q` in `[0, 1]`
    pub fn percentile(&self, q: f64) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted: Vec<Duration> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let idx = ((sorted.len() as f64 * q) as usize).min(sorted.len() - 1);
        sorted[idx]
    }

    pub fn max(&self) -> Duration {
        self.samples.iter().copied().max().unwrap_or(Duration::ZERO)
    }

    /// Average step as a fraction of the interval
    pub fn budget_usage(&self) -> f64 {
        self.average().as_secs_f64() / self.budget.as_secs_f64()
    }

    /// True once per stats interval
    pub fn report_due(&mut self) -> bool {
        if self.last_report.elapsed() < Duration::from_secs(STATS_LOG_INTERVAL_SECS) {
            return false;
        }
        self.last_report = Instant::now();
        true
    }

    pub fn summary(&self) -> String {
        format!(
            "{:?}: avg {:.2}ms, p95 {:.2}ms, max {:.2}ms, {:.0}% of budget, {} overruns in {} ticks",
            self.status,
            self.average().as_secs_f64() * 1000.0,
            self.percentile(0.95).as_secs_f64() * 1000.0,
            self.max().as_secs_f64() * 1000.0,
            self.budget_usage() * 100.0,
            self.overruns,
            self.total_ticks,
        )
    }
}
