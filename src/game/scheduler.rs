//! Fixed-interval tick driver
//!
//! One dedicated thread runs the simulation step, then sleeps for whatever
//! is left of the interval. A step that overruns is followed immediately by
//! the next one; missed time is never caught up. The sleep doubles as the
//! stop signal wait, so stopping never interrupts a step in progress.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use tracing::{info, warn};

use super::performance::PerformanceMonitor;

/// Time left to sleep after a step that took `elapsed`
#[inline]
pub fn sleep_budget(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

pub fn interval_for(tick_rate: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(tick_rate.max(1)))
}

pub struct TickScheduler {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TickScheduler {
    /// Spawn the tick thread; `step` receives the wall-clock seconds since
    /// the previous step began
    pub fn start<F>(tick_rate: u32, step: F) -> std::io::Result<Self>
    where
        F: FnMut(f32) + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("tick".to_string())
            .spawn(move || run_loop(tick_rate, step, stop_rx))?;
        info!("Tick scheduler started at {} Hz", tick_rate);
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Let the current step finish, then join the thread
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Tick thread panicked");
            }
            info!("Tick scheduler stopped");
        }
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop<F>(tick_rate: u32, mut step: F, stop_rx: crossbeam_channel::Receiver<()>)
where
    F: FnMut(f32),
{
    let interval = interval_for(tick_rate);
    let mut monitor = PerformanceMonitor::new(tick_rate);
    let mut last = Instant::now()
        .checked_sub(interval)
        .unwrap_or_else(Instant::now);

    loop {
        let started = Instant::now();
        let delta = started.duration_since(last).as_secs_f32();
        last = started;

        step(delta);

        let elapsed = started.elapsed();
        if monitor.record(elapsed) {
            warn!(
                "Tick overran: {:.2}ms of {:.2}ms budget",
                elapsed.as_secs_f64() * 1000.0,
                interval.as_secs_f64() * 1000.0
            );
        }
        if monitor.report_due() {
            info!("Tick stats: {}", monitor.summary());
        }

        match stop_rx.recv_timeout(sleep_budget(interval, elapsed)) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
