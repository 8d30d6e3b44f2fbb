use crate::error::Result;
use crate::model::TICKS_PER_SECOND;
use crate::scheduler::{Scheduler, TaskId, TimerKind, TimerSlot};
use std::time::Duration;

pub trait PlaybackReporter {
    fn report_start(&mut self, track_id: &str) -> Result<()>;
    fn report_progress(&mut self, track_id: &str, position_ticks: i64, is_paused: bool)
    -> Result<()>;
    fn report_stopped(&mut self, track_id: &str, position_ticks: i64) -> Result<()>;
}

pub fn seconds_to_ticks(seconds: f64) -> i64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * TICKS_PER_SECOND).round() as i64
}

#[derive(Debug, Default)]
pub struct TracingReporter;

impl PlaybackReporter for TracingReporter {
    fn report_start(&mut self, track_id: &str) -> Result<()> {
        tracing::debug!(track_id, "playback started");
        Ok(())
    }

    fn report_progress(
        &mut self,
        track_id: &str,
        position_ticks: i64,
        is_paused: bool,
    ) -> Result<()> {
        tracing::debug!(track_id, position_ticks, is_paused, "playback progress");
        Ok(())
    }

    fn report_stopped(&mut self, track_id: &str, position_ticks: i64) -> Result<()> {
        tracing::debug!(track_id, position_ticks, "playback stopped");
        Ok(())
    }
}

#[derive(Debug)]
pub struct ProgressReporter {
    timer: TimerSlot,
    interval: Duration,
}

impl ProgressReporter {
    pub fn new(interval: Duration) -> Self {
        Self {
            timer: TimerSlot::new(),
            interval,
        }
    }

    pub fn start(&mut self, scheduler: &mut Scheduler) {
        self.timer
            .arm(scheduler, TimerKind::ProgressReport, self.interval);
    }

    pub fn stop(&mut self, scheduler: &mut Scheduler) {
        self.timer.cancel(scheduler);
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_armed()
    }

    pub fn owns(&self, id: TaskId) -> bool {
        self.timer.owns(id)
    }
}

pub(crate) fn send<F>(what: &str, track_id: &str, report: F)
where
    F: FnOnce() -> Result<()>,
{
    if let Err(err) = report() {
        tracing::warn!(track_id, "failed to report {what}: {err}");
    }
}
