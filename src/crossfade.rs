use crate::model::{MAX_CROSSFADE_SECONDS, RepeatMode};
use std::time::Duration;

pub const FADE_TICK: Duration = Duration::from_millis(100);
const TICKS_PER_SECOND: f64 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct FadeRamp {
    pub steps: u32,
    pub taken: u32,
    pub decrement: f32,
    pub volume: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FadeStep {
    Continue(f32),
    Finished,
}

#[derive(Debug, Default)]
pub struct CrossfadeScheduler {
    seconds: f64,
    ramp: Option<FadeRamp>,
}

impl CrossfadeScheduler {
    pub fn new(seconds: f64) -> Self {
        let mut scheduler = Self::default();
        scheduler.set_seconds(seconds);
        scheduler
    }

    pub fn seconds(&self) -> f64 {
        self.seconds
    }

    pub fn set_seconds(&mut self, seconds: f64) {
        self.seconds = if seconds.is_finite() {
            seconds.clamp(0.0, MAX_CROSSFADE_SECONDS)
        } else {
            0.0
        };
    }

    pub fn is_active(&self) -> bool {
        self.ramp.is_some()
    }

    pub fn should_begin(
        &self,
        current_time: f64,
        duration: f64,
        has_next: bool,
        repeat: RepeatMode,
    ) -> Option<f64> {
        if self.ramp.is_some() || self.seconds <= 0.0 || !has_next || repeat == RepeatMode::One {
            return None;
        }
        if !duration.is_finite() || duration <= 0.0 {
            return None;
        }

        let remaining = duration - current_time;
        (remaining > 0.0 && remaining <= self.seconds).then_some(remaining)
    }

    pub fn begin(&mut self, start_volume: f32, remaining: f64) -> &FadeRamp {
        let steps = ((remaining * TICKS_PER_SECOND).ceil() as u32).max(1);
        let start_volume = start_volume.max(0.0);
        self.ramp.insert(FadeRamp {
            steps,
            taken: 0,
            decrement: start_volume / steps as f32,
            volume: start_volume,
        })
    }

    pub fn step(&mut self) -> FadeStep {
        let Some(ramp) = self.ramp.as_mut() else {
            return FadeStep::Finished;
        };

        ramp.taken += 1;
        ramp.volume = (ramp.volume - ramp.decrement).max(0.0);
        if ramp.volume <= 0.0 || ramp.taken >= ramp.steps {
            self.ramp = None;
            return FadeStep::Finished;
        }
        FadeStep::Continue(ramp.volume)
    }

    pub fn cancel(&mut self) -> bool {
        self.ramp.take().is_some()
    }
}
