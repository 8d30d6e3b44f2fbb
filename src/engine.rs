use crate::audio::{DeviceEvent, PlaybackDevice, StartToken};
use crate::crossfade::{CrossfadeScheduler, FADE_TICK, FadeStep};
use crate::model::{
    DropPosition, EngineSettings, EqualizerSettings, PlaybackSnapshot, RepeatMode, Track,
    TransportState,
};
use crate::persistence::{KeyValueStore, PersistenceManager};
use crate::progress::{self, PlaybackReporter, ProgressReporter, seconds_to_ticks};
use crate::queue::QueueStore;
use crate::recent::RecentlyPlayed;
use crate::reorder;
use crate::scheduler::{Scheduler, TaskId, TimerKind, TimerSlot};
use crate::shuffle::{self, ShuffleOutcome};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    NowPlayingChanged(Option<Track>),
    StateChanged(TransportState),
    QueueChanged,
    ShuffleChanged(bool),
    RepeatChanged(RepeatMode),
    VolumeChanged(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub track: Option<Track>,
    pub index: Option<usize>,
    pub state: TransportState,
    pub position: f64,
    pub duration: Option<f64>,
    pub volume: f32,
    pub is_shuffled: bool,
    pub repeat: RepeatMode,
    pub crossfading: bool,
}

pub struct PlaybackEngine {
    queue: QueueStore,
    device: Box<dyn PlaybackDevice>,
    reporter: Box<dyn PlaybackReporter>,
    store: Box<dyn KeyValueStore>,
    settings: EngineSettings,
    volume: f32,
    repeat: RepeatMode,
    state: TransportState,
    scheduler: Scheduler,
    crossfade: CrossfadeScheduler,
    crossfade_timer: TimerSlot,
    progress: ProgressReporter,
    persistence: PersistenceManager,
    recent: RecentlyPlayed,
    rng: SmallRng,
    pending_start: Option<StartToken>,
    last_token: u64,
    needs_stop_report: bool,
    clock: Box<dyn Fn() -> i64>,
    events: Vec<EngineEvent>,
}

impl PlaybackEngine {
    pub fn new(
        device: Box<dyn PlaybackDevice>,
        reporter: Box<dyn PlaybackReporter>,
        store: Box<dyn KeyValueStore>,
        settings: EngineSettings,
        user: &str,
    ) -> Self {
        let volume = settings.volume.clamp(0.0, 1.0);
        Self {
            queue: QueueStore::new(),
            device,
            reporter,
            store,
            volume,
            repeat: RepeatMode::Off,
            state: TransportState::Idle,
            scheduler: Scheduler::new(),
            crossfade: CrossfadeScheduler::new(settings.crossfade_seconds),
            crossfade_timer: TimerSlot::new(),
            progress: ProgressReporter::new(Duration::from_millis(settings.progress_interval_ms)),
            persistence: PersistenceManager::new(
                user,
                Duration::from_millis(settings.snapshot_interval_ms),
            ),
            recent: RecentlyPlayed::new(settings.recently_played_limit),
            rng: SmallRng::from_os_rng(),
            pending_start: None,
            last_token: 0,
            needs_stop_report: false,
            clock: Box::new(epoch_millis),
            events: Vec::new(),
            settings,
        }
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    pub fn with_clock(mut self, clock: impl Fn() -> i64 + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn queue(&self) -> Vec<Track> {
        self.queue.tracks()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.queue.current_index()
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.queue.current_track()
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat
    }

    pub fn is_shuffled(&self) -> bool {
        self.queue.is_shuffled()
    }

    pub fn is_crossfading(&self) -> bool {
        self.crossfade.is_active()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn user(&self) -> &str {
        self.persistence.user()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn recently_played(&self) -> Vec<String> {
        self.recent.list(self.store.as_ref(), self.persistence.user())
    }

    pub fn now_playing(&self) -> NowPlaying {
        let track = self.queue.current_track().cloned();
        let position = if track.is_some() {
            self.device.current_time()
        } else {
            0.0
        };
        NowPlaying {
            duration: self
                .device
                .duration()
                .or_else(|| track.as_ref().map(Track::duration_seconds)),
            track,
            index: self.queue.current_index(),
            state: self.state,
            position,
            volume: self.volume,
            is_shuffled: self.queue.is_shuffled(),
            repeat: self.repeat,
            crossfading: self.crossfade.is_active(),
        }
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn load_queue(&mut self, tracks: Vec<Track>, start_shuffled: bool) {
        self.halt();
        self.queue.load(tracks);
        if start_shuffled && !self.queue.is_empty() {
            shuffle::toggle(&mut self.queue, &mut self.rng);
        }
        tracing::debug!(len = self.queue.len(), start_shuffled, "queue loaded");
        self.set_state(TransportState::Idle);
        self.emit(EngineEvent::ShuffleChanged(self.queue.is_shuffled()));
        self.emit_now_playing();
        self.queue_changed();
    }

    pub fn add_to_queue(&mut self, track: Track) {
        self.queue.append(track);
        self.queue_changed();
    }

    pub fn insert_next(&mut self, track: Track) {
        self.queue.insert_after_current(track);
        self.queue_changed();
    }

    pub fn remove_from_queue(&mut self, index: usize) -> bool {
        if !self.queue.remove_at(index) {
            tracing::debug!(index, "remove rejected");
            return false;
        }
        self.queue_changed();
        true
    }

    pub fn clear_queue(&mut self) {
        self.queue.clear_except_current();
        self.queue_changed();
    }

    pub fn reorder_queue(&mut self, from: usize, to: usize, drop: DropPosition) -> bool {
        if !reorder::apply(&mut self.queue, from, to, drop) {
            tracing::debug!(from, to, ?drop, "reorder rejected");
            return false;
        }
        self.queue_changed();
        true
    }

    pub fn toggle_shuffle(&mut self) -> ShuffleOutcome {
        let outcome = shuffle::toggle(&mut self.queue, &mut self.rng);
        tracing::debug!(?outcome, "shuffle toggled");
        self.emit(EngineEvent::ShuffleChanged(self.queue.is_shuffled()));
        self.emit_now_playing();
        self.queue_changed();
        outcome
    }

    pub fn toggle_repeat(&mut self) -> RepeatMode {
        self.set_repeat(self.repeat.next());
        self.repeat
    }

    pub fn set_repeat(&mut self, repeat: RepeatMode) {
        if self.repeat == repeat {
            return;
        }
        self.repeat = repeat;
        // Repeat One never fades out of the current track.
        if repeat == RepeatMode::One {
            self.cancel_crossfade();
        }
        self.emit(EngineEvent::RepeatChanged(repeat));
        self.save_snapshot();
    }

    pub fn set_favorite(&mut self, track_id: &str, is_favorite: bool) -> usize {
        let changed = self.queue.set_favorite(track_id, is_favorite);
        if changed > 0 {
            if self.queue.current_track().is_some_and(|track| track.id == track_id) {
                self.emit_now_playing();
            }
            self.queue_changed();
        }
        changed
    }

    pub fn play_index(&mut self, index: usize) -> bool {
        if index >= self.queue.len() {
            tracing::debug!(index, len = self.queue.len(), "play index out of range");
            return false;
        }

        self.stop_active_track();
        self.cancel_timers();
        self.device.set_volume(self.volume);

        self.queue.set_current(index);
        let Some(track) = self.queue.current_track().cloned() else {
            return false;
        };
        tracing::debug!(index, track_id = %track.id, "playing");

        self.last_token += 1;
        let token = StartToken(self.last_token);
        self.pending_start = Some(token);
        self.needs_stop_report = true;

        self.set_state(TransportState::Playing);
        self.emit_now_playing();

        let requested = self
            .device
            .load(&track.stream_url)
            .and_then(|()| self.device.play(token));
        if let Err(err) = requested {
            self.start_failed(token, &err.to_string());
        }
        self.save_snapshot();
        true
    }

    pub fn toggle_play_pause(&mut self) {
        match self.state {
            TransportState::Playing => self.pause(),
            TransportState::Idle | TransportState::Paused => {
                if self.queue.current_index().is_none() {
                    if !self.queue.is_empty() {
                        self.play_index(0);
                    }
                    return;
                }
                self.resume();
            }
        }
    }

    pub fn pause(&mut self) {
        if self.state != TransportState::Playing {
            return;
        }
        self.device.pause();
        self.pending_start = None;
        self.cancel_crossfade();
        self.progress.stop(&mut self.scheduler);
        self.set_state(TransportState::Paused);
        self.report_progress(true);
        self.save_snapshot();
    }

    pub fn resume(&mut self) {
        if self.state == TransportState::Playing || self.queue.current_index().is_none() {
            return;
        }
        if let Err(err) = self.device.resume() {
            tracing::warn!("failed to resume playback: {err}");
            return;
        }
        self.needs_stop_report = true;
        self.set_state(TransportState::Playing);
        self.progress.start(&mut self.scheduler);
        self.persistence.start_periodic(&mut self.scheduler);
        self.report_progress(false);
    }

    pub fn next(&mut self) -> bool {
        let current = self.queue.current_index();

        if self.repeat == RepeatMode::One && current.is_some() {
            self.restart_current();
            return true;
        }

        let next = current.map_or(0, |current| current + 1);
        if next < self.queue.len() {
            return self.play_index(next);
        }
        if self.repeat == RepeatMode::All && !self.queue.is_empty() {
            return self.play_index(0);
        }
        false
    }

    pub fn prev(&mut self) -> bool {
        match self.queue.current_index() {
            Some(current) if current > 0 => self.play_index(current - 1),
            _ => false,
        }
    }

    pub fn seek(&mut self, seconds: f64) -> bool {
        let Some(track) = self.queue.current_track() else {
            return false;
        };
        let duration = self
            .device
            .duration()
            .unwrap_or_else(|| track.duration_seconds());
        let target = if duration > 0.0 {
            seconds.clamp(0.0, duration)
        } else {
            seconds.max(0.0)
        };
        if let Err(err) = self.device.set_current_time(target) {
            tracing::warn!("seek failed: {err}");
            return false;
        }
        true
    }

    pub fn set_volume(&mut self, volume: f32) {
        let volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            self.volume
        };
        self.volume = volume;
        if !self.crossfade.is_active() {
            self.device.set_volume(volume);
        }
        if let Err(err) = self.persistence.save_volume(self.store.as_mut(), volume) {
            tracing::warn!("failed to save volume: {err}");
        }
        self.emit(EngineEvent::VolumeChanged(volume));
    }

    pub fn set_crossfade_seconds(&mut self, seconds: f64) {
        self.crossfade.set_seconds(seconds);
        self.settings.crossfade_seconds = self.crossfade.seconds();
        if self.crossfade.seconds() <= 0.0 {
            self.cancel_crossfade();
        }
    }

    pub fn apply_equalizer_settings(&mut self, settings: &EqualizerSettings) {
        if let Err(err) = self.device.apply_equalizer(settings) {
            tracing::warn!("failed to apply equalizer settings: {err}");
        }
    }

    pub fn reset_equalizer(&mut self) {
        self.device.reset_equalizer();
    }

    pub fn restore_session(&mut self) -> bool {
        let now = (self.clock)();
        let Some(plan) = self.persistence.restorable(self.store.as_ref(), now) else {
            return false;
        };

        let snapshot = plan.snapshot;
        let original = snapshot.is_shuffled.then_some(snapshot.original_queue);
        self.queue
            .restore(snapshot.queue, original, snapshot.current_index);
        self.repeat = snapshot.repeat_mode;
        self.needs_stop_report = false;
        self.pending_start = None;

        let Some(track) = self.queue.current_track().cloned() else {
            self.set_state(TransportState::Idle);
            self.emit_restored();
            return true;
        };

        if let Err(err) = self.device.load(&track.stream_url) {
            tracing::warn!(track_id = %track.id, "failed to load restored track: {err}");
        } else {
            self.device.set_volume(self.volume);
            if let Some(position) = plan.resume_at
                && let Err(err) = self.device.set_current_time(position)
            {
                tracing::warn!(track_id = %track.id, "failed to seek restored track: {err}");
            }
        }
        tracing::info!(
            user = %self.persistence.user(),
            track_id = %track.id,
            resume_at = ?plan.resume_at,
            "restored playback session"
        );
        self.set_state(TransportState::Paused);
        self.emit_restored();
        true
    }

    pub fn reload_user_data(&mut self, user: &str) -> bool {
        self.halt();
        self.queue.load(Vec::new());
        self.set_state(TransportState::Idle);

        self.persistence.set_user(user);
        self.volume = self
            .persistence
            .load_volume(self.store.as_ref())
            .unwrap_or(self.settings.volume.clamp(0.0, 1.0));
        self.device.set_volume(self.volume);
        self.emit(EngineEvent::VolumeChanged(self.volume));

        if self.restore_session() {
            return true;
        }
        self.emit_now_playing();
        self.emit(EngineEvent::QueueChanged);
        false
    }

    pub fn advance(&mut self, elapsed: Duration) {
        let until = self
            .scheduler
            .now_ms()
            .saturating_add(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
        while let Some((id, kind)) = self.scheduler.pop_due(until) {
            self.fire(id, kind);
        }
        self.scheduler.settle(until);
    }

    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.device.poll_event() {
            self.handle_device_event(event);
            handled += 1;
        }
        handled
    }

    pub fn handle_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Started(token) => self.start_succeeded(token),
            DeviceEvent::StartFailed { token, reason } => self.start_failed(token, &reason),
            DeviceEvent::TimeUpdate => self.on_time_update(),
            DeviceEvent::Ended => self.on_ended(),
            DeviceEvent::Playing | DeviceEvent::Paused | DeviceEvent::Seeked => {}
        }
    }

    fn fire(&mut self, id: TaskId, kind: TimerKind) {
        match kind {
            TimerKind::CrossfadeTick if self.crossfade_timer.owns(id) => self.crossfade_tick(),
            TimerKind::ProgressReport if self.progress.owns(id) => self.report_progress(false),
            TimerKind::SnapshotSave if self.persistence.owns(id) => self.save_snapshot(),
            _ => {
                tracing::debug!(?kind, "dropping orphaned timer");
                self.scheduler.cancel(id);
            }
        }
    }

    fn start_succeeded(&mut self, token: StartToken) {
        if self.pending_start != Some(token) {
            tracing::debug!(?token, "ignoring stale start");
            return;
        }
        self.pending_start = None;
        let Some(track_id) = self.queue.current_track().map(|track| track.id.clone()) else {
            return;
        };

        let reporter = &mut self.reporter;
        progress::send("start", &track_id, || reporter.report_start(&track_id));
        self.progress.start(&mut self.scheduler);
        self.persistence.start_periodic(&mut self.scheduler);
        self.set_state(TransportState::Playing);
    }

    fn start_failed(&mut self, token: StartToken, reason: &str) {
        if self.pending_start != Some(token) {
            tracing::debug!(?token, "ignoring stale start failure");
            return;
        }
        self.pending_start = None;
        self.needs_stop_report = false;
        tracing::warn!(?token, "playback failed to start: {reason}");
        self.set_state(TransportState::Paused);
    }

    fn on_time_update(&mut self) {
        if self.crossfade.is_active() || self.state != TransportState::Playing {
            return;
        }
        let Some(track) = self.queue.current_track() else {
            return;
        };

        let duration = self
            .device
            .duration()
            .unwrap_or_else(|| track.duration_seconds());
        let has_next = self.queue.has_next() || self.repeat == RepeatMode::All;
        let Some(remaining) = self.crossfade.should_begin(
            self.device.current_time(),
            duration,
            has_next,
            self.repeat,
        ) else {
            return;
        };

        let ramp = self.crossfade.begin(self.device.volume(), remaining);
        tracing::debug!(remaining, steps = ramp.steps, "crossfade started");
        self.crossfade_timer
            .arm(&mut self.scheduler, TimerKind::CrossfadeTick, FADE_TICK);
    }

    fn crossfade_tick(&mut self) {
        match self.crossfade.step() {
            FadeStep::Continue(volume) => self.device.set_volume(volume),
            FadeStep::Finished => {
                self.device.set_volume(0.0);
                self.crossfade_timer.cancel(&mut self.scheduler);
                tracing::debug!("crossfade finished");
                self.next();
                self.device.set_volume(self.volume);
            }
        }
    }

    fn on_ended(&mut self) {
        if self.crossfade.is_active() {
            return;
        }
        let Some(track) = self.queue.current_track().cloned() else {
            return;
        };

        let duration = self
            .device
            .duration()
            .unwrap_or_else(|| track.duration_seconds());
        self.finish_track(&track, duration);
        self.progress.stop(&mut self.scheduler);

        if !self.next() {
            tracing::debug!("reached end of queue");
            self.cancel_timers();
            self.set_state(TransportState::Paused);
            self.save_snapshot();
        }
    }

    fn restart_current(&mut self) {
        if let Err(err) = self.device.set_current_time(0.0) {
            tracing::warn!("failed to restart track: {err}");
        }
        if self.state == TransportState::Playing {
            if let Err(err) = self.device.resume() {
                tracing::warn!("failed to restart track: {err}");
            }
            self.needs_stop_report = true;
            self.progress.start(&mut self.scheduler);
        }
    }

    fn stop_active_track(&mut self) {
        let Some(track) = self.queue.current_track().cloned() else {
            return;
        };
        let position = self.device.current_time();
        self.finish_track(&track, position);
    }

    // Once per playthrough.
    fn finish_track(&mut self, track: &Track, position: f64) {
        if !self.needs_stop_report {
            return;
        }
        self.needs_stop_report = false;

        let ticks = seconds_to_ticks(position);
        let reporter = &mut self.reporter;
        progress::send("stop", &track.id, || reporter.report_stopped(&track.id, ticks));
        if let Err(err) =
            self.recent
                .record(self.store.as_mut(), self.persistence.user(), &track.id)
        {
            tracing::warn!(track_id = %track.id, "failed to record recently played: {err}");
        }
    }

    fn halt(&mut self) {
        self.stop_active_track();
        self.cancel_timers();
        if self.state == TransportState::Playing {
            self.device.pause();
        }
        self.pending_start = None;
    }

    fn cancel_crossfade(&mut self) {
        self.crossfade_timer.cancel(&mut self.scheduler);
        if self.crossfade.cancel() {
            self.device.set_volume(self.volume);
        }
    }

    fn cancel_timers(&mut self) {
        self.cancel_crossfade();
        self.progress.stop(&mut self.scheduler);
        self.persistence.stop_periodic(&mut self.scheduler);
    }

    fn report_progress(&mut self, is_paused: bool) {
        let Some(track_id) = self.queue.current_track().map(|track| track.id.clone()) else {
            return;
        };
        let ticks = seconds_to_ticks(self.device.current_time());
        let reporter = &mut self.reporter;
        progress::send("progress", &track_id, || {
            reporter.report_progress(&track_id, ticks, is_paused)
        });
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let queue = self.queue.tracks();
        let current_time = if self.queue.current_index().is_some() {
            self.device.current_time()
        } else {
            0.0
        };
        PlaybackSnapshot {
            original_queue: self.queue.original_tracks().unwrap_or_else(|| queue.clone()),
            queue,
            current_index: self.queue.current_index(),
            current_time,
            is_shuffled: self.queue.is_shuffled(),
            repeat_mode: self.repeat,
            timestamp: (self.clock)(),
        }
    }

    fn save_snapshot(&mut self) {
        let snapshot = self.snapshot();
        if let Err(err) = self.persistence.save(self.store.as_mut(), &snapshot) {
            tracing::warn!(user = %self.persistence.user(), "failed to save playback state: {err}");
        }
    }

    fn queue_changed(&mut self) {
        self.emit(EngineEvent::QueueChanged);
        self.save_snapshot();
    }

    fn set_state(&mut self, state: TransportState) {
        if self.state != state {
            self.state = state;
            self.emit(EngineEvent::StateChanged(state));
        }
    }

    fn emit_now_playing(&mut self) {
        let track = self.queue.current_track().cloned();
        self.emit(EngineEvent::NowPlayingChanged(track));
    }

    fn emit_restored(&mut self) {
        self.emit(EngineEvent::ShuffleChanged(self.queue.is_shuffled()));
        self.emit(EngineEvent::RepeatChanged(self.repeat));
        self.emit_now_playing();
        self.emit(EngineEvent::QueueChanged);
    }

    fn emit(&mut self, event: EngineEvent) {
        self.events.push(event);
    }
}

fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
