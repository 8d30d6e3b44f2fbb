#![allow(dead_code)]

use encore::audio::{DeviceEvent, PlaybackDevice, StartToken};
use encore::engine::PlaybackEngine;
use encore::error::{EngineError, Result};
use encore::model::{EngineSettings, Track};
use encore::persistence::{KeyValueStore, MemoryStore};
use encore::progress::PlaybackReporter;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

pub const NOW: i64 = 1_700_000_000_000;
pub const HOUR_MS: i64 = 60 * 60 * 1_000;

pub fn track(id: &str) -> Track {
    Track {
        id: id.to_string(),
        title: id.to_uppercase(),
        artist: String::from("artist"),
        album: String::from("album"),
        duration_ms: 180_000,
        stream_url: format!("{id}.mp3"),
        image: None,
        is_favorite: false,
    }
}

pub fn tracks(ids: &[&str]) -> Vec<Track> {
    ids.iter().map(|id| track(id)).collect()
}

pub fn ids(engine: &PlaybackEngine) -> Vec<String> {
    engine.queue().into_iter().map(|track| track.id).collect()
}

#[derive(Debug)]
pub struct FakeState {
    pub loaded: Option<String>,
    pub time: f64,
    pub duration: Option<f64>,
    pub volume: f32,
    pub playing: bool,
    pub auto_start: bool,
    pub fail_load: bool,
    pub commands: Vec<String>,
    pub events: VecDeque<DeviceEvent>,
    pub tokens: Vec<StartToken>,
}

// Scriptable device. Clones share state, so a test keeps one handle while
// the engine owns another.
#[derive(Debug, Clone)]
pub struct FakeDevice(Rc<RefCell<FakeState>>);

impl FakeDevice {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(FakeState {
            loaded: None,
            time: 0.0,
            duration: None,
            volume: 1.0,
            playing: false,
            auto_start: true,
            fail_load: false,
            commands: Vec::new(),
            events: VecDeque::new(),
            tokens: Vec::new(),
        })))
    }

    pub fn with_duration(self, seconds: f64) -> Self {
        self.0.borrow_mut().duration = Some(seconds);
        self
    }

    pub fn manual_start(self) -> Self {
        self.0.borrow_mut().auto_start = false;
        self
    }

    pub fn state(&self) -> std::cell::RefMut<'_, FakeState> {
        self.0.borrow_mut()
    }

    pub fn set_time(&self, seconds: f64) {
        self.0.borrow_mut().time = seconds;
    }

    pub fn push(&self, event: DeviceEvent) {
        self.0.borrow_mut().events.push_back(event);
    }

    pub fn commands(&self) -> Vec<String> {
        self.0.borrow().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.0.borrow_mut().commands.clear();
    }

    pub fn volume_now(&self) -> f32 {
        self.0.borrow().volume
    }

    pub fn last_token(&self) -> Option<StartToken> {
        self.0.borrow().tokens.last().copied()
    }
}

impl PlaybackDevice for FakeDevice {
    fn load(&mut self, stream_url: &str) -> Result<()> {
        let mut state = self.0.borrow_mut();
        state.commands.push(format!("load {stream_url}"));
        if state.fail_load {
            return Err(EngineError::Device(String::from("load refused")));
        }
        state.loaded = Some(stream_url.to_string());
        state.time = 0.0;
        state.playing = false;
        Ok(())
    }

    fn play(&mut self, token: StartToken) -> Result<()> {
        let mut state = self.0.borrow_mut();
        state.commands.push(String::from("play"));
        state.tokens.push(token);
        if state.auto_start {
            state.playing = true;
            state.events.push_back(DeviceEvent::Started(token));
        }
        Ok(())
    }

    fn pause(&mut self) {
        let mut state = self.0.borrow_mut();
        state.commands.push(String::from("pause"));
        state.playing = false;
    }

    fn resume(&mut self) -> Result<()> {
        let mut state = self.0.borrow_mut();
        state.commands.push(String::from("resume"));
        state.playing = true;
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.0.borrow().time
    }

    fn set_current_time(&mut self, seconds: f64) -> Result<()> {
        let mut state = self.0.borrow_mut();
        state.commands.push(format!("seek {seconds}"));
        state.time = seconds;
        Ok(())
    }

    fn duration(&self) -> Option<f64> {
        self.0.borrow().duration
    }

    fn volume(&self) -> f32 {
        self.0.borrow().volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.0.borrow_mut().volume = volume;
    }

    fn poll_event(&mut self) -> Option<DeviceEvent> {
        self.0.borrow_mut().events.pop_front()
    }

    fn output_name(&self) -> Option<String> {
        Some(String::from("fake"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Start(String),
    Progress {
        track_id: String,
        ticks: i64,
        paused: bool,
    },
    Stopped {
        track_id: String,
        ticks: i64,
    },
}

#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    log: Rc<RefCell<Vec<Report>>>,
    failing: bool,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn reports(&self) -> Vec<Report> {
        self.log.borrow().clone()
    }

    pub fn clear(&self) {
        self.log.borrow_mut().clear();
    }

    pub fn progress_count(&self) -> usize {
        self.log
            .borrow()
            .iter()
            .filter(|report| matches!(report, Report::Progress { .. }))
            .count()
    }

    fn record(&self, report: Report) -> Result<()> {
        self.log.borrow_mut().push(report);
        if self.failing {
            return Err(EngineError::Report(String::from("backend unavailable")));
        }
        Ok(())
    }
}

impl PlaybackReporter for RecordingReporter {
    fn report_start(&mut self, track_id: &str) -> Result<()> {
        self.record(Report::Start(track_id.to_string()))
    }

    fn report_progress(&mut self, track_id: &str, position_ticks: i64, is_paused: bool) -> Result<()> {
        self.record(Report::Progress {
            track_id: track_id.to_string(),
            ticks: position_ticks,
            paused: is_paused,
        })
    }

    fn report_stopped(&mut self, track_id: &str, position_ticks: i64) -> Result<()> {
        self.record(Report::Stopped {
            track_id: track_id.to_string(),
            ticks: position_ticks,
        })
    }
}

// Store handle that outlives the engine owning its clone.
#[derive(Debug, Clone, Default)]
pub struct SharedStore(Rc<RefCell<MemoryStore>>);

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.0.borrow().get(key).ok().flatten()
    }
}

impl KeyValueStore for SharedStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.0.borrow().get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.0.borrow_mut().set(key, value)
    }
}

pub struct Harness {
    pub engine: PlaybackEngine,
    pub device: FakeDevice,
    pub reporter: RecordingReporter,
    pub store: SharedStore,
}

pub fn harness(device: FakeDevice, settings: EngineSettings) -> Harness {
    harness_with(device, RecordingReporter::new(), SharedStore::new(), settings)
}

pub fn harness_with(
    device: FakeDevice,
    reporter: RecordingReporter,
    store: SharedStore,
    settings: EngineSettings,
) -> Harness {
    let engine = PlaybackEngine::new(
        Box::new(device.clone()),
        Box::new(reporter.clone()),
        Box::new(store.clone()),
        settings,
        "alice",
    )
    .with_rng_seed(42)
    .with_clock(|| NOW);
    Harness {
        engine,
        device,
        reporter,
        store,
    }
}

// Loads `ids`, plays `index` and lets the device confirm the start.
pub fn playing(ids: &[&str], index: usize) -> Harness {
    let mut h = harness(FakeDevice::new().with_duration(180.0), EngineSettings::default());
    h.engine.load_queue(tracks(ids), false);
    assert!(h.engine.play_index(index));
    h.engine.pump();
    h
}
