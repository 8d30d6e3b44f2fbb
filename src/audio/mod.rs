use crate::error::{EngineError, Result};
use crate::model::EqualizerSettings;
use anyhow::Context;
use rodio::Source;
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
use std::collections::VecDeque;
#[cfg(unix)]
use std::ffi::CString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const MAX_VOLUME: f32 = 1.0;
const TIME_UPDATE_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StartToken(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Started(StartToken),
    StartFailed { token: StartToken, reason: String },
    Playing,
    Paused,
    TimeUpdate,
    Ended,
    Seeked,
}

pub trait PlaybackDevice {
    fn load(&mut self, stream_url: &str) -> Result<()>;
    // Answered later by Started or StartFailed carrying the same token.
    fn play(&mut self, token: StartToken) -> Result<()>;
    fn pause(&mut self);
    fn resume(&mut self) -> Result<()>;
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, seconds: f64) -> Result<()>;
    fn duration(&self) -> Option<f64>;
    fn volume(&self) -> f32;
    fn set_volume(&mut self, volume: f32);
    fn poll_event(&mut self) -> Option<DeviceEvent>;
    fn output_name(&self) -> Option<String>;

    fn apply_equalizer(&mut self, _settings: &EqualizerSettings) -> Result<()> {
        Ok(())
    }

    fn reset_equalizer(&mut self) {}
}

pub fn local_path(stream_url: &str) -> Option<PathBuf> {
    if stream_url.starts_with("http://") || stream_url.starts_with("https://") {
        return None;
    }
    let raw = stream_url.strip_prefix("file://").unwrap_or(stream_url);
    (!raw.is_empty()).then(|| PathBuf::from(raw))
}

pub struct RodioDevice {
    stream: OutputStream,
    sink: Sink,
    loaded: Option<PathBuf>,
    track_duration: Option<Duration>,
    volume: f32,
    events: VecDeque<DeviceEvent>,
    last_time_update: Option<Instant>,
    ended_signaled: bool,
}

impl RodioDevice {
    pub fn new() -> anyhow::Result<Self> {
        let (stream, sink) = Self::open_output_stream()?;
        Ok(Self {
            stream,
            sink,
            loaded: None,
            track_duration: None,
            volume: MAX_VOLUME,
            events: VecDeque::new(),
            last_time_update: None,
            ended_signaled: false,
        })
    }

    fn open_output_stream() -> anyhow::Result<(OutputStream, Sink)> {
        let mut stream = with_silenced_stderr(|| {
            match OutputStreamBuilder::from_default_device()
                .context("failed to open default system output stream")
                .and_then(|builder| {
                    builder
                        .with_error_callback(|_| {})
                        .open_stream_or_fallback()
                        .context("failed to start default output stream")
                }) {
                Ok(stream) => Ok(stream),
                Err(default_err) => {
                    let host = rodio::cpal::default_host();
                    let mut started: Option<OutputStream> = None;
                    for device in host.output_devices().ok().into_iter().flatten() {
                        let name = device.name().unwrap_or_default();
                        let opened = OutputStreamBuilder::from_device(device)
                            .context("failed to open fallback output device")
                            .and_then(|builder| {
                                builder
                                    .with_error_callback(|_| {})
                                    .open_stream_or_fallback()
                                    .context("failed to start fallback output stream")
                            });
                        match opened {
                            Ok(stream) => {
                                tracing::info!(device = %name, "using fallback output device");
                                started = Some(stream);
                                break;
                            }
                            Err(err) => tracing::debug!(device = %name, "output device unusable: {err:#}"),
                        }
                    }
                    started.with_context(|| {
                        format!(
                            "unable to start any audio output stream after default failed: {default_err:#}"
                        )
                    })
                }
            }
        })?;
        stream.log_on_drop(false);
        let sink = Sink::connect_new(stream.mixer());
        Ok((stream, sink))
    }

    fn open_source(path: &Path) -> anyhow::Result<impl Source + Send + 'static> {
        let file =
            File::open(path).with_context(|| format!("failed to open track {}", path.display()))?;
        Decoder::try_from(file).with_context(|| format!("failed to decode {}", path.display()))
    }

    fn is_finished(&self) -> bool {
        self.loaded.is_some() && !self.sink.is_paused() && self.sink.empty()
    }
}

impl PlaybackDevice for RodioDevice {
    fn load(&mut self, stream_url: &str) -> Result<()> {
        let path = local_path(stream_url)
            .ok_or_else(|| EngineError::Device(format!("unsupported stream url {stream_url}")))?;

        self.sink.stop();
        self.sink = Sink::connect_new(self.stream.mixer());
        self.sink.pause();
        self.loaded = None;
        self.ended_signaled = false;

        let source = Self::open_source(&path).map_err(|err| EngineError::Device(format!("{err:#}")))?;
        self.track_duration = source.total_duration();
        self.sink.append(source);
        self.sink.set_volume(self.volume);
        self.loaded = Some(path);
        Ok(())
    }

    fn play(&mut self, token: StartToken) -> Result<()> {
        if self.loaded.is_none() {
            self.events.push_back(DeviceEvent::StartFailed {
                token,
                reason: String::from("no stream loaded"),
            });
            return Ok(());
        }
        self.sink.play();
        self.last_time_update = Some(Instant::now());
        self.events.push_back(DeviceEvent::Started(token));
        self.events.push_back(DeviceEvent::Playing);
        Ok(())
    }

    fn pause(&mut self) {
        self.sink.pause();
        self.events.push_back(DeviceEvent::Paused);
    }

    fn resume(&mut self) -> Result<()> {
        let Some(path) = self.loaded.clone() else {
            return Err(EngineError::Device(String::from("no stream loaded")));
        };
        if self.sink.empty() {
            let source = Self::open_source(&path).map_err(|err| EngineError::Device(format!("{err:#}")))?;
            self.sink.append(source);
            self.ended_signaled = false;
        }
        self.sink.play();
        self.events.push_back(DeviceEvent::Playing);
        Ok(())
    }

    fn current_time(&self) -> f64 {
        if self.loaded.is_none() {
            return 0.0;
        }
        self.sink.get_pos().as_secs_f64()
    }

    fn set_current_time(&mut self, seconds: f64) -> Result<()> {
        if self.loaded.is_none() {
            return Err(EngineError::Device(String::from("no active track")));
        }
        self.sink
            .try_seek(Duration::from_secs_f64(seconds.max(0.0)))
            .map_err(|err| EngineError::Device(format!("failed to seek current track: {err:?}")))?;
        self.events.push_back(DeviceEvent::Seeked);
        Ok(())
    }

    fn duration(&self) -> Option<f64> {
        self.track_duration.map(|duration| duration.as_secs_f64())
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, MAX_VOLUME);
        self.sink.set_volume(self.volume);
    }

    fn poll_event(&mut self) -> Option<DeviceEvent> {
        if let Some(event) = self.events.pop_front() {
            return Some(event);
        }
        if self.is_finished() && !self.ended_signaled {
            self.ended_signaled = true;
            return Some(DeviceEvent::Ended);
        }
        if self.loaded.is_some()
            && !self.sink.is_paused()
            && self
                .last_time_update
                .is_none_or(|at| at.elapsed() >= TIME_UPDATE_INTERVAL)
        {
            self.last_time_update = Some(Instant::now());
            return Some(DeviceEvent::TimeUpdate);
        }
        None
    }

    fn output_name(&self) -> Option<String> {
        Some(String::from("System default output (CPAL)"))
    }
}

#[cfg(unix)]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    let saved = unsafe { libc::dup(libc::STDERR_FILENO) };
    if saved < 0 {
        return operation();
    }

    let devnull = CString::new("/dev/null")
        .ok()
        .map(|path| unsafe { libc::open(path.as_ptr(), libc::O_WRONLY) })
        .unwrap_or(-1);

    if devnull >= 0 {
        unsafe {
            libc::dup2(devnull, libc::STDERR_FILENO);
            libc::close(devnull);
        }
    }

    let result = operation();

    unsafe {
        libc::dup2(saved, libc::STDERR_FILENO);
        libc::close(saved);
    }

    result
}

#[cfg(not(unix))]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    operation()
}

pub struct NullDevice {
    paused: bool,
    loaded: Option<String>,
    volume: f32,
    started_at: Option<Instant>,
    position_offset: Duration,
    track_duration: Option<Duration>,
    duration_override: Option<Duration>,
    events: VecDeque<DeviceEvent>,
    last_time_update: Option<Instant>,
    ended_signaled: bool,
}

impl NullDevice {
    pub fn new() -> Self {
        Self {
            paused: true,
            loaded: None,
            volume: MAX_VOLUME,
            started_at: None,
            position_offset: Duration::ZERO,
            track_duration: None,
            duration_override: None,
            events: VecDeque::new(),
            last_time_update: None,
            ended_signaled: false,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_override = Some(duration);
        self
    }

    fn estimate_duration(stream_url: &str) -> Option<Duration> {
        let path = local_path(stream_url)?;
        let file = File::open(path).ok()?;
        let source = Decoder::try_from(file).ok()?;
        source
            .total_duration()
            .filter(|duration| !duration.is_zero())
    }

    fn current_position(&self) -> Duration {
        let mut position = self.position_offset;
        if !self.paused
            && self.loaded.is_some()
            && let Some(started_at) = self.started_at
        {
            position = position.saturating_add(started_at.elapsed());
        }
        if let Some(duration) = self.track_duration {
            return position.min(duration);
        }
        position
    }

    fn is_finished(&self) -> bool {
        let Some(duration) = self.track_duration else {
            return false;
        };
        self.loaded.is_some() && !self.paused && self.current_position() >= duration
    }
}

impl Default for NullDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackDevice for NullDevice {
    fn load(&mut self, stream_url: &str) -> Result<()> {
        self.paused = true;
        self.loaded = Some(stream_url.to_string());
        self.started_at = None;
        self.position_offset = Duration::ZERO;
        self.ended_signaled = false;
        self.track_duration = self
            .duration_override
            .or_else(|| Self::estimate_duration(stream_url));
        Ok(())
    }

    fn play(&mut self, token: StartToken) -> Result<()> {
        if self.loaded.is_none() {
            self.events.push_back(DeviceEvent::StartFailed {
                token,
                reason: String::from("no stream loaded"),
            });
            return Ok(());
        }
        self.paused = false;
        self.started_at = Some(Instant::now());
        self.events.push_back(DeviceEvent::Started(token));
        self.events.push_back(DeviceEvent::Playing);
        Ok(())
    }

    fn pause(&mut self) {
        self.position_offset = self.current_position();
        self.started_at = None;
        self.paused = true;
        self.events.push_back(DeviceEvent::Paused);
    }

    fn resume(&mut self) -> Result<()> {
        if self.loaded.is_none() {
            return Err(EngineError::Device(String::from("no stream loaded")));
        }
        if self.ended_signaled {
            self.position_offset = Duration::ZERO;
            self.ended_signaled = false;
        }
        self.started_at = Some(Instant::now());
        self.paused = false;
        self.events.push_back(DeviceEvent::Playing);
        Ok(())
    }

    fn current_time(&self) -> f64 {
        if self.loaded.is_none() {
            return 0.0;
        }
        self.current_position().as_secs_f64()
    }

    fn set_current_time(&mut self, seconds: f64) -> Result<()> {
        if self.loaded.is_none() {
            return Err(EngineError::Device(String::from("no active track")));
        }

        let position = Duration::from_secs_f64(seconds.max(0.0));
        self.position_offset = self
            .track_duration
            .map_or(position, |duration| position.min(duration));
        self.started_at = if self.paused {
            None
        } else {
            Some(Instant::now())
        };
        self.ended_signaled = false;
        self.events.push_back(DeviceEvent::Seeked);
        Ok(())
    }

    fn duration(&self) -> Option<f64> {
        self.track_duration.map(|duration| duration.as_secs_f64())
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, MAX_VOLUME);
    }

    fn poll_event(&mut self) -> Option<DeviceEvent> {
        if let Some(event) = self.events.pop_front() {
            return Some(event);
        }
        if self.is_finished() && !self.ended_signaled {
            self.ended_signaled = true;
            return Some(DeviceEvent::Ended);
        }
        if self.loaded.is_some()
            && !self.paused
            && self
                .last_time_update
                .is_none_or(|at| at.elapsed() >= TIME_UPDATE_INTERVAL)
        {
            self.last_time_update = Some(Instant::now());
            return Some(DeviceEvent::TimeUpdate);
        }
        None
    }

    fn output_name(&self) -> Option<String> {
        Some(String::from("Null audio device"))
    }
}
