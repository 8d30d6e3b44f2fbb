use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const TICKS_PER_SECOND: f64 = 10_000_000.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub duration_ms: u64,
    pub stream_url: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
}

impl Track {
    pub fn duration_seconds(&self) -> f64 {
        self.duration_ms as f64 / 1_000.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RepeatMode {
    #[default]
    Off,
    All,
    One,
}

impl RepeatMode {
    pub fn next(self) -> Self {
        match self {
            Self::Off => Self::All,
            Self::All => Self::One,
            Self::One => Self::Off,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::All => "all",
            Self::One => "one",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropPosition {
    Before,
    After,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    #[serde(default)]
    pub queue: Vec<Track>,
    #[serde(default)]
    pub original_queue: Vec<Track>,
    #[serde(
        default = "default_snapshot_index",
        serialize_with = "serialize_index",
        deserialize_with = "deserialize_index"
    )]
    pub current_index: Option<usize>,
    #[serde(default)]
    pub current_time: f64,
    #[serde(default)]
    pub is_shuffled: bool,
    #[serde(default)]
    pub repeat_mode: RepeatMode,
    pub timestamp: i64,
}

fn default_snapshot_index() -> Option<usize> {
    None
}

fn serialize_index<S>(index: &Option<usize>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match index {
        Some(value) => serializer.serialize_i64(*value as i64),
        None => serializer.serialize_i64(-1),
    }
}

fn deserialize_index<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    Ok(usize::try_from(raw).ok())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSettings {
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub crossfade_seconds: f64,
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
    #[serde(default = "default_recently_played_limit")]
    pub recently_played_limit: usize,
}

pub const MAX_CROSSFADE_SECONDS: f64 = 12.0;

fn default_volume() -> f32 {
    1.0
}

fn default_progress_interval_ms() -> u64 {
    10_000
}

fn default_snapshot_interval_ms() -> u64 {
    10_000
}

fn default_recently_played_limit() -> usize {
    50
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            crossfade_seconds: 0.0,
            progress_interval_ms: default_progress_interval_ms(),
            snapshot_interval_ms: default_snapshot_interval_ms(),
            recently_played_limit: default_recently_played_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EqualizerSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub preamp_db: f32,
    #[serde(default)]
    pub bands: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_mode_cycles_through_all_variants() {
        assert_eq!(RepeatMode::Off.next(), RepeatMode::All);
        assert_eq!(RepeatMode::All.next(), RepeatMode::One);
        assert_eq!(RepeatMode::One.next(), RepeatMode::Off);
    }

    #[test]
    fn snapshot_index_uses_minus_one_for_nothing_active() {
        let snapshot = PlaybackSnapshot {
            queue: Vec::new(),
            original_queue: Vec::new(),
            current_index: None,
            current_time: 0.0,
            is_shuffled: false,
            repeat_mode: RepeatMode::Off,
            timestamp: 7,
        };
        let json = serde_json::to_string(&snapshot).expect("serialize");
        assert!(json.contains("\"currentIndex\":-1"), "unexpected json: {json}");

        let parsed: PlaybackSnapshot = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed.current_index, None);
    }

    #[test]
    fn settings_fill_missing_fields_with_defaults() {
        let settings: EngineSettings =
            serde_json::from_str(r#"{"crossfade_seconds": 4.0}"#).expect("parse");
        assert_eq!(settings.crossfade_seconds, 4.0);
        assert_eq!(settings.volume, 1.0);
        assert_eq!(settings.progress_interval_ms, 10_000);
    }
}
