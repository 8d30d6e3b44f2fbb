use crate::audio::{NullDevice, PlaybackDevice, RodioDevice};
use crate::config;
use crate::engine::{EngineEvent, PlaybackEngine};
use crate::library;
use crate::model::{DropPosition, EqualizerSettings, TransportState};
use crate::persistence::JsonDirStore;
use crate::progress::TracingReporter;
use crate::shuffle::ShuffleOutcome;
use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const TICK: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Default)]
pub struct AppStartupOptions {
    pub user: Option<String>,
    pub folders: Vec<PathBuf>,
    pub shuffle: bool,
    pub null_audio: bool,
}

enum Flow {
    Continue,
    Quit,
}

pub fn run(options: AppStartupOptions) -> Result<()> {
    let settings = config::load_settings()?;
    let store = config::open_store()?;
    let user = options
        .user
        .clone()
        .unwrap_or_else(|| String::from("default"));

    let device = open_device(options.null_audio);
    if let Some(name) = device.output_name() {
        tracing::info!(output = %name, "audio output ready");
    }

    let mut engine = PlaybackEngine::new(
        device,
        Box::new(TracingReporter),
        Box::new(store),
        settings,
        &user,
    );
    engine.reload_user_data(&user);

    if !options.folders.is_empty() {
        let tracks = library::scan_many(&options.folders);
        println!("Loaded {} tracks", tracks.len());
        engine.load_queue(tracks, options.shuffle);
        engine.play_index(0);
    }
    print_events(&mut engine);

    let lines = spawn_stdin_reader();
    let mut last_tick = Instant::now();

    loop {
        match lines.recv_timeout(TICK) {
            Ok(line) => {
                if let Flow::Quit = run_command(&mut engine, &line) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let elapsed = last_tick.elapsed();
        last_tick = Instant::now();
        engine.advance(elapsed);
        engine.pump();
        print_events(&mut engine);
    }

    engine.pause();
    save_settings(&engine);
    Ok(())
}

fn open_device(null_audio: bool) -> Box<dyn PlaybackDevice> {
    if null_audio {
        return Box::new(NullDevice::new());
    }
    match RodioDevice::new() {
        Ok(device) => Box::new(device),
        Err(err) => {
            tracing::warn!("no audio output, continuing silently: {err:#}");
            Box::new(NullDevice::new())
        }
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn save_settings(engine: &PlaybackEngine) {
    let mut settings = engine.settings().clone();
    settings.volume = engine.volume();
    if let Err(err) = config::save_settings(&settings) {
        tracing::warn!("failed to save settings: {err:#}");
    }
}

fn run_command(engine: &mut PlaybackEngine, raw: &str) -> Flow {
    let input = raw.trim();
    if input.is_empty() {
        return Flow::Continue;
    }

    let mut command_split = input.splitn(2, char::is_whitespace);
    let command = command_split.next().unwrap_or_default();
    let rest = command_split.next().unwrap_or("").trim();

    match command {
        "help" => println!(
            "Commands: play <n> | p | next | prev | shuffle | repeat | add <path> | insert <path> | rm <n> | mv <from> <to> <before|after> | clear | queue | seek <s> | vol <0-1> | fav <id> | xfade <s> | eq reset | user <name> | quit"
        ),
        "play" => match rest.parse::<usize>() {
            Ok(index) if engine.play_index(index) => {}
            _ => println!("Usage: play <index>"),
        },
        "p" | "toggle" => engine.toggle_play_pause(),
        "next" => {
            if !engine.next() {
                println!("End of queue");
            }
        }
        "prev" => {
            if !engine.prev() {
                println!("Already at the first track");
            }
        }
        "shuffle" => match engine.toggle_shuffle() {
            ShuffleOutcome::Shuffled => println!("Shuffle on"),
            ShuffleOutcome::Restored => println!("Shuffle off"),
            ShuffleOutcome::Diverged => println!("Shuffle off (queue order kept)"),
        },
        "repeat" => println!("Repeat: {}", engine.toggle_repeat().label()),
        "add" | "insert" => {
            if rest.is_empty() {
                println!("Usage: {command} <path>");
                return Flow::Continue;
            }
            let tracks = tracks_at(Path::new(rest));
            if tracks.is_empty() {
                println!("No audio found at {rest}");
            }
            if command == "add" {
                tracks.into_iter().for_each(|track| engine.add_to_queue(track));
            } else {
                // Inserting each right after the current entry, last first, keeps folder order.
                tracks.into_iter().rev().for_each(|track| engine.insert_next(track));
            }
        }
        "rm" => match rest.parse::<usize>() {
            Ok(index) if engine.remove_from_queue(index) => {}
            Ok(_) => println!("Cannot remove that entry"),
            Err(_) => println!("Usage: rm <index>"),
        },
        "mv" => {
            let parts: Vec<&str> = rest.split_whitespace().collect();
            let parsed = match parts.as_slice() {
                [from, to, drop] => from
                    .parse::<usize>()
                    .ok()
                    .zip(to.parse::<usize>().ok())
                    .zip(parse_drop(drop)),
                _ => None,
            };
            match parsed {
                Some(((from, to), drop)) if engine.reorder_queue(from, to, drop) => {}
                Some(_) => println!("Cannot move that entry"),
                None => println!("Usage: mv <from> <to> <before|after>"),
            }
        }
        "clear" => engine.clear_queue(),
        "queue" => print_queue(engine),
        "seek" => match rest.parse::<f64>() {
            Ok(seconds) if engine.seek(seconds) => {}
            _ => println!("Usage: seek <seconds>"),
        },
        "vol" => match rest.parse::<f32>() {
            Ok(volume) => engine.set_volume(volume),
            Err(_) => println!("Usage: vol <0.0-1.0>"),
        },
        "fav" => {
            let Some(track_id) = (!rest.is_empty())
                .then(|| rest.to_string())
                .or_else(|| engine.current_track().map(|track| track.id.clone()))
            else {
                println!("Usage: fav <track id>");
                return Flow::Continue;
            };
            let is_favorite = !engine
                .queue()
                .iter()
                .any(|track| track.id == track_id && track.is_favorite);
            let changed = engine.set_favorite(&track_id, is_favorite);
            println!("Updated {changed} entries");
        }
        "xfade" => match rest.parse::<f64>() {
            Ok(seconds) => {
                engine.set_crossfade_seconds(seconds);
                println!("Crossfade: {}s", engine.settings().crossfade_seconds);
            }
            Err(_) => println!("Usage: xfade <seconds>"),
        },
        "eq" => match rest {
            "reset" => engine.reset_equalizer(),
            "flat" => engine.apply_equalizer_settings(&EqualizerSettings::default()),
            _ => println!("Usage: eq <reset|flat>"),
        },
        "user" => {
            if rest.is_empty() {
                println!("User: {}", engine.user());
            } else if !engine.reload_user_data(rest) {
                println!("No saved session for {rest}");
            }
        }
        "quit" | "exit" | "q" => return Flow::Quit,
        other => println!("Unknown command {other}"),
    }
    Flow::Continue
}

fn tracks_at(path: &Path) -> Vec<crate::model::Track> {
    if path.is_dir() {
        library::scan_folder(path)
    } else if path.is_file() {
        vec![library::track_for_path(path)]
    } else {
        Vec::new()
    }
}

fn parse_drop(raw: &str) -> Option<DropPosition> {
    match raw {
        "before" | "b" => Some(DropPosition::Before),
        "after" | "a" => Some(DropPosition::After),
        _ => None,
    }
}

fn print_queue(engine: &PlaybackEngine) {
    let current = engine.current_index();
    for (index, track) in engine.queue().iter().enumerate() {
        let marker = if current == Some(index) { ">" } else { " " };
        let favorite = if track.is_favorite { "*" } else { "" };
        println!("{marker}{index:>3} {}{favorite}  {}", track.title, track.artist);
    }
}

fn print_events(engine: &mut PlaybackEngine) {
    for event in engine.drain_events() {
        match event {
            EngineEvent::NowPlayingChanged(Some(track)) => {
                println!("Now playing: {} - {}", track.artist, track.title);
            }
            EngineEvent::StateChanged(TransportState::Paused) => println!("Paused"),
            EngineEvent::RepeatChanged(mode) => println!("Repeat: {}", mode.label()),
            EngineEvent::VolumeChanged(volume) => println!("Volume: {:.0}%", volume * 100.0),
            _ => {}
        }
    }
}
