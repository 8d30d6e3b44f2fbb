#![no_main]

use encore::audio::NullDevice;
use encore::engine::PlaybackEngine;
use encore::model::{DropPosition, EngineSettings, Track};
use encore::persistence::MemoryStore;
use encore::progress::TracingReporter;
use libfuzzer_sys::fuzz_target;
use std::time::Duration;

fn track(n: usize) -> Track {
    Track {
        id: format!("track_{}", n % 7),
        title: format!("track {n}"),
        artist: String::new(),
        album: String::new(),
        duration_ms: 30_000,
        stream_url: format!("track_{n}.mp3"),
        image: None,
        is_favorite: false,
    }
}

fuzz_target!(|data: &[u8]| {
    let settings = EngineSettings {
        crossfade_seconds: 3.0,
        ..EngineSettings::default()
    };
    let mut engine = PlaybackEngine::new(
        Box::new(NullDevice::new().with_duration(Duration::from_secs(30))),
        Box::new(TracingReporter),
        Box::new(MemoryStore::new()),
        settings,
        "fuzz",
    )
    .with_rng_seed(data.len() as u64)
    .with_clock(|| 0);

    let len = (data.len() % 32).max(1);
    engine.load_queue((0..len).map(track).collect(), false);

    let mut added = len;
    for pair in data.chunks(2) {
        let op = pair[0];
        let arg = usize::from(pair.get(1).copied().unwrap_or_default());
        match op % 14 {
            0 => {
                engine.play_index(arg % 40);
            }
            1 => engine.toggle_play_pause(),
            2 => {
                engine.next();
            }
            3 => {
                engine.prev();
            }
            4 => {
                engine.toggle_shuffle();
            }
            5 => {
                engine.toggle_repeat();
            }
            6 => {
                added += 1;
                engine.add_to_queue(track(added));
            }
            7 => {
                added += 1;
                engine.insert_next(track(added));
            }
            8 => {
                engine.remove_from_queue(arg % 40);
            }
            9 => {
                let drop = if arg & 1 == 0 {
                    DropPosition::Before
                } else {
                    DropPosition::After
                };
                engine.reorder_queue(arg % 17, arg % 23, drop);
            }
            10 => engine.clear_queue(),
            11 => {
                engine.seek(arg as f64);
            }
            12 => engine.advance(Duration::from_millis(arg as u64 * 100)),
            _ => {
                engine.set_favorite(&format!("track_{}", arg % 7), arg & 1 == 0);
            }
        }
        engine.pump();
        engine.drain_events();

        if let Some(index) = engine.current_index() {
            assert!(index < engine.queue().len());
        }
    }
});
