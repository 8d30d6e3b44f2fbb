mod support;

use encore::audio::DeviceEvent;
use encore::model::{EngineSettings, RepeatMode, TransportState};
use std::time::Duration;
use support::{FakeDevice, Harness, harness, tracks};

const TICK: Duration = Duration::from_millis(100);

fn crossfading(seconds: f64) -> Harness {
    let settings = EngineSettings {
        crossfade_seconds: seconds,
        ..EngineSettings::default()
    };
    let mut h = harness(FakeDevice::new().with_duration(10.0), settings);
    h.engine.load_queue(tracks(&["a", "b", "c"]), false);
    h.engine.play_index(0);
    h.engine.pump();
    h
}

fn time_update(h: &mut Harness, seconds: f64) {
    h.device.set_time(seconds);
    h.device.push(DeviceEvent::TimeUpdate);
    h.engine.pump();
}

#[test]
fn fade_advances_on_final_tick_and_not_before() {
    let mut h = crossfading(4.0);
    time_update(&mut h, 6.5);
    assert!(h.engine.is_crossfading());

    let mut last = h.device.volume_now();
    for _ in 0..34 {
        h.engine.advance(TICK);
        assert_eq!(h.engine.current_index(), Some(0));
        let volume = h.device.volume_now();
        assert!(volume < last);
        last = volume;
    }

    h.engine.advance(TICK);
    h.engine.pump();
    assert_eq!(h.engine.current_index(), Some(1));
    assert!(!h.engine.is_crossfading());
    assert_eq!(h.device.volume_now(), 1.0);
}

#[test]
fn fade_waits_for_the_window() {
    let mut h = crossfading(4.0);
    time_update(&mut h, 5.0);
    assert!(!h.engine.is_crossfading());
    time_update(&mut h, 6.0);
    assert!(h.engine.is_crossfading());
}

#[test]
fn only_one_fade_runs_at_a_time() {
    let mut h = crossfading(4.0);
    time_update(&mut h, 7.0);
    let pending = h.engine.scheduler().pending();
    time_update(&mut h, 7.5);
    time_update(&mut h, 8.0);
    assert_eq!(h.engine.scheduler().pending(), pending);
}

#[test]
fn no_fade_without_a_next_track_or_under_repeat_one() {
    let mut h = crossfading(4.0);
    h.engine.play_index(2);
    h.engine.pump();
    time_update(&mut h, 8.0);
    assert!(!h.engine.is_crossfading());

    h.engine.set_repeat(RepeatMode::One);
    h.engine.play_index(0);
    h.engine.pump();
    time_update(&mut h, 8.0);
    assert!(!h.engine.is_crossfading());
}

#[test]
fn repeat_all_fades_from_last_track_into_first() {
    let mut h = crossfading(2.0);
    h.engine.set_repeat(RepeatMode::All);
    h.engine.play_index(2);
    h.engine.pump();
    time_update(&mut h, 9.0);
    assert!(h.engine.is_crossfading());

    h.engine.advance(Duration::from_secs(1));
    assert_eq!(h.engine.current_index(), Some(0));
}

#[test]
fn explicit_play_cancels_fade_and_restores_volume() {
    let mut h = crossfading(4.0);
    h.engine.set_volume(0.8);
    time_update(&mut h, 7.0);
    h.engine.advance(TICK * 5);
    assert!(h.device.volume_now() < 0.8);

    h.engine.play_index(2);
    assert!(!h.engine.is_crossfading());
    assert_eq!(h.device.volume_now(), 0.8);

    h.engine.advance(Duration::from_secs(5));
    assert_eq!(h.engine.current_index(), Some(2));
}

#[test]
fn device_end_during_fade_does_not_skip_twice() {
    let mut h = crossfading(4.0);
    time_update(&mut h, 7.0);
    h.device.push(DeviceEvent::Ended);
    h.engine.pump();
    assert_eq!(h.engine.current_index(), Some(0));

    h.engine.advance(Duration::from_secs(3));
    assert_eq!(h.engine.current_index(), Some(1));
}

#[test]
fn disabling_crossfade_mid_fade_cancels_it() {
    let mut h = crossfading(4.0);
    time_update(&mut h, 7.0);
    h.engine.set_crossfade_seconds(0.0);
    assert!(!h.engine.is_crossfading());
    assert_eq!(h.device.volume_now(), 1.0);

    h.engine.set_crossfade_seconds(30.0);
    assert_eq!(h.engine.settings().crossfade_seconds, 12.0);
}

#[test]
fn pausing_mid_fade_cancels_it_and_stays_put() {
    let mut h = crossfading(4.0);
    time_update(&mut h, 7.0);
    h.engine.advance(TICK * 3);
    assert!(h.device.volume_now() < 1.0);

    h.engine.pause();
    assert!(!h.engine.is_crossfading());
    assert_eq!(h.device.volume_now(), 1.0);

    h.device.clear_commands();
    h.engine.advance(Duration::from_secs(4));
    h.engine.pump();
    assert_eq!(h.engine.current_index(), Some(0));
    assert_eq!(h.engine.state(), TransportState::Paused);
    assert!(h.device.commands().is_empty());

    h.engine.toggle_play_pause();
    time_update(&mut h, 7.5);
    assert!(h.engine.is_crossfading());
}

#[test]
fn switching_to_repeat_one_mid_fade_restores_volume_and_keeps_track() {
    let mut h = crossfading(4.0);
    time_update(&mut h, 7.0);
    h.engine.advance(TICK * 3);

    h.engine.set_repeat(RepeatMode::One);
    assert!(!h.engine.is_crossfading());
    assert_eq!(h.device.volume_now(), 1.0);

    h.engine.advance(Duration::from_secs(4));
    h.engine.pump();
    assert_eq!(h.engine.current_index(), Some(0));
    assert_eq!(h.engine.state(), TransportState::Playing);
    assert_eq!(h.device.volume_now(), 1.0);
}
