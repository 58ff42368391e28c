//! Pacing clock tests, on a virtual time source.

mod common;

use std::time::Duration;

use common::{ManualTimeSource, millis};
use unspool::{CancellationToken, PacingClock, TimeSource, WaitOutcome};

// ── deadline_for ───────────────────────────────────────────────────

#[test]
fn deadline_is_offset_from_first_timestamp() {
    let time = ManualTimeSource::new();
    let start = time.now();
    let mut clock = PacingClock::new(time.clone());
    clock.start(millis(1_000));

    assert_eq!(clock.deadline_for(millis(1_000)), start);
    assert_eq!(clock.deadline_for(millis(1_040)), start + millis(40));
    assert_eq!(clock.deadline_for(millis(2_500)), start + millis(1_500));
}

#[test]
fn deadline_is_monotonic_and_pure() {
    let time = ManualTimeSource::new();
    let mut clock = PacingClock::new(time.clone());
    clock.start(millis(500));

    let timestamps: Vec<Duration> = (0..50).map(|index| millis(index * 37)).collect();
    let deadlines: Vec<_> = timestamps
        .iter()
        .map(|&timestamp| clock.deadline_for(timestamp))
        .collect();
    assert!(deadlines.windows(2).all(|pair| pair[0] <= pair[1]));

    // Time passing does not move deadlines.
    time.advance(millis(10_000));
    let again: Vec<_> = timestamps
        .iter()
        .map(|&timestamp| clock.deadline_for(timestamp))
        .collect();
    assert_eq!(deadlines, again);
}

#[test]
fn timestamps_before_origin_map_to_start() {
    let time = ManualTimeSource::new();
    let start = time.now();
    let mut clock = PacingClock::new(time.clone());
    clock.start(millis(200));

    assert_eq!(clock.deadline_for(millis(0)), start);
    assert_eq!(clock.deadline_for(millis(199)), start);
}

#[test]
#[should_panic(expected = "called twice")]
fn starting_twice_panics() {
    let time = ManualTimeSource::new();
    let mut clock = PacingClock::new(time);
    clock.start(millis(0));
    clock.start(millis(40));
}

#[test]
#[should_panic(expected = "before start")]
fn deadline_before_start_panics() {
    let clock = PacingClock::new(ManualTimeSource::new());
    let _ = clock.deadline_for(millis(0));
}

#[test]
fn is_started_tracks_anchor() {
    let mut clock = PacingClock::new(ManualTimeSource::new());
    assert!(!clock.is_started());
    clock.start(millis(0));
    assert!(clock.is_started());
}

// ── wait_until ─────────────────────────────────────────────────────

#[test]
fn wait_sleeps_in_quanta_until_deadline() {
    let time = ManualTimeSource::new();
    let mut clock = PacingClock::new(time.clone());
    clock.start(millis(0));

    let outcome = clock.wait_until(
        clock.deadline_for(millis(35)),
        &CancellationToken::new(),
        millis(10),
    );

    assert_eq!(outcome, WaitOutcome::Reached);
    assert_eq!(time.elapsed(), millis(35));
    // 10 + 10 + 10 + 5
    assert_eq!(time.sleeps(), 4);
}

#[test]
fn past_deadline_reports_lateness_without_sleeping() {
    let time = ManualTimeSource::new();
    let mut clock = PacingClock::new(time.clone());
    clock.start(millis(0));
    time.advance(millis(75));

    let outcome = clock.wait_until(
        clock.deadline_for(millis(40)),
        &CancellationToken::new(),
        millis(10),
    );

    assert_eq!(outcome, WaitOutcome::Late(millis(35)));
    assert_eq!(time.sleeps(), 0);
}

#[test]
fn wait_observes_cancellation_between_quanta() {
    let time = ManualTimeSource::new();
    let token = CancellationToken::new();
    time.cancel_after(3, token.clone());
    let mut clock = PacingClock::new(time.clone());
    clock.start(millis(0));

    let outcome = clock.wait_until(clock.deadline_for(millis(1_000)), &token, millis(10));

    assert_eq!(outcome, WaitOutcome::Cancelled);
    assert_eq!(time.elapsed(), millis(30));
}

#[test]
fn pause_reports_cancellation() {
    let time = ManualTimeSource::new();
    let clock = PacingClock::new(time.clone());
    let token = CancellationToken::new();

    assert!(clock.pause(millis(25), &token, millis(10)));
    assert_eq!(time.elapsed(), millis(25));

    token.cancel();
    assert!(!clock.pause(millis(25), &token, millis(10)));
    assert_eq!(time.elapsed(), millis(25));
}
