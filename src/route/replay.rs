// src/route/replay.rs
//! Deterministic route replay with a cancellable timer-driven player

use super::segment::{segment_index_of, Segment};
use crate::track::sample::PositionSample;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplayEvent {
    PositionChanged { index: usize, sample: PositionSample },
    SegmentHighlighted { segment_index: usize },
    RouteCompleted,
}

/// Deterministic replay state machine. Each `tick` advances the virtual
/// vehicle to the next fix whose coordinates differ from the current one
/// (collapsing consecutive duplicates) and reports what changed. All timing
/// lives in `ReplayPlayer`; the stepper itself has no clock, which is what
/// makes playback reproducible.
pub struct ReplayStepper {
    fixes: Vec<PositionSample>,
    segments: Vec<Segment>,
    state: ReplayState,
    current_index: usize,
    speed_multiplier: f64,
    active_segment: Option<usize>,
}

impl ReplayStepper {
    /// `segments` must come from splitting the same `fixes` list, so that
    /// fix indices map onto segment indices
    pub fn new(fixes: Vec<PositionSample>, segments: Vec<Segment>) -> Self {
        Self {
            fixes,
            segments,
            state: ReplayState::Stopped,
            current_index: 0,
            speed_multiplier: 1.0,
            active_segment: None,
        }
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_playing(&self) -> bool {
        self.state == ReplayState::Playing
    }

    /// Delay until the next tick at the current playback speed
    pub fn delay_ms(&self) -> u64 {
        (1000.0 / self.speed_multiplier).round() as u64
    }

    /// Enter Playing at `from_index`. A replay over an empty fix list stays
    /// Stopped.
    pub fn start(&mut self, from_index: usize) -> Vec<ReplayEvent> {
        if self.fixes.is_empty() {
            return Vec::new();
        }
        self.state = ReplayState::Playing;
        self.current_index = from_index.min(self.fixes.len() - 1);
        self.highlight_segment_at(self.current_index)
            .into_iter()
            .collect()
    }

    /// Advance one step. Does nothing unless Playing.
    pub fn tick(&mut self) -> Vec<ReplayEvent> {
        if self.state != ReplayState::Playing {
            return Vec::new();
        }

        let next = self.next_distinct_index();
        let next = match next {
            Some(next) => next,
            None => {
                self.state = ReplayState::Stopped;
                return vec![ReplayEvent::RouteCompleted];
            }
        };

        self.current_index = next;
        let mut events = vec![ReplayEvent::PositionChanged {
            index: next,
            sample: self.fixes[next].clone(),
        }];
        events.extend(self.highlight_segment_at(next));
        events
    }

    /// Toggle into Paused without losing the current index
    pub fn pause(&mut self) {
        if self.state == ReplayState::Playing {
            self.state = ReplayState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == ReplayState::Paused {
            self.state = ReplayState::Playing;
        }
    }

    /// Jump to a fix index while keeping the current play/pause state
    pub fn seek(&mut self, index: usize) -> Vec<ReplayEvent> {
        if self.fixes.is_empty() {
            return Vec::new();
        }
        self.current_index = index.min(self.fixes.len() - 1);
        let mut events = vec![ReplayEvent::PositionChanged {
            index: self.current_index,
            sample: self.fixes[self.current_index].clone(),
        }];
        events.extend(self.highlight_segment_at(self.current_index));
        events
    }

    /// Change the pacing of future ticks without restarting playback
    pub fn set_speed(&mut self, multiplier: f64) {
        if multiplier > 0.0 && multiplier.is_finite() {
            self.speed_multiplier = multiplier;
        }
    }

    pub fn stop(&mut self) {
        self.state = ReplayState::Stopped;
    }

    fn next_distinct_index(&self) -> Option<usize> {
        let current = &self.fixes[self.current_index];
        self.fixes
            .iter()
            .enumerate()
            .skip(self.current_index + 1)
            .find(|(_, fix)| !fix.same_coordinates(current))
            .map(|(i, _)| i)
    }

    fn highlight_segment_at(&mut self, fix_index: usize) -> Option<ReplayEvent> {
        let segment_index = segment_index_of(&self.segments, fix_index)?;
        if self.active_segment == Some(segment_index) {
            return None;
        }
        self.active_segment = Some(segment_index);
        Some(ReplayEvent::SegmentHighlighted { segment_index })
    }
}

/// Timer-driven wrapper around the stepper. One cooperative task re-arms a
/// sleep of `delay_ms` between ticks; `pause` and `stop` abort that task
/// before returning, so a stale timer can never resurrect a stopped
/// playback and no two ticks are ever in flight for the same player.
pub struct ReplayPlayer {
    stepper: Arc<Mutex<ReplayStepper>>,
    events: mpsc::UnboundedSender<ReplayEvent>,
    task: Option<JoinHandle<()>>,
}

impl ReplayPlayer {
    pub fn new(
        fixes: Vec<PositionSample>,
        segments: Vec<Segment>,
    ) -> (Self, mpsc::UnboundedReceiver<ReplayEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let player = Self {
            stepper: Arc::new(Mutex::new(ReplayStepper::new(fixes, segments))),
            events,
            task: None,
        };
        (player, events_rx)
    }

    pub fn start(&mut self, from_index: usize) {
        self.cancel_timer();
        let initial = self.stepper.lock().unwrap().start(from_index);
        self.forward(initial);
        self.spawn_loop();
    }

    pub fn pause(&mut self) {
        self.cancel_timer();
        self.stepper.lock().unwrap().pause();
    }

    pub fn resume(&mut self) {
        let resumed = {
            let mut stepper = self.stepper.lock().unwrap();
            stepper.resume();
            stepper.is_playing()
        };
        if resumed {
            self.spawn_loop();
        }
    }

    pub fn set_speed(&self, multiplier: f64) {
        self.stepper.lock().unwrap().set_speed(multiplier);
    }

    pub fn seek(&self, index: usize) {
        let events = self.stepper.lock().unwrap().seek(index);
        self.forward(events);
    }

    pub fn stop(&mut self) {
        self.cancel_timer();
        self.stepper.lock().unwrap().stop();
    }

    pub fn state(&self) -> ReplayState {
        self.stepper.lock().unwrap().state()
    }

    pub fn current_index(&self) -> usize {
        self.stepper.lock().unwrap().current_index()
    }

    fn spawn_loop(&mut self) {
        let stepper = Arc::clone(&self.stepper);
        let events = self.events.clone();
        self.task = Some(tokio::spawn(async move {
            loop {
                let delay = {
                    let stepper = stepper.lock().unwrap();
                    if !stepper.is_playing() {
                        break;
                    }
                    stepper.delay_ms()
                };

                tokio::time::sleep(Duration::from_millis(delay)).await;

                let ticked = {
                    let mut stepper = stepper.lock().unwrap();
                    stepper.tick()
                };
                let done = ticked.contains(&ReplayEvent::RouteCompleted);
                for event in ticked {
                    let _ = events.send(event);
                }
                if done {
                    break;
                }
            }
        }));
    }

    fn cancel_timer(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn forward(&self, events: Vec<ReplayEvent>) {
        for event in events {
            let _ = self.events.send(event);
        }
    }
}

impl Drop for ReplayPlayer {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::segment::split_segments;
    use chrono::{TimeZone, Utc};

    fn fix(lat_step: i64, secs: i64) -> PositionSample {
        PositionSample::new(
            47.0 + lat_step as f64 * 0.001,
            8.0,
            Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            15.0,
            "a-1",
        )
    }

    fn stepper_for(fixes: Vec<PositionSample>) -> ReplayStepper {
        let segments = split_segments(&fixes, &[], 6);
        ReplayStepper::new(fixes, segments)
    }

    #[test]
    fn test_tick_emits_position_per_distinct_fix_then_completion() {
        // 5 fixes, but two consecutive duplicates: 4 distinct positions
        let fixes = vec![fix(0, 0), fix(1, 10), fix(1, 20), fix(2, 30), fix(3, 40)];
        let mut stepper = stepper_for(fixes.clone());
        stepper.start(0);

        let mut position_changes = 0;
        let mut completed = 0;
        loop {
            let events = stepper.tick();
            if events.is_empty() {
                break;
            }
            for event in &events {
                match event {
                    ReplayEvent::PositionChanged { index, .. } => {
                        position_changes += 1;
                        assert!(*index <= fixes.len() - 1);
                    }
                    ReplayEvent::RouteCompleted => completed += 1,
                    ReplayEvent::SegmentHighlighted { .. } => {}
                }
            }
            if completed > 0 {
                break;
            }
        }

        // distinct consecutive fixes - 1 moves, then one completion
        assert_eq!(position_changes, 3);
        assert_eq!(completed, 1);
        assert_eq!(stepper.state(), ReplayState::Stopped);
    }

    #[test]
    fn test_empty_fixes_never_start() {
        let mut stepper = stepper_for(Vec::new());
        assert!(stepper.start(0).is_empty());
        assert_eq!(stepper.state(), ReplayState::Stopped);
        assert!(stepper.tick().is_empty());
    }

    #[test]
    fn test_pause_freezes_index_and_resume_continues() {
        let fixes = vec![fix(0, 0), fix(1, 10), fix(2, 20)];
        let mut stepper = stepper_for(fixes);
        stepper.start(0);
        stepper.tick();
        assert_eq!(stepper.current_index(), 1);

        stepper.pause();
        assert_eq!(stepper.state(), ReplayState::Paused);
        assert!(stepper.tick().is_empty());
        assert_eq!(stepper.current_index(), 1);

        stepper.resume();
        stepper.tick();
        assert_eq!(stepper.current_index(), 2);
    }

    #[test]
    fn test_stop_silences_further_ticks() {
        let fixes = vec![fix(0, 0), fix(1, 10), fix(2, 20)];
        let mut stepper = stepper_for(fixes);
        stepper.start(0);
        stepper.stop();
        assert!(stepper.tick().is_empty());
        assert_eq!(stepper.state(), ReplayState::Stopped);
    }

    #[test]
    fn test_set_speed_changes_delay() {
        let mut stepper = stepper_for(vec![fix(0, 0), fix(1, 10)]);
        assert_eq!(stepper.delay_ms(), 1000);
        stepper.set_speed(2.0);
        assert_eq!(stepper.delay_ms(), 500);
        stepper.set_speed(0.5);
        assert_eq!(stepper.delay_ms(), 2000);
        // Invalid multipliers are ignored
        stepper.set_speed(0.0);
        assert_eq!(stepper.delay_ms(), 2000);
    }

    #[test]
    fn test_segment_highlight_on_boundary_crossing() {
        let fixes = vec![fix(0, 0), fix(1, 10), fix(2, 20), fix(3, 30)];
        let mut marker = fixes[1].clone();
        marker.is_return_event = true;
        let segments = split_segments(&fixes, &[marker], 6);
        let mut stepper = ReplayStepper::new(fixes, segments);

        let initial = stepper.start(0);
        assert_eq!(
            initial,
            vec![ReplayEvent::SegmentHighlighted { segment_index: 0 }]
        );

        // Moving to index 1 stays in segment 0; index 2 crosses into segment 1
        let events = stepper.tick();
        assert!(!events
            .iter()
            .any(|e| matches!(e, ReplayEvent::SegmentHighlighted { .. })));
        let events = stepper.tick();
        assert!(events
            .iter()
            .any(|e| matches!(e, ReplayEvent::SegmentHighlighted { segment_index: 1 })));
    }

    #[test]
    fn test_seek_keeps_state_and_reports_position() {
        let fixes = vec![fix(0, 0), fix(1, 10), fix(2, 20), fix(3, 30)];
        let mut stepper = stepper_for(fixes);
        stepper.start(0);
        stepper.pause();

        let events = stepper.seek(2);
        assert_eq!(stepper.current_index(), 2);
        assert_eq!(stepper.state(), ReplayState::Paused);
        assert!(matches!(
            events[0],
            ReplayEvent::PositionChanged { index: 2, .. }
        ));

        // Seek past the end clamps to the last fix
        stepper.seek(99);
        assert_eq!(stepper.current_index(), 3);
    }

    #[tokio::test]
    async fn test_player_runs_to_completion() {
        let fixes = vec![fix(0, 0), fix(1, 10), fix(2, 20)];
        let segments = split_segments(&fixes, &[], 6);
        let (mut player, mut events_rx) = ReplayPlayer::new(fixes, segments);
        player.set_speed(1000.0); // 1 ms ticks
        player.start(0);

        let mut positions = 0;
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), events_rx.recv())
                .await
                .expect("replay stalled")
                .expect("event channel closed");
            match event {
                ReplayEvent::PositionChanged { .. } => positions += 1,
                ReplayEvent::RouteCompleted => break,
                ReplayEvent::SegmentHighlighted { .. } => {}
            }
        }
        assert_eq!(positions, 2);
        assert_eq!(player.state(), ReplayState::Stopped);
    }

    #[tokio::test]
    async fn test_player_stop_cancels_pending_tick() {
        let fixes = vec![fix(0, 0), fix(1, 10), fix(2, 20)];
        let segments = split_segments(&fixes, &[], 6);
        let (mut player, mut events_rx) = ReplayPlayer::new(fixes, segments);
        player.start(0); // default 1000 ms delay, no tick fires this fast
        player.stop();

        // Drain the initial highlight, then confirm silence
        while let Ok(event) = events_rx.try_recv() {
            assert!(matches!(event, ReplayEvent::SegmentHighlighted { .. }));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(events_rx.try_recv().is_err());
        assert_eq!(player.state(), ReplayState::Stopped);
    }
}
