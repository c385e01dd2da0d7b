//! Per-identity touch demultiplexing and tri-state flag annotation.
//!
//! The tracker splits a raw multi-touch stream by touch identifier, keeps an
//! ordered history of observations per identity, and annotates every
//! observation with incrementally derived tap / long-press / double-tap
//! flags. It emits normalized track-start / track-move / track-end events to
//! a [`TrackSink`]; the history slice handed to the sink holds the prior
//! observations of that identity (empty for the first).

use std::collections::HashMap;

use log::{debug, trace};

use crate::clock::{Clock, MonotonicClock};
use crate::config::Thresholds;
use crate::touch::{Flag, Source, TouchEvent, TouchPoint};

/// One annotated observation of a touch point.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Snapshot copy of the touch point.
    pub touch: TouchPoint,
    /// Opaque context passed through from the input source.
    pub origin: Option<Source>,
    /// Wall-clock milliseconds at observation creation.
    pub timestamp: u64,
    /// Touches active system-wide at this moment.
    pub count: usize,
    /// Whether this observation terminates its identity's sequence.
    pub is_end: bool,
    pub tap: Flag,
    pub long_press: Flag,
    pub double_tap: Flag,
}

/// Consumer of the normalized track stream.
pub trait TrackSink {
    fn on_track_start(&mut self, obs: &Observation, history: &[Observation]);
    fn on_track_move(&mut self, obs: &Observation, history: &[Observation]);
    fn on_track_end(&mut self, obs: &Observation, history: &[Observation]);
}

pub struct TouchTracker {
    thresholds: Thresholds,
    clock: Box<dyn Clock>,
    histories: HashMap<i32, Vec<Observation>>,
    /// Most recent terminal observation across all identities.
    last_end: Option<Observation>,
    selective: bool,
}

impl TouchTracker {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            clock: Box::new(MonotonicClock::new()),
            histories: HashMap::new(),
            last_end: None,
            selective: false,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// In selective mode the caller decides which identities get recorded,
    /// via [`TouchTracker::record`]. Start events are still reported.
    pub fn with_selective(mut self, selective: bool) -> Self {
        self.selective = selective;
        self
    }

    /// Begin recording history for an identity, seeded with the given
    /// observation. No-op if the identity is already tracked.
    pub fn record(&mut self, obs: Observation) {
        let id = obs.touch.id;
        self.histories.entry(id).or_insert_with(|| vec![obs]);
    }

    pub fn is_tracking(&self, id: i32) -> bool {
        self.histories.contains_key(&id)
    }

    pub fn tracked_count(&self) -> usize {
        self.histories.len()
    }

    pub fn on_touch_start(&mut self, ev: &TouchEvent, out: &mut impl TrackSink) {
        let now = self.clock.now_ms();
        for touch in &ev.changed {
            let (tap, long_press, double_tap) =
                classify(&self.thresholds, self.last_end.as_ref(), touch, now, &[], false);
            let obs = Observation {
                touch: *touch,
                origin: ev.origin.clone(),
                timestamp: now,
                count: ev.active.len(),
                is_end: false,
                tap,
                long_press,
                double_tap,
            };
            trace!("track-start id={} t={}", touch.id, now);
            out.on_track_start(&obs, &[]);
            if !self.selective && !self.histories.contains_key(&touch.id) {
                self.histories.insert(touch.id, vec![obs]);
            }
        }
    }

    pub fn on_touch_move(&mut self, ev: &TouchEvent, out: &mut impl TrackSink) {
        let now = self.clock.now_ms();
        for touch in &ev.changed {
            // Untracked identities are dropped on purpose: the tracker only
            // reports on identities it has been told to record.
            let Some(history) = self.histories.get_mut(&touch.id) else {
                trace!("move for untracked id={} ignored", touch.id);
                continue;
            };
            let (tap, long_press, double_tap) =
                classify(&self.thresholds, self.last_end.as_ref(), touch, now, history, false);
            let obs = Observation {
                touch: *touch,
                origin: ev.origin.clone(),
                timestamp: now,
                count: ev.active.len(),
                is_end: false,
                tap,
                long_press,
                double_tap,
            };
            out.on_track_move(&obs, history);
            history.push(obs);
        }
    }

    pub fn on_touch_end(&mut self, ev: &TouchEvent, out: &mut impl TrackSink) {
        let now = self.clock.now_ms();
        for touch in &ev.changed {
            let Some(history) = self.histories.remove(&touch.id) else {
                trace!("end for untracked id={} ignored", touch.id);
                continue;
            };
            let (tap, long_press, double_tap) =
                classify(&self.thresholds, self.last_end.as_ref(), touch, now, &history, true);
            let obs = Observation {
                touch: *touch,
                origin: ev.origin.clone(),
                timestamp: now,
                count: ev.active.len(),
                is_end: true,
                tap,
                long_press,
                double_tap,
            };
            debug!(
                "track-end id={} tap={:?} long_press={:?} double_tap={:?}",
                touch.id, tap, long_press, double_tap
            );
            out.on_track_end(&obs, &history);
            self.last_end = Some(obs);
        }
    }

    /// Cancel carries the same semantics as end.
    pub fn on_touch_cancel(&mut self, ev: &TouchEvent, out: &mut impl TrackSink) {
        self.on_touch_end(ev, out);
    }

    /// Upstream source detached: force a terminal event for every identity
    /// still in flight so none is left dangling, then start clean.
    pub fn on_disconnect(&mut self, out: &mut impl TrackSink) {
        let now = self.clock.now_ms();
        let histories = std::mem::take(&mut self.histories);
        for (id, history) in histories {
            let Some(last) = history.last() else { continue };
            let obs = Observation {
                touch: last.touch,
                origin: last.origin.clone(),
                timestamp: now,
                count: 0,
                is_end: true,
                tap: Flag::No,
                long_press: Flag::No,
                double_tap: Flag::No,
            };
            debug!("disconnect: synthesized track-end for id={id}");
            out.on_track_end(&obs, &history);
        }
        self.last_end = None;
    }
}

/// Derive the three flags for one observation, in order: tap (terminal-ness
/// and displacement only), long-press (frozen once resolved), double-tap
/// (needs the fresh tap result and the previous cross-identity terminal
/// observation).
fn classify(
    th: &Thresholds,
    last_end: Option<&Observation>,
    touch: &TouchPoint,
    now: u64,
    history: &[Observation],
    is_end: bool,
) -> (Flag, Flag, Flag) {
    let first = history.first();
    let within = match first {
        Some(f) => {
            (touch.x - f.touch.x).abs() <= th.drag_tolerance
                && (touch.y - f.touch.y).abs() <= th.drag_tolerance
        }
        None => true,
    };

    let tap = if !is_end {
        Flag::Unknown
    } else if within {
        Flag::Yes
    } else {
        Flag::No
    };

    let mut long_press = match history.last() {
        // Decided once, then carried forward verbatim for the rest of the
        // sequence.
        Some(prev) if prev.long_press.resolved() => prev.long_press,
        _ => {
            let started = first.map_or(now, |f| f.timestamp);
            let elapsed = now.saturating_sub(started);
            if !within {
                Flag::No
            } else if elapsed >= th.long_press_ms {
                Flag::Yes
            } else {
                Flag::Unknown
            }
        }
    };
    if is_end && !long_press.resolved() {
        long_press = Flag::No;
    }

    let double_tap = if !is_end {
        Flag::Unknown
    } else if !tap.is_yes() {
        Flag::No
    } else {
        match last_end {
            Some(prev)
                if prev.tap.is_yes() && now.saturating_sub(prev.timestamp) < th.double_tap_ms =>
            {
                Flag::Yes
            }
            _ => Flag::No,
        }
    };

    (tap, long_press, double_tap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[derive(Default)]
    struct Collect {
        starts: Vec<Observation>,
        moves: Vec<Observation>,
        ends: Vec<Observation>,
        end_history_lens: Vec<usize>,
    }

    impl TrackSink for Collect {
        fn on_track_start(&mut self, obs: &Observation, _history: &[Observation]) {
            self.starts.push(obs.clone());
        }
        fn on_track_move(&mut self, obs: &Observation, _history: &[Observation]) {
            self.moves.push(obs.clone());
        }
        fn on_track_end(&mut self, obs: &Observation, history: &[Observation]) {
            self.ends.push(obs.clone());
            self.end_history_lens.push(history.len());
        }
    }

    fn tracker(clock: &ManualClock) -> TouchTracker {
        TouchTracker::new(Thresholds::default()).with_clock(clock.clone())
    }

    fn ev(changed: &[(i32, f32, f32)], active: &[(i32, f32, f32)]) -> TouchEvent {
        let mk = |pts: &[(i32, f32, f32)]| {
            pts.iter()
                .map(|&(id, x, y)| TouchPoint::new(id, x, y))
                .collect()
        };
        TouchEvent::new(mk(changed), mk(active), None)
    }

    #[test]
    fn quick_stationary_release_is_a_tap() {
        let clock = ManualClock::new();
        let mut tr = tracker(&clock);
        let mut out = Collect::default();

        tr.on_touch_start(&ev(&[(1, 10.0, 10.0)], &[(1, 10.0, 10.0)]), &mut out);
        clock.set(50);
        tr.on_touch_end(&ev(&[(1, 12.0, 9.0)], &[]), &mut out);

        let end = &out.ends[0];
        assert_eq!(end.tap, Flag::Yes);
        assert_eq!(end.long_press, Flag::No); // forced from Unknown
        assert_eq!(end.double_tap, Flag::No); // no prior terminal observation
        assert_eq!(end.timestamp, 50);
        assert!(!tr.is_tracking(1));
    }

    #[test]
    fn drag_breaks_tap_and_long_press() {
        let clock = ManualClock::new();
        let mut tr = tracker(&clock);
        let mut out = Collect::default();

        tr.on_touch_start(&ev(&[(1, 10.0, 10.0)], &[(1, 10.0, 10.0)]), &mut out);
        clock.set(30);
        tr.on_touch_move(&ev(&[(1, 20.0, 10.0)], &[(1, 20.0, 10.0)]), &mut out);
        clock.set(50);
        tr.on_touch_end(&ev(&[(1, 20.0, 10.0)], &[]), &mut out);

        assert_eq!(out.moves[0].long_press, Flag::No); // moved too far
        let end = &out.ends[0];
        assert_eq!(end.tap, Flag::No);
        assert_eq!(end.long_press, Flag::No);
    }

    #[test]
    fn long_press_resolves_then_stays_frozen() {
        let clock = ManualClock::new();
        let mut tr = tracker(&clock);
        let mut out = Collect::default();

        tr.on_touch_start(&ev(&[(1, 10.0, 10.0)], &[(1, 10.0, 10.0)]), &mut out);
        clock.set(1100);
        tr.on_touch_move(&ev(&[(1, 11.0, 10.0)], &[(1, 11.0, 10.0)]), &mut out);
        assert_eq!(out.moves[0].long_press, Flag::Yes);

        // A later drag must not revoke the decision.
        clock.set(1200);
        tr.on_touch_move(&ev(&[(1, 60.0, 10.0)], &[(1, 60.0, 10.0)]), &mut out);
        assert_eq!(out.moves[1].long_press, Flag::Yes);

        clock.set(1300);
        tr.on_touch_end(&ev(&[(1, 60.0, 10.0)], &[]), &mut out);
        let end = &out.ends[0];
        assert_eq!(end.long_press, Flag::Yes);
        assert_eq!(end.tap, Flag::No);
        assert_eq!(out.end_history_lens[0], 3);
    }

    #[test]
    fn double_tap_requires_the_window() {
        let clock = ManualClock::new();
        let mut tr = tracker(&clock);
        let mut out = Collect::default();

        tr.on_touch_start(&ev(&[(1, 10.0, 10.0)], &[(1, 10.0, 10.0)]), &mut out);
        clock.set(100);
        tr.on_touch_end(&ev(&[(1, 10.0, 10.0)], &[]), &mut out);
        assert_eq!(out.ends[0].double_tap, Flag::No);

        // Second identity ends 150 ms after the first: inside the window.
        clock.set(150);
        tr.on_touch_start(&ev(&[(2, 10.0, 10.0)], &[(2, 10.0, 10.0)]), &mut out);
        clock.set(250);
        tr.on_touch_end(&ev(&[(2, 10.0, 10.0)], &[]), &mut out);
        assert_eq!(out.ends[1].double_tap, Flag::Yes);

        // Third ends 210 ms after the second: outside.
        clock.set(300);
        tr.on_touch_start(&ev(&[(3, 10.0, 10.0)], &[(3, 10.0, 10.0)]), &mut out);
        clock.set(460);
        tr.on_touch_end(&ev(&[(3, 10.0, 10.0)], &[]), &mut out);
        assert_eq!(out.ends[2].double_tap, Flag::No);
    }

    #[test]
    fn double_tap_needs_a_previous_clean_tap() {
        let clock = ManualClock::new();
        let mut tr = tracker(&clock);
        let mut out = Collect::default();

        // First touch drags, so its tap resolves to No.
        tr.on_touch_start(&ev(&[(1, 10.0, 10.0)], &[(1, 10.0, 10.0)]), &mut out);
        clock.set(50);
        tr.on_touch_end(&ev(&[(1, 40.0, 10.0)], &[]), &mut out);

        clock.set(80);
        tr.on_touch_start(&ev(&[(2, 10.0, 10.0)], &[(2, 10.0, 10.0)]), &mut out);
        clock.set(150);
        tr.on_touch_end(&ev(&[(2, 10.0, 10.0)], &[]), &mut out);
        assert_eq!(out.ends[1].double_tap, Flag::No);
    }

    #[test]
    fn events_for_unknown_identities_are_dropped() {
        let clock = ManualClock::new();
        let mut tr = tracker(&clock);
        let mut out = Collect::default();

        tr.on_touch_move(&ev(&[(7, 1.0, 1.0)], &[(7, 1.0, 1.0)]), &mut out);
        tr.on_touch_end(&ev(&[(7, 1.0, 1.0)], &[]), &mut out);
        assert!(out.moves.is_empty());
        assert!(out.ends.is_empty());
    }

    #[test]
    fn selective_mode_waits_for_opt_in() {
        let clock = ManualClock::new();
        let mut tr = tracker(&clock).with_selective(true);
        let mut out = Collect::default();

        tr.on_touch_start(&ev(&[(1, 10.0, 10.0)], &[(1, 10.0, 10.0)]), &mut out);
        assert_eq!(out.starts.len(), 1);
        assert!(!tr.is_tracking(1));

        clock.set(20);
        tr.on_touch_move(&ev(&[(1, 11.0, 10.0)], &[(1, 11.0, 10.0)]), &mut out);
        assert!(out.moves.is_empty());

        tr.record(out.starts[0].clone());
        clock.set(40);
        tr.on_touch_move(&ev(&[(1, 12.0, 10.0)], &[(1, 12.0, 10.0)]), &mut out);
        assert_eq!(out.moves.len(), 1);
    }

    #[test]
    fn disconnect_synthesizes_terminal_events() {
        let clock = ManualClock::new();
        let mut tr = tracker(&clock);
        let mut out = Collect::default();

        let active = [(1, 1.0, 1.0), (2, 2.0, 2.0), (3, 3.0, 3.0)];
        for (i, pt) in active.iter().enumerate() {
            tr.on_touch_start(&ev(&[*pt], &active[..=i]), &mut out);
        }
        assert_eq!(tr.tracked_count(), 3);

        clock.set(400);
        tr.on_disconnect(&mut out);
        assert_eq!(out.ends.len(), 3);
        for end in &out.ends {
            assert!(end.is_end);
            assert_eq!(end.count, 0);
            assert_eq!(end.tap, Flag::No);
            assert_eq!(end.long_press, Flag::No);
            assert_eq!(end.double_tap, Flag::No);
        }
        assert_eq!(tr.tracked_count(), 0);
    }

    #[test]
    fn count_reports_system_wide_active_touches() {
        let clock = ManualClock::new();
        let mut tr = tracker(&clock);
        let mut out = Collect::default();

        tr.on_touch_start(&ev(&[(1, 1.0, 1.0)], &[(1, 1.0, 1.0)]), &mut out);
        tr.on_touch_start(&ev(&[(2, 2.0, 2.0)], &[(1, 1.0, 1.0), (2, 2.0, 2.0)]), &mut out);
        assert_eq!(out.starts[0].count, 1);
        assert_eq!(out.starts[1].count, 2);
    }
}
