//! Tap / double-tap / press recognition over the normalized track stream.
//!
//! A single state machine shared across touch identities: rapid sequential
//! touches from any source contribute to the same tap/double-tap sequencing.
//! Only the bounded cache of recent terminal observations is identity-keyed,
//! and that cache exists for later lookup, not for classification.

use log::{debug, trace};
use serde::Serialize;

use crate::cache::RecentEnds;
use crate::config::Thresholds;
use crate::touch::Source;
use crate::tracker::{Observation, TrackSink};

/// Capacity of the recent-ends inspection cache.
pub const END_CACHE_CAPACITY: usize = 5;

/// Recognizer session state. `Started` means a touch is in flight and not
/// yet classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapState {
    Invalid,
    Started,
    Tap,
    DoubleTap,
    Press,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GestureKind {
    Tap,
    DoubleTap,
    Press,
}

/// Payload of an emitted gesture event. Coordinates are omitted when the
/// originating event carried none.
#[derive(Debug, Clone, Serialize)]
pub struct GesturePayload {
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    pub id: i32,
}

impl GesturePayload {
    fn from_observation(obs: &Observation) -> Self {
        Self {
            timestamp: obs.timestamp,
            x: Some(obs.touch.x),
            y: Some(obs.touch.y),
            id: obs.touch.id,
        }
    }
}

/// Consumer of recognized gestures.
pub trait GestureSink {
    fn on_tap(&mut self, payload: &GesturePayload);
    fn on_double_tap(&mut self, payload: &GesturePayload);
    fn on_press(&mut self, payload: &GesturePayload);
}

/// Opaque handle identifying one armed deferred broadcast. A token from a
/// superseded arming no longer matches and its firing is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken(u64);

/// One-shot delayed callback scheduler. The host must call
/// [`TapRecognizer::on_timer`] with the token once the delay elapses; firing
/// late or more than once is harmless.
pub trait TimerHost {
    fn schedule(&mut self, delay_ms: u64, token: TimerToken);
}

pub struct TapRecognizer {
    thresholds: Thresholds,
    emit_every_tap: bool,
    state: TapState,
    last_tap_state: TapState,
    /// Payload awaiting broadcast.
    pending: Option<GesturePayload>,
    /// Payload of the last broadcast, whatever its kind.
    last_tap: Option<GesturePayload>,
    last_track_start: Option<Observation>,
    last_track_end: Option<Observation>,
    ends: RecentEnds,
    /// Bumped on every deferred arming; stale timers fail the match.
    generation: u64,
}

impl TapRecognizer {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            emit_every_tap: true,
            state: TapState::Invalid,
            last_tap_state: TapState::Invalid,
            pending: None,
            last_tap: None,
            last_track_start: None,
            last_track_end: None,
            ends: RecentEnds::new(END_CACHE_CAPACITY),
            generation: 0,
        }
    }

    /// With `false`, taps are withheld for `double_tap_link_ms` so a quick
    /// second tap can upgrade them to a double-tap before they are announced.
    pub fn with_emit_every_tap(mut self, on: bool) -> Self {
        self.emit_every_tap = on;
        self
    }

    pub fn state(&self) -> TapState {
        self.state
    }

    pub fn last_tap_state(&self) -> TapState {
        self.last_tap_state
    }

    pub fn last_track_start(&self) -> Option<&Observation> {
        self.last_track_start.as_ref()
    }

    pub fn last_track_end(&self) -> Option<&Observation> {
        self.last_track_end.as_ref()
    }

    /// The cached raw terminal observation for an identity, if still held.
    pub fn last_end(&self, id: i32) -> Option<&Observation> {
        self.ends.get(id)
    }

    /// Origin context of the cached terminal observation for an identity.
    pub fn origin_of(&self, id: i32) -> Option<&Source> {
        self.ends.get(id).and_then(|obs| obs.origin.as_ref())
    }

    pub fn on_track_start(&mut self, obs: &Observation) {
        trace!("recognizer: started id={} t={}", obs.touch.id, obs.timestamp);
        self.state = TapState::Started;
        self.last_track_start = Some(obs.clone());
    }

    pub fn on_track_move(&mut self, obs: &Observation, out: &mut impl GestureSink) {
        if self.state != TapState::Started {
            return;
        }
        let Some(start) = &self.last_track_start else {
            return;
        };
        // A long hold that still reports movement: the only way a press can
        // be recognized before release.
        if obs.timestamp.saturating_sub(start.timestamp) > self.thresholds.press_ms {
            self.state = TapState::Press;
            self.pending = Some(GesturePayload::from_observation(obs));
            self.broadcast(out);
        }
    }

    pub fn on_track_end(
        &mut self,
        obs: &Observation,
        out: &mut impl GestureSink,
        timers: &mut impl TimerHost,
    ) {
        self.ends.insert(obs.clone());
        self.last_track_end = Some(obs.clone());

        let link_ms = self.thresholds.double_tap_link_ms;

        // Double-tap strictly precedes tap/press for the same end event. The
        // reference tap is the still-withheld pending one when taps are
        // deferred, otherwise the last broadcast payload.
        if self.state == TapState::Started && self.last_tap_state != TapState::DoubleTap {
            let prev_tap_ts = self
                .pending
                .as_ref()
                .map(|p| p.timestamp)
                .or_else(|| self.last_tap.as_ref().map(|p| p.timestamp));
            if let Some(ts) = prev_tap_ts {
                if obs.timestamp.saturating_sub(ts) < link_ms {
                    self.state = TapState::DoubleTap;
                    self.pending = Some(GesturePayload::from_observation(obs));
                    // Emitted right here in both modes; when a deferred tap
                    // timer is still armed it dies on the generation guard.
                    self.broadcast(out);
                }
            }
        }

        if self.state == TapState::Started {
            let Some(start) = &self.last_track_start else {
                return;
            };
            let held = obs.timestamp.saturating_sub(start.timestamp);
            if held < self.thresholds.tap_ms {
                self.state = TapState::Tap;
                self.pending = Some(GesturePayload::from_observation(obs));
                if self.emit_every_tap {
                    self.broadcast(out);
                } else {
                    self.generation += 1;
                    debug!("tap withheld for {link_ms}ms (gen {})", self.generation);
                    timers.schedule(link_ms, TimerToken(self.generation));
                }
            } else if held > self.thresholds.press_ms {
                self.state = TapState::Press;
                self.pending = Some(GesturePayload::from_observation(obs));
                self.broadcast(out);
            }
            // Between tap_ms and press_ms the release classifies as nothing.
        }
    }

    /// Deferred broadcast firing. Stale tokens and already-consumed payloads
    /// are guaranteed no-ops.
    pub fn on_timer(&mut self, token: TimerToken, out: &mut impl GestureSink) {
        if token != TimerToken(self.generation) {
            trace!("stale timer {token:?} ignored (gen {})", self.generation);
            return;
        }
        if self.pending.is_none() {
            return;
        }
        self.broadcast(out);
    }

    /// Upstream detached: drop anything pending and start the next sequence
    /// clean.
    pub fn on_disconnect(&mut self) {
        self.pending = None;
        self.state = TapState::Invalid;
    }

    fn broadcast(&mut self, out: &mut impl GestureSink) {
        let Some(payload) = self.pending.take() else {
            return;
        };
        match self.state {
            TapState::DoubleTap => {
                debug!("doubletap id={} t={}", payload.id, payload.timestamp);
                out.on_double_tap(&payload);
            }
            TapState::Press => {
                debug!("press id={} t={}", payload.id, payload.timestamp);
                out.on_press(&payload);
            }
            _ => {
                debug!("tap id={} t={}", payload.id, payload.timestamp);
                out.on_tap(&payload);
            }
        }
        // `Started` does not finalize: the press-during-move path leaves room
        // for a later end-triggered upgrade.
        if self.state != TapState::Started {
            self.last_tap_state = self.state;
            self.state = TapState::Invalid;
        }
        self.last_tap = Some(payload);
    }
}

/// Adapter piping a [`crate::tracker::TouchTracker`] straight into a
/// recognizer: implements [`TrackSink`] by forwarding each track event with
/// the host's gesture sink and timer host.
pub struct RecognizerSink<'a, G: GestureSink, T: TimerHost> {
    recognizer: &'a mut TapRecognizer,
    out: &'a mut G,
    timers: &'a mut T,
}

impl<'a, G: GestureSink, T: TimerHost> RecognizerSink<'a, G, T> {
    pub fn new(recognizer: &'a mut TapRecognizer, out: &'a mut G, timers: &'a mut T) -> Self {
        Self {
            recognizer,
            out,
            timers,
        }
    }
}

impl<G: GestureSink, T: TimerHost> TrackSink for RecognizerSink<'_, G, T> {
    fn on_track_start(&mut self, obs: &Observation, _history: &[Observation]) {
        self.recognizer.on_track_start(obs);
    }

    fn on_track_move(&mut self, obs: &Observation, _history: &[Observation]) {
        self.recognizer.on_track_move(obs, self.out);
    }

    fn on_track_end(&mut self, obs: &Observation, _history: &[Observation]) {
        self.recognizer.on_track_end(obs, self.out, self.timers);
    }
}
