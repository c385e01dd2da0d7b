//! Live classification pipeline: evdev MT slot streams in, gesture events
//! out through the tracker → recognizer chain.

use anyhow::Result;
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use std::thread;

use evdev::{AbsoluteAxisCode, Device, EventType, SynchronizationCode};
use signal_hook::consts::{SIGINT, SIGTERM};

use tapsense::config::EngineConfig;
use tapsense::recognizer::{
    GestureKind, GesturePayload, GestureSink, RecognizerSink, TapRecognizer, TimerHost, TimerToken,
};
use tapsense::touch::{Source, TouchEvent, TouchPoint};
use tapsense::tracker::TouchTracker;

use crate::input;

const MAX_SLOTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
struct SlotState {
    id: i32, // -1 = inactive
    x: f32,
    y: f32,
}

impl Default for SlotState {
    fn default() -> Self {
        Self {
            id: -1,
            x: 0.0,
            y: 0.0,
        }
    }
}

fn point(s: &SlotState) -> TouchPoint {
    TouchPoint::new(s.id, s.x, s.y)
}

/// Events derived from one SYN_REPORT frame, grouped by kind.
#[derive(Debug, Default)]
struct FrameEvents {
    start: Option<TouchEvent>,
    moved: Option<TouchEvent>,
    end: Option<TouchEvent>,
}

/// Decodes the kernel MT slot protocol into changed/active touch lists by
/// diffing slot state across SYN_REPORT boundaries.
#[derive(Debug, Default)]
struct SlotDecoder {
    cur: usize,
    slots: [SlotState; MAX_SLOTS],
    committed: [SlotState; MAX_SLOTS],
}

impl SlotDecoder {
    fn on_slot(&mut self, v: i32) {
        self.cur = v.clamp(0, MAX_SLOTS as i32 - 1) as usize;
    }

    fn on_tracking_id(&mut self, v: i32) {
        self.slots[self.cur].id = v;
    }

    fn on_pos_x(&mut self, v: i32) {
        self.slots[self.cur].x = v as f32;
    }

    fn on_pos_y(&mut self, v: i32) {
        self.slots[self.cur].y = v as f32;
    }

    fn commit(&mut self, origin: &Source) -> FrameEvents {
        let mut starts = vec![];
        let mut moves = vec![];
        let mut ends = vec![];
        for i in 0..MAX_SLOTS {
            let (p, c) = (self.committed[i], self.slots[i]);
            if p.id < 0 && c.id >= 0 {
                starts.push(point(&c));
            } else if p.id >= 0 && c.id < 0 {
                // release; coordinates keep their last reported values
                ends.push(TouchPoint::new(p.id, c.x, c.y));
            } else if p.id >= 0 && c.id >= 0 {
                if p.id != c.id {
                    // slot reused within one frame
                    ends.push(point(&p));
                    starts.push(point(&c));
                } else if p.x != c.x || p.y != c.y {
                    moves.push(point(&c));
                }
            }
        }
        let active: Vec<TouchPoint> = self
            .slots
            .iter()
            .filter(|s| s.id >= 0)
            .map(point)
            .collect();
        self.committed = self.slots;

        let wrap = |changed: Vec<TouchPoint>| {
            (!changed.is_empty())
                .then(|| TouchEvent::new(changed, active.clone(), Some(origin.clone())))
        };
        FrameEvents {
            start: wrap(starts),
            moved: wrap(moves),
            end: wrap(ends),
        }
    }
}

/// Deadline list drained by the poll loop; the engine's one-shot timer host.
struct PollTimers {
    start: Instant,
    armed: Vec<(u64, TimerToken)>,
}

impl PollTimers {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            armed: Vec::new(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn drain_due(&mut self) -> Vec<TimerToken> {
        let now = self.now_ms();
        let mut due = vec![];
        self.armed.retain(|(at, token)| {
            if *at <= now {
                due.push(*token);
                false
            } else {
                true
            }
        });
        due
    }
}

impl TimerHost for PollTimers {
    fn schedule(&mut self, delay_ms: u64, token: TimerToken) {
        let at = self.now_ms() + delay_ms;
        self.armed.push((at, token));
    }
}

#[derive(Serialize)]
struct GestureLine<'a> {
    event: GestureKind,
    #[serde(flatten)]
    payload: &'a GesturePayload,
}

/// Prints recognized gestures, either human-readable via the log or as JSON
/// lines on stdout.
struct PrintSink {
    json: bool,
}

impl PrintSink {
    fn emit(&self, event: GestureKind, payload: &GesturePayload) {
        if self.json {
            let line = GestureLine { event, payload };
            match serde_json::to_string(&line) {
                Ok(s) => println!("{s}"),
                Err(e) => warn!("failed to serialize gesture: {e}"),
            }
        } else {
            let at = match (payload.x, payload.y) {
                (Some(x), Some(y)) => format!(" at ({x:.0}, {y:.0})"),
                _ => String::new(),
            };
            info!("{:?} id={} t={}ms{at}", event, payload.id, payload.timestamp);
        }
    }
}

impl GestureSink for PrintSink {
    fn on_tap(&mut self, payload: &GesturePayload) {
        self.emit(GestureKind::Tap, payload);
    }
    fn on_double_tap(&mut self, payload: &GesturePayload) {
        self.emit(GestureKind::DoubleTap, payload);
    }
    fn on_press(&mut self, payload: &GesturePayload) {
        self.emit(GestureKind::Press, payload);
    }
}

pub fn run(cfg: &EngineConfig, json: bool) -> Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&stop))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&stop))?;

    let discovered = input::discover_multitouch();
    if discovered.is_empty() {
        warn!("no multitouch devices detected; nothing to watch");
        return Ok(());
    }

    let mut devs: Vec<(SlotDecoder, Device, Source)> = vec![];
    for d in discovered {
        match Device::open(&d.path) {
            Ok(mut dev) => {
                let _ = dev.set_nonblocking(true);
                info!("watching {} ({})", d.name, d.path);
                devs.push((SlotDecoder::default(), dev, Source::new(d.path)));
            }
            Err(e) => warn!("failed to open {}: {e}", d.path),
        }
    }
    if devs.is_empty() {
        anyhow::bail!("failed to open any detected device");
    }

    let mut tracker = TouchTracker::new(cfg.thresholds.clone());
    let mut recognizer =
        TapRecognizer::new(cfg.thresholds.clone()).with_emit_every_tap(cfg.emit_every_tap);
    let mut out = PrintSink { json };
    let mut timers = PollTimers::new();

    loop {
        if stop.load(Ordering::Relaxed) {
            info!("shutting down: finalizing in-flight touches");
            let mut sink = RecognizerSink::new(&mut recognizer, &mut out, &mut timers);
            tracker.on_disconnect(&mut sink);
            recognizer.on_disconnect();
            return Ok(());
        }

        let mut any_event = false;
        for (decoder, dev, origin) in devs.iter_mut() {
            if let Ok(events) = dev.fetch_events() {
                for ev in events {
                    any_event = true;
                    if ev.event_type() == EventType::ABSOLUTE {
                        match ev.code() {
                            c if c == AbsoluteAxisCode::ABS_MT_SLOT.0 => {
                                decoder.on_slot(ev.value());
                            }
                            c if c == AbsoluteAxisCode::ABS_MT_TRACKING_ID.0 => {
                                decoder.on_tracking_id(ev.value());
                            }
                            c if c == AbsoluteAxisCode::ABS_MT_POSITION_X.0 => {
                                decoder.on_pos_x(ev.value());
                            }
                            c if c == AbsoluteAxisCode::ABS_MT_POSITION_Y.0 => {
                                decoder.on_pos_y(ev.value());
                            }
                            _ => {}
                        }
                    } else if ev.event_type() == EventType::SYNCHRONIZATION
                        && ev.code() == SynchronizationCode::SYN_REPORT.0
                    {
                        let frame = decoder.commit(origin);
                        let mut sink = RecognizerSink::new(&mut recognizer, &mut out, &mut timers);
                        if let Some(start) = &frame.start {
                            tracker.on_touch_start(start, &mut sink);
                        }
                        if let Some(moved) = &frame.moved {
                            tracker.on_touch_move(moved, &mut sink);
                        }
                        if let Some(end) = &frame.end {
                            tracker.on_touch_end(end, &mut sink);
                        }
                    }
                }
            }
        }

        for token in timers.drain_due() {
            recognizer.on_timer(token, &mut out);
        }

        if !any_event {
            thread::sleep(Duration::from_millis(4));
        }
    }
}
