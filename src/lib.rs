//! tapsense — touch-gesture classification engine.
//!
//! Two independently usable components over the same upstream contract:
//! [`tracker::TouchTracker`] demultiplexes a raw multi-touch stream by touch
//! identifier and annotates per-identity observations with tri-state tap /
//! long-press / double-tap flags; [`recognizer::TapRecognizer`] consumes the
//! normalized track stream and classifies discrete `tap`, `doubletap` and
//! `press` gestures through a single shared state machine.
//!
//! Raw input → tracker → recognizer → application, wired through the
//! [`tracker::TrackSink`] / [`recognizer::GestureSink`] traits. The whole
//! engine is single-threaded and event-driven; the only asynchronous point
//! is the deferred tap broadcast behind [`recognizer::TimerHost`].

pub mod cache;
pub mod clock;
pub mod config;
pub mod recognizer;
pub mod touch;
pub mod tracker;

pub use config::{EngineConfig, Thresholds};
pub use recognizer::{GestureKind, GesturePayload, GestureSink, TapRecognizer, TimerHost};
pub use touch::{Flag, Source, TouchEvent, TouchPoint};
pub use tracker::{Observation, TouchTracker, TrackSink};
