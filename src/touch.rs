//! Raw touch input types shared by the tracker and the recognizer.

use std::sync::Arc;

use serde::Serialize;

/// Snapshot of a single touch point. Always copied into the engine, never
/// aliased: later mutation on the producer side must not leak into stored
/// history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TouchPoint {
    /// Stable identifier across this touch's lifetime.
    pub id: i32,
    pub x: f32,
    pub y: f32,
}

impl TouchPoint {
    pub fn new(id: i32, x: f32, y: f32) -> Self {
        Self { id, x, y }
    }
}

/// Opaque origin context handed through from the input source, e.g. a device
/// path. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source(Arc<str>);

impl Source {
    pub fn new(s: impl Into<Arc<str>>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One upstream touch event: the touch points that changed plus the full set
/// of currently active points.
#[derive(Debug, Clone)]
pub struct TouchEvent {
    pub changed: Vec<TouchPoint>,
    pub active: Vec<TouchPoint>,
    pub origin: Option<Source>,
}

impl TouchEvent {
    pub fn new(changed: Vec<TouchPoint>, active: Vec<TouchPoint>, origin: Option<Source>) -> Self {
        Self {
            changed,
            active,
            origin,
        }
    }
}

/// Tri-state classification flag. `Unknown` is a first-class "not yet
/// decided" value, distinct from both outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Flag {
    Unknown,
    Yes,
    No,
}

impl Flag {
    /// Whether the flag has settled on an outcome.
    pub fn resolved(self) -> bool {
        self != Flag::Unknown
    }

    pub fn is_yes(self) -> bool {
        self == Flag::Yes
    }
}
