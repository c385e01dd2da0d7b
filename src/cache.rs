//! Bounded cache of the most recent terminal observations, keyed by touch
//! identifier.

use crate::tracker::Observation;

/// Fixed-capacity ordered map. Inserting a new identifier past capacity
/// evicts the oldest one; re-inserting an existing identifier replaces its
/// entry in place.
#[derive(Debug)]
pub struct RecentEnds {
    slots: Vec<(i32, Observation)>,
    cap: usize,
}

impl RecentEnds {
    pub fn new(cap: usize) -> Self {
        Self {
            slots: Vec::with_capacity(cap),
            cap,
        }
    }

    pub fn insert(&mut self, obs: Observation) {
        let id = obs.touch.id;
        if let Some(slot) = self.slots.iter_mut().find(|(k, _)| *k == id) {
            slot.1 = obs;
            return;
        }
        self.slots.push((id, obs));
        if self.slots.len() > self.cap {
            self.slots.remove(0);
        }
    }

    pub fn get(&self, id: i32) -> Option<&Observation> {
        self.slots.iter().find(|(k, _)| *k == id).map(|(_, o)| o)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
