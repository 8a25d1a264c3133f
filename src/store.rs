//! Desired state: what the application wants every light to look like.

use std::fmt;

use crate::light::{LightId, LightState};

/// Callback invoked after the desired set changes.
pub type ChangeListener = Box<dyn FnMut() + Send + 'static>;

/// Insertion-ordered set of desired light states.
///
/// Iteration order is the order lights were first added, which is also the
/// order the sync engines visit them on every tick.
#[derive(Default)]
pub struct DesiredStateStore {
    lights: Vec<LightState>,
    listeners: Vec<ChangeListener>,
}

impl fmt::Debug for DesiredStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DesiredStateStore")
            .field("lights", &self.lights)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl DesiredStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback fired whenever the desired set changes.
    pub fn subscribe<F: FnMut() + Send + 'static>(&mut self, listener: F) {
        self.listeners.push(Box::new(listener));
    }

    /// Insert or replace the desired state of a light.
    ///
    /// Returns `false` if the stored state was already identical.
    pub fn upsert(&mut self, state: LightState) -> bool {
        match self.lights.iter_mut().find(|l| l.id() == state.id()) {
            Some(existing) if *existing == state => return false,
            Some(existing) => *existing = state,
            None => self.lights.push(state),
        }
        self.notify();
        true
    }

    /// Drop a light from the desired set.
    pub fn remove(&mut self, id: &LightId) -> bool {
        let before = self.lights.len();
        self.lights.retain(|l| l.id() != id);
        let changed = self.lights.len() != before;
        if changed {
            self.notify();
        }
        changed
    }

    pub fn get(&self, id: &LightId) -> Option<&LightState> {
        self.lights.iter().find(|l| l.id() == id)
    }

    /// Desired lights in iteration order.
    pub fn lights(&self) -> impl Iterator<Item = &LightState> {
        self.lights.iter()
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    fn notify(&mut self) {
        for listener in self.listeners.iter_mut() {
            listener();
        }
    }
}
