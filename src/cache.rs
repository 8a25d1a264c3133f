//! Last known actual state of each light, as reported by hardware.

use std::collections::HashMap;

use crate::light::{LightId, LightState};

/// Actual light states owned by one transport backend.
///
/// Entries appear only when a controller reports a light; the sync engines
/// read from the cache but never write to it.
#[derive(Debug, Clone, Default)]
pub struct DeviceStateCache {
    lights: HashMap<LightId, LightState>,
}

impl DeviceStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a complete report for a light, creating the entry if needed.
    pub fn insert(&mut self, state: LightState) {
        self.lights.insert(state.id().clone(), state);
    }

    /// Apply a partial change to a light that has already reported.
    ///
    /// Returns `false` if the light is unknown.
    pub fn update<F: FnOnce(&mut LightState)>(&mut self, id: &LightId, change: F) -> bool {
        match self.lights.get_mut(id) {
            Some(state) => {
                change(state);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &LightId) -> Option<&LightState> {
        self.lights.get(id)
    }

    /// Lights known on one controller, identified by controller name.
    pub fn lights_on<'a>(&'a self, controller: &'a str) -> impl Iterator<Item = &'a LightState> {
        self.lights
            .values()
            .filter(move |l| l.id().controller().name() == controller)
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::{Controller, TransportKind};

    #[test]
    fn test_update_requires_existing_entry() {
        let id = LightId::new(Controller::new("1", TransportKind::Hue), 4);
        let mut cache = DeviceStateCache::new();

        assert!(!cache.update(&id, |l| l.on = true));
        assert!(cache.get(&id).is_none());

        cache.insert(LightState::new(id.clone()));
        assert!(cache.update(&id, |l| l.on = true));
        assert!(cache.get(&id).unwrap().on());
        assert_eq!(cache.lights_on("1").count(), 1);
    }
}
