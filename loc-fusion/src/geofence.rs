/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Geofence registry: arena-style id pool and boundary-transition tracking
//! over the GPS tracking stream.

use crate::error::ErrorCode;
use crate::sample::PositionSample;
use crate::subscription::distance::great_circle_distance_meters;
use serde::Serialize;

/// First id handed out. Ids rotate through a fixed 1000-wide range and are
/// never reused while the fence is active.
pub(crate) const GEOFENCE_ID_BASE: u32 = 20_000;
pub(crate) const GEOFENCE_ID_POOL_WIDTH: u32 = 1_000;
/// Active-fence ceiling, well below the id pool width.
pub(crate) const GEOFENCE_MAX_ACTIVE: usize = 200;

/// Boundary crossing reported to fence subscribers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GeofenceTransition {
    Entered,
    Exited,
}

/// Containment state of one fence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum GeofenceState {
    /// Registered, no fix evaluated yet.
    Added,
    Inside,
    Outside,
}

#[derive(Debug)]
pub(crate) struct Geofence {
    pub(crate) id: u32,
    pub(crate) latitude: f64,
    pub(crate) longitude: f64,
    pub(crate) radius_meters: f64,
    pub(crate) state: GeofenceState,
}

impl Geofence {
    /// Applies one containment observation. Returning to `Added` is not a
    /// legal transition; a same-state observation is a silent no-op.
    fn transition_to(
        &mut self,
        next: GeofenceState,
    ) -> Result<Option<GeofenceTransition>, ErrorCode> {
        let emitted = match (self.state, next) {
            (_, GeofenceState::Added) => return Err(ErrorCode::GeofenceInvalidTransition),
            (GeofenceState::Added, GeofenceState::Inside) => Some(GeofenceTransition::Entered),
            (GeofenceState::Added, GeofenceState::Outside) => Some(GeofenceTransition::Exited),
            (GeofenceState::Outside, GeofenceState::Inside) => Some(GeofenceTransition::Entered),
            (GeofenceState::Inside, GeofenceState::Outside) => Some(GeofenceTransition::Exited),
            (GeofenceState::Inside, GeofenceState::Inside)
            | (GeofenceState::Outside, GeofenceState::Outside) => None,
        };
        self.state = next;
        Ok(emitted)
    }
}

/// Fixed-pool fence registry with linear-scan id allocation.
#[derive(Default)]
pub(crate) struct GeofenceTable {
    fences: Vec<Geofence>,
    next_offset: u32,
}

impl GeofenceTable {
    /// Registers one fence, allocating the next free id from the pool.
    pub(crate) fn add(
        &mut self,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
    ) -> Result<u32, ErrorCode> {
        if self.fences.len() >= GEOFENCE_MAX_ACTIVE {
            return Err(ErrorCode::GeofenceTooManyGeofence);
        }

        let mut allocated = None;
        for step in 0..GEOFENCE_ID_POOL_WIDTH {
            let offset = (self.next_offset + step) % GEOFENCE_ID_POOL_WIDTH;
            let candidate = GEOFENCE_ID_BASE + offset;
            if !self.fences.iter().any(|fence| fence.id == candidate) {
                allocated = Some((candidate, offset));
                break;
            }
        }
        let Some((id, offset)) = allocated else {
            // Active count below the cap guarantees a free id; a collision
            // here means the pool bookkeeping is corrupt.
            return Err(ErrorCode::GeofenceIdExist);
        };
        self.next_offset = (offset + 1) % GEOFENCE_ID_POOL_WIDTH;

        self.fences.push(Geofence {
            id,
            latitude,
            longitude,
            radius_meters,
            state: GeofenceState::Added,
        });
        Ok(id)
    }

    pub(crate) fn remove(&mut self, id: u32) -> Result<(), ErrorCode> {
        let before = self.fences.len();
        self.fences.retain(|fence| fence.id != id);
        if self.fences.len() == before {
            return Err(ErrorCode::GeofenceIdUnknown);
        }
        Ok(())
    }

    pub(crate) fn contains(&self, id: u32) -> bool {
        self.fences.iter().any(|fence| fence.id == id)
    }

    pub(crate) fn active_count(&self) -> usize {
        self.fences.len()
    }

    pub(crate) fn ids(&self) -> Vec<u32> {
        self.fences.iter().map(|fence| fence.id).collect()
    }

    /// Evaluates one fix against every fence, returning boundary crossings.
    pub(crate) fn on_fix(&mut self, sample: &PositionSample) -> Vec<(u32, GeofenceTransition)> {
        let mut transitions = Vec::new();
        for fence in &mut self.fences {
            let distance = great_circle_distance_meters(
                sample.latitude,
                sample.longitude,
                fence.latitude,
                fence.longitude,
            );
            let next = if distance <= fence.radius_meters {
                GeofenceState::Inside
            } else {
                GeofenceState::Outside
            };
            if let Ok(Some(transition)) = fence.transition_to(next) {
                transitions.push((fence.id, transition));
            }
        }
        transitions
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Geofence, GeofenceState, GeofenceTable, GeofenceTransition, GEOFENCE_ID_BASE,
        GEOFENCE_MAX_ACTIVE,
    };
    use crate::error::ErrorCode;
    use crate::sample::PositionSample;

    fn fix(latitude: f64, longitude: f64) -> PositionSample {
        PositionSample {
            timestamp_millis: 0,
            latitude,
            longitude,
            altitude: 0.0,
            speed: 0.0,
            direction: 0.0,
            horizontal_accuracy: 10.0,
            vertical_accuracy: 0.0,
        }
    }

    #[test]
    fn ids_are_not_reused_while_active() {
        let mut table = GeofenceTable::default();

        let first = table.add(37.39, -122.08, 100.0).unwrap();
        let second = table.add(37.40, -122.08, 100.0).unwrap();

        assert_eq!(first, GEOFENCE_ID_BASE);
        assert_eq!(second, GEOFENCE_ID_BASE + 1);

        table.remove(first).unwrap();
        let third = table.add(37.41, -122.08, 100.0).unwrap();
        // The cursor keeps advancing rather than handing back the freed id.
        assert_eq!(third, GEOFENCE_ID_BASE + 2);
    }

    #[test]
    fn pool_refuses_beyond_active_ceiling() {
        let mut table = GeofenceTable::default();
        for _ in 0..GEOFENCE_MAX_ACTIVE {
            table.add(37.39, -122.08, 50.0).unwrap();
        }

        assert_eq!(
            table.add(37.39, -122.08, 50.0),
            Err(ErrorCode::GeofenceTooManyGeofence)
        );
    }

    #[test]
    fn remove_unknown_id_is_reported() {
        let mut table = GeofenceTable::default();

        assert_eq!(table.remove(12345), Err(ErrorCode::GeofenceIdUnknown));
    }

    #[test]
    fn first_fix_sets_containment_and_emits_transition() {
        let mut table = GeofenceTable::default();
        let id = table.add(37.3900, -122.0800, 100.0).unwrap();

        let transitions = table.on_fix(&fix(37.3900, -122.0800));
        assert_eq!(transitions, vec![(id, GeofenceTransition::Entered)]);

        // No movement, no event.
        assert!(table.on_fix(&fix(37.3900, -122.0800)).is_empty());

        // ~1.1km north exits the fence.
        let transitions = table.on_fix(&fix(37.4000, -122.0800));
        assert_eq!(transitions, vec![(id, GeofenceTransition::Exited)]);
    }

    #[test]
    fn returning_to_added_is_an_invalid_transition() {
        let mut fence = Geofence {
            id: GEOFENCE_ID_BASE,
            latitude: 37.39,
            longitude: -122.08,
            radius_meters: 50.0,
            state: GeofenceState::Inside,
        };

        assert_eq!(
            fence.transition_to(GeofenceState::Added),
            Err(ErrorCode::GeofenceInvalidTransition)
        );
    }
}
