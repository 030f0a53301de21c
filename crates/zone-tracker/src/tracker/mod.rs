// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Zone membership tracking.
//!
//! The tracker owns the per-entity state table. Every (entity, zone) pair is
//! in one of three states: absent (no record), outside, or inside. A first
//! sighting records membership silently; afterwards each change of the
//! boolean produces exactly one [`ZoneEvent`]. Reaped entities lose their
//! state without any exit event, so a later re-appearance is a first sighting
//! again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::geo::GeoPoint;
use crate::zones::ZoneRegistry;

/// A normalized, tracked entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub callsign: String,
    #[serde(flatten)]
    pub position: GeoPoint,
    /// Degrees [0, 360), `None` if never known.
    pub heading: Option<f64>,
    /// Altitude in feet.
    pub altitude: Option<i32>,
    /// Speed in knots.
    pub speed: Option<f64>,
    pub aircraft_type: Option<String>,
    pub last_seen: DateTime<Utc>,
}

/// Direction of a membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Entered,
    Left,
}

/// An enter or leave event for one (entity, zone) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneEvent {
    pub entity_id: String,
    pub callsign: String,
    pub zone: String,
    pub transition: Transition,
    pub position: GeoPoint,
    pub at: DateTime<Utc>,
}

/// Events broadcast to subscribers when the state table changes.
#[derive(Debug, Clone)]
pub enum TrackerEvent {
    /// An entity was seen for the first time (or again after reaping).
    EntityAdded(String),
    /// A zone transition was detected.
    Transition(ZoneEvent),
    /// An entity was removed after exceeding the staleness window.
    EntityRemoved(String),
}

/// Read-only view of a tracked entity for the query surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityView {
    #[serde(flatten)]
    pub entity: Entity,
    /// Names of the zones the entity is currently inside, in registry order.
    pub zones: Vec<String>,
}

/// Configuration for the zone tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Entities unseen for longer than this are reaped.
    pub stale_after: Duration,
    /// Broadcast channel capacity for events.
    pub event_channel_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(15),
            event_channel_capacity: 256,
        }
    }
}

#[derive(Debug, Clone)]
struct TrackedEntity {
    entity: Entity,
    /// Indexed like the registry's zone list.
    membership: Vec<bool>,
}

/// Per-entity zone membership state machine.
pub struct ZoneTracker {
    zones: Arc<ZoneRegistry>,
    entities: HashMap<String, TrackedEntity>,
    stale_after: Duration,
    event_tx: broadcast::Sender<TrackerEvent>,
}

impl std::fmt::Debug for ZoneTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneTracker")
            .field("entity_count", &self.entities.len())
            .field("zone_count", &self.zones.len())
            .field("stale_after", &self.stale_after)
            .finish_non_exhaustive()
    }
}

impl ZoneTracker {
    #[must_use]
    pub fn new(zones: Arc<ZoneRegistry>, config: TrackerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));
        Self {
            zones,
            entities: HashMap::new(),
            stale_after: config.stale_after,
            event_tx,
        }
    }

    #[must_use]
    pub fn zones(&self) -> &Arc<ZoneRegistry> {
        &self.zones
    }

    /// Last accepted state of an entity, used for heading fallback.
    #[must_use]
    pub fn prior(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id).map(|t| &t.entity)
    }

    /// Apply one cycle's accepted entities and return the transitions.
    ///
    /// If an id appears more than once, only its last occurrence is applied.
    /// Events come out grouped per entity (first-occurrence order) and, within
    /// an entity, in registry order.
    pub fn ingest(&mut self, entities: Vec<Entity>) -> Vec<ZoneEvent> {
        let mut batch: Vec<Entity> = Vec::with_capacity(entities.len());
        let mut index: HashMap<String, usize> = HashMap::with_capacity(entities.len());
        for entity in entities {
            if let Some(&i) = index.get(&entity.id) {
                debug!("Duplicate id {} in snapshot, keeping latest record", entity.id);
                batch[i] = entity;
            } else {
                index.insert(entity.id.clone(), batch.len());
                batch.push(entity);
            }
        }

        let mut events = Vec::new();
        for entity in batch {
            self.apply(entity, &mut events);
        }
        events
    }

    fn apply(&mut self, entity: Entity, events: &mut Vec<ZoneEvent>) {
        let membership = self.zones.membership(entity.position);

        let Some(tracked) = self.entities.get_mut(&entity.id) else {
            debug!(
                "New entity {} ({}) inside {} zone(s)",
                entity.id,
                entity.callsign,
                membership.iter().filter(|m| **m).count()
            );
            let _ = self.event_tx.send(TrackerEvent::EntityAdded(entity.id.clone()));
            self.entities
                .insert(entity.id.clone(), TrackedEntity { entity, membership });
            return;
        };

        for (zone, (was, is)) in self
            .zones
            .zones()
            .iter()
            .zip(tracked.membership.iter().zip(membership.iter()))
        {
            let transition = match (*was, *is) {
                (false, true) => Transition::Entered,
                (true, false) => Transition::Left,
                _ => continue,
            };
            let event = ZoneEvent {
                entity_id: entity.id.clone(),
                callsign: entity.callsign.clone(),
                zone: zone.name.clone(),
                transition,
                position: entity.position,
                at: entity.last_seen,
            };
            info!("{} {:?} zone {}", event.callsign, event.transition, event.zone);
            let _ = self.event_tx.send(TrackerEvent::Transition(event.clone()));
            events.push(event);
        }

        tracked.entity = entity;
        tracked.membership = membership;
    }

    /// Remove entities not seen for longer than the staleness window.
    ///
    /// No exit events are produced for zones the entity was inside.
    pub fn reap(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let stale_after = self.stale_after;
        let removed: Vec<String> = self
            .entities
            .iter()
            .filter(|(_, t)| is_older_than(t.entity.last_seen, now, stale_after))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &removed {
            self.entities.remove(id);
            debug!("Reaped stale entity {id}");
            let _ = self.event_tx.send(TrackerEvent::EntityRemoved(id.clone()));
        }
        removed
    }

    /// Recorded membership for an (entity, zone) pair; `None` when absent.
    #[must_use]
    pub fn membership(&self, id: &str, zone: &str) -> Option<bool> {
        let index = self.zones.zones().iter().position(|z| z.name == zone)?;
        self.entities.get(id).map(|t| t.membership[index])
    }

    /// Views of tracked entities seen within `max_age` of `now` (all entities
    /// when `max_age` is `None`), sorted by callsign then id.
    #[must_use]
    pub fn views(&self, now: DateTime<Utc>, max_age: Option<Duration>) -> Vec<EntityView> {
        let mut views: Vec<EntityView> = self
            .entities
            .values()
            .filter(|t| max_age.map_or(true, |age| !is_older_than(t.entity.last_seen, now, age)))
            .map(|t| EntityView {
                entity: t.entity.clone(),
                zones: self
                    .zones
                    .zones()
                    .iter()
                    .zip(&t.membership)
                    .filter(|(_, inside)| **inside)
                    .map(|(z, _)| z.name.clone())
                    .collect(),
            })
            .collect();
        views.sort_by(|a, b| {
            a.entity
                .callsign
                .cmp(&b.entity.callsign)
                .then_with(|| a.entity.id.cmp(&b.entity.id))
        });
        views
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.prior(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Subscribe to tracker events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.event_tx.subscribe()
    }
}

/// Strictly older than `window`. Timestamps in the future are never stale.
fn is_older_than(last_seen: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    (now - last_seen).to_std().is_ok_and(|age| age > window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::Zone;
    use chrono::TimeDelta;

    fn mainland() -> Arc<ZoneRegistry> {
        Arc::new(
            ZoneRegistry::new(vec![Zone::new(
                "Mainland",
                vec![
                    GeoPoint::new(0.0, 0.0),
                    GeoPoint::new(0.0, 10.0),
                    GeoPoint::new(10.0, 10.0),
                    GeoPoint::new(10.0, 0.0),
                ],
            )])
            .unwrap(),
        )
    }

    fn two_zones() -> Arc<ZoneRegistry> {
        let square = |name: &str, lo: f64, hi: f64| {
            Zone::new(
                name,
                vec![
                    GeoPoint::new(lo, lo),
                    GeoPoint::new(lo, hi),
                    GeoPoint::new(hi, hi),
                    GeoPoint::new(hi, lo),
                ],
            )
        };
        Arc::new(ZoneRegistry::new(vec![square("Outer", 0.0, 20.0), square("Inner", 5.0, 10.0)]).unwrap())
    }

    fn entity(id: &str, lat: f64, lon: f64, at: DateTime<Utc>) -> Entity {
        Entity {
            id: id.to_string(),
            callsign: format!("{id}[IAF]"),
            position: GeoPoint::new(lat, lon),
            heading: None,
            altitude: None,
            speed: None,
            aircraft_type: None,
            last_seen: at,
        }
    }

    fn tracker(zones: Arc<ZoneRegistry>) -> ZoneTracker {
        ZoneTracker::new(
            zones,
            TrackerConfig {
                stale_after: Duration::from_secs(15),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_first_sighting_emits_nothing() {
        let mut t = tracker(mainland());
        let now = Utc::now();
        assert!(t.ingest(vec![entity("A", 5.0, 5.0, now), entity("B", 20.0, 20.0, now)]).is_empty());
        assert_eq!(t.membership("A", "Mainland"), Some(true));
        assert_eq!(t.membership("B", "Mainland"), Some(false));
        assert_eq!(t.membership("C", "Mainland"), None);
    }

    #[test]
    fn test_enter_emits_exactly_once() {
        let mut t = tracker(mainland());
        let now = Utc::now();
        t.ingest(vec![entity("A", 20.0, 20.0, now)]);

        let events = t.ingest(vec![entity("A", 5.0, 5.0, now)]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].zone, "Mainland");
        assert_eq!(events[0].transition, Transition::Entered);
        assert_eq!(events[0].callsign, "A[IAF]");

        assert!(t.ingest(vec![entity("A", 5.0, 5.0, now)]).is_empty());
    }

    #[test]
    fn test_identical_snapshot_replay_is_silent() {
        let mut t = tracker(two_zones());
        let now = Utc::now();
        let snapshot = vec![entity("A", 7.0, 7.0, now), entity("B", 2.0, 2.0, now)];
        t.ingest(snapshot.clone());
        t.ingest(vec![entity("A", 30.0, 30.0, now), entity("B", 7.0, 7.0, now)]);
        assert!(!t.ingest(snapshot.clone()).is_empty());
        assert!(t.ingest(snapshot).is_empty());
    }

    #[test]
    fn test_multiple_transitions_in_registry_order() {
        let mut t = tracker(two_zones());
        let now = Utc::now();
        t.ingest(vec![entity("A", 30.0, 30.0, now)]);

        let events = t.ingest(vec![entity("A", 7.0, 7.0, now)]);
        let zones: Vec<_> = events.iter().map(|e| e.zone.as_str()).collect();
        assert_eq!(zones, ["Outer", "Inner"]);
        assert!(events.iter().all(|e| e.transition == Transition::Entered));

        let events = t.ingest(vec![entity("A", 2.0, 2.0, now)]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].zone, "Inner");
        assert_eq!(events[0].transition, Transition::Left);
    }

    #[test]
    fn test_duplicate_ids_keep_last_record() {
        let mut t = tracker(mainland());
        let now = Utc::now();
        t.ingest(vec![entity("A", 20.0, 20.0, now)]);

        let events = t.ingest(vec![entity("A", 5.0, 5.0, now), entity("A", 25.0, 25.0, now)]);
        assert!(events.is_empty());
        assert_eq!(t.membership("A", "Mainland"), Some(false));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_reaped_entity_reappears_as_new() {
        let mut t = tracker(mainland());
        let start = Utc::now();
        t.ingest(vec![entity("A", 5.0, 5.0, start)]);

        assert!(t.reap(start + TimeDelta::seconds(15)).is_empty());
        assert_eq!(t.reap(start + TimeDelta::seconds(16)), vec!["A".to_string()]);
        assert!(t.is_empty());

        let later = start + TimeDelta::seconds(20);
        assert!(t.ingest(vec![entity("A", 5.0, 5.0, later)]).is_empty());
        assert!(t.ingest(vec![entity("A", 5.0, 5.0, later)]).is_empty());
        assert_eq!(t.membership("A", "Mainland"), Some(true));
    }

    #[test]
    fn test_mainland_scenario() {
        let mut t = tracker(mainland());
        let t0 = Utc::now();
        let at = |cycle: i64| t0 + TimeDelta::seconds(2 * cycle);
        let mut all = Vec::new();

        all.extend(t.ingest(vec![entity("A", 5.0, 5.0, at(1))]));
        t.reap(at(1));
        assert!(all.is_empty());

        all.extend(t.ingest(vec![entity("A", 5.0, 5.0, at(2))]));
        t.reap(at(2));
        assert!(all.is_empty());

        let left = t.ingest(vec![entity("A", 20.0, 20.0, at(3))]);
        t.reap(at(3));
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].transition, Transition::Left);
        assert_eq!(left[0].zone, "Mainland");
        assert_eq!(left[0].entity_id, "A");

        t.ingest(vec![]);
        t.reap(at(4));

        let b = t.ingest(vec![entity("B", 5.0, 5.0, at(5))]);
        assert!(b.is_empty());
    }

    #[test]
    fn test_views_filter_by_age_and_list_zones() {
        let mut t = tracker(two_zones());
        let now = Utc::now();
        t.ingest(vec![
            entity("B", 7.0, 7.0, now),
            entity("A", 2.0, 2.0, now - TimeDelta::seconds(10)),
        ]);

        let all = t.views(now, None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].entity.id, "A");
        assert_eq!(all[0].zones, ["Outer"]);
        assert_eq!(all[1].zones, ["Outer", "Inner"]);

        let recent = t.views(now, Some(Duration::from_secs(5)));
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].entity.id, "B");
    }

    #[test]
    fn test_broadcast_events() {
        let mut t = tracker(mainland());
        let mut rx = t.subscribe();
        let now = Utc::now();

        t.ingest(vec![entity("A", 20.0, 20.0, now)]);
        t.ingest(vec![entity("A", 5.0, 5.0, now)]);
        t.reap(now + TimeDelta::seconds(60));

        assert!(matches!(rx.try_recv(), Ok(TrackerEvent::EntityAdded(id)) if id == "A"));
        assert!(matches!(
            rx.try_recv(),
            Ok(TrackerEvent::Transition(ZoneEvent { transition: Transition::Entered, .. }))
        ));
        assert!(matches!(rx.try_recv(), Ok(TrackerEvent::EntityRemoved(id)) if id == "A"));
    }
}
