//! Region membership tracking and enter/exit detection

use crate::core::{Location, Region, RegionKey, RegionType};
use crate::dispatch::event::BridgeEvent;
use crate::geofence::GeofenceRegistry;
use std::collections::BTreeMap;
use tracing::debug;

/// Regions the last accepted fix is inside.
///
/// Membership covers the registered geofences containing the fix plus any
/// floor plan or venue the producer attached to it.
#[derive(Debug, Default, Clone)]
pub struct RegionTracker {
    current: BTreeMap<RegionKey, Region>,
}

impl RegionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diffs membership for one fix.
    ///
    /// Exits come first, then entries, each in ascending region key order.
    /// Membership is replaced once all events for the fix are built.
    pub fn update(&mut self, registry: &GeofenceRegistry, location: &Location) -> Vec<BridgeEvent> {
        let timestamp = location.timestamp_ms;
        let mut inside: BTreeMap<RegionKey, Region> = registry
            .containing(location)
            .into_iter()
            .map(|geofence| {
                let region = Region::geofence(geofence).with_timestamp(timestamp);
                (region.key(), region)
            })
            .collect();

        if let Some(region) = &location.region {
            if region.region_type() != RegionType::Geofence {
                inside.insert(region.key(), region.clone());
            }
        }

        let mut events = Vec::new();
        for (key, region) in &self.current {
            if !inside.contains_key(key) {
                debug!(region = %key, "Exited region");
                events.push(BridgeEvent::ExitRegion(region.clone().with_timestamp(timestamp)));
            }
        }
        for (key, region) in &inside {
            if !self.current.contains_key(key) {
                debug!(region = %key, "Entered region");
                events.push(BridgeEvent::EnterRegion(region.clone()));
            }
        }

        self.current = inside;
        events
    }

    /// Undoes the membership changes behind transitions observers never received
    pub fn revert(&mut self, undelivered: &[BridgeEvent]) {
        for event in undelivered.iter().rev() {
            match event {
                BridgeEvent::EnterRegion(region) => {
                    self.current.remove(&region.key());
                }
                BridgeEvent::ExitRegion(region) => {
                    self.current.insert(region.key(), region.clone());
                }
                _ => {}
            }
        }
    }

    pub fn contains(&self, key: &RegionKey) -> bool {
        self.current.contains_key(key)
    }

    pub fn current_keys(&self) -> Vec<RegionKey> {
        self.current.keys().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.current.clear();
    }
}
