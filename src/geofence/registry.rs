//! Set of monitored geofences keyed by identifier

use crate::core::Location;
use crate::geofence::{Geofence, GeometryError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Monitored geofences.
///
/// Iteration order is ascending identifier, which is also the order used for
/// containment results.
#[derive(Debug, Default, Clone)]
pub struct GeofenceRegistry {
    geofences: BTreeMap<String, Arc<Geofence>>,
}

impl GeofenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a geofence, fully replacing any entry with the same identifier.
    ///
    /// Returns the replaced geofence. On error the registry is unchanged.
    pub fn register(&mut self, geofence: Geofence) -> Result<Option<Arc<Geofence>>, GeometryError> {
        geofence.validate()?;
        let id = geofence.identifier().to_string();
        let previous = self.geofences.insert(id.clone(), Arc::new(geofence));
        if previous.is_some() {
            info!(geofence = %id, "Replaced monitored geofence");
        } else {
            info!(geofence = %id, "Started monitoring geofence");
        }
        Ok(previous)
    }

    /// Stops monitoring a geofence; unknown geofences are ignored
    pub fn unregister(&mut self, geofence: &Geofence) -> Option<Arc<Geofence>> {
        self.remove(geofence.identifier())
    }

    /// Stops monitoring by identifier; `None` when it was not monitored
    pub fn remove(&mut self, identifier: &str) -> Option<Arc<Geofence>> {
        let removed = self.geofences.remove(identifier);
        match removed {
            Some(_) => info!(geofence = %identifier, "Stopped monitoring geofence"),
            None => debug!(geofence = %identifier, "Geofence was not monitored"),
        }
        removed
    }

    pub fn get(&self, identifier: &str) -> Option<&Arc<Geofence>> {
        self.geofences.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.geofences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geofences.is_empty()
    }

    /// Ordered copy of the monitored set
    pub fn snapshot(&self) -> Vec<Arc<Geofence>> {
        self.geofences.values().cloned().collect()
    }

    /// Every geofence containing the location, in ascending identifier order
    pub fn containing(&self, location: &Location) -> Vec<Arc<Geofence>> {
        self.geofences
            .values()
            .filter(|g| g.contains(location))
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) {
        self.geofences.clear();
    }
}
