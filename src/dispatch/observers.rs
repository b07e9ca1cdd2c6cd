//! Ordered set of registered observers

use crate::dispatch::observer::LocationObserver;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Registration handle returned by `add`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ObserverHandle(pub(crate) u64);

impl ObserverHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObserverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

pub type ObserverEntry = (ObserverHandle, Arc<dyn LocationObserver>);

/// Observers in registration order.
///
/// The registry holds the only strong reference the bridge keeps; removing
/// an observer releases it.
#[derive(Default)]
pub struct ObserverRegistry {
    next_id: u64,
    entries: Vec<ObserverEntry>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, observer: Arc<dyn LocationObserver>) -> ObserverHandle {
        self.next_id += 1;
        let handle = ObserverHandle(self.next_id);
        self.entries.push((handle, observer));
        handle
    }

    /// Returns false for unknown handles
    pub fn remove(&mut self, handle: ObserverHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(h, _)| *h != handle);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of the current list for one dispatch cycle
    pub fn snapshot(&self) -> Vec<ObserverEntry> {
        self.entries.clone()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
