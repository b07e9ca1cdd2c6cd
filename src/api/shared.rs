//! Conventional process-wide manager instance.
//!
//! Nothing is created implicitly: the host installs an instance, fetches it
//! where needed and tears it down explicitly.

use crate::api::manager::LocationManager;
use parking_lot::{const_mutex, Mutex};
use tracing::info;

static SHARED: Mutex<Option<LocationManager>> = const_mutex(None);

/// Installs `manager` as the shared instance, returning the one it replaces.
///
/// The replaced manager is not shut down.
pub fn install(manager: LocationManager) -> Option<LocationManager> {
    let previous = SHARED.lock().replace(manager);
    info!(replaced = previous.is_some(), "Shared location manager installed");
    previous
}

/// The shared instance, if one is installed
pub fn instance() -> Option<LocationManager> {
    SHARED.lock().clone()
}

/// Removes and shuts down the shared instance; false when none was installed
pub fn teardown() -> bool {
    let manager = SHARED.lock().take();
    match manager {
        Some(manager) => {
            manager.shutdown();
            true
        }
        None => false,
    }
}
