//! DIAL applications: the registry the HTTP layer dispatches into, and the two
//! apps every receiver registers (the casting app and `system`).

pub mod cast;
pub mod data;
pub mod registry;
pub mod system;

use std::sync::Arc;

pub use cast::{CastApp, YOUTUBE_APP, YOUTUBE_ORIGINS};
pub use data::{DialData, DialDataStore, FileDataStore, MemoryDataStore};
pub use registry::{AppRegistration, DialApp, DialAppRegistry, LaunchRequest, OriginPolicy};
pub use system::{SystemApp, SYSTEM_APP};

use crate::service::{EventSink, SharedCallbacks};
use crate::Result;

/// Registry with the casting app (backed by the shared callback table) and
/// the `system` app.
pub fn default_registry(callbacks: SharedCallbacks, events: EventSink) -> Result<DialAppRegistry> {
    let mut registry = DialAppRegistry::new();
    registry.register(
        YOUTUBE_APP,
        YOUTUBE_ORIGINS,
        true,
        Arc::new(CastApp::youtube(callbacks, events)),
    )?;
    registry.register(SYSTEM_APP, "", false, Arc::new(SystemApp))?;
    Ok(registry)
}
