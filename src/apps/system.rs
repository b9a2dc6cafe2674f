use tracing::{debug, info};

use crate::{AppStatus, SessionId};

use super::registry::{DialApp, LaunchRequest};

pub const SYSTEM_APP: &str = "system";

/// The `system` application senders query for origin and capability
/// negotiation. It launches nothing and cannot be stopped.
#[derive(Debug, Default)]
pub struct SystemApp;

impl DialApp for SystemApp {
    fn start(&self, launch: &LaunchRequest<'_>) {
        info!("System request (session {})", launch.session);
        debug!("System payload: {:?}", launch.payload);
    }

    fn status(&self, _session: SessionId) -> AppStatus {
        AppStatus {
            running: true,
            can_stop: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_is_running_and_not_stoppable() {
        let app = SystemApp;
        let status = app.status(SessionId(1));
        assert!(status.running);
        assert!(!status.can_stop);
        assert!(!app.can_stop());
        assert!(!app.can_hide());
    }
}
