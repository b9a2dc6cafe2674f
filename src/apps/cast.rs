use tracing::info;

use crate::service::{DialEvent, EventSink, SharedCallbacks};
use crate::{AppStatus, SessionId};

use super::registry::{DialApp, LaunchRequest};

pub const YOUTUBE_APP: &str = "YouTube";
pub const YOUTUBE_ORIGINS: &str = "https://youtube.com https://*.youtube.com package:*";
pub const YOUTUBE_TV_URL: &str = "https://www.youtube.com/tv";

/// Builds the URL handed to the player: the base URL plus every non-empty
/// query fragment, joined with `&`.
pub fn launch_url(base: &str, payload: &str, additional_data_url: Option<&str>) -> String {
    let fragments: Vec<&str> = [payload, additional_data_url.unwrap_or("")]
        .into_iter()
        .map(|f| f.trim_start_matches(['?', '&']))
        .filter(|f| !f.is_empty())
        .collect();

    if fragments.is_empty() {
        return base.to_string();
    }

    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base, separator, fragments.join("&"))
}

/// The casting receiver app. It keeps no state of its own: launches, hides
/// and stops go to the application layer, and so does every status query.
pub struct CastApp {
    name: String,
    base_url: String,
    callbacks: SharedCallbacks,
    events: EventSink,
}

impl CastApp {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        callbacks: SharedCallbacks,
        events: EventSink,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            callbacks,
            events,
        }
    }

    pub fn youtube(callbacks: SharedCallbacks, events: EventSink) -> Self {
        Self::new(YOUTUBE_APP, YOUTUBE_TV_URL, callbacks, events)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl DialApp for CastApp {
    fn start(&self, launch: &LaunchRequest<'_>) {
        let url = launch_url(&self.base_url, launch.payload, launch.additional_data_url);
        info!("Launching {} session {}: {}", self.name, launch.session, url);

        self.callbacks.notify_start(launch.session, &url);
        self.events.publish(DialEvent::Started {
            app: self.name.clone(),
            session: launch.session,
            url,
        });
    }

    fn status(&self, session: SessionId) -> AppStatus {
        self.callbacks.query_status(session)
    }

    fn hide(&self, session: SessionId) {
        info!("Hiding {} session {}", self.name, session);
        self.callbacks.notify_hide(session);
        self.events.publish(DialEvent::Hidden {
            app: self.name.clone(),
            session,
        });
    }

    fn stop(&self, session: SessionId) {
        info!("Stopping {} session {}", self.name, session);
        self.callbacks.notify_stop(session);
        self.events.publish(DialEvent::Stopped {
            app: self.name.clone(),
            session,
        });
    }

    fn can_stop(&self) -> bool {
        true
    }

    fn can_hide(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::DialCallbacks;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_launch_url_fragments() {
        assert_eq!(launch_url(YOUTUBE_TV_URL, "", None), "https://www.youtube.com/tv");
        assert_eq!(
            launch_url(YOUTUBE_TV_URL, "pairingCode=abc&v=xyz", None),
            "https://www.youtube.com/tv?pairingCode=abc&v=xyz"
        );
        assert_eq!(
            launch_url(YOUTUBE_TV_URL, "v=xyz", Some("additionalDataUrl=http%3A%2F%2Flocalhost")),
            "https://www.youtube.com/tv?v=xyz&additionalDataUrl=http%3A%2F%2Flocalhost"
        );
        assert_eq!(
            launch_url(YOUTUBE_TV_URL, "", Some("additionalDataUrl=x")),
            "https://www.youtube.com/tv?additionalDataUrl=x"
        );
        assert_eq!(launch_url("https://host/tv?lang=en", "v=1", None), "https://host/tv?lang=en&v=1");
    }

    #[tokio::test]
    async fn test_start_dispatches_callback_and_event() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let callbacks = SharedCallbacks::new();
        callbacks.install(DialCallbacks::new().on_start(move |session, url| {
            sink.lock().push((session, url.to_string()));
        }));
        let events = EventSink::default();
        let mut rx = events.subscribe();

        let app = CastApp::youtube(callbacks, events);
        app.start(&LaunchRequest {
            session: SessionId(7),
            payload: "v=abc",
            query_string: "",
            additional_data_url: None,
        });

        let expected_url = "https://www.youtube.com/tv?v=abc".to_string();
        assert_eq!(seen.lock().as_slice(), &[(SessionId(7), expected_url.clone())]);
        assert_eq!(
            rx.recv().await.unwrap(),
            DialEvent::Started {
                app: "YouTube".into(),
                session: SessionId(7),
                url: expected_url,
            }
        );
    }

    #[test]
    fn test_status_comes_from_application_layer() {
        let callbacks = SharedCallbacks::new();
        callbacks.install(DialCallbacks::new().on_status(|session| AppStatus {
            running: session == SessionId(1),
            can_stop: false,
        }));
        let app = CastApp::youtube(callbacks, EventSink::default());

        assert!(app.status(SessionId(1)).running);
        assert!(!app.status(SessionId(2)).running);
        assert!(!app.status(SessionId(1)).can_stop);
    }
}
