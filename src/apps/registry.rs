use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{AppStatus, DialError, DialStatus, Result, SessionId};

/// What a launch request carries once the transport has taken it apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest<'a> {
    pub session: SessionId,
    /// Request body, passed through untouched.
    pub payload: &'a str,
    pub query_string: &'a str,
    /// `additionalDataUrl=...` fragment, for apps that asked for one.
    pub additional_data_url: Option<&'a str>,
}

/// Per-application handler table.
///
/// Every method runs on a request-handling task and must answer quickly; the
/// registry holds no lock while calling into it.
pub trait DialApp: Send + Sync {
    /// Launch notification. The registry reports Running whatever happens
    /// here: the receiver app reports its own liveness through `status`.
    fn start(&self, launch: &LaunchRequest<'_>);

    fn status(&self, session: SessionId) -> AppStatus;

    fn hide(&self, _session: SessionId) {}

    fn stop(&self, _session: SessionId) {}

    fn can_stop(&self) -> bool {
        false
    }

    /// Whether `hide` does anything. The DIAL server answers 501 otherwise.
    fn can_hide(&self) -> bool {
        false
    }
}

/// Space-separated origin patterns a registration accepts. `*` matches any
/// run of characters, so `https://*.youtube.com` and `package:*` work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginPolicy {
    patterns: Vec<String>,
}

impl OriginPolicy {
    pub fn parse(allowed: &str) -> Self {
        Self {
            patterns: allowed.split_whitespace().map(str::to_string).collect(),
        }
    }

    /// Requests without an `Origin` header come from native senders and are
    /// always allowed.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        match origin {
            None => true,
            Some(origin) => self.patterns.iter().any(|p| wildcard_match(p, origin)),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p = pattern.as_bytes();
    let t = text.as_bytes();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && p[pi] == b'*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if pi < p.len() && p[pi].eq_ignore_ascii_case(&t[ti]) {
            pi += 1;
            ti += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == b'*')
}

#[derive(Clone)]
pub struct AppRegistration {
    pub name: String,
    pub origins: OriginPolicy,
    pub use_additional_data: bool,
    pub app: Arc<dyn DialApp>,
}

impl std::fmt::Debug for AppRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppRegistration")
            .field("name", &self.name)
            .field("origins", &self.origins)
            .field("use_additional_data", &self.use_additional_data)
            .finish_non_exhaustive()
    }
}

/// Applications the DIAL server exposes under `/apps/`.
///
/// Filled once before serving starts, then shared read-only. No session
/// table is kept: liveness always comes from the application itself.
pub struct DialAppRegistry {
    apps: HashMap<String, AppRegistration>,
    next_session: AtomicU32,
    last_session: DashMap<String, SessionId>,
}

impl DialAppRegistry {
    pub fn new() -> Self {
        Self {
            apps: HashMap::new(),
            next_session: AtomicU32::new(1),
            last_session: DashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        name: &str,
        allowed_origins: &str,
        use_additional_data: bool,
        app: Arc<dyn DialApp>,
    ) -> Result<()> {
        if name.trim().is_empty() {
            return Err(DialError::InvalidAppName);
        }
        if self.apps.contains_key(name) {
            return Err(DialError::DuplicateApp(name.to_string()));
        }

        self.apps.insert(
            name.to_string(),
            AppRegistration {
                name: name.to_string(),
                origins: OriginPolicy::parse(allowed_origins),
                use_additional_data,
                app,
            },
        );
        info!("Registered DIAL application '{}'", name);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&AppRegistration> {
        self.apps
            .get(name)
            .ok_or_else(|| DialError::UnknownApp(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.apps.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn issue_session(&self) -> SessionId {
        loop {
            let id = self.next_session.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return SessionId(id);
            }
        }
    }

    /// Most recent session launched for `name`, if any.
    pub fn last_session(&self, name: &str) -> Option<SessionId> {
        self.last_session.get(name).map(|entry| *entry.value())
    }

    pub fn start(
        &self,
        name: &str,
        payload: &str,
        query_string: &str,
        additional_data_url: Option<&str>,
    ) -> Result<(DialStatus, SessionId)> {
        let registration = self.lookup(name)?;
        let session = self.issue_session();

        registration.app.start(&LaunchRequest {
            session,
            payload,
            query_string,
            additional_data_url,
        });
        self.last_session.insert(name.to_string(), session);

        debug!("Launched {} as session {}", name, session);
        Ok((DialStatus::Running, session))
    }

    pub fn status(&self, name: &str, session: SessionId) -> Result<AppStatus> {
        let registration = self.lookup(name)?;
        Ok(registration.app.status(session))
    }

    /// Asks the app to hide `session`, then reports its status afterwards.
    pub fn hide(&self, name: &str, session: SessionId) -> Result<AppStatus> {
        let registration = self.lookup(name)?;
        registration.app.hide(session);
        Ok(registration.app.status(session))
    }

    pub fn stop(&self, name: &str, session: SessionId) -> Result<()> {
        let registration = self.lookup(name)?;
        registration.app.stop(session);
        Ok(())
    }
}

impl Default for DialAppRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    /// Test double keeping the running set the way an embedding app would.
    #[derive(Default)]
    struct Tracker {
        running: Mutex<HashSet<SessionId>>,
        stops: Mutex<Vec<SessionId>>,
        hides: Mutex<Vec<SessionId>>,
    }

    impl DialApp for Tracker {
        fn start(&self, launch: &LaunchRequest<'_>) {
            self.running.lock().insert(launch.session);
        }

        fn status(&self, session: SessionId) -> AppStatus {
            if self.running.lock().contains(&session) {
                AppStatus::running()
            } else {
                AppStatus::stopped()
            }
        }

        fn hide(&self, session: SessionId) {
            self.hides.lock().push(session);
        }

        fn stop(&self, session: SessionId) {
            self.stops.lock().push(session);
            self.running.lock().remove(&session);
        }

        fn can_stop(&self) -> bool {
            true
        }

        fn can_hide(&self) -> bool {
            true
        }
    }

    fn registry_with(tracker: Arc<Tracker>) -> DialAppRegistry {
        let mut registry = DialAppRegistry::new();
        registry
            .register("YouTube", "https://*.youtube.com", false, tracker)
            .unwrap();
        registry
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let tracker = Arc::new(Tracker::default());
        let mut registry = registry_with(tracker.clone());

        let err = registry
            .register("YouTube", "", false, tracker)
            .unwrap_err();
        assert!(matches!(err, DialError::DuplicateApp(ref name) if name == "YouTube"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("YouTube").unwrap().origins.patterns(), ["https://*.youtube.com"]);
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut registry = DialAppRegistry::new();
        let err = registry
            .register("  ", "", false, Arc::new(Tracker::default()))
            .unwrap_err();
        assert!(matches!(err, DialError::InvalidAppName));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_app_lookup_fails() {
        let registry = DialAppRegistry::new();
        assert!(matches!(registry.lookup("Netflix"), Err(DialError::UnknownApp(_))));
        assert!(registry.status("Netflix", SessionId(1)).is_err());
    }

    #[test]
    fn test_start_then_status_is_running() {
        let tracker = Arc::new(Tracker::default());
        let registry = registry_with(tracker);

        let (status, session) = registry.start("YouTube", "v=abc", "", None).unwrap();
        assert_eq!(status, DialStatus::Running);
        assert_eq!(registry.status("YouTube", session).unwrap().status(), DialStatus::Running);
        assert_eq!(registry.last_session("YouTube"), Some(session));
    }

    #[test]
    fn test_sessions_are_monotonic() {
        let registry = registry_with(Arc::new(Tracker::default()));
        let (_, first) = registry.start("YouTube", "", "", None).unwrap();
        let (_, second) = registry.start("YouTube", "", "", None).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_stop_twice_is_harmless() {
        let tracker = Arc::new(Tracker::default());
        let registry = registry_with(tracker.clone());
        let (_, session) = registry.start("YouTube", "", "", None).unwrap();

        registry.stop("YouTube", session).unwrap();
        registry.stop("YouTube", session).unwrap();

        assert_eq!(registry.status("YouTube", session).unwrap().status(), DialStatus::Stopped);
        assert!(tracker.stops.lock().iter().all(|s| *s == session));
    }

    #[test]
    fn test_unknown_session_is_passed_through() {
        let tracker = Arc::new(Tracker::default());
        let registry = registry_with(tracker.clone());

        let hidden = registry.hide("YouTube", SessionId(999)).unwrap();
        assert_eq!(hidden.status(), DialStatus::Stopped);
        assert_eq!(tracker.hides.lock().as_slice(), &[SessionId(999)]);
    }

    #[test]
    fn test_origin_policy() {
        let policy = OriginPolicy::parse("https://youtube.com https://*.youtube.com package:*");
        assert!(policy.allows(None));
        assert!(policy.allows(Some("https://youtube.com")));
        assert!(policy.allows(Some("https://www.youtube.com")));
        assert!(policy.allows(Some("package:com.google.android.youtube")));
        assert!(!policy.allows(Some("https://evil.example")));
        assert!(!policy.allows(Some("https://youtube.com.evil.example")));

        let empty = OriginPolicy::parse("");
        assert!(empty.allows(None));
        assert!(!empty.allows(Some("https://youtube.com")));
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("a*c", "abbbc"));
        assert!(wildcard_match("a*b*c", "axxbyyc"));
        assert!(!wildcard_match("a*c", "abcd"));
        assert!(wildcard_match("https://*.youtube.com:443", "https://m.youtube.com:443"));
    }
}
