use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

use crate::{AppStatus, DialError, Result, SessionId};

pub type StartCallback = Arc<dyn Fn(SessionId, &str) + Send + Sync>;
pub type SessionCallback = Arc<dyn Fn(SessionId) + Send + Sync>;
pub type StatusCallback = Arc<dyn Fn(SessionId) -> AppStatus + Send + Sync>;

/// Application-layer hooks for the casting app.
///
/// All of them are called synchronously from request-handling tasks, so they
/// must return quickly and must not wait on a UI thread. `on_status` in
/// particular should be a lock-protected lookup of whatever session set the
/// application keeps. Stop may be delivered more than once for a session.
#[derive(Clone, Default)]
pub struct DialCallbacks {
    pub on_start: Option<StartCallback>,
    pub on_hide: Option<SessionCallback>,
    pub on_stop: Option<SessionCallback>,
    pub on_status: Option<StatusCallback>,
}

impl DialCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start<F>(mut self, f: F) -> Self
    where
        F: Fn(SessionId, &str) + Send + Sync + 'static,
    {
        self.on_start = Some(Arc::new(f));
        self
    }

    pub fn on_hide<F>(mut self, f: F) -> Self
    where
        F: Fn(SessionId) + Send + Sync + 'static,
    {
        self.on_hide = Some(Arc::new(f));
        self
    }

    pub fn on_stop<F>(mut self, f: F) -> Self
    where
        F: Fn(SessionId) + Send + Sync + 'static,
    {
        self.on_stop = Some(Arc::new(f));
        self
    }

    pub fn on_status<F>(mut self, f: F) -> Self
    where
        F: Fn(SessionId) -> AppStatus + Send + Sync + 'static,
    {
        self.on_status = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for DialCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialCallbacks")
            .field("on_start", &self.on_start.is_some())
            .field("on_hide", &self.on_hide.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .field("on_status", &self.on_status.is_some())
            .finish()
    }
}

/// The callback table shared between the controller and the request tasks.
///
/// Readers clone the callback they need under the lock and call it after the
/// lock is released, so a slow callback never blocks `init`/`uninit`.
#[derive(Clone, Default)]
pub struct SharedCallbacks {
    inner: Arc<RwLock<Option<DialCallbacks>>>,
}

impl SharedCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, callbacks: DialCallbacks) {
        *self.inner.write() = Some(callbacks);
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    pub fn is_installed(&self) -> bool {
        self.inner.read().is_some()
    }

    pub fn set_status_callback(&self, callback: Option<StatusCallback>) -> Result<()> {
        match self.inner.write().as_mut() {
            Some(callbacks) => {
                callbacks.on_status = callback;
                Ok(())
            }
            None => Err(DialError::NotInitialized),
        }
    }

    fn pick<T: Clone>(&self, select: impl FnOnce(&DialCallbacks) -> Option<T>) -> Option<T> {
        self.inner.read().as_ref().and_then(select)
    }

    pub fn notify_start(&self, session: SessionId, url: &str) {
        if let Some(cb) = self.pick(|c| c.on_start.clone()) {
            cb(session, url);
        }
    }

    pub fn notify_hide(&self, session: SessionId) {
        if let Some(cb) = self.pick(|c| c.on_hide.clone()) {
            cb(session);
        }
    }

    pub fn notify_stop(&self, session: SessionId) {
        if let Some(cb) = self.pick(|c| c.on_stop.clone()) {
            cb(session);
        }
    }

    /// Running/can-stop for `session`; Running when nobody answers.
    pub fn query_status(&self, session: SessionId) -> AppStatus {
        match self.pick(|c| c.on_status.clone()) {
            Some(cb) => cb(session),
            None => AppStatus::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_status_fails_open_without_callback() {
        let shared = SharedCallbacks::new();
        assert_eq!(shared.query_status(SessionId(1)), AppStatus::running());

        shared.install(DialCallbacks::new());
        assert_eq!(shared.query_status(SessionId(1)), AppStatus::running());
    }

    #[test]
    fn test_clear_detaches_callbacks() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let shared = SharedCallbacks::new();
        shared.install(DialCallbacks::new().on_stop(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        shared.notify_stop(SessionId(3));
        shared.clear();
        shared.notify_stop(SessionId(3));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!shared.is_installed());
    }

    #[test]
    fn test_callback_may_reenter_the_table() {
        // A callback reading the table again must not deadlock.
        let shared = SharedCallbacks::new();
        let inner = shared.clone();
        shared.install(DialCallbacks::new().on_hide(move |session| {
            let _ = inner.query_status(session);
        }));
        shared.notify_hide(SessionId(1));
    }

    #[test]
    fn test_set_status_callback_requires_table() {
        let shared = SharedCallbacks::new();
        let cb: StatusCallback = Arc::new(|_| AppStatus::stopped());
        assert!(shared.set_status_callback(Some(cb.clone())).is_err());

        shared.install(DialCallbacks::new());
        shared.set_status_callback(Some(cb)).unwrap();
        assert_eq!(shared.query_status(SessionId(9)), AppStatus::stopped());
    }
}
