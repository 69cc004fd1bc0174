//! Session Registry
//!
//! Tracks the hub session id that threads quote polls into the swap submit.
//! The id from the latest successful quote is fed into the next quote
//! request; a session that took part in a failed swap is burned and never
//! sent again, so a retry always starts from a fresh server-minted session.
//!
//! Created: 2026-10-04

use std::collections::HashSet;
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct SessionState {
    current: Option<String>,
    burned: HashSet<String>,
}

/// Shared between the quote engine (reader/observer) and the swap executor (burner)
#[derive(Debug, Default)]
pub struct SessionRegistry {
    inner: Mutex<SessionState>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Session id to send with the next quote request
    pub fn current(&self) -> Option<String> {
        self.with_state(|s| s.current.clone())
    }

    /// Record the id from a successful quote response. Burned ids are ignored.
    pub fn observe(&self, session_id: &str) -> bool {
        self.with_state(|s| {
            if s.burned.contains(session_id) {
                debug!("Ignoring burned session id {}", session_id);
                return false;
            }
            s.current = Some(session_id.to_string());
            true
        })
    }

    /// Mark a session as failed; clears it if it is the current one
    pub fn burn(&self, session_id: &str) {
        self.with_state(|s| {
            s.burned.insert(session_id.to_string());
            if s.current.as_deref() == Some(session_id) {
                s.current = None;
            }
        });
        debug!("Session {} burned", session_id);
    }

    pub fn is_burned(&self, session_id: &str) -> bool {
        self.with_state(|s| s.burned.contains(session_id))
    }

    /// Forget the current id (e.g. after a successful swap)
    pub fn clear_current(&self) {
        self.with_state(|s| s.current = None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_then_burn() {
        let sessions = SessionRegistry::new();
        assert!(sessions.current().is_none());

        assert!(sessions.observe("s-1"));
        assert_eq!(sessions.current().as_deref(), Some("s-1"));

        sessions.burn("s-1");
        assert!(sessions.current().is_none());
        assert!(sessions.is_burned("s-1"));

        // Backend echoing a burned id must not bring it back
        assert!(!sessions.observe("s-1"));
        assert!(sessions.current().is_none());

        assert!(sessions.observe("s-2"));
        assert_eq!(sessions.current().as_deref(), Some("s-2"));
    }

    #[test]
    fn test_burning_other_session_keeps_current() {
        let sessions = SessionRegistry::new();
        sessions.observe("s-2");
        sessions.burn("s-1");
        assert_eq!(sessions.current().as_deref(), Some("s-2"));
    }
}
