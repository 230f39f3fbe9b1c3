//! Authorization requests parked while the browser visits an external provider.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::protocol::AuthorizeRequest;
use crate::shared::crypto::random_handle;

#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub request: AuthorizeRequest,
    pub provider: String,
    created_at: Instant,
}

/// TTL-bounded map keyed by an opaque state value
pub struct PendingAuthorizations {
    entries: DashMap<String, PendingAuthorization>,
    ttl: Duration,
}

impl PendingAuthorizations {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Park a request; returns the state to hand to the provider
    pub fn insert(&self, request: AuthorizeRequest, provider: &str) -> String {
        let state = random_handle();
        self.entries.insert(
            state.clone(),
            PendingAuthorization {
                request,
                provider: provider.to_string(),
                created_at: Instant::now(),
            },
        );
        state
    }

    /// Remove and return the parked request; each state is usable once
    pub fn take(&self, state: &str) -> Option<PendingAuthorization> {
        self.entries
            .remove(state)
            .map(|(_, pending)| pending)
            .filter(|pending| pending.created_at.elapsed() < self.ttl)
    }

    pub fn prune_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, pending| pending.created_at.elapsed() < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PendingAuthorizations {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AuthorizeRequest {
        AuthorizeRequest::new("web", "https://app/cb", "openid")
    }

    #[test]
    fn test_take_is_single_use() {
        let pending = PendingAuthorizations::default();
        let state = pending.insert(request(), "github");

        let taken = pending.take(&state).unwrap();
        assert_eq!(taken.provider, "github");
        assert_eq!(taken.request.client_id, "web");
        assert!(pending.take(&state).is_none());
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let pending = PendingAuthorizations::new(Duration::ZERO);
        let state = pending.insert(request(), "github");
        pending.insert(request(), "github");

        assert!(pending.take(&state).is_none());
        assert_eq!(pending.prune_expired(), 1);
        assert!(pending.is_empty());
    }
}
