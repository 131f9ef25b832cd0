//! The CSRF token slot (§4.5.1): the one piece of process-wide mutable
//! state in the bridge.
//!
//! Cookie accumulation across the fetch and the write request is handled by
//! the shared `reqwest::Client`'s cookie jar (`ReqwestClient` is built with
//! `cookie_store(true)`), so the slot here only needs to track the token
//! itself plus the "somebody is already fetching" condition.

use tokio::sync::Mutex;

/// `Unknown` / `Held` / `Fetching` collapsed into an `Option` behind a
/// mutex: `None` is `Unknown`, `Some(token)` is `Held`. The mutex guard
/// itself is the "Fetching" state — a second writer blocks on `lock()`
/// until the first finishes its fetch-then-retry round trip, satisfying
/// the "at most one concurrent token fetch" rule without a separate
/// condition variable.
pub struct CsrfSlot {
    token: Mutex<Option<String>>,
}

impl CsrfSlot {
    pub fn new() -> Self {
        Self {
            token: Mutex::new(None),
        }
    }

    /// Returns the currently held token, if any, without fetching.
    pub async fn peek(&self) -> Option<String> {
        self.token.lock().await.clone()
    }

    /// Runs `fetch` to populate the slot if it is empty, then returns the
    /// token. Holding the lock across the fetch is what serializes
    /// concurrent writers onto a single token request.
    pub async fn get_or_fetch<F, Fut, E>(&self, fetch: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<String, E>>,
    {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        let token = fetch().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    /// Invalidates a stale token after a 403/`X-CSRF-Token: Required`
    /// response, forcing the next `get_or_fetch` to re-fetch.
    pub async fn invalidate(&self) {
        *self.token.lock().await = None;
    }
}

impl Default for CsrfSlot {
    fn default() -> Self {
        Self::new()
    }
}
