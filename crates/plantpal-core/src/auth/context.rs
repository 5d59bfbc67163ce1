use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::principal::{Principal, SessionData};
use super::store::SessionStore;

#[derive(Default)]
struct State {
    data: Option<SessionData>,
    /// Set by any mutator; a restore finishing afterwards must not overwrite.
    touched: bool,
}

struct Inner {
    store: Arc<dyn SessionStore>,
    state: RwLock<State>,
    loading: watch::Sender<bool>,
    restore: Mutex<Option<JoinHandle<()>>>,
}

/// Process-wide holder of the current principal and tokens.
///
/// Cloning is cheap and every clone sees the same session. Reads always
/// return the live value. All writes go through [`set_session`],
/// [`clear_session`] and [`replace_access_token`], which keep memory and the
/// backing store in step.
///
/// [`set_session`]: SessionContext::set_session
/// [`clear_session`]: SessionContext::clear_session
/// [`replace_access_token`]: SessionContext::replace_access_token
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<Inner>,
}

impl SessionContext {
    /// Create the context and start restoring from `store` in the background.
    ///
    /// `is_loading()` is true on return and flips to false once the restore
    /// settles. Must be called from within a Tokio runtime.
    pub fn init(store: impl SessionStore + 'static) -> Self {
        Self::init_shared(Arc::new(store))
    }

    pub fn init_shared(store: Arc<dyn SessionStore>) -> Self {
        let (loading, _) = watch::channel(true);
        let ctx = Self {
            inner: Arc::new(Inner {
                store,
                state: RwLock::new(State::default()),
                loading,
                restore: Mutex::new(None),
            }),
        };

        let task_ctx = ctx.clone();
        let handle = tokio::spawn(async move {
            let store = Arc::clone(&task_ctx.inner.store);
            let loaded = match tokio::task::spawn_blocking(move || store.load()).await {
                Ok(Ok(data)) => data,
                Ok(Err(e)) => {
                    warn!(error = %e, "Failed to restore session, starting logged out");
                    None
                }
                Err(e) => {
                    warn!(error = %e, "Session restore task failed");
                    None
                }
            };
            task_ctx.finish_restore(loaded);
        });
        *ctx.inner.restore.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        ctx
    }

    /// Stop a pending restore and settle `loading`. The session itself is
    /// left as is; use [`clear_session`](Self::clear_session) to log out.
    pub fn teardown(&self) {
        if let Some(handle) = self
            .inner
            .restore
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        self.mark_loaded();
        debug!("Session context torn down");
    }

    fn finish_restore(&self, loaded: Option<SessionData>) {
        {
            let mut state = self.write();
            if state.touched {
                debug!("Session changed while restoring, keeping the newer one");
            } else if let Some(data) = loaded {
                info!(principal = %data.principal, "Session restored");
                state.data = Some(data);
            } else {
                debug!("No stored session");
            }
        }
        self.mark_loaded();
    }

    fn mark_loaded(&self) {
        self.inner.loading.send_if_modified(|loading| {
            let was_loading = *loading;
            *loading = false;
            was_loading
        });
    }

    // ===== Reads =====

    pub fn is_loading(&self) -> bool {
        *self.inner.loading.borrow()
    }

    /// Resolve once the initial restore has settled.
    pub async fn wait_until_loaded(&self) {
        let mut rx = self.inner.loading.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|loading| !*loading).await;
    }

    /// Receiver observing the `loading` flag.
    pub fn loading_updates(&self) -> watch::Receiver<bool> {
        self.inner.loading.subscribe()
    }

    pub fn snapshot(&self) -> Option<SessionData> {
        self.read().data.clone()
    }

    pub fn principal(&self) -> Option<Principal> {
        self.read().data.as_ref().map(|d| d.principal.clone())
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().data.as_ref().map(|d| d.tokens.access.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read().data.as_ref().map(|d| d.tokens.refresh.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().data.is_some()
    }

    // ===== Mutators =====
    //
    // Store I/O runs under the write lock so the store sees mutations in the
    // same order as memory. It blocks the calling thread for one small file
    // or keychain write.

    /// Replace the session. `None` is the same as [`clear_session`](Self::clear_session).
    ///
    /// Memory is updated even when persisting fails; the error is returned so
    /// the caller can tell the user the login will not survive a restart.
    pub fn set_session(&self, data: Option<SessionData>) -> Result<()> {
        let Some(data) = data else {
            return self.clear_session();
        };

        let mut state = self.write();
        info!(principal = %data.principal, "Session set");
        let saved = self.inner.store.save(&data);
        state.data = Some(data);
        state.touched = true;
        saved.inspect_err(|e| warn!(error = %e, "Failed to persist session"))
    }

    /// Drop the principal and both tokens, in memory and in the store.
    pub fn clear_session(&self) -> Result<()> {
        let mut state = self.write();
        if state.data.take().is_some() {
            info!("Session cleared");
        }
        state.touched = true;
        self.inner
            .store
            .clear()
            .inspect_err(|e| warn!(error = %e, "Failed to clear stored session"))
    }

    /// Clear the session, but only if it still holds `expected_refresh`.
    /// Returns whether anything was cleared.
    pub fn clear_if_refresh_token(&self, expected_refresh: &str) -> Result<bool> {
        let mut state = self.write();
        if !state
            .data
            .as_ref()
            .is_some_and(|d| d.tokens.refresh == expected_refresh)
        {
            return Ok(false);
        }
        state.data = None;
        state.touched = true;
        info!("Session cleared");
        self.inner
            .store
            .clear()
            .inspect_err(|e| warn!(error = %e, "Failed to clear stored session"))?;
        Ok(true)
    }

    /// Swap in a new access token, but only if the session still holds
    /// `expected_refresh`. Returns whether the swap happened.
    pub fn replace_access_token(&self, expected_refresh: &str, access: String) -> Result<bool> {
        let mut state = self.write();
        let Some(data) = state
            .data
            .as_mut()
            .filter(|d| d.tokens.refresh == expected_refresh)
        else {
            return Ok(false);
        };
        data.tokens.access = access;
        let snapshot = data.clone();
        state.touched = true;

        self.inner
            .store
            .save(&snapshot)
            .inspect_err(|e| warn!(error = %e, "Failed to persist refreshed token"))?;
        debug!("Access token replaced");
        Ok(true)
    }

    /// Swap in an updated principal of the same kind, keeping the tokens.
    /// Returns false if there is no session to update.
    pub fn replace_principal(&self, principal: Principal) -> Result<bool> {
        let mut state = self.write();
        let Some(data) = state
            .data
            .as_mut()
            .filter(|d| d.principal.platform() == principal.platform())
        else {
            return Ok(false);
        };
        data.principal = principal;
        let snapshot = data.clone();
        state.touched = true;

        self.inner
            .store
            .save(&snapshot)
            .inspect_err(|e| warn!(error = %e, "Failed to persist updated principal"))?;
        Ok(true)
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("principal", &self.principal())
            .field("loading", &self.is_loading())
            .finish()
    }
}
