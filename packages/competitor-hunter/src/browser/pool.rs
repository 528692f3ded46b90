//! Shared browser session pool.
//!
//! The pool owns the engine and a bounded set of sessions. A session is
//! borrowed through a [`SessionLease`]; dropping the lease returns the
//! session (or discards it) and frees the slot, so completion, failure and
//! cancellation all release it the same way.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::error::{FetchError, FetchResult};
use crate::traits::browser::{BrowserEngine, BrowserSession, NavigationPlan};
use crate::types::content::PageCapture;

struct PoolInner {
    engine: Arc<dyn BrowserEngine>,
    headless: bool,
    max_sessions: usize,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Box<dyn BrowserSession>>>,
    opened: AtomicUsize,
    closed: AtomicBool,
}

impl PoolInner {
    fn push_idle(&self, session: Box<dyn BrowserSession>) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(session);
    }

    fn pop_idle(&self) -> Option<Box<dyn BrowserSession>> {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
    }
}

/// Bounded pool of browser sessions.
///
/// Sessions are opened lazily on first demand and reused afterwards.
/// At most `max_sessions` are leased at any time; further callers wait.
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

impl SessionPool {
    /// Create a pool. No session is opened until the first [`acquire`](Self::acquire).
    pub fn new(engine: Arc<dyn BrowserEngine>, headless: bool, max_sessions: usize) -> Self {
        let max_sessions = max_sessions.max(1);
        Self {
            inner: Arc::new(PoolInner {
                engine,
                headless,
                max_sessions,
                permits: Arc::new(Semaphore::new(max_sessions)),
                idle: Mutex::new(Vec::new()),
                opened: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn max_sessions(&self) -> usize {
        self.inner.max_sessions
    }

    /// Slots not currently leased.
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Sessions opened and waiting for reuse.
    pub fn idle_sessions(&self) -> usize {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Sessions opened over the pool's lifetime.
    pub fn sessions_opened(&self) -> usize {
        self.inner.opened.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Borrow a session, waiting for a free slot if necessary.
    pub async fn acquire(&self) -> FetchResult<SessionLease> {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| FetchError::PoolClosed)?;

        let session = match self.inner.pop_idle() {
            Some(session) => session,
            None => {
                let session = self.inner.engine.open_session(self.inner.headless).await?;
                let opened = self.inner.opened.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(engine = self.inner.engine.name(), opened, "Opened browser session");
                session
            }
        };

        Ok(SessionLease {
            session: Some(session),
            discard: false,
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Close idle sessions and the engine. Further acquires fail.
    ///
    /// Sessions still leased are closed when their lease drops.
    pub async fn shutdown(&self) -> FetchResult<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.permits.close();

        let idle: Vec<_> = std::mem::take(
            &mut *self
                .inner
                .idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let count = idle.len();
        for mut session in idle {
            if let Err(e) = session.close().await {
                warn!(error = %e, "Failed to close browser session");
            }
        }

        self.inner.engine.shutdown().await?;
        info!(closed_sessions = count, "Browser session pool shut down");
        Ok(())
    }
}

/// A borrowed session. Dropping it releases the pool slot.
pub struct SessionLease {
    session: Option<Box<dyn BrowserSession>>,
    discard: bool,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl SessionLease {
    /// Close the session on release instead of returning it for reuse.
    pub fn discard(&mut self) {
        self.discard = true;
    }

    pub async fn navigate_and_extract(
        &mut self,
        url: &str,
        plan: &NavigationPlan,
    ) -> FetchResult<PageCapture> {
        let Some(session) = self.session.as_mut() else {
            return Err(FetchError::PoolClosed);
        };

        // A lease dropped mid-navigation leaves the page in an unknown state
        let discard = std::mem::replace(&mut self.discard, true);
        let result = session.navigate_and_extract(url, plan).await;
        self.discard = discard;
        result
    }

    /// Screenshot of whatever the session currently shows.
    pub async fn screenshot(&mut self) -> FetchResult<Vec<u8>> {
        match self.session.as_mut() {
            Some(session) => session.screenshot().await,
            None => Err(FetchError::PoolClosed),
        }
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        if !self.discard && !self.pool.closed.load(Ordering::Acquire) {
            self.pool.push_idle(session);
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = session.close().await {
                        debug!(error = %e, "Discarded session did not close cleanly");
                    }
                });
            }
            Err(_) => debug!("No runtime available, dropping discarded session"),
        }
    }
}
