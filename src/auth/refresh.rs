// Token refresh coordination
// Collapses concurrent refresh requests into one execution and falls back across schemes

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;

use crate::error::AuthError;
use crate::schemes::Scheme;
use crate::utils::MutexExt;

type RefreshHandle = Shared<BoxFuture<'static, Result<(), AuthError>>>;

struct InFlight {
    generation: u64,
    handle: RefreshHandle,
}

type Slot = Arc<Mutex<Option<InFlight>>>;

/// Clears the in-flight slot when the refresh it belongs to settles.
/// Lives inside the shared future, so it runs on success, failure and drop.
struct InFlightGuard {
    slot: Slot,
    generation: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut slot = self.slot.lock_or_recover();
        if slot.as_ref().map(|f| f.generation) == Some(self.generation) {
            *slot = None;
        }
    }
}

/// Single-flight refresh across an ordered list of schemes.
///
/// At most one refresh runs at a time; concurrent callers await the same
/// outcome. Failures are not memoized: the next call after a settled
/// refresh starts a new attempt.
pub struct RefreshCoordinator {
    schemes: Arc<[Arc<dyn Scheme>]>,
    in_flight: Slot,
    generation: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(schemes: Vec<Arc<dyn Scheme>>) -> Self {
        Self {
            schemes: schemes.into(),
            in_flight: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    pub fn schemes(&self) -> &[Arc<dyn Scheme>] {
        &self.schemes
    }

    /// True while a refresh is running
    pub fn is_refreshing(&self) -> bool {
        self.in_flight.lock_or_recover().is_some()
    }

    /// Refresh credentials, joining an in-flight refresh if there is one
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let handle = {
            let mut slot = self.in_flight.lock_or_recover();

            match slot.as_ref() {
                Some(in_flight) => {
                    tracing::debug!("Joining in-flight token refresh");
                    in_flight.handle.clone()
                }
                None => {
                    if !self.schemes.iter().any(|s| s.supports_refresh()) {
                        return Err(AuthError::refresh_failed("No schemes support token refresh"));
                    }

                    let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
                    let guard = InFlightGuard {
                        slot: Arc::clone(&self.in_flight),
                        generation,
                    };
                    let schemes = Arc::clone(&self.schemes);

                    let handle = async move {
                        let _guard = guard;
                        refresh_in_order(&schemes).await
                    }
                    .boxed()
                    .shared();

                    *slot = Some(InFlight {
                        generation,
                        handle: handle.clone(),
                    });

                    // Drive the refresh to completion even if every waiter is dropped
                    if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                        let driver = handle.clone();
                        runtime.spawn(async move {
                            let _ = driver.await;
                        });
                    }

                    handle
                }
            }
        };

        handle.await
    }
}

/// Try every refresh-capable scheme in order until one succeeds
async fn refresh_in_order(schemes: &[Arc<dyn Scheme>]) -> Result<(), AuthError> {
    let mut first_failure: Option<anyhow::Error> = None;

    for scheme in schemes.iter().filter(|s| s.supports_refresh()) {
        tracing::debug!(scheme = scheme.name(), "Attempting token refresh");

        match scheme.refresh().await {
            Ok(()) => {
                tracing::info!(scheme = scheme.name(), "Token refresh succeeded");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(scheme = scheme.name(), error = %e, "Token refresh attempt failed");
                if first_failure.is_none() {
                    first_failure = Some(e);
                }
            }
        }
    }

    let err = AuthError::refresh_failed("All refresh attempts failed");
    Err(match first_failure {
        Some(cause) => err.with_cause(cause),
        None => err,
    })
}
