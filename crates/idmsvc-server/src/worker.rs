//! Periodic host-conf JWK refresh.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use idmsvc_core::error::IdmsvcError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Level, debug, error, info, warn};

use crate::api::AppState;

/// Held while a refresh runs; clears the in-flight flag on drop.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn try_begin(flag: &Arc<AtomicBool>) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self(Arc::clone(flag)))
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Spawn the refresh loop. Each tick starts a run unless the previous
/// one is still going. The loop exits once `shutdown` flips to `true`
/// or its sender is dropped.
pub fn spawn_jwk_refresh(
    state: Arc<AppState>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let in_flight = Arc::new(AtomicBool::new(false));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_secs = period.as_secs(), "JWK refresh worker started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(guard) = InFlight::try_begin(&in_flight) else {
                        debug!("Previous JWK refresh still running, skipping tick");
                        continue;
                    };
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        let _guard = guard;
                        if let Err(e) = state.service.keys().refresh().await {
                            if failure_level(&e) == Level::WARN {
                                warn!(error = %e, "JWK refresh failed, retrying on next tick");
                            } else {
                                error!(error = %e, "JWK refresh failed");
                            }
                        }
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("JWK refresh worker stopped");
    })
}

/// Log level for a failed refresh run. Transient failures are retried
/// on the next tick.
fn failure_level(err: &IdmsvcError) -> Level {
    if err.is_transient() {
        Level::WARN
    } else {
        Level::ERROR
    }
}
