//! Background health probing
//!
//! Probes run outside the router lock; only applying their results takes the
//! write lock, so `acquire` is never held up by a slow health check.

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use voice_orchestrator_core::ProviderError;

use crate::router::log_transition;
use crate::{HealthState, ProviderId, ProviderRouter};

impl ProviderRouter {
    /// Spawn the probe loop
    ///
    /// Ticks every `probe_interval` and additionally re-checks a provider as
    /// soon as a failure is reported against it. Send `true` on the returned
    /// channel (or drop it) to stop the loop.
    pub fn start_probe_loop(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let router = Arc::clone(self);
        let interval = router.probe_policy.interval;

        let mut recheck_rx = self.recheck_rx.lock().take();
        if recheck_rx.is_none() {
            tracing::warn!("Probe loop already running, failure re-checks stay with the first loop");
        }

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        router.probe_once().await;
                    }
                    Some(id) = next_recheck(&mut recheck_rx) => {
                        router.run_probes(Some(id)).await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::info!("Provider probe loop shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Probe every registration once and retry idle unreachable ones
    pub async fn probe_once(&self) {
        self.run_probes(None).await;
        self.recover_after_cooldown();
    }

    async fn run_probes(&self, only: Option<ProviderId>) {
        let targets = self.probes(only);
        if targets.is_empty() {
            return;
        }

        let timeout = self.probe_policy.timeout;
        let results = join_all(targets.into_iter().map(|(id, probe)| async move {
            let result = match tokio::time::timeout(timeout, probe.check()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(timeout.as_millis() as u64)),
            };
            (id, result)
        }))
        .await;

        let now = Instant::now();
        let mut state = self.state.write();
        for (id, result) in results {
            let Some(entry) = state.entry_mut(id) else {
                continue;
            };
            let change = match result {
                // Live traffic decides between healthy and degraded; a probe
                // only brings an unreachable provider back
                Ok(()) if entry.health.state == HealthState::Unreachable => {
                    entry.health.restore(now)
                }
                Ok(()) => None,
                Err(e) => {
                    tracing::debug!(provider = %entry.registration.name, error = %e, "Probe failed");
                    entry
                        .health
                        .record_failure(&self.failure_policy, now, e.to_string())
                }
            };
            if let Some(next) = change {
                log_transition(entry, next);
            }
        }
    }

    /// Half-open probe-less providers that have been unreachable long enough
    fn recover_after_cooldown(&self) {
        let cooldown = self.probe_policy.recovery_cooldown;
        let now = Instant::now();
        let mut state = self.state.write();

        for entry in state.entries.iter_mut() {
            if entry.registration.probe.is_some() {
                continue;
            }
            let idle = entry
                .health
                .unreachable_since
                .map_or(false, |since| now.duration_since(since) >= cooldown);
            if idle {
                if let Some(next) = entry.health.half_open(now) {
                    log_transition(entry, next);
                }
            }
        }
    }
}

async fn next_recheck(rx: &mut Option<mpsc::Receiver<ProviderId>>) -> Option<ProviderId> {
    match rx {
        Some(rx) => rx.recv().await,
        None => futures::future::pending().await,
    }
}
