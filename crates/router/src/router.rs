//! Provider selection over per-role failover chains

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

use voice_orchestrator_config::RouterConfig;
use voice_orchestrator_core::{HealthProbe, ProviderError, ProviderRole, TaskClassification};

use crate::health::ProviderHealth;
use crate::{
    FailurePolicy, HealthState, ProbePolicy, ProviderId, ProviderRegistration, ProviderStatus,
    RouteContext, RouterError, SelectedProvider,
};

/// Pending re-check requests beyond this are dropped; the periodic probe
/// still covers them
const RECHECK_QUEUE: usize = 32;

pub(crate) struct Entry {
    pub id: ProviderId,
    pub registration: ProviderRegistration,
    pub health: ProviderHealth,
}

#[derive(Default)]
pub(crate) struct RouterState {
    next_id: u64,
    /// Sorted by (priority, id)
    pub entries: Vec<Entry>,
}

impl RouterState {
    pub fn entry_mut(&mut self, id: ProviderId) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }
}

/// Selects providers per role and tracks their health
///
/// Registrations and health live behind one lock so `acquire` always sees a
/// consistent snapshot. `acquire` never awaits.
pub struct ProviderRouter {
    pub(crate) state: RwLock<RouterState>,
    pub(crate) failure_policy: FailurePolicy,
    pub(crate) probe_policy: ProbePolicy,
    recheck_tx: mpsc::Sender<ProviderId>,
    pub(crate) recheck_rx: Mutex<Option<mpsc::Receiver<ProviderId>>>,
}

impl Default for ProviderRouter {
    fn default() -> Self {
        Self::new(FailurePolicy::default(), ProbePolicy::default())
    }
}

impl ProviderRouter {
    pub fn new(failure_policy: FailurePolicy, probe_policy: ProbePolicy) -> Self {
        let (recheck_tx, recheck_rx) = mpsc::channel(RECHECK_QUEUE);
        Self {
            state: RwLock::new(RouterState::default()),
            failure_policy,
            probe_policy,
            recheck_tx,
            recheck_rx: Mutex::new(Some(recheck_rx)),
        }
    }

    pub fn from_config(config: &RouterConfig) -> Self {
        Self::new(FailurePolicy::from(config), ProbePolicy::from(config))
    }

    /// Add a candidate to its role's failover chain
    pub fn register(&self, registration: ProviderRegistration) -> Result<ProviderId, RouterError> {
        let role = registration.role();
        let mut state = self.state.write();

        if state
            .entries
            .iter()
            .any(|e| e.registration.role() == role && e.registration.priority == registration.priority)
        {
            return Err(RouterError::DuplicatePriority {
                role,
                priority: registration.priority,
            });
        }

        let id = ProviderId(state.next_id);
        state.next_id += 1;

        tracing::info!(
            provider = %registration.name,
            %id,
            %role,
            priority = registration.priority,
            on_device = registration.is_on_device,
            "Registered provider"
        );

        state.entries.push(Entry {
            id,
            registration,
            health: ProviderHealth::default(),
        });
        state
            .entries
            .sort_by_key(|e| (e.registration.priority, e.id));

        Ok(id)
    }

    /// Select a provider for `role`
    pub fn acquire(
        &self,
        role: ProviderRole,
        task: TaskClassification,
        context: &RouteContext,
    ) -> Result<SelectedProvider, RouterError> {
        self.acquire_excluding(role, task, context, &[])
    }

    /// Select a provider for `role`, skipping the ones already tried this call
    ///
    /// Walks the chain in priority order, drops unreachable candidates and
    /// those `context` rules out, and returns the first survivor. With
    /// `context.tier_by_task` set, the first survivor within the task's
    /// preferred tier wins instead, falling back to the first survivor.
    pub fn acquire_excluding(
        &self,
        role: ProviderRole,
        task: TaskClassification,
        context: &RouteContext,
        exclude: &[ProviderId],
    ) -> Result<SelectedProvider, RouterError> {
        let state = self.state.read();
        let preferred_tier = context.tier_by_task.then(|| task.preferred_tier());

        let mut first_survivor: Option<&Entry> = None;
        for entry in state.entries.iter() {
            let reg = &entry.registration;
            if reg.role() != role
                || exclude.contains(&entry.id)
                || entry.health.state == HealthState::Unreachable
                || !context.permits(reg)
            {
                continue;
            }
            match preferred_tier {
                Some(tier) if reg.tier > tier => {
                    if first_survivor.is_none() {
                        first_survivor = Some(entry);
                    }
                }
                _ => return Ok(selected(entry)),
            }
        }

        first_survivor
            .map(selected)
            .ok_or(RouterError::NoProviderAvailable { role })
    }

    /// Count a failure against a provider and request an immediate re-check
    pub fn report_failure(&self, id: ProviderId, error: &ProviderError) {
        if matches!(error, ProviderError::Cancelled) {
            return;
        }

        {
            let mut state = self.state.write();
            let Some(entry) = state.entry_mut(id) else {
                tracing::warn!(%id, "Failure reported for unknown provider");
                return;
            };

            tracing::debug!(provider = %entry.registration.name, %error, "Provider failure");
            if let Some(next) =
                entry
                    .health
                    .record_failure(&self.failure_policy, Instant::now(), error.to_string())
            {
                log_transition(entry, next);
            }
        }

        // Never blocks; a full queue means a re-check is already pending
        let _ = self.recheck_tx.try_send(id);
    }

    /// Reset the failure counter; a degraded provider becomes healthy again
    pub fn report_success(&self, id: ProviderId) {
        let mut state = self.state.write();
        let Some(entry) = state.entry_mut(id) else {
            tracing::warn!(%id, "Success reported for unknown provider");
            return;
        };
        if let Some(next) = entry.health.record_success(Instant::now()) {
            log_transition(entry, next);
        }
    }

    pub fn health_of(&self, id: ProviderId) -> Result<HealthState, RouterError> {
        self.state
            .read()
            .entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.health.state)
            .ok_or(RouterError::UnknownProvider(id))
    }

    /// Consistent copy of every registration's health
    pub fn health_snapshot(&self) -> Vec<ProviderStatus> {
        self.state
            .read()
            .entries
            .iter()
            .map(|e| ProviderStatus {
                id: e.id,
                name: e.registration.name.to_string(),
                role: e.registration.role(),
                priority: e.registration.priority,
                tier: e.registration.tier,
                state: e.health.state,
                recent_failures: e.health.failure_count(),
                last_error: e.health.last_error.clone(),
            })
            .collect()
    }

    /// Number of registrations for `role`
    pub fn chain_len(&self, role: ProviderRole) -> usize {
        self.state
            .read()
            .entries
            .iter()
            .filter(|e| e.registration.role() == role)
            .count()
    }

    pub(crate) fn probes(&self, only: Option<ProviderId>) -> Vec<(ProviderId, Arc<dyn HealthProbe>)> {
        self.state
            .read()
            .entries
            .iter()
            .filter(|e| only.map_or(true, |id| id == e.id))
            .filter_map(|e| e.registration.probe.clone().map(|p| (e.id, p)))
            .collect()
    }
}

fn selected(entry: &Entry) -> SelectedProvider {
    SelectedProvider {
        id: entry.id,
        name: entry.registration.name.clone(),
        handle: entry.registration.handle.clone(),
        tier: entry.registration.tier,
    }
}

pub(crate) fn log_transition(entry: &Entry, next: HealthState) {
    match next {
        HealthState::Healthy => tracing::info!(
            provider = %entry.registration.name,
            role = %entry.registration.role(),
            "Provider healthy"
        ),
        HealthState::Degraded => tracing::warn!(
            provider = %entry.registration.name,
            role = %entry.registration.role(),
            failures = entry.health.failure_count(),
            "Provider degraded"
        ),
        HealthState::Unreachable => tracing::warn!(
            provider = %entry.registration.name,
            role = %entry.registration.role(),
            last_error = ?entry.health.last_error,
            "Provider unreachable"
        ),
    }
}
