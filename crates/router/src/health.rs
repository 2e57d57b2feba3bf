//! Provider health tracking

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use voice_orchestrator_config::RouterConfig;
use voice_orchestrator_core::{ProviderRole, ProviderTier};

use crate::ProviderId;

/// Health of a registered provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    #[default]
    Healthy,
    /// Recent failures, still selectable
    Degraded,
    /// Skipped by selection until a probe succeeds
    Unreachable,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unreachable => "unreachable",
        }
    }

    fn severity(&self) -> u8 {
        match self {
            HealthState::Healthy => 0,
            HealthState::Degraded => 1,
            HealthState::Unreachable => 2,
        }
    }

    fn max_severity(self, other: HealthState) -> HealthState {
        if self.severity() >= other.severity() {
            self
        } else {
            other
        }
    }
}

/// Debounce policy turning reported failures into health transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailurePolicy {
    pub degrade_after: u32,
    pub unreachable_after: u32,
    /// Failures older than this are forgotten
    pub window: Duration,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::from(&RouterConfig::default())
    }
}

impl From<&RouterConfig> for FailurePolicy {
    fn from(config: &RouterConfig) -> Self {
        Self {
            degrade_after: config.degrade_after_failures,
            unreachable_after: config.unreachable_after_failures,
            window: Duration::from_millis(config.failure_window_ms),
        }
    }
}

impl FailurePolicy {
    /// State implied by `failures` counted within the window
    fn state_for(&self, failures: u32) -> HealthState {
        if failures >= self.unreachable_after {
            HealthState::Unreachable
        } else if failures >= self.degrade_after {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        }
    }
}

/// Background probe schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    pub interval: Duration,
    pub timeout: Duration,
    /// Probe-less providers leave `Unreachable` after this long
    pub recovery_cooldown: Duration,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self::from(&RouterConfig::default())
    }
}

impl From<&RouterConfig> for ProbePolicy {
    fn from(config: &RouterConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.probe_interval_ms),
            timeout: Duration::from_millis(config.probe_timeout_ms),
            recovery_cooldown: Duration::from_millis(config.recovery_cooldown_ms),
        }
    }
}

/// Mutable health record of one provider
#[derive(Debug, Clone, Default)]
pub(crate) struct ProviderHealth {
    pub state: HealthState,
    failures: VecDeque<Instant>,
    pub unreachable_since: Option<Instant>,
    pub last_error: Option<String>,
}

impl ProviderHealth {
    /// Count a failure; returns the new state if it changed
    pub fn record_failure(
        &mut self,
        policy: &FailurePolicy,
        now: Instant,
        error: String,
    ) -> Option<HealthState> {
        self.failures.push_back(now);
        self.prune(policy, now);
        self.last_error = Some(error);

        let counted = policy.state_for(self.failures.len() as u32);
        // Failures only ever worsen the state
        let next = counted.max_severity(self.state);
        self.transition(next, now)
    }

    /// Clear the counter; a degraded provider becomes healthy
    pub fn record_success(&mut self, now: Instant) -> Option<HealthState> {
        self.failures.clear();
        if self.state == HealthState::Degraded {
            self.transition(HealthState::Healthy, now)
        } else {
            None
        }
    }

    /// Probe succeeded: healthy regardless of the previous state
    pub fn restore(&mut self, now: Instant) -> Option<HealthState> {
        self.failures.clear();
        self.last_error = None;
        self.transition(HealthState::Healthy, now)
    }

    /// Give an unreachable provider one more chance
    pub fn half_open(&mut self, now: Instant) -> Option<HealthState> {
        self.failures.clear();
        self.transition(HealthState::Degraded, now)
    }

    pub fn failure_count(&self) -> u32 {
        self.failures.len() as u32
    }

    fn prune(&mut self, policy: &FailurePolicy, now: Instant) {
        while let Some(&oldest) = self.failures.front() {
            if now.duration_since(oldest) > policy.window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn transition(&mut self, next: HealthState, now: Instant) -> Option<HealthState> {
        if next == self.state {
            return None;
        }
        self.unreachable_since = match next {
            HealthState::Unreachable => Some(now),
            _ => None,
        };
        self.state = next;
        Some(next)
    }
}

/// Point-in-time view of one registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    #[serde(serialize_with = "serialize_id")]
    pub id: ProviderId,
    pub name: String,
    pub role: ProviderRole,
    pub priority: u32,
    pub tier: ProviderTier,
    pub state: HealthState,
    pub recent_failures: u32,
    pub last_error: Option<String>,
}

fn serialize_id<S: serde::Serializer>(id: &ProviderId, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(id.as_u64())
}
