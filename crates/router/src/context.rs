//! Device and network conditions a selection must satisfy

use serde::{Deserialize, Serialize};
use voice_orchestrator_core::ProviderTier;

use crate::ProviderRegistration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    #[default]
    Online,
    Offline,
}

/// Constraints for one `acquire` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RouteContext {
    pub network: NetworkStatus,
    /// Only on-device providers may be used (privacy mode)
    #[serde(default)]
    pub on_device_only: bool,
    /// Most expensive tier allowed
    #[serde(default)]
    pub cost_ceiling: Option<ProviderTier>,
    /// Prefer providers within the task's tier over higher-priority ones
    #[serde(default)]
    pub tier_by_task: bool,
}

impl RouteContext {
    pub fn offline() -> Self {
        Self {
            network: NetworkStatus::Offline,
            ..Self::default()
        }
    }

    pub fn with_cost_ceiling(mut self, tier: ProviderTier) -> Self {
        self.cost_ceiling = Some(tier);
        self
    }

    pub fn tier_by_task(mut self) -> Self {
        self.tier_by_task = true;
        self
    }

    pub fn on_device_only(mut self) -> Self {
        self.on_device_only = true;
        self
    }

    /// Whether a registration satisfies these constraints
    pub fn permits(&self, registration: &ProviderRegistration) -> bool {
        if registration.requires_network && self.network == NetworkStatus::Offline {
            return false;
        }
        if self.on_device_only && !registration.is_on_device {
            return false;
        }
        match self.cost_ceiling {
            Some(ceiling) => registration.tier <= ceiling,
            None => true,
        }
    }
}
