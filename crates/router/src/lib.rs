//! Provider routing for the voice orchestrator
//!
//! Keeps a priority-ordered failover chain per provider role, tracks health
//! from reported failures and background probes, and selects a provider for a
//! turn without ever waiting on the network.

pub mod context;
pub mod failover;
pub mod health;
pub mod probe;
pub mod registry;
pub mod router;

pub use context::{NetworkStatus, RouteContext};
pub use health::{FailurePolicy, HealthState, ProbePolicy, ProviderStatus};
pub use registry::{ProviderHandle, ProviderId, ProviderRegistration, SelectedProvider};
pub use router::ProviderRouter;

use thiserror::Error;
use voice_orchestrator_core::ProviderRole;

/// Router errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("No {role} provider available")]
    NoProviderAvailable { role: ProviderRole },

    #[error("A {role} provider is already registered with priority {priority}")]
    DuplicatePriority { role: ProviderRole, priority: u32 },

    #[error("Unknown provider: {0}")]
    UnknownProvider(ProviderId),

    #[error("Cancelled")]
    Cancelled,
}

impl From<RouterError> for voice_orchestrator_core::Error {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::NoProviderAvailable { role } => {
                voice_orchestrator_core::Error::ProviderUnavailable { role }
            }
            RouterError::Cancelled => voice_orchestrator_core::Error::Cancelled,
            other => voice_orchestrator_core::Error::Config(other.to_string()),
        }
    }
}
