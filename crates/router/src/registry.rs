//! Provider registrations

use std::fmt;
use std::sync::Arc;

use voice_orchestrator_core::{
    HealthProbe, ProviderError, ProviderRole, ProviderTier, Responder, Synthesizer, Transcriber,
};

/// Identifier assigned at registration, in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProviderId(pub(crate) u64);

impl ProviderId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider-{}", self.0)
    }
}

/// A provider implementation, tagged by the role it serves
#[derive(Clone)]
pub enum ProviderHandle {
    Transcriber(Arc<dyn Transcriber>),
    Responder(Arc<dyn Responder>),
    Synthesizer(Arc<dyn Synthesizer>),
}

impl ProviderHandle {
    pub fn role(&self) -> ProviderRole {
        match self {
            ProviderHandle::Transcriber(_) => ProviderRole::Transcriber,
            ProviderHandle::Responder(_) => ProviderRole::Responder,
            ProviderHandle::Synthesizer(_) => ProviderRole::Synthesizer,
        }
    }

    pub fn transcriber(&self) -> Result<Arc<dyn Transcriber>, ProviderError> {
        match self {
            ProviderHandle::Transcriber(t) => Ok(t.clone()),
            _ => Err(ProviderError::RoleMismatch(ProviderRole::Transcriber)),
        }
    }

    pub fn responder(&self) -> Result<Arc<dyn Responder>, ProviderError> {
        match self {
            ProviderHandle::Responder(r) => Ok(r.clone()),
            _ => Err(ProviderError::RoleMismatch(ProviderRole::Responder)),
        }
    }

    pub fn synthesizer(&self) -> Result<Arc<dyn Synthesizer>, ProviderError> {
        match self {
            ProviderHandle::Synthesizer(s) => Ok(s.clone()),
            _ => Err(ProviderError::RoleMismatch(ProviderRole::Synthesizer)),
        }
    }
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderHandle::Transcriber(t) => t.name(),
            ProviderHandle::Responder(r) => r.name(),
            ProviderHandle::Synthesizer(s) => s.name(),
        };
        f.debug_tuple("ProviderHandle")
            .field(&self.role())
            .field(&name)
            .finish()
    }
}

/// One candidate in a role's failover chain
///
/// Lower `priority` values are tried first.
#[derive(Clone)]
pub struct ProviderRegistration {
    pub name: Arc<str>,
    pub handle: ProviderHandle,
    pub priority: u32,
    pub requires_network: bool,
    pub is_on_device: bool,
    pub tier: ProviderTier,
    pub probe: Option<Arc<dyn HealthProbe>>,
}

impl fmt::Debug for ProviderRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistration")
            .field("name", &self.name)
            .field("role", &self.role())
            .field("priority", &self.priority)
            .field("requires_network", &self.requires_network)
            .field("is_on_device", &self.is_on_device)
            .field("tier", &self.tier)
            .field("has_probe", &self.probe.is_some())
            .finish()
    }
}

impl ProviderRegistration {
    /// Cloud provider of the standard tier, no probe
    pub fn new(name: impl Into<Arc<str>>, handle: ProviderHandle, priority: u32) -> Self {
        Self {
            name: name.into(),
            handle,
            priority,
            requires_network: true,
            is_on_device: false,
            tier: ProviderTier::Standard,
            probe: None,
        }
    }

    pub fn transcriber(name: impl Into<Arc<str>>, t: Arc<dyn Transcriber>, priority: u32) -> Self {
        Self::new(name, ProviderHandle::Transcriber(t), priority)
    }

    pub fn responder(name: impl Into<Arc<str>>, r: Arc<dyn Responder>, priority: u32) -> Self {
        Self::new(name, ProviderHandle::Responder(r), priority)
    }

    pub fn synthesizer(name: impl Into<Arc<str>>, s: Arc<dyn Synthesizer>, priority: u32) -> Self {
        Self::new(name, ProviderHandle::Synthesizer(s), priority)
    }

    /// Runs locally without network access
    pub fn on_device(mut self) -> Self {
        self.is_on_device = true;
        self.requires_network = false;
        self
    }

    pub fn requires_network(mut self, requires: bool) -> Self {
        self.requires_network = requires;
        self
    }

    pub fn with_tier(mut self, tier: ProviderTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn role(&self) -> ProviderRole {
        self.handle.role()
    }
}

/// Result of a successful `acquire`
#[derive(Debug, Clone)]
pub struct SelectedProvider {
    pub id: ProviderId,
    pub name: Arc<str>,
    pub handle: ProviderHandle,
    pub tier: ProviderTier,
}
