//! Provider health probing

use async_trait::async_trait;

use crate::ProviderError;

/// Cheap liveness check run by the router's background loop
#[async_trait]
pub trait HealthProbe: Send + Sync + 'static {
    async fn check(&self) -> Result<(), ProviderError>;
}
