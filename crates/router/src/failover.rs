//! Same-role failover around a single provider call

use std::future::Future;
use std::time::Duration;

use voice_orchestrator_core::{Error, ProviderError, ProviderRole, TaskClassification};

use crate::{ProviderId, ProviderRouter, RouteContext, RouterError, SelectedProvider};

impl ProviderRouter {
    /// Run `attempt` against successive candidates for `role`
    ///
    /// Each attempt gets `timeout`. Failures and timeouts are reported to the
    /// router and the next candidate is tried; the first success is reported
    /// and returned with the provider that produced it. A `Cancelled` error
    /// aborts without counting against the provider.
    pub async fn with_failover<T, F, Fut>(
        &self,
        role: ProviderRole,
        task: TaskClassification,
        context: &RouteContext,
        timeout: Duration,
        mut attempt: F,
    ) -> Result<(SelectedProvider, T), RouterError>
    where
        F: FnMut(SelectedProvider) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut tried: Vec<ProviderId> = Vec::new();

        loop {
            let selected = self.acquire_excluding(role, task, context, &tried)?;
            tried.push(selected.id);

            let error = match tokio::time::timeout(timeout, attempt(selected.clone())).await {
                Ok(Ok(value)) => {
                    self.report_success(selected.id);
                    return Ok((selected, value));
                }
                Ok(Err(ProviderError::Cancelled)) => return Err(RouterError::Cancelled),
                Ok(Err(e)) => {
                    tracing::warn!(
                        provider = %selected.name,
                        %role,
                        error = %e,
                        "Provider call failed, trying next candidate"
                    );
                    e
                }
                Err(_) => {
                    let after_ms = timeout.as_millis() as u64;
                    let timed_out = Error::ProviderTimeout {
                        role,
                        provider: selected.name.to_string(),
                        after_ms,
                    };
                    tracing::warn!(error = %timed_out, "Trying next candidate");
                    ProviderError::Timeout(after_ms)
                }
            };

            self.report_failure(selected.id, &error);
        }
    }
}
