//! Trait definitions with mockall annotations for testing

use serde_json::Value;
use shared::Operation;

use crate::error::{ProviderError, ProviderResult};

/// Named asynchronous system-metric queries.
///
/// Callers invoke operations by `Operation`; the arguments are the positional
/// values the caller supplied, passed through untouched.
#[mockall::automock]
#[async_trait::async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Operations this provider actually implements
    fn operations(&self) -> Vec<Operation>;

    /// Run one operation to completion
    async fn call(&self, operation: Operation, args: Vec<Value>) -> ProviderResult<Value>;
}

/// Check that a provider implements every allow-listed operation.
///
/// Run once at startup so drift between the allow-list and the provider
/// surface fails loudly instead of surfacing as per-request errors.
pub fn validate_surface<P: MetricsProvider + ?Sized>(provider: &P) -> ProviderResult<()> {
    let supported = provider.operations();
    let missing: Vec<Operation> = Operation::ALL
        .iter()
        .copied()
        .filter(|op| !supported.contains(op))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ProviderError::MissingOperations { missing })
    }
}
