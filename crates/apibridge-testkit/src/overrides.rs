//! Scoped override registration
use apibridge_core::overrides::OverrideFn;
use apibridge_core::{ApiCallError, ApiMessage, CallOptions, OverrideRegistry, Runtime};
use std::sync::Arc;

/// Unregisters its override when dropped, unless a later registration
/// has replaced it.
#[must_use = "the override is removed as soon as the guard is dropped"]
pub struct OverrideGuard {
    registry: Arc<OverrideRegistry>,
    service: String,
    method: String,
    entry: OverrideFn,
}

impl OverrideGuard {
    pub fn unregister(self) {}
}

impl Drop for OverrideGuard {
    fn drop(&mut self) {
        self.registry.unregister_entry(&self.service, &self.method, &self.entry);
    }
}

/// Register a typed override on `runtime` for the lifetime of the guard.
pub fn register_override<I, O, F>(runtime: &Runtime, service: &str, method: &str, f: F) -> OverrideGuard
where
    I: ApiMessage,
    O: ApiMessage,
    F: Fn(&I, &mut O, Option<&CallOptions>) -> Result<(), ApiCallError> + Send + Sync + 'static,
{
    let registry = runtime.overrides().clone();
    let entry = registry.register_typed(service, method, f);
    OverrideGuard {
        registry,
        service: service.to_string(),
        method: method.to_string(),
        entry,
    }
}
