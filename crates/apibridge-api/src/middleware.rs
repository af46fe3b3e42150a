//! Top-level request filter.
//!
//! Every inbound request gets an execution context for exactly the
//! duration of the handler. The handler sees a sanitized request; the
//! context keeps the original metadata, internal headers included.
use apibridge_core::{RegistryViolation, RequestHandle, RequestSnapshot, Runtime};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

/// Called when a handler reports a [`RegistryViolation`].
pub type FatalHook = Arc<dyn Fn(&RegistryViolation) + Send + Sync>;

/// Filter state, also exposed to handlers through request extensions.
#[derive(Clone)]
pub struct Bridge {
    runtime: Arc<Runtime>,
    on_fatal: FatalHook,
}

impl Bridge {
    /// A violation terminates the process.
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self {
            runtime,
            on_fatal: Arc::new(exit_process),
        }
    }

    pub fn with_fatal_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RegistryViolation) + Send + Sync + 'static,
    {
        self.on_fatal = Arc::new(hook);
        self
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }
}

fn exit_process(violation: &RegistryViolation) {
    tracing::error!(%violation, "appengine: request context violation, terminating");
    std::process::exit(1);
}

/// Effective client address as seen by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddr(pub String);

/// Deletes the context even if the handler future is dropped.
struct ContextGuard {
    runtime: Arc<Runtime>,
    handle: RequestHandle,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.runtime.contexts().delete(&self.handle);
    }
}

pub async fn filter_request(State(bridge): State<Bridge>, mut req: Request, next: Next) -> Response {
    let snapshot = RequestSnapshot::new(req.method().clone(), req.uri().clone(), req.headers().clone());
    let handle = RequestHandle::new();

    *req.headers_mut() = snapshot.sanitized_headers();
    req.extensions_mut().insert(RemoteAddr(snapshot.remote_addr().to_string()));
    req.extensions_mut().insert(handle);
    req.extensions_mut().insert(bridge.clone());

    tracing::debug!(%handle, request_id = snapshot.request_id(), "creating execution context");
    bridge.runtime.contexts().create(handle, snapshot);
    let guard = ContextGuard {
        runtime: bridge.runtime.clone(),
        handle,
    };

    let response = next.run(req).await;
    drop(guard);

    if let Some(violation) = response.extensions().get::<RegistryViolation>() {
        (bridge.on_fatal)(violation);
    }
    response
}
