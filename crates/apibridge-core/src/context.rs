//! Execution Context: per-request state and the registry that owns it
//!
//! Each live inbound request has exactly one [`ExecutionContext`],
//! registered under its [`RequestHandle`] for the duration of the request.
use crate::config::SharedConfig;
use crate::dispatcher::{CallOptions, Dispatcher};
use crate::error::ApiCallError;
use crate::message::ApiMessage;
use http::header::HeaderName;
use http::{HeaderMap, Method, Uri};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use uuid::Uuid;

/// Headers with this prefix are private to the runtime.
pub const INTERNAL_HEADER_PREFIX: &str = "x-appengine-internal-";
pub const REMOTE_ADDR_HEADER: &str = "x-appengine-internal-remote-addr";
pub const REQUEST_ID_HEADER: &str = "x-appengine-internal-request-id";
pub const CURRENT_NAMESPACE_HEADER: &str = "x-appengine-current-namespace";
pub const DEFAULT_NAMESPACE_HEADER: &str = "x-appengine-default-namespace";

/// Used when the remote-address header is absent.
pub const FALLBACK_REMOTE_ADDR: &str = "127.0.0.1";

/// Opaque identity of one inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestHandle(Uuid);

impl RequestHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Headers kept out of the application-visible request: the internal
/// prefix and the namespace markers.
pub fn is_internal_header(name: &HeaderName) -> bool {
    let name = name.as_str();
    name.starts_with(INTERNAL_HEADER_PREFIX) || name == CURRENT_NAMESPACE_HEADER || name == DEFAULT_NAMESPACE_HEADER
}

/// Read-only copy of the inbound request metadata, internal headers
/// included. Captured once when the context is created.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    method: Method,
    uri: Uri,
    remote_addr: String,
    headers: HeaderMap,
}

impl RequestSnapshot {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        let remote_addr = headers
            .get(REMOTE_ADDR_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(FALLBACK_REMOTE_ADDR)
            .to_string();
        Self {
            method,
            uri,
            remote_addr,
            headers,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// Header value, empty when absent or not visible ASCII.
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    pub fn request_id(&self) -> &str {
        self.header(REQUEST_ID_HEADER)
    }

    pub fn current_namespace(&self) -> &str {
        self.header(CURRENT_NAMESPACE_HEADER)
    }

    pub fn default_namespace(&self) -> &str {
        self.header(DEFAULT_NAMESPACE_HEADER)
    }

    /// Every header, internal ones included
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The application-visible view: internal headers removed.
    pub fn sanitized_headers(&self) -> HeaderMap {
        let mut visible = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            if !is_internal_header(name) {
                visible.append(name.clone(), value.clone());
            }
        }
        visible
    }
}

/// Severity accepted by [`ExecutionContext::log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// State of one in-flight request.
pub struct ExecutionContext {
    handle: RequestHandle,
    request: RequestSnapshot,
    dispatcher: Arc<Dispatcher>,
    config: SharedConfig,
}

impl ExecutionContext {
    pub fn handle(&self) -> RequestHandle {
        self.handle
    }

    pub fn request(&self) -> &RequestSnapshot {
        &self.request
    }

    pub fn request_id(&self) -> &str {
        self.request.request_id()
    }

    pub fn current_namespace(&self) -> &str {
        self.request.current_namespace()
    }

    pub fn default_namespace(&self) -> &str {
        self.request.default_namespace()
    }

    /// Fully-qualified application id, partition prefix included (`s~app`).
    pub fn full_app_id(&self) -> String {
        self.config.get().app_id
    }

    pub fn is_dev_app_server(&self) -> bool {
        self.config.is_dev_app_server()
    }

    /// Issue `service.method`; `output` is written only on success.
    pub async fn call<I, O>(
        &self,
        service: &str,
        method: &str,
        input: &I,
        output: &mut O,
        options: Option<&CallOptions>,
    ) -> Result<(), ApiCallError>
    where
        I: ApiMessage + Clone,
        O: ApiMessage + Default,
    {
        self.dispatcher
            .call(&self.request, service, method, input, output, options)
            .await
    }

    pub fn log(&self, level: LogLevel, message: impl fmt::Display) {
        let request_id = self.request_id();
        match level {
            LogLevel::Debug => tracing::debug!(request_id, "{}", message),
            LogLevel::Info => tracing::info!(request_id, "{}", message),
            LogLevel::Warning => tracing::warn!(request_id, "{}", message),
            LogLevel::Error => tracing::error!(request_id, "{}", message),
            LogLevel::Critical => tracing::error!(request_id, critical = true, "{}", message),
        }
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.log(LogLevel::Info, message)
    }

    pub fn warning(&self, message: impl fmt::Display) {
        self.log(LogLevel::Warning, message)
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.log(LogLevel::Error, message)
    }

    pub fn critical(&self, message: impl fmt::Display) {
        self.log(LogLevel::Critical, message)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("handle", &self.handle)
            .field("method", self.request.method())
            .field("uri", self.request.uri())
            .finish()
    }
}

/// Lookup of a context that is not registered.
///
/// Never converted into an [`ApiCallError`]: the request-handling boundary
/// treats it as fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryViolation {
    #[error("no execution context registered for request {0}")]
    Unregistered(RequestHandle),

    #[error("request did not pass through the context filter")]
    Unfiltered,
}

/// Live contexts keyed by request handle, behind a single lock.
pub struct ContextRegistry {
    dispatcher: Arc<Dispatcher>,
    config: SharedConfig,
    contexts: Mutex<HashMap<RequestHandle, Arc<ExecutionContext>>>,
}

impl ContextRegistry {
    pub fn new(dispatcher: Arc<Dispatcher>, config: SharedConfig) -> Self {
        Self {
            dispatcher,
            config,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Register a fresh context for `handle`, replacing any stale one.
    pub fn create(&self, handle: RequestHandle, request: RequestSnapshot) -> Arc<ExecutionContext> {
        let ctx = Arc::new(ExecutionContext {
            handle,
            request,
            dispatcher: self.dispatcher.clone(),
            config: self.config.clone(),
        });
        let stale = self
            .contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, ctx.clone());
        if stale.is_some() {
            tracing::warn!(%handle, "replaced stale execution context");
        }
        ctx
    }

    pub fn lookup(&self, handle: &RequestHandle) -> Result<Arc<ExecutionContext>, RegistryViolation> {
        let found = self
            .contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle)
            .cloned();
        found.ok_or_else(|| {
            tracing::error!(%handle, "lookup of an unknown request");
            RegistryViolation::Unregistered(*handle)
        })
    }

    /// Remove the context for `handle`; no-op when absent.
    pub fn delete(&self, handle: &RequestHandle) -> bool {
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(handle)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
