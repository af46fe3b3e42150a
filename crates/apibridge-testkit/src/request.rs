//! Synthetic requests with a registered execution context.
use apibridge_core::context::{CURRENT_NAMESPACE_HEADER, DEFAULT_NAMESPACE_HEADER, REMOTE_ADDR_HEADER, REQUEST_ID_HEADER};
use apibridge_core::{ExecutionContext, RequestHandle, RequestSnapshot, Runtime};
use http::header::{HeaderName, HeaderValue, InvalidHeaderValue};
use http::{HeaderMap, Method, Uri};
use std::ops::Deref;
use std::sync::Arc;

pub struct TestRequestBuilder {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
}

impl TestRequestBuilder {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    fn internal(self, name: &'static str, value: &str) -> Result<Self, InvalidHeaderValue> {
        let value = HeaderValue::from_str(value)?;
        Ok(self.header(HeaderName::from_static(name), value))
    }

    pub fn request_id(self, id: &str) -> Result<Self, InvalidHeaderValue> {
        self.internal(REQUEST_ID_HEADER, id)
    }

    pub fn remote_addr(self, addr: &str) -> Result<Self, InvalidHeaderValue> {
        self.internal(REMOTE_ADDR_HEADER, addr)
    }

    pub fn current_namespace(self, namespace: &str) -> Result<Self, InvalidHeaderValue> {
        self.internal(CURRENT_NAMESPACE_HEADER, namespace)
    }

    pub fn default_namespace(self, namespace: &str) -> Result<Self, InvalidHeaderValue> {
        self.internal(DEFAULT_NAMESPACE_HEADER, namespace)
    }

    /// Register a context for the synthetic request.
    pub fn create(self, runtime: &Arc<Runtime>) -> TestRequest {
        let handle = RequestHandle::new();
        let snapshot = RequestSnapshot::new(self.method, self.uri, self.headers);
        let context = runtime.contexts().create(handle, snapshot);
        tracing::debug!(%handle, "created test context");
        TestRequest {
            runtime: runtime.clone(),
            context,
        }
    }
}

/// A registered test context; deleted when dropped.
pub struct TestRequest {
    runtime: Arc<Runtime>,
    context: Arc<ExecutionContext>,
}

impl TestRequest {
    pub fn builder(method: Method, uri: Uri) -> TestRequestBuilder {
        TestRequestBuilder::new(method, uri)
    }

    pub fn get(uri: &'static str) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::GET, Uri::from_static(uri))
    }

    pub fn put(uri: &'static str) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::PUT, Uri::from_static(uri))
    }

    pub fn handle(&self) -> RequestHandle {
        self.context.handle()
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }

    /// Delete the context now instead of at end of scope.
    pub fn finish(self) {}
}

impl Deref for TestRequest {
    type Target = ExecutionContext;

    fn deref(&self) -> &ExecutionContext {
        &self.context
    }
}

impl Drop for TestRequest {
    fn drop(&mut self) {
        self.runtime.contexts().delete(&self.context.handle());
    }
}
