//! Extractor giving application handlers their execution context.
use crate::middleware::Bridge;
use apibridge_core::{ExecutionContext, RegistryViolation, RequestHandle};
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, Extensions, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::ops::Deref;
use std::sync::Arc;

/// The execution context of the current request.
pub struct RequestContext(pub Arc<ExecutionContext>);

impl Deref for RequestContext {
    type Target = ExecutionContext;

    fn deref(&self) -> &ExecutionContext {
        &self.0
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ContextRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        resolve(&parts.extensions).map(RequestContext)
    }
}

/// Look up the context registered by the filter for these extensions.
pub fn resolve(extensions: &Extensions) -> Result<Arc<ExecutionContext>, ContextRejection> {
    let bridge = extensions.get::<Bridge>().ok_or(RegistryViolation::Unfiltered)?;
    let handle = extensions
        .get::<RequestHandle>()
        .ok_or(RegistryViolation::Unfiltered)?;
    Ok(bridge.runtime().contexts().lookup(handle)?)
}

/// Carries a [`RegistryViolation`] out to the filter.
///
/// Responds 500 and stores the violation in the response extensions,
/// where the filter picks it up.
#[derive(Debug)]
pub struct ContextRejection(pub RegistryViolation);

impl From<RegistryViolation> for ContextRejection {
    fn from(violation: RegistryViolation) -> Self {
        Self(violation)
    }
}

impl IntoResponse for ContextRejection {
    fn into_response(self) -> Response {
        let mut response = (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "context", "message": self.0.to_string() })),
        )
            .into_response();
        response.extensions_mut().insert(self.0);
        response
    }
}
