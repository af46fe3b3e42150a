//! Integration tests for the request filter and the context extractor.
//!
//! Requests are driven through the full router with `oneshot`; calls to
//! the backend are served by overrides so no network is involved.

use std::sync::{Arc, Mutex};

use apibridge_api::{create_app, Bridge, ContextRejection, RemoteAddr, RequestContext, HEALTH_CHECK_PATH};
use apibridge_core::context::{CURRENT_NAMESPACE_HEADER, REMOTE_ADDR_HEADER, REQUEST_ID_HEADER};
use apibridge_core::dispatcher::{GET_NAMESPACE, NAMESPACE_SERVICE};
use apibridge_core::{
    ApiCallError, ApplicationError, InstanceConfig, RegistryViolation, RequestHandle, Runtime, StringProto,
    VoidProto,
};
use axum::body::{to_bytes, Body};
use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower::ServiceExt;

#[derive(Clone, PartialEq, prost::Message)]
struct GetItem {
    #[prost(string, tag = "1")]
    id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
struct Item {
    #[prost(string, tag = "1")]
    name: String,
}

const NO_SUCH_ENTITY: i32 = 1;

/// GET /items/{id}: looks the item up through the `store` service.
async fn get_item(ctx: RequestContext, Path(id): Path<String>) -> Response {
    let mut item = Item::default();
    match ctx.call("store", "Get", &GetItem { id }, &mut item, None).await {
        Ok(()) => (StatusCode::OK, item.name).into_response(),
        Err(ApiCallError::Application(e)) if e.code == NO_SUCH_ENTITY => StatusCode::NOT_FOUND.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn inspect(ctx: RequestContext, headers: HeaderMap, Extension(remote): Extension<RemoteAddr>) -> String {
    let mut namespace = StringProto::default();
    ctx.call(NAMESPACE_SERVICE, GET_NAMESPACE, &VoidProto {}, &mut namespace, None)
        .await
        .unwrap();
    format!(
        "{}|{}|{}|{}|{}",
        remote.0,
        ctx.request_id(),
        namespace.value(),
        headers.contains_key(REQUEST_ID_HEADER),
        headers.len(),
    )
}

/// Deletes its own context, then resolves it again.
async fn use_after_delete(
    Extension(bridge): Extension<Bridge>,
    Extension(handle): Extension<RequestHandle>,
) -> Result<&'static str, ContextRejection> {
    bridge.runtime().contexts().delete(&handle);
    bridge.runtime().contexts().lookup(&handle)?;
    Ok("unreachable")
}

fn app_routes() -> Router {
    Router::new()
        .route("/items/{id}", get(get_item))
        .route("/inspect", get(inspect))
        .route("/use-after-delete", get(use_after_delete))
}

struct Harness {
    runtime: Arc<Runtime>,
    violations: Arc<Mutex<Vec<RegistryViolation>>>,
    app: Router,
}

fn harness() -> Harness {
    let runtime = Arc::new(Runtime::builder(InstanceConfig::standalone()).build());
    let violations = Arc::new(Mutex::new(Vec::new()));
    let seen = violations.clone();
    let bridge = Bridge::new(runtime.clone()).with_fatal_hook(move |v| seen.lock().unwrap().push(v.clone()));
    Harness {
        app: create_app(bridge, app_routes()),
        runtime,
        violations,
    }
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let h = harness();
    let response = h
        .app
        .oneshot(Request::get(HEALTH_CHECK_PATH).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
    assert!(h.runtime.contexts().is_empty());
}

#[tokio::test]
async fn test_internal_headers_hidden_from_handler() {
    let h = harness();
    let request = Request::get("/inspect")
        .header(REMOTE_ADDR_HEADER, "203.0.113.9")
        .header(REQUEST_ID_HEADER, "corr-77")
        .header(CURRENT_NAMESPACE_HEADER, "tenant-a")
        .header("x-appengine-internal-datacenter", "us1")
        .header("accept", "text/plain")
        .body(Body::empty())
        .unwrap();

    let response = h.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "203.0.113.9|corr-77|tenant-a|false|1");
}

#[tokio::test]
async fn test_remote_addr_fallback() {
    let h = harness();
    let response = h
        .app
        .oneshot(Request::get("/inspect").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(body_text(response).await.starts_with("127.0.0.1|"));
}

#[tokio::test]
async fn test_context_deleted_after_every_request() {
    let h = harness();
    h.runtime
        .overrides()
        .register_typed("store", "Get", |req: &GetItem, out: &mut Item, _| {
            if req.id == "missing" {
                return Err(ApplicationError::new("store", NO_SUCH_ENTITY, "no such entity").into());
            }
            out.name = format!("item {}", req.id);
            Ok(())
        });

    let ok = h
        .app
        .clone()
        .oneshot(Request::get("/items/42").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    assert_eq!(body_text(ok).await, "item 42");
    assert!(h.runtime.contexts().is_empty());

    let missing = h
        .app
        .clone()
        .oneshot(Request::get("/items/missing").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert!(h.runtime.contexts().is_empty());
}

#[tokio::test]
async fn test_unreachable_backend_surfaces_as_500() {
    let h = harness();
    let response = h
        .app
        .oneshot(Request::get("/items/7").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(h.runtime.contexts().is_empty());
    assert!(h.violations.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_registry_violation_reaches_fatal_hook() {
    let h = harness();
    let response = h
        .app
        .oneshot(Request::get("/use-after-delete").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let violations = h.violations.lock().unwrap();
    assert_eq!(violations.len(), 1);
    assert!(matches!(violations[0], RegistryViolation::Unregistered(_)));
}

#[tokio::test]
async fn test_extractor_without_filter_is_rejected() {
    let app = Router::new().route("/", get(|ctx: RequestContext| async move { ctx.request_id().to_string() }));
    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.extensions().get::<RegistryViolation>(),
        Some(&RegistryViolation::Unfiltered)
    );
}
