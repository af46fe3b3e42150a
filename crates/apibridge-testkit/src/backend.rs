//! In-process backend speaking the envelope protocol.
use apibridge_core::wire::{self, ResponseOutcome};
use apibridge_core::ApiMessage;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Reported for calls without a canned reply or fallback.
pub const CALL_NOT_FOUND: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CannedReply {
    Payload(Vec<u8>),
    ApplicationError { code: i32, detail: String },
    CallError { code: i32, detail: String },
    /// Body sent as is, bypassing the envelope
    Raw(Vec<u8>),
    /// Bare HTTP status, no envelope
    Status(StatusCode),
}

#[derive(Default)]
struct BackendState {
    replies: Mutex<HashMap<(String, String), CannedReply>>,
    fallback: Mutex<Option<CannedReply>>,
    received: Mutex<Vec<wire::Request>>,
}

pub struct FakeBackend {
    addr: SocketAddr,
    state: Arc<BackendState>,
    task: JoinHandle<()>,
}

impl FakeBackend {
    /// Bind on an ephemeral loopback port and start serving.
    pub async fn start() -> std::io::Result<Self> {
        let state = Arc::new(BackendState::default());
        let app = Router::new().route("/", post(handle)).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "fake backend stopped");
            }
        });

        Ok(Self { addr, state, task })
    }

    pub fn address(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn reply(&self, service: &str, method: &str, reply: CannedReply) {
        self.state
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((service.to_string(), method.to_string()), reply);
    }

    /// Answer `service.method` with `message` as the success payload
    pub fn reply_with<M: ApiMessage>(&self, service: &str, method: &str, message: &M) {
        self.reply(service, method, CannedReply::Payload(message.encode_bytes()));
    }

    /// Reply for every call without a canned reply
    pub fn fallback(&self, reply: CannedReply) {
        *self.state.fallback.lock().unwrap_or_else(PoisonError::into_inner) = Some(reply);
    }

    /// Envelopes received so far, in arrival order.
    pub fn received(&self) -> Vec<wire::Request> {
        self.state
            .received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle(State(state): State<Arc<BackendState>>, body: Bytes) -> Response {
    let request = match wire::decode_request(&body) {
        Ok(request) => request,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let key = (request.service_name.clone(), request.method.clone());
    state
        .received
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(request);

    let canned = state
        .replies
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
        .cloned();
    let reply = canned
        .or_else(|| state.fallback.lock().unwrap_or_else(PoisonError::into_inner).clone())
        .unwrap_or_else(|| CannedReply::CallError {
            code: CALL_NOT_FOUND,
            detail: format!("no canned reply for {}.{}", key.0, key.1),
        });

    let outcome = match reply {
        CannedReply::Payload(bytes) => ResponseOutcome::Payload(bytes),
        CannedReply::ApplicationError { code, detail } => ResponseOutcome::Application { code, detail },
        CannedReply::CallError { code, detail } => ResponseOutcome::Call { code, detail },
        CannedReply::Raw(bytes) => return (StatusCode::OK, bytes).into_response(),
        CannedReply::Status(status) => return (status, "simulated backend failure").into_response(),
    };
    (StatusCode::OK, wire::encode_response(&outcome)).into_response()
}
