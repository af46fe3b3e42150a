//! Call Dispatcher: resolves one `service.method` call.
//!
//! Order: namespace built-ins, then overrides, then the wire codec and the
//! transport. The caller's output is written only when the call succeeds.
use crate::context::RequestSnapshot;
use crate::error::{ApiCallError, CallError, ErrorCodeTables};
use crate::message::{ApiMessage, StringProto};
use crate::overrides::{NamespaceMods, OverrideRegistry};
use crate::transport::Transport;
use crate::wire::{self, ResponseOutcome};
use std::sync::Arc;
use std::time::Duration;

/// Reserved service answered from request metadata.
pub const NAMESPACE_SERVICE: &str = "__go__";
pub const GET_NAMESPACE: &str = "GetNamespace";
pub const GET_DEFAULT_NAMESPACE: &str = "GetDefaultNamespace";

/// Per-call options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Overrides the transport default when set and non-zero
    pub timeout: Option<Duration>,
}

impl CallOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout: Some(timeout) }
    }

    /// The timeout to hand the transport; zero means "use the default".
    pub fn effective_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }
}

pub struct Dispatcher {
    overrides: Arc<OverrideRegistry>,
    namespace_mods: Arc<NamespaceMods>,
    error_codes: Arc<ErrorCodeTables>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(
        overrides: Arc<OverrideRegistry>,
        namespace_mods: Arc<NamespaceMods>,
        error_codes: Arc<ErrorCodeTables>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            overrides,
            namespace_mods,
            error_codes,
            transport,
        }
    }

    pub fn overrides(&self) -> &Arc<OverrideRegistry> {
        &self.overrides
    }

    pub fn error_codes(&self) -> &ErrorCodeTables {
        &self.error_codes
    }

    /// Issue `service.method` on behalf of the request described by `request`.
    pub async fn call<I, O>(
        &self,
        request: &RequestSnapshot,
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
        if let Some(value) = builtin_reply(request, service, method) {
            return commit(output, &StringProto::new(value).encode_bytes());
        }

        if let Some(f) = self.overrides.lookup(service, method) {
            tracing::debug!(service, method, "API call served by override");
            let input: &dyn ApiMessage = input;
            let mut staged = O::default();
            f(input, &mut staged, options)?;
            *output = staged;
            return Ok(());
        }

        let request_id = request.request_id();
        let envelope = wire::encode_request(service, method, self.encode_input(request, service, input), request_id);
        tracing::debug!(service, method, request_id, "dispatching API call to backend");

        let reply = self.transport.send(envelope, options.and_then(CallOptions::effective_timeout)).await?;
        match wire::decode_response(&reply)? {
            ResponseOutcome::Payload(bytes) => commit(output, &bytes),
            ResponseOutcome::Application { code, detail } => {
                Err(self.error_codes.application_error(service, code, detail).into())
            }
            ResponseOutcome::Call { code, detail } => Err(CallError::new(code, detail).into()),
        }
    }

    fn encode_input<I>(&self, request: &RequestSnapshot, service: &str, input: &I) -> Vec<u8>
    where
        I: ApiMessage + Clone,
    {
        let namespace = request.current_namespace();
        match self.namespace_mods.get(service) {
            Some(apply) if !namespace.is_empty() => {
                let mut scoped = input.clone();
                apply(&mut scoped, namespace);
                scoped.encode_bytes()
            }
            _ => input.encode_bytes(),
        }
    }
}

fn builtin_reply(request: &RequestSnapshot, service: &str, method: &str) -> Option<String> {
    if service != NAMESPACE_SERVICE {
        return None;
    }
    match method {
        GET_NAMESPACE => Some(request.current_namespace().to_string()),
        GET_DEFAULT_NAMESPACE => Some(request.default_namespace().to_string()),
        _ => None,
    }
}

/// Decode into a fresh value and swap it in only when decoding succeeds.
fn commit<O>(output: &mut O, bytes: &[u8]) -> Result<(), ApiCallError>
where
    O: ApiMessage + Default,
{
    let mut staged = O::default();
    staged.merge_bytes(bytes).map_err(crate::error::CodecError::from)?;
    *output = staged;
    Ok(())
}
