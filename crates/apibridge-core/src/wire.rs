//! Wire Codec: request/response envelopes exchanged with the backend.
//!
//! The envelope is a protobuf message. Encoding never fails; decoding
//! distinguishes a malformed envelope ([`CodecError`]) from a well-formed
//! envelope that reports a failure ([`ResponseOutcome::Application`],
//! [`ResponseOutcome::Call`]).
use crate::error::CodecError;
use prost::Message;

/// Content type of every envelope POSTed to the backend.
pub const ENVELOPE_CONTENT_TYPE: &str = "application/octet-stream";

/// Outbound call envelope
#[derive(Clone, PartialEq, Message)]
pub struct Request {
    #[prost(string, tag = "2")]
    pub service_name: String,
    #[prost(string, tag = "3")]
    pub method: String,
    #[prost(bytes = "vec", tag = "4")]
    pub request: Vec<u8>,
    #[prost(string, optional, tag = "5")]
    pub request_id: Option<String>,
}

/// Inbound reply envelope
#[derive(Clone, PartialEq, Message)]
pub struct Response {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub response: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub exception: Option<Vec<u8>>,
    #[prost(message, optional, tag = "3")]
    pub application_error: Option<WireApplicationError>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub java_exception: Option<Vec<u8>>,
    #[prost(message, optional, tag = "5")]
    pub rpc_error: Option<WireRpcError>,
}

/// Service-scoped failure reported by the backend
#[derive(Clone, PartialEq, Message)]
pub struct WireApplicationError {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub detail: String,
}

/// Cross-service failure reported by the backend
#[derive(Clone, PartialEq, Message)]
pub struct WireRpcError {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, optional, tag = "2")]
    pub detail: Option<String>,
}

/// What a well-formed reply envelope carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    Payload(Vec<u8>),
    Application { code: i32, detail: String },
    Call { code: i32, detail: String },
}

/// Build the outbound envelope for `service.method`.
pub fn encode_request(service: &str, method: &str, payload: Vec<u8>, request_id: &str) -> Vec<u8> {
    Request {
        service_name: service.to_string(),
        method: method.to_string(),
        request: payload,
        request_id: Some(request_id.to_string()),
    }
    .encode_to_vec()
}

/// Backend side of [`encode_request`].
pub fn decode_request(bytes: &[u8]) -> Result<Request, CodecError> {
    Ok(Request::decode(bytes)?)
}

/// Classify a reply envelope.
///
/// Error fields win over the payload. An `rpc_error` with code 0 means OK
/// and is ignored.
pub fn decode_response(bytes: &[u8]) -> Result<ResponseOutcome, CodecError> {
    let response = Response::decode(bytes)?;

    if let Some(ae) = response.application_error {
        return Ok(ResponseOutcome::Application {
            code: ae.code,
            detail: ae.detail,
        });
    }
    if let Some(rpc) = response.rpc_error.filter(|e| e.code != 0) {
        return Ok(ResponseOutcome::Call {
            code: rpc.code,
            detail: rpc.detail.unwrap_or_default(),
        });
    }
    if let Some(payload) = response.response {
        return Ok(ResponseOutcome::Payload(payload));
    }
    if response.exception.is_some() || response.java_exception.is_some() {
        return Err(CodecError::Exception);
    }
    Err(CodecError::EmptyResponse)
}

/// Backend side of [`decode_response`].
pub fn encode_response(outcome: &ResponseOutcome) -> Vec<u8> {
    let mut response = Response::default();
    match outcome {
        ResponseOutcome::Payload(bytes) => response.response = Some(bytes.clone()),
        ResponseOutcome::Application { code, detail } => {
            response.application_error = Some(WireApplicationError {
                code: *code,
                detail: detail.clone(),
            })
        }
        ResponseOutcome::Call { code, detail } => {
            response.rpc_error = Some(WireRpcError {
                code: *code,
                detail: Some(detail.clone()),
            })
        }
    }
    response.encode_to_vec()
}
