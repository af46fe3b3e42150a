//! Payload capability for everything that flows through `Call`.
use prost::Message;
use std::any::Any;

/// What the dispatcher needs from a request or response message.
///
/// Implemented for every `prost::Message`, so application types only need
/// `#[derive(prost::Message)]`.
pub trait ApiMessage: Send + Sync + 'static {
    /// Serialize to wire bytes
    fn encode_bytes(&self) -> Vec<u8>;

    /// Merge wire bytes into `self`
    fn merge_bytes(&mut self, buf: &[u8]) -> Result<(), prost::DecodeError>;

    /// Reset every field to its default
    fn reset(&mut self);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T> ApiMessage for T
where
    T: Message + Default + 'static,
{
    fn encode_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    fn merge_bytes(&mut self, buf: &[u8]) -> Result<(), prost::DecodeError> {
        self.merge(buf)
    }

    fn reset(&mut self) {
        self.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Single optional string, the reply type of the namespace built-ins.
#[derive(Clone, PartialEq, Message)]
pub struct StringProto {
    #[prost(string, optional, tag = "1")]
    pub value: Option<String>,
}

impl StringProto {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
        }
    }
}

/// Empty message for calls without a meaningful request or reply.
#[derive(Clone, PartialEq, Message)]
pub struct VoidProto {}
