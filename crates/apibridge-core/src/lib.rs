//! API Bridge Core: Call Dispatch, Wire Codec, e Registries
//!
//! Routes typed `service.method` calls issued from an in-flight request
//! either to a registered in-process override or to the backend RPC
//! endpoint over HTTP, and keeps one execution context per live request.
//!
//! ```text
//! Call → __go__ built-ins? → override registered? → encode → Transport → decode
//!            ↓                      ↓                                  ↓
//!      request metadata        override fn                 payload / ApiCallError
//! ```

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod overrides;
pub mod runtime;
pub mod transport;
pub mod wire;

pub use config::{ConfigError, ConfigMode, InstanceConfig, LoadedConfig, SharedConfig};
pub use context::{ContextRegistry, ExecutionContext, RegistryViolation, RequestHandle, RequestSnapshot};
pub use dispatcher::{CallOptions, Dispatcher};
pub use error::{ApiCallError, ApplicationError, CallError, CodecError, ErrorCodeTables, TransportError};
pub use message::{ApiMessage, StringProto, VoidProto};
pub use overrides::{NamespaceMods, OverrideRegistry};
pub use runtime::{Runtime, RuntimeBuilder};
pub use transport::{HttpTransport, Transport};

/// Versão do bridge
pub const BRIDGE_VERSION: &str = "1.0.0";
