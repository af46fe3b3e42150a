//! Test harness for code that issues API calls.
//!
//! ```ignore
//! let runtime = apibridge_testkit::standalone_runtime();
//! let _put = register_override(&runtime, "store", "Put", |req: &PutRequest, out: &mut PutResponse, _| {
//!     out.key = req.key.clone();
//!     Ok(())
//! });
//!
//! let request = TestRequest::get("/items/1").create(&runtime);
//! request.call("store", "Put", &put, &mut reply, None).await?;
//! // context deleted and override removed when both guards drop
//! ```

pub mod backend;
pub mod overrides;
pub mod request;

pub use backend::{CannedReply, FakeBackend};
pub use overrides::{register_override, OverrideGuard};
pub use request::{TestRequest, TestRequestBuilder};

use apibridge_core::{HttpTransport, InstanceConfig, Runtime};
use std::sync::Arc;

/// Runtime for the synthetic standalone instance, default transport.
pub fn standalone_runtime() -> Arc<Runtime> {
    Arc::new(Runtime::builder(InstanceConfig::standalone()).build())
}

/// Runtime whose transport posts to `backend`.
pub fn runtime_with_backend(backend: &FakeBackend) -> Arc<Runtime> {
    Arc::new(
        Runtime::builder(InstanceConfig::standalone())
            .transport(Arc::new(HttpTransport::new(backend.address())))
            .build(),
    )
}
