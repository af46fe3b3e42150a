//! Runtime: the registries and dispatcher shared by every request.
//!
//! Built once by bootstrap (or a test) and handed around explicitly.
use crate::config::{InstanceConfig, SharedConfig};
use crate::context::ContextRegistry;
use crate::dispatcher::Dispatcher;
use crate::error::ErrorCodeTables;
use crate::message::ApiMessage;
use crate::overrides::{NamespaceMods, OverrideRegistry};
use crate::transport::{HttpTransport, Transport};
use std::sync::Arc;

pub struct Runtime {
    config: SharedConfig,
    overrides: Arc<OverrideRegistry>,
    dispatcher: Arc<Dispatcher>,
    contexts: ContextRegistry,
}

impl Runtime {
    pub fn builder(config: InstanceConfig) -> RuntimeBuilder {
        RuntimeBuilder::new(config)
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn overrides(&self) -> &Arc<OverrideRegistry> {
        &self.overrides
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn contexts(&self) -> &ContextRegistry {
        &self.contexts
    }
}

pub struct RuntimeBuilder {
    config: InstanceConfig,
    error_codes: ErrorCodeTables,
    namespace_mods: NamespaceMods,
    transport: Option<Arc<dyn Transport>>,
}

impl RuntimeBuilder {
    pub fn new(config: InstanceConfig) -> Self {
        Self {
            config,
            error_codes: ErrorCodeTables::new(),
            namespace_mods: NamespaceMods::new(),
            transport: None,
        }
    }

    /// Register the error-code table of `service`
    pub fn error_codes<I, S>(mut self, service: impl Into<String>, table: I) -> Self
    where
        I: IntoIterator<Item = (i32, S)>,
        S: Into<String>,
    {
        self.error_codes.register(service, table);
        self
    }

    /// Register the namespace mutator of `service`
    pub fn namespace_mod<M, F>(mut self, service: impl Into<String>, f: F) -> Self
    where
        M: ApiMessage,
        F: Fn(&mut M, &str) + Send + Sync + 'static,
    {
        self.namespace_mods.register_typed(service, f);
        self
    }

    /// Replace the default HTTP transport to `http://localhost:<api_port>`
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Runtime {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.config.api_address())),
        };
        let overrides = Arc::new(OverrideRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            overrides.clone(),
            Arc::new(self.namespace_mods),
            Arc::new(self.error_codes),
            transport,
        ));
        let config = SharedConfig::new(self.config);

        tracing::info!(app_id = %config.get().app_id, "API bridge runtime ready");
        Runtime {
            contexts: ContextRegistry::new(dispatcher.clone(), config.clone()),
            config,
            overrides,
            dispatcher,
        }
    }
}
