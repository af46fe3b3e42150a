//! Override Registry: in-process replacements for backend calls
//!
//! Consulted by the dispatcher before any network call. Tests register
//! stubs here; simulators register whole services.
use crate::dispatcher::CallOptions;
use crate::error::{ApiCallError, CodecError};
use crate::message::ApiMessage;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Type-erased override: `(input, output, options)`.
pub type OverrideFn =
    Arc<dyn Fn(&dyn ApiMessage, &mut dyn ApiMessage, Option<&CallOptions>) -> Result<(), ApiCallError> + Send + Sync>;

/// Mutator attaching a namespace to an outbound request.
pub type NamespaceModFn = Arc<dyn Fn(&mut dyn ApiMessage, &str) + Send + Sync>;

/// `(service, method)` key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub service: String,
    pub method: String,
}

impl MethodKey {
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
        }
    }
}

/// Process-wide override table. Last registration for a key wins.
#[derive(Default)]
pub struct OverrideRegistry {
    entries: RwLock<HashMap<MethodKey, OverrideFn>>,
}

impl OverrideRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an override, replacing any previous one for the key.
    ///
    /// Returns the stored entry, for [`OverrideRegistry::unregister_entry`].
    pub fn register<F>(&self, service: impl Into<String>, method: impl Into<String>, f: F) -> OverrideFn
    where
        F: Fn(&dyn ApiMessage, &mut dyn ApiMessage, Option<&CallOptions>) -> Result<(), ApiCallError>
            + Send
            + Sync
            + 'static,
    {
        let key = MethodKey::new(service, method);
        tracing::debug!(service = %key.service, method = %key.method, "registering API override");
        let entry: OverrideFn = Arc::new(f);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, entry.clone());
        entry
    }

    /// Register an override over concrete message types.
    ///
    /// A call whose messages are not `I`/`O` fails with
    /// [`CodecError::PayloadMismatch`].
    pub fn register_typed<I, O, F>(&self, service: impl Into<String>, method: impl Into<String>, f: F) -> OverrideFn
    where
        I: ApiMessage,
        O: ApiMessage,
        F: Fn(&I, &mut O, Option<&CallOptions>) -> Result<(), ApiCallError> + Send + Sync + 'static,
    {
        self.register(service, method, move |input, output, options| {
            let input = input
                .as_any()
                .downcast_ref::<I>()
                .ok_or(CodecError::PayloadMismatch {
                    expected: std::any::type_name::<I>(),
                })?;
            let output = output
                .as_any_mut()
                .downcast_mut::<O>()
                .ok_or(CodecError::PayloadMismatch {
                    expected: std::any::type_name::<O>(),
                })?;
            f(input, output, options)
        })
    }

    /// Remove the override for the key. Returns whether one existed.
    pub fn unregister(&self, service: &str, method: &str) -> bool {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&MethodKey::new(service, method))
            .is_some();
        if removed {
            tracing::debug!(service, method, "unregistered API override");
        }
        removed
    }

    /// Remove the key only while `entry` is still the registered override.
    ///
    /// A later registration for the same key stays in place.
    pub fn unregister_entry(&self, service: &str, method: &str, entry: &OverrideFn) -> bool {
        let key = MethodKey::new(service, method);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(&key) {
            Some(current) if Arc::ptr_eq(current, entry) => {
                entries.remove(&key);
                tracing::debug!(service, method, "unregistered API override");
                true
            }
            _ => false,
        }
    }

    /// The current override for the key, if any.
    ///
    /// The lock is released before the caller invokes the returned fn.
    pub fn lookup(&self, service: &str, method: &str) -> Option<OverrideFn> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&MethodKey::new(service, method))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Namespace mutators per service.
///
/// Built during initialization and read-only afterwards. A mutator may see
/// the same message more than once and must only modify it the first time.
#[derive(Default, Clone)]
pub struct NamespaceMods {
    mods: HashMap<String, NamespaceModFn>,
}

impl NamespaceMods {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, service: impl Into<String>, f: F)
    where
        F: Fn(&mut dyn ApiMessage, &str) + Send + Sync + 'static,
    {
        self.mods.insert(service.into(), Arc::new(f));
    }

    /// Register a mutator for one concrete request type; other types pass
    /// through untouched.
    pub fn register_typed<M, F>(&mut self, service: impl Into<String>, f: F)
    where
        M: ApiMessage,
        F: Fn(&mut M, &str) + Send + Sync + 'static,
    {
        self.register(service, move |message, namespace| {
            if let Some(message) = message.as_any_mut().downcast_mut::<M>() {
                f(message, namespace);
            }
        });
    }

    pub fn get(&self, service: &str) -> Option<&NamespaceModFn> {
        self.mods.get(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{StringProto, VoidProto};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn invoke(registry: &OverrideRegistry, service: &str, method: &str) -> StringProto {
        let f = registry.lookup(service, method).unwrap();
        let input = StringProto::new("in");
        let mut output = StringProto::default();
        f(&input, &mut output, None).unwrap();
        output
    }

    #[test]
    fn test_register_lookup_unregister() {
        let registry = OverrideRegistry::new();
        assert!(registry.lookup("store", "Put").is_none());

        registry.register_typed("store", "Put", |input: &StringProto, out: &mut StringProto, _| {
            out.value = Some(format!("got {}", input.value()));
            Ok(())
        });
        assert_eq!(registry.len(), 1);
        assert_eq!(invoke(&registry, "store", "Put").value(), "got in");
        assert!(registry.lookup("store", "Get").is_none());

        assert!(registry.unregister("store", "Put"));
        assert!(!registry.unregister("store", "Put"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_last_registration_wins() {
        let registry = OverrideRegistry::new();
        let first_calls = Arc::new(AtomicUsize::new(0));

        let counter = first_calls.clone();
        registry.register_typed("store", "Put", move |_: &StringProto, out: &mut StringProto, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            out.value = Some("first".to_string());
            Ok(())
        });
        registry.register_typed("store", "Put", |_: &StringProto, out: &mut StringProto, _| {
            out.value = Some("second".to_string());
            Ok(())
        });

        assert_eq!(invoke(&registry, "store", "Put").value(), "second");
        assert_eq!(first_calls.load(Ordering::SeqCst), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_entry_keeps_newer_registration() {
        let registry = OverrideRegistry::new();
        let first = registry.register_typed("store", "Put", |_: &StringProto, out: &mut StringProto, _| {
            out.value = Some("first".to_string());
            Ok(())
        });
        let second = registry.register_typed("store", "Put", |_: &StringProto, out: &mut StringProto, _| {
            out.value = Some("second".to_string());
            Ok(())
        });

        assert!(!registry.unregister_entry("store", "Put", &first));
        assert_eq!(invoke(&registry, "store", "Put").value(), "second");

        assert!(registry.unregister_entry("store", "Put", &second));
        assert!(registry.is_empty());
        assert!(!registry.unregister_entry("store", "Put", &second));
    }

    #[test]
    fn test_typed_override_type_mismatch() {
        let registry = OverrideRegistry::new();
        registry.register_typed("store", "Put", |_: &VoidProto, _: &mut VoidProto, _| Ok(()));

        let f = registry.lookup("store", "Put").unwrap();
        let mut output = VoidProto::default();
        let err = f(&StringProto::new("x"), &mut output, None).unwrap_err();
        assert!(matches!(err, ApiCallError::Codec(CodecError::PayloadMismatch { .. })));
    }

    #[test]
    fn test_concurrent_register_and_lookup() {
        let registry = Arc::new(OverrideRegistry::new());
        let mut handles = Vec::new();

        for i in 0..8 {
            let registry = registry.clone();
            handles.push(thread::spawn(move || {
                let method = format!("M{}", i % 2);
                for _ in 0..200 {
                    registry.register_typed("svc", method.clone(), |_: &StringProto, out: &mut StringProto, _| {
                        out.value = Some("ok".to_string());
                        Ok(())
                    });
                    if let Some(f) = registry.lookup("svc", &method) {
                        let mut out = StringProto::default();
                        f(&StringProto::default(), &mut out, None).unwrap();
                        assert_eq!(out.value(), "ok");
                    }
                    registry.unregister("svc", &method);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(registry.len() <= 2);
    }

    #[test]
    fn test_namespace_mod_typed() {
        let mut mods = NamespaceMods::new();
        mods.register_typed("store", |m: &mut StringProto, ns: &str| {
            if m.value.is_none() {
                m.value = Some(ns.to_string());
            }
        });

        let f = mods.get("store").unwrap();
        let mut message = StringProto::default();
        f(&mut message, "tenant-a");
        f(&mut message, "tenant-b");
        assert_eq!(message.value(), "tenant-a");

        let mut other = VoidProto::default();
        f(&mut other, "tenant-a");
        assert!(mods.get("queue").is_none());
    }
}
