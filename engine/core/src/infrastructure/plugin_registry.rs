// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Plugin Registry - Name → factory map for property plugins
//
// Built once at startup and shared by the resolver. Registering a name twice
// is reported as `RegistryError::Duplicate`; the host treats that as fatal.
// Looking up an unknown name is an ordinary error the resolver degrades on.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::domain::plugin::{PluginFactory, PluginInstance, PluginRegistration};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("{kind} type already registered: {name}")]
    Duplicate { kind: &'static str, name: String },

    #[error("{kind} type not registered: {name}")]
    NotRegistered { kind: &'static str, name: String },
}

/// Registry for property plugins
#[derive(Default)]
pub struct PluginRegistry {
    entries: RwLock<HashMap<String, PluginRegistration>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, registration: PluginRegistration) -> Result<(), RegistryError> {
        let name = name.into();
        let mut entries = self.entries.write();
        if entries.contains_key(&name) {
            return Err(RegistryError::Duplicate { kind: "Plugin", name });
        }
        let capability = match registration.factory {
            PluginFactory::ReadOnly(_) => "read",
            PluginFactory::ReadWrite(_) => "read-write",
        };
        info!(plugin = %name, capability, closable = registration.on_close.is_some(), "Registered plugin");
        entries.insert(name, registration);
        Ok(())
    }

    pub fn register_factory(&self, name: impl Into<String>, factory: PluginFactory) -> Result<(), RegistryError> {
        self.register(name, PluginRegistration::new(factory))
    }

    /// Fresh instance of the named plugin.
    pub fn instantiate(&self, name: &str) -> Result<PluginInstance, RegistryError> {
        let entries = self.entries.read();
        entries
            .get(name)
            .map(|registration| registration.factory.instantiate())
            .ok_or_else(|| RegistryError::NotRegistered {
                kind: "Plugin",
                name: name.to_string(),
            })
    }

    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.entries.write().remove(name).is_some();
        if removed {
            debug!(plugin = %name, "Unregistered plugin");
        }
        removed
    }

    /// Tear down a plugin that registered a close hook: the hook runs and the
    /// name is unregistered. Plugins without a hook are left in place.
    pub fn close(&self, name: &str) -> bool {
        let hook = {
            let mut entries = self.entries.write();
            match entries.get(name).and_then(|r| r.on_close.clone()) {
                Some(hook) => {
                    entries.remove(name);
                    hook
                }
                None => return false,
            }
        };
        info!(plugin = %name, "Closing plugin");
        hook();
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plugin::{PluginError, PropertyReader, PropertyRequest};
    use crate::domain::property::PropertyNode;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixed;

    #[async_trait]
    impl PropertyReader for Fixed {
        async fn read(&self, _request: &PropertyRequest) -> Result<PropertyNode, PluginError> {
            Ok(PropertyNode::Scalar(Value::from(1)))
        }
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let registry = PluginRegistry::new();
        registry
            .register_factory("fixed", PluginFactory::read_only(|| Fixed))
            .unwrap();
        let err = registry
            .register_factory("fixed", PluginFactory::read_only(|| Fixed))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::Duplicate {
                kind: "Plugin",
                name: "fixed".to_string()
            }
        );
    }

    #[test]
    fn test_instantiate_unknown_is_recoverable() {
        let registry = PluginRegistry::new();
        assert!(matches!(
            registry.instantiate("missing"),
            Err(RegistryError::NotRegistered { .. })
        ));
        registry
            .register_factory("fixed", PluginFactory::read_only(|| Fixed))
            .unwrap();
        assert!(!registry.instantiate("fixed").unwrap().can_write());
    }

    #[test]
    fn test_close_runs_hook_and_unregisters() {
        let registry = PluginRegistry::new();
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = closed.clone();
        registry
            .register(
                "/redfish/v1/TelemetryService",
                PluginRegistration::new(PluginFactory::read_only(|| Fixed)).with_close(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        registry
            .register_factory("plain", PluginFactory::read_only(|| Fixed))
            .unwrap();

        assert!(registry.close("/redfish/v1/TelemetryService"));
        assert!(!registry.close("/redfish/v1/TelemetryService"));
        assert!(!registry.close("plain"));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(registry.names(), vec!["plain".to_string()]);
    }
}
