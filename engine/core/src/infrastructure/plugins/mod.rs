// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Built-in property plugins.
//!
//! | Name | Capability | Backing state |
//! |------|------------|---------------|
//! | `kv` | read-write | shared in-memory map |
//! | `static` | read | the directive's `value` argument |

pub mod kv_store;
pub mod static_value;

use crate::infrastructure::plugin_registry::{PluginRegistry, RegistryError};

pub use kv_store::KvStore;
pub use static_value::StaticValuePlugin;

/// Register every built-in plugin under its well-known name.
pub fn register_builtin(registry: &PluginRegistry, kv: &KvStore) -> Result<(), RegistryError> {
    registry.register_factory(kv_store::PLUGIN_NAME, kv.factory())?;
    registry.register_factory(static_value::PLUGIN_NAME, StaticValuePlugin::factory())?;
    Ok(())
}
