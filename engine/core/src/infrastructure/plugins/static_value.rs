// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::plugin::{PluginError, PluginFactory, PropertyReader, PropertyRequest};
use crate::domain::property::PropertyNode;

pub const PLUGIN_NAME: &str = "static";

/// Resolves to the directive's `value` argument.
pub struct StaticValuePlugin;

impl StaticValuePlugin {
    pub fn factory() -> PluginFactory {
        PluginFactory::read_only(|| StaticValuePlugin)
    }
}

#[async_trait]
impl PropertyReader for StaticValuePlugin {
    async fn read(&self, request: &PropertyRequest) -> Result<PropertyNode, PluginError> {
        let value = request.args.get("value").cloned().unwrap_or(Value::Null);
        Ok(PropertyNode::from_json(value))
    }
}
