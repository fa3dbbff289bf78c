// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Server Configuration Types
//
// Defines the YAML configuration for the resource server, including:
// - HTTP binding and request deadlines
// - Property resolver limits (fan-out, depth, plugin timeouts)
// - Event waiter queue sizing
// - Fallback principal for deployments without an auth front end
// - Startup event injection, seed resources and static property mappings

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::aggregate::ResourceDefinition;
use crate::domain::authorization::Principal;

/// Top-level server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpSettings,

    #[serde(default)]
    pub resolver: ResolverSettings,

    #[serde(default)]
    pub events: EventSettings,

    #[serde(default)]
    pub authorization: AuthorizationSettings,

    /// Events published on the main bus once the engine is up
    #[serde(default)]
    pub startup_events: Vec<StartupEvent>,

    /// Resources created at boot
    #[serde(default)]
    pub resources: Vec<ResourceDefinition>,

    /// Properties merged into a resource as soon as it is created
    #[serde(default)]
    pub static_properties: Vec<StaticProperties>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Mount point of the resource tree
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,

    /// Upper bound on any request, including the completion wait
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Value of the `Server` response header
    #[serde(default = "default_server_name")]
    pub server_name: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path_prefix: default_path_prefix(),
            request_timeout_ms: default_request_timeout_ms(),
            server_name: default_server_name(),
        }
    }
}

impl HttpSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// Children of one composite node resolved concurrently
    #[serde(default = "default_max_fanout")]
    pub max_fanout: usize,

    /// Deepest nesting walked before a branch is dropped
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default = "default_plugin_timeout_ms")]
    pub plugin_timeout_ms: u64,

    /// Plugin calls in flight across all requests
    #[serde(default = "default_max_concurrent_plugins")]
    pub max_concurrent_plugins: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            max_fanout: default_max_fanout(),
            max_depth: default_max_depth(),
            plugin_timeout_ms: default_plugin_timeout_ms(),
            max_concurrent_plugins: default_max_concurrent_plugins(),
        }
    }
}

impl ResolverSettings {
    pub fn plugin_timeout(&self) -> Duration {
        Duration::from_millis(self.plugin_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSettings {
    /// Inbox size of every event waiter; overflow is dropped with a warning
    #[serde(default = "default_waiter_queue_len")]
    pub waiter_queue_len: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            waiter_queue_len: default_waiter_queue_len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationSettings {
    /// Principal used when no upstream layer attached one
    #[serde(default = "default_user")]
    pub default_user: String,

    #[serde(default = "default_privileges")]
    pub default_privileges: Vec<String>,

    #[serde(default)]
    pub licenses: Vec<String>,
}

impl Default for AuthorizationSettings {
    fn default() -> Self {
        Self {
            default_user: default_user(),
            default_privileges: default_privileges(),
            licenses: Vec::new(),
        }
    }
}

impl AuthorizationSettings {
    pub fn default_principal(&self) -> Principal {
        Principal {
            username: self.default_user.clone(),
            privileges: self.default_privileges.clone(),
            licenses: self.licenses.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupEvent {
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticProperties {
    pub uri: String,
    pub properties: Map<String, Value>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8443
}

fn default_path_prefix() -> String {
    "/redfish/v1".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_server_name() -> String {
    "redfish-engine".to_string()
}

fn default_max_fanout() -> usize {
    16
}

fn default_max_depth() -> usize {
    32
}

fn default_plugin_timeout_ms() -> u64 {
    5_000
}

fn default_max_concurrent_plugins() -> usize {
    64
}

fn default_waiter_queue_len() -> usize {
    200
}

fn default_user() -> String {
    "root".to_string()
}

fn default_privileges() -> Vec<String> {
    [
        "Login",
        "ConfigureManager",
        "ConfigureUsers",
        "ConfigureSelf",
        "ConfigureComponents",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

impl ServerConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. REDFISH_CONFIG_PATH environment variable
    /// 2. ./redfish-config.yaml (working directory)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("REDFISH_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./redfish-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            return Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            });
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            Self::from_yaml_file(config_path)
        } else {
            tracing::warn!("No configuration file found. Using defaults.");
            Ok(Self::default())
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.server.path_prefix.starts_with('/') {
            anyhow::bail!(
                "server.path_prefix must start with '/': '{}'",
                self.server.path_prefix
            );
        }
        if self.server.request_timeout_ms == 0 {
            anyhow::bail!("server.request_timeout_ms must be greater than zero");
        }
        if self.resolver.max_fanout == 0 {
            anyhow::bail!("resolver.max_fanout must be greater than zero");
        }
        if self.resolver.max_depth == 0 {
            anyhow::bail!("resolver.max_depth must be greater than zero");
        }
        if self.resolver.plugin_timeout_ms == 0 {
            anyhow::bail!("resolver.plugin_timeout_ms must be greater than zero");
        }
        if self.resolver.max_concurrent_plugins == 0 {
            anyhow::bail!("resolver.max_concurrent_plugins must be greater than zero");
        }
        if self.events.waiter_queue_len == 0 {
            anyhow::bail!("events.waiter_queue_len must be greater than zero");
        }
        for resource in &self.resources {
            if !resource.resource_uri.starts_with('/') {
                anyhow::bail!("Seed resource URI must be absolute: '{}'", resource.resource_uri);
            }
        }
        for event in &self.startup_events {
            if event.name.is_empty() {
                anyhow::bail!("startup_events entries need a name");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.server.path_prefix, "/redfish/v1");
        assert_eq!(config.events.waiter_queue_len, 200);
        assert_eq!(config.resolver.max_depth, 32);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config = ServerConfig::from_yaml_str(
            r##"
server:
  port: 9000
resolver:
  max_fanout: 4
startup_events:
  - name: SystemBooted
    data: {Reason: "PowerOn"}
resources:
  - ResourceURI: /redfish/v1
    Type: "#ServiceRoot.v1_5_0.ServiceRoot"
    Privileges:
      GET: [Login]
    Properties:
      Id: RootService
"##,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.resolver.max_fanout, 4);
        assert_eq!(config.resolver.max_depth, 32);
        assert_eq!(config.startup_events[0].name, "SystemBooted");
        assert_eq!(config.resources[0].resource_uri, "/redfish/v1");
        assert_eq!(config.resources[0].privileges["GET"], vec!["Login".to_string()]);
        assert_eq!(
            config.resources[0].odata_type.as_deref(),
            Some("#ServiceRoot.v1_5_0.ServiceRoot")
        );
        assert_eq!(config.resources[0].properties["Id"], "RootService");
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_prefix_and_zero_limits() {
        let mut config = ServerConfig::default();
        config.server.path_prefix = "redfish".to_string();
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.resolver.max_fanout = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "events:\n  waiter_queue_len: 8").unwrap();

        let config = ServerConfig::load_or_default(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.events.waiter_queue_len, 8);
    }

    #[test]
    fn test_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        assert!(ServerConfig::load_or_default(Some(missing)).is_err());
    }
}
