// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `redfishd config` - inspect, check and scaffold the YAML that seeds the
//! resource tree.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::fmt;
use std::path::{Path, PathBuf};

use redfish_core::domain::server_config::ServerConfig;

const SAMPLE_CONFIG: &str = include_str!("../../templates/redfish-config.yaml");
const CONFIG_ENV: &str = "REDFISH_CONFIG_PATH";
const LOCAL_CONFIG: &str = "./redfish-config.yaml";

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the effective settings and the seed resources they declare
    Show {
        /// Also list every location consulted, marking the one in use
        #[arg(long, alias = "paths")]
        sources: bool,
    },

    /// Parse a config file and run the startup checks on it without serving
    Validate {
        /// File to check; falls back to --config, then discovery
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Write the bundled starter config (service root plus a Systems collection)
    Generate {
        #[arg(short, long, default_value = LOCAL_CONFIG)]
        output: PathBuf,

        /// Replace an existing file at the output path
        #[arg(long)]
        force: bool,
    },
}

/// Where the running configuration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConfigSource {
    Flag(PathBuf),
    Env(PathBuf),
    WorkingDir(PathBuf),
    BuiltIn,
}

impl ConfigSource {
    /// Mirrors the lookup order of `ServerConfig::load_or_default`.
    fn resolve(flag: Option<&Path>, env: Option<&str>, working_dir_file: &Path) -> Self {
        if let Some(path) = flag {
            return ConfigSource::Flag(path.to_path_buf());
        }
        if let Some(path) = env.map(PathBuf::from).filter(|p| p.exists()) {
            return ConfigSource::Env(path);
        }
        if working_dir_file.exists() {
            return ConfigSource::WorkingDir(working_dir_file.to_path_buf());
        }
        ConfigSource::BuiltIn
    }

    fn current(flag: Option<&Path>) -> Self {
        let env = std::env::var(CONFIG_ENV).ok();
        Self::resolve(flag, env.as_deref(), Path::new(LOCAL_CONFIG))
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Flag(path) => write!(f, "{} (--config)", path.display()),
            ConfigSource::Env(path) => write!(f, "{} (${CONFIG_ENV})", path.display()),
            ConfigSource::WorkingDir(path) => write!(f, "{} (working directory)", path.display()),
            ConfigSource::BuiltIn => write!(f, "built-in defaults"),
        }
    }
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { sources } => show(config_override, sources),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, force } => generate(&output, force),
    }
}

fn show(config_override: Option<PathBuf>, list_sources: bool) -> Result<()> {
    let source = ConfigSource::current(config_override.as_deref());
    let config = ServerConfig::load_or_default(config_override.clone())
        .with_context(|| format!("Cannot read settings from {source}"))?;

    if list_sources {
        let env = std::env::var(CONFIG_ENV).ok();
        let flag = config_override.as_ref().map(|p| p.display().to_string());
        let candidates = [
            ("--config", flag, matches!(source, ConfigSource::Flag(_))),
            (CONFIG_ENV, env, matches!(source, ConfigSource::Env(_))),
            ("cwd", Some(LOCAL_CONFIG.to_string()), matches!(source, ConfigSource::WorkingDir(_))),
        ];
        for (label, value, active) in candidates {
            let marker = if active { "*".green() } else { " ".normal() };
            let value = value.unwrap_or_else(|| "-".to_string());
            println!("{marker} {label:<20} {}", value.dimmed());
        }
        println!();
    }
    println!("{} {}", "Loaded from".bold(), source);
    println!();

    println!(
        "{} http://{}:{}{}",
        "Listening".bold(),
        config.server.host,
        config.server.port,
        config.server.path_prefix
    );
    println!("  requests time out after {} ms", config.server.request_timeout_ms);
    println!(
        "  resolver: depth {} / fan-out {} / {} plugin calls in flight, {} ms each",
        config.resolver.max_depth,
        config.resolver.max_fanout,
        config.resolver.max_concurrent_plugins,
        config.resolver.plugin_timeout_ms
    );
    println!();

    println!("{} ({})", "Seeded resources".bold(), config.resources.len());
    for resource in &config.resources {
        let marker = if resource.collection { "[]" } else { "  " };
        let odata_type = resource.odata_type.as_deref().unwrap_or("-");
        println!("  {marker} {} {}", resource.resource_uri, odata_type.dimmed());
    }
    if !config.startup_events.is_empty() || !config.static_properties.is_empty() {
        println!();
        println!(
            "{} startup event(s), {} static property set(s)",
            config.startup_events.len(),
            config.static_properties.len()
        );
    }

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    let source = ConfigSource::current(config_path.as_deref());
    let config = ServerConfig::load_or_default(config_path)
        .with_context(|| format!("Cannot read settings from {source}"))?;
    config.validate().with_context(|| format!("{source} failed startup checks"))?;

    let collections = config.resources.iter().filter(|r| r.collection).count();
    println!(
        "{} {source}: {} resource(s), {collections} collection(s)",
        "ok".green().bold(),
        config.resources.len()
    );
    Ok(())
}

fn generate(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!("{} already exists; pass --force to replace it", output.display());
    }
    std::fs::write(output, SAMPLE_CONFIG).with_context(|| format!("Cannot write {}", output.display()))?;

    println!("{} {}", "wrote".green().bold(), output.display());
    println!("  start with: redfishd --config {} serve", output.display());
    Ok(())
}
