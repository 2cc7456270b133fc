use std::collections::BTreeMap;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "bindery-server", about = "Demo REST service over a bindery model")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the `people` resource
    Serve(ServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Path to the TOML config file
    #[arg(long, default_value = "config.toml", env = "BINDERY_CONFIG")]
    pub config: String,
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default)]
    pub people: ResourceConfig,
}

/// Serializer and storage settings of one resource.
#[derive(Debug, Deserialize)]
pub struct ResourceConfig {
    /// Field name to rule spec, e.g. `name = "required,min=2"`.
    #[serde(default)]
    pub validation: BTreeMap<String, String>,
    /// Fields accepted on output only.
    #[serde(default = "default_read_only")]
    pub read_only: Vec<String>,
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            validation: BTreeMap::new(),
            read_only: default_read_only(),
            max_rows: default_max_rows(),
        }
    }
}

fn default_api_port() -> u16 {
    9300
}
fn default_read_only() -> Vec<String> {
    vec!["id".to_string()]
}
fn default_max_rows() -> usize {
    100_000
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        toml::from_str(&content)
            .map_err(|e| ServerError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }
}
