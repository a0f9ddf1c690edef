//! The single hierarchical configuration object (spec §6): app name, log
//! level, LLM/memory/governance/telemetry/MCP/A2A/discovery sections, every
//! field defaulted, resolved with precedence `defaults → XDG TOML → .env →
//! process env (KAIROS_-prefixed) → --set key=value CLI overrides` (highest
//! precedence last).
//!
//! Grounded in the teacher's standalone `config` crate (`load_and_apply`:
//! XDG TOML + `.env`, existing-env-wins), generalized from "apply values to
//! process env" to "resolve one typed config tree," per `SPEC_FULL.md` §6.

mod dotenv;
mod overrides;
mod xdg_toml;

use std::collections::HashMap;
use std::path::Path;

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use overrides::parse_key_value;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
    #[error("convert toml to json: {0}")]
    JsonConvert(serde_json::Error),
    #[error("deserialize resolved config: {0}")]
    Resolve(serde_json::Error),
    #[error("unknown config key: {0}")]
    UnknownKey(String),
    #[error("invalid --set override '{0}', expected key=value")]
    InvalidOverride(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// `{provider, model, base_url, api_key}` (spec §6). No vendor adapter is
/// selected here — `kairos-core`'s `LLMProvider` contract is vendor-neutral;
/// this only names which one a process wiring script should construct.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key: None,
        }
    }
}

/// `{backend, embedder_base_url, embedder_model, qdrant_addr}` (spec §6).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub backend: String,
    pub embedder_base_url: Option<String>,
    pub embedder_model: Option<String>,
    pub qdrant_addr: Option<String>,
}

/// One row of `governance.policies`, mirroring `kairos_core::governance::
/// PolicyRule` field-for-field so a config loader can build a `PolicyEngine`
/// directly from the deserialized list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub id: String,
    pub effect: String,
    #[serde(rename = "type")]
    pub action_type: String,
    pub name_pattern: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `{enable, policies}` (spec §6).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub enable: bool,
    pub policies: Vec<PolicyConfig>,
}

/// `{exporter, otlp_endpoint, otlp_insecure, otlp_timeout_s, otlp_headers}`
/// (spec §6). Only the emission points matter to the core (spec §1); this
/// section configures an external exporter the core doesn't implement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub exporter: String,
    pub otlp_endpoint: Option<String>,
    pub otlp_insecure: bool,
    pub otlp_timeout_s: u64,
    pub otlp_headers: HashMap<String, String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            exporter: "none".to_string(),
            otlp_endpoint: None,
            otlp_insecure: false,
            otlp_timeout_s: 10,
            otlp_headers: HashMap::new(),
        }
    }
}

/// One entry of `mcp.servers`: `{transport, command/args/env OR url,
/// timeout_s, retry_count, retry_backoff_ms, cache_ttl_s}` (spec §6).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpServerConfig {
    pub transport: String,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub url: Option<String>,
    pub timeout_s: u64,
    pub retry_count: u32,
    pub retry_backoff_ms: u64,
    pub cache_ttl_s: u64,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".to_string(),
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            url: None,
            timeout_s: 30,
            retry_count: 3,
            retry_backoff_ms: 500,
            cache_ttl_s: 300,
        }
    }
}

/// `{servers: {name -> McpServerConfig}}` (spec §6).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    pub servers: HashMap<String, McpServerConfig>,
}

/// `{enable, listen_addr, auto_register}` (spec §6).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct A2aConfig {
    pub enable: bool,
    pub listen_addr: String,
    pub auto_register: bool,
}

impl Default for A2aConfig {
    fn default() -> Self {
        Self {
            enable: false,
            listen_addr: "127.0.0.1:8088".to_string(),
            auto_register: false,
        }
    }
}

/// `{registry_url, auto_register, heartbeat_s}` (spec §6).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub registry_url: Option<String>,
    pub auto_register: bool,
    pub heartbeat_s: u64,
}

/// The full configuration tree (spec §6). Every field has a deterministic
/// default (spec requirement); `KairosConfig::load` resolves the full
/// precedence chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KairosConfig {
    pub app_name: String,
    pub log_level: String,
    pub llm: LlmConfig,
    pub memory: MemoryConfig,
    pub governance: GovernanceConfig,
    pub telemetry: TelemetryConfig,
    pub mcp: McpConfig,
    pub a2a: A2aConfig,
    pub discovery: DiscoveryConfig,
}

impl Default for KairosConfig {
    fn default() -> Self {
        Self {
            app_name: "kairos".to_string(),
            log_level: "info".to_string(),
            llm: LlmConfig::default(),
            memory: MemoryConfig::default(),
            governance: GovernanceConfig::default(),
            telemetry: TelemetryConfig::default(),
            mcp: McpConfig::default(),
            a2a: A2aConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

/// `--set key=value` CLI override collector, grounded in the teacher's `cli`
/// crate's `clap`-derived option structs.
#[derive(Parser, Debug, Default)]
pub struct ConfigArgs {
    /// Override a config value by dotted path, e.g. `--set llm.model=gpt-4o`.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,
}

const ENV_PREFIX: &str = "KAIROS_";

impl KairosConfig {
    /// Resolves the full config tree for `app_name`, applying every stage of
    /// spec §6's precedence chain. `project_dir` overrides the directory
    /// `.env` is searched in (defaults to the current directory).
    pub fn load(app_name: &str, project_dir: Option<&Path>, cli_overrides: &[String]) -> Result<Self> {
        let mut value = serde_json::to_value(KairosConfig {
            app_name: app_name.to_string(),
            ..KairosConfig::default()
        })
        .expect("KairosConfig serializes");

        if let Some(xdg) = xdg_toml::load(app_name)? {
            overrides::merge(&mut value, overrides::toml_to_json(xdg)?);
        }

        let dotenv_map = dotenv::load(project_dir).map_err(ConfigError::DotenvRead)?;
        let mut effective_env = dotenv_map;
        for (key, val) in std::env::vars() {
            effective_env.insert(key, val);
        }
        overrides::apply_env_overrides(&mut value, ENV_PREFIX, &effective_env);

        for raw in cli_overrides {
            let (path, val) = overrides::parse_key_value(raw)?;
            overrides::apply_dotted(&mut value, &path, &val)?;
        }

        serde_json::from_value(value).map_err(ConfigError::Resolve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_deterministic_values() {
        let config = KairosConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.llm.provider, "mock");
        assert_eq!(config.a2a.listen_addr, "127.0.0.1:8088");
        assert!(!config.governance.enable);
    }

    #[test]
    fn load_with_no_files_returns_defaults_with_app_name_set() {
        let dir = tempfile::tempdir().unwrap();
        let prev = std::env::var_os("XDG_CONFIG_HOME");
        std::env::set_var("XDG_CONFIG_HOME", dir.path());
        let config = KairosConfig::load("kairos-config-test-app-empty", Some(dir.path()), &[]).unwrap();
        match prev {
            Some(p) => std::env::set_var("XDG_CONFIG_HOME", p),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }
        assert_eq!(config.app_name, "kairos-config-test-app-empty");
        assert_eq!(config.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn xdg_toml_overrides_defaults() {
        let xdg_dir = tempfile::tempdir().unwrap();
        let app_dir = xdg_dir.path().join("kairos-test-xdg");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(
            app_dir.join("config.toml"),
            "log_level = \"debug\"\n[llm]\nmodel = \"gpt-4o\"\n",
        )
        .unwrap();
        let project_dir = tempfile::tempdir().unwrap();

        let prev = std::env::var_os("XDG_CONFIG_HOME");
        std::env::set_var("XDG_CONFIG_HOME", xdg_dir.path());
        let config = KairosConfig::load("kairos-test-xdg", Some(project_dir.path()), &[]).unwrap();
        match prev {
            Some(p) => std::env::set_var("XDG_CONFIG_HOME", p),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.llm.model, "gpt-4o");
    }

    #[test]
    fn process_env_overrides_xdg_toml() {
        let xdg_dir = tempfile::tempdir().unwrap();
        let app_dir = xdg_dir.path().join("kairos-test-env");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(app_dir.join("config.toml"), "[llm]\nmodel = \"from-toml\"\n").unwrap();
        let project_dir = tempfile::tempdir().unwrap();

        let prev_xdg = std::env::var_os("XDG_CONFIG_HOME");
        std::env::set_var("XDG_CONFIG_HOME", xdg_dir.path());
        std::env::set_var("KAIROS_LLM_MODEL", "from-env");
        let config = KairosConfig::load("kairos-test-env", Some(project_dir.path()), &[]).unwrap();
        std::env::remove_var("KAIROS_LLM_MODEL");
        match prev_xdg {
            Some(p) => std::env::set_var("XDG_CONFIG_HOME", p),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }

        assert_eq!(config.llm.model, "from-env");
    }

    #[test]
    fn cli_set_overrides_take_highest_precedence() {
        let project_dir = tempfile::tempdir().unwrap();
        let prev_xdg = std::env::var_os("XDG_CONFIG_HOME");
        std::env::set_var("XDG_CONFIG_HOME", project_dir.path());
        std::env::set_var("KAIROS_LLM_MODEL", "from-env");
        let config = KairosConfig::load(
            "kairos-test-cli",
            Some(project_dir.path()),
            &["llm.model=from-cli".to_string()],
        )
        .unwrap();
        std::env::remove_var("KAIROS_LLM_MODEL");
        match prev_xdg {
            Some(p) => std::env::set_var("XDG_CONFIG_HOME", p),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }
        assert_eq!(config.llm.model, "from-cli");
    }

    #[test]
    fn governance_policies_round_trip_from_toml() {
        let xdg_dir = tempfile::tempdir().unwrap();
        let app_dir = xdg_dir.path().join("kairos-test-policies");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(
            app_dir.join("config.toml"),
            r#"
[governance]
enable = true
[[governance.policies]]
id = "deny-shell"
effect = "deny"
type = "tool"
name_pattern = "shell_*"
"#,
        )
        .unwrap();
        let project_dir = tempfile::tempdir().unwrap();

        let prev = std::env::var_os("XDG_CONFIG_HOME");
        std::env::set_var("XDG_CONFIG_HOME", xdg_dir.path());
        let config = KairosConfig::load("kairos-test-policies", Some(project_dir.path()), &[]).unwrap();
        match prev {
            Some(p) => std::env::set_var("XDG_CONFIG_HOME", p),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }

        assert!(config.governance.enable);
        assert_eq!(config.governance.policies.len(), 1);
        assert_eq!(config.governance.policies[0].id, "deny-shell");
        assert_eq!(config.governance.policies[0].action_type, "tool");
    }
}
