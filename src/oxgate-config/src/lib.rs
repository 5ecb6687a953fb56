use anyhow::{anyhow, Context, Result};
use oxgate_core::Service;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayCfg {
    #[serde(default = "def_host")]
    pub host: String,
    #[serde(default = "def_port")]
    pub port: u16,
    #[serde(default = "def_logging")]
    pub logging_mode: String,
    #[serde(default)]
    pub name: String,
}
fn def_host() -> String { "0.0.0.0".into() }
fn def_port() -> u16 { 8080 }
fn def_logging() -> String { "default".into() }

impl Default for GatewayCfg {
    fn default() -> Self {
        Self {
            host: def_host(),
            port: def_port(),
            logging_mode: def_logging(),
            name: String::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthCfg {
    /// HMAC secret for signing and verifying tokens.
    #[serde(default)]
    pub secret: String,
    #[serde(default = "def_issuer")]
    pub issuer: String,
    #[serde(default = "def_expiration")]
    pub expiration_secs: u64,
}
fn def_issuer() -> String { "oxgate".into() }
fn def_expiration() -> u64 { 3600 }

impl Default for AuthCfg {
    fn default() -> Self {
        Self {
            secret: String::default(),
            issuer: def_issuer(),
            expiration_secs: def_expiration(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitCfg {
    #[serde(default = "def_window")]
    pub window_secs: u64,
}
fn def_window() -> u64 { 60 }

impl Default for RateLimitCfg {
    fn default() -> Self {
        Self { window_secs: def_window() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    pub gateway: GatewayCfg,
    #[serde(default)]
    pub auth: AuthCfg,
    #[serde(default)]
    pub rate_limit: RateLimitCfg,
    /// Services registered at startup, before the admin API takes over.
    #[serde(default)]
    pub services: Vec<Service>,
}

pub fn load_config(path: &str) -> Result<FileConfig> {
    let content = fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    if path.ends_with(".yaml") || path.ends_with(".yml") {
        Ok(serde_yml::from_str(&content)?)
    } else if path.ends_with(".json") {
        Ok(serde_json::from_str(&content)?)
    } else if path.ends_with(".toml") {
        Ok(toml::from_str(&content)?)
    } else {
        Err(anyhow!("Unknown config extension: {}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg: FileConfig = serde_yml::from_str("gateway: {}\n").unwrap();
        assert_eq!(cfg.gateway.host, "0.0.0.0");
        assert_eq!(cfg.gateway.port, 8080);
        assert_eq!(cfg.auth.issuer, "oxgate");
        assert_eq!(cfg.auth.expiration_secs, 3600);
        assert_eq!(cfg.rate_limit.window_secs, 60);
        assert!(cfg.services.is_empty());
    }

    #[test]
    fn parses_seeded_services() {
        let yaml = r#"
gateway:
  port: 9000
  logging_mode: json
auth:
  secret: hunter2
services:
  - name: users
    baseUrl: http://users:8080
    endpoints:
      - path: /v1/users
        methods: [GET]
        rateLimit: 100
        authRequired: true
"#;
        let cfg: FileConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(cfg.gateway.port, 9000);
        assert_eq!(cfg.auth.secret, "hunter2");
        assert_eq!(cfg.services.len(), 1);
        let ep = &cfg.services[0].endpoints[0];
        assert_eq!(ep.rate_limit, 100);
        assert!(ep.auth_required);
        assert!(cfg.services[0].validate().is_ok());
    }
}
