//! TOML configuration file

use anyhow::{bail, Context, Result};
use pubsync_engine::{DomainSettings, RedemptionMode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub limits: LimitsConfig,
    pub publications: PublicationsConfig,
    pub methods: MethodsConfig,
    pub access: AccessConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub log_level: String,
    pub metrics_port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 7070,
            log_level: "info".into(),
            metrics_port: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Polls per second per connection, 0 disables rate limiting
    pub rate_limit: u32,
    pub rate_burst: Option<u32>,
    pub store_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            rate_limit: 0,
            rate_burst: None,
            store_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublicationsConfig {
    pub recent_horizon_hours: u64,
    pub recent_limit: usize,
}

impl Default for PublicationsConfig {
    fn default() -> Self {
        Self {
            recent_horizon_hours: 48,
            recent_limit: 500,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MethodsConfig {
    pub redemption: RedemptionMode,
    pub credit_codes: Vec<CreditCodeSeed>,
}

/// A credit code created at startup unless one with the same name exists
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreditCodeSeed {
    pub name: String,
    pub credits: i64,
    pub total: i64,
}

impl CreditCodeSeed {
    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("name must not be empty");
        }
        if self.credits < 0 {
            bail!("credits must not be negative, got {}", self.credits);
        }
        if self.total < 0 {
            bail!("total must not be negative, got {}", self.total);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessConfig {
    /// User ids marked `admin: true` at startup
    pub admins: Vec<String>,
    /// Session id to user id
    pub sessions: BTreeMap<String, String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for code in &self.methods.credit_codes {
            code.validate()
                .with_context(|| format!("invalid credit code {:?}", code.name))?;
        }
        Ok(())
    }

    pub fn domain_settings(&self) -> DomainSettings {
        DomainSettings {
            recent_horizon: Duration::from_secs(self.publications.recent_horizon_hours * 3600),
            recent_limit: self.publications.recent_limit,
            redemption: self.methods.redemption,
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.limits.store_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.server.port, 7070);
        assert_eq!(config.domain_settings(), DomainSettings::default());
        assert_eq!(config.store_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_full_file() {
        let config = Config::parse(
            r#"
            [server]
            port = 9000
            metrics_port = 9100

            [limits]
            rate_limit = 20

            [publications]
            recent_horizon_hours = 1
            recent_limit = 10

            [methods]
            redemption = "atomic"

            [[methods.credit_codes]]
            name = "WELCOME10"
            credits = 10
            total = 5

            [access]
            admins = ["root"]

            [access.sessions]
            dev = "root"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.server.metrics_port, Some(9100));
        assert_eq!(config.limits.rate_limit, 20);
        assert_eq!(config.methods.redemption, RedemptionMode::Atomic);
        assert_eq!(config.methods.credit_codes[0].name, "WELCOME10");
        assert_eq!(config.access.admins, vec!["root"]);
        assert_eq!(config.access.sessions["dev"], "root");

        let settings = config.domain_settings();
        assert_eq!(settings.recent_horizon, Duration::from_secs(3600));
        assert_eq!(settings.recent_limit, 10);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(Config::parse("[server]\nprot = 1\n").is_err());
        assert!(Config::parse("[methods]\nredemption = \"strict\"\n").is_err());
    }

    #[test]
    fn test_negative_credit_codes_rejected() {
        let negative_total = "[[methods.credit_codes]]\nname = \"NEG\"\ncredits = 5\ntotal = -1\n";
        let negative_credits = "[[methods.credit_codes]]\nname = \"NEG\"\ncredits = -50\ntotal = 3\n";
        let unnamed = "[[methods.credit_codes]]\nname = \"\"\ncredits = 1\ntotal = 1\n";

        for text in [negative_total, negative_credits, unnamed] {
            let err = Config::parse(text).unwrap_err();
            assert!(format!("{:#}", err).contains("invalid credit code"));
        }

        let zero = Config::parse("[[methods.credit_codes]]\nname = \"Z\"\ncredits = 0\ntotal = 0\n").unwrap();
        assert_eq!(zero.methods.credit_codes[0].total, 0);
    }

    #[test]
    fn test_invalid_code_in_file_names_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[methods.credit_codes]]\nname = \"NEG\"\ncredits = -50\ntotal = -1").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("parsing config file"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nlog_level = \"debug\"").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.log_level, "debug");

        assert!(Config::load(Path::new("/nonexistent/pubsync.toml")).is_err());
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = Config::parse(include_str!("../config/pubsync.toml")).unwrap();
        assert_eq!(config.methods.credit_codes.len(), 1);
    }
}
