//! `ServerConfig` - the binary's layered configuration, loaded from
//! environment variables with typed defaults and validated after parse.

use std::net::SocketAddr;
use std::time::Duration;

use webpilot_supervisor::SupervisorConfig;

use crate::error::{Error, Result};

/// Model endpoint configuration. `None` when no vision-language model is
/// configured - the `replay` CLI subcommand still runs in that case, it
/// just never gets a generated summary and the CAPTCHA handler's
/// tile/text strategies fail fast if actually invoked.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub heartbeat_interval: Duration,
    pub live_pump_interval: Duration,
    pub replay_pump_interval: Duration,
    pub max_steps: u32,
    pub jwt_secret: String,
    pub model: Option<ModelConfig>,
}

impl ServerConfig {
    /// Load from environment variables, each with a typed default, and
    /// validate the result. `bind` may be overridden by the CLI's
    /// `--bind` flag after loading - validate again if you do.
    pub fn from_env() -> Result<Self> {
        let config = Self::load()?;
        config.validate()?;
        Ok(config)
    }

    /// As `from_env`, but skips `validate()` - used by the `replay`
    /// subcommand, which has no use for `jwt_secret` and should still run
    /// with a configured model endpoint even when no secret is set.
    pub fn load() -> Result<Self> {
        let bind_str = env_or("WEBPILOT_BIND", "0.0.0.0:8080");
        let bind: SocketAddr = bind_str
            .parse()
            .map_err(|e| Error::Config(format!("WEBPILOT_BIND \"{bind_str}\" is invalid: {e}")))?;

        let heartbeat_interval = Duration::from_secs(env_parsed("WEBPILOT_HEARTBEAT_INTERVAL_SECS", 30)?);
        let live_pump_interval = Duration::from_millis(env_parsed("WEBPILOT_LIVE_PUMP_MS", 1000)?);
        let replay_pump_interval = Duration::from_millis(env_parsed("WEBPILOT_REPLAY_PUMP_MS", 500)?);
        let max_steps = env_parsed("WEBPILOT_MAX_STEPS", 25)? as u32;

        let jwt_secret = std::env::var("WEBPILOT_JWT_SECRET").unwrap_or_default();

        let model = match std::env::var("WEBPILOT_MODEL_BASE_URL") {
            Ok(base_url) if !base_url.is_empty() => Some(ModelConfig {
                base_url,
                api_key: std::env::var("WEBPILOT_MODEL_API_KEY").unwrap_or_default(),
                model: env_or("WEBPILOT_MODEL_NAME", "gpt-4o"),
            }),
            _ => None,
        };

        let config = Self {
            bind,
            heartbeat_interval,
            live_pump_interval,
            replay_pump_interval,
            max_steps,
            jwt_secret,
            model,
        };
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.is_empty() {
            return Err(Error::Config(
                "WEBPILOT_JWT_SECRET must be set to a non-empty signing secret".into(),
            ));
        }
        if self.max_steps == 0 {
            return Err(Error::Config("WEBPILOT_MAX_STEPS must be at least 1".into()));
        }
        Ok(())
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            heartbeat_interval: self.heartbeat_interval,
            live_pump_interval: self.live_pump_interval,
            replay_pump_interval: self.replay_pump_interval,
            max_iterations: self.max_steps,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("{key} \"{raw}\" is invalid: {e}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supervisor_config_carries_max_steps_through() {
        let config = ServerConfig {
            bind: "0.0.0.0:8080".parse().unwrap(),
            heartbeat_interval: Duration::from_secs(30),
            live_pump_interval: Duration::from_secs(1),
            replay_pump_interval: Duration::from_millis(500),
            max_steps: 10,
            jwt_secret: "secret".into(),
            model: None,
        };
        assert_eq!(config.supervisor_config().max_iterations, 10);
    }

    #[test]
    fn validate_rejects_empty_jwt_secret() {
        let config = ServerConfig {
            bind: "0.0.0.0:8080".parse().unwrap(),
            heartbeat_interval: Duration::from_secs(30),
            live_pump_interval: Duration::from_secs(1),
            replay_pump_interval: Duration::from_millis(500),
            max_steps: 25,
            jwt_secret: String::new(),
            model: None,
        };
        assert!(config.validate().is_err());
    }
}
