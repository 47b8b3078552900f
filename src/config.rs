//! Layered configuration: defaults, config file, `CHAT_` environment
//! variables, then command-line flags.

use std::time::Duration;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::llm::LlmSettings;
use crate::session::EmptyReplyPolicy;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Base URL of the OpenAI-compatible model endpoint
    #[arg(long, env = "LLM_BASE_URL")]
    pub llm_base_url: Option<String>,

    /// Model name
    #[arg(long, env = "LLM_MODEL")]
    pub llm_model: Option<String>,

    /// API key for the model endpoint
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    /// System prompt prepended to every conversation
    #[arg(long, env = "SYSTEM_PROMPT")]
    pub system_prompt: Option<String>,

    /// Do not record assistant replies that came back empty
    #[arg(long)]
    pub suppress_empty_replies: Option<bool>,

    /// Log output format: text or json
    #[arg(long, env = "LOG_FORMAT")]
    pub log_format: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub base_url: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub idle_timeout_secs: u64,
    pub cleanup_interval_secs: u64,
    pub suppress_empty_replies: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Filter directives used when `RUST_LOG` is unset.
    pub filter: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        // 1. Defaults
        let mut builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("agent.base_url", "http://localhost:11434")?
            .set_default("agent.model", "llama3.2")?
            .set_default("agent.connect_timeout_secs", 10)?
            .set_default("session.idle_timeout_secs", 30 * 60)?
            .set_default("session.cleanup_interval_secs", 60)?
            .set_default("session.suppress_empty_replies", false)?
            .set_default("logging.format", "text")?
            .set_default("logging.filter", "info")?;

        // 2. Config file: explicit path must exist, ./config.* is optional
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // 3. Environment variables, e.g. CHAT_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("CHAT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags (and the env vars clap maps onto them)
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(url) = cli.llm_base_url {
            builder = builder.set_override("agent.base_url", url)?;
        }
        if let Some(model) = cli.llm_model {
            builder = builder.set_override("agent.model", model)?;
        }
        if let Some(key) = cli.llm_api_key.filter(|k| !k.trim().is_empty()) {
            builder = builder.set_override("agent.api_key", key)?;
        }
        if let Some(prompt) = cli.system_prompt {
            builder = builder.set_override("agent.system_prompt", prompt)?;
        }
        if let Some(suppress) = cli.suppress_empty_replies {
            builder = builder.set_override("session.suppress_empty_replies", suppress)?;
        }
        if let Some(format) = cli.log_format {
            builder = builder.set_override("logging.format", format.to_lowercase())?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.agent.base_url.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "agent.base_url cannot be empty".to_string(),
            ));
        }
        if self.agent.model.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "agent.model cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings for the model driver.
    #[must_use]
    pub fn llm_settings(&self) -> LlmSettings {
        LlmSettings {
            base_url: self.agent.base_url.clone(),
            api_key: self.agent.api_key.clone(),
            model: self.agent.model.clone(),
            connect_timeout: Duration::from_secs(self.agent.connect_timeout_secs),
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn empty_reply_policy(&self) -> EmptyReplyPolicy {
        if self.suppress_empty_replies {
            EmptyReplyPolicy::Suppress
        } else {
            EmptyReplyPolicy::Append
        }
    }

    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}
