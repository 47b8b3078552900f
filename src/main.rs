//! Chat thread server.
//!
//! Entry point: loads configuration, initializes logging and serves the API.

use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use mimalloc::MiMalloc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use chat_threads::agent::{ConversationAgent, LlmAgent, MemoryCheckpointer};
use chat_threads::config::{AppConfig, LogFormat, LoggingConfig};
use chat_threads::llm::ChatCompletionsDriver;
use chat_threads::server::start_server;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.filter.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format {
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    let config = Arc::new(AppConfig::load().context("Failed to load configuration")?);

    // Initialize tracing (M-LOG-STRUCTURED)
    init_tracing(&config.logging);

    let settings = config.llm_settings();
    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        "LLM configuration loaded"
    );

    let driver = Arc::new(ChatCompletionsDriver::new(settings)?);
    let agent: Arc<dyn ConversationAgent> = Arc::new(
        LlmAgent::new(driver, Arc::new(MemoryCheckpointer::new()))
            .with_system_prompt(config.agent.system_prompt.clone()),
    );

    start_server(config, agent).await
}
