use crate::command::CommandStrategy;
use parley_config::Config;
use parley_core::Runtime;
use parley_telegram::TelegramBot;
use std::sync::Arc;
use tracing::info;

/// Input for Telegram bot command.
pub struct TelegramInput {
    /// Optional bot token (overrides config)
    pub token: Option<String>,
    /// Optional allowed chat IDs (overrides config)
    pub allow_from: Option<Vec<String>>,
}

/// Strategy for running the demo script as a Telegram bot.
pub struct TelegramStrategy;

impl CommandStrategy for TelegramStrategy {
    type Input = TelegramInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let config = Config::load()?;

        if !config.telegram.enabled {
            anyhow::bail!("Telegram is not enabled in config. Set \"telegram.enabled\": true");
        }

        let mut telegram = config.telegram.clone();
        if let Some(token) = input.token {
            telegram.token = token;
        }
        if let Some(allow_from) = input.allow_from {
            telegram.allow_from = allow_from;
        }
        if telegram.token.is_empty() {
            anyhow::bail!("Telegram bot token not configured. Set \"telegram.token\" in config");
        }

        info!("Starting Telegram bot...");

        let (runtime, handle) = Runtime::new(super::build_controller(&config));
        let driver = tokio::spawn(runtime.run());
        handle.start_ticking()?;

        let bot = Arc::new(TelegramBot::new(&telegram)?);

        info!("Telegram bot is running. Press Ctrl+C to stop.");
        bot.run(handle.clone()).await?;

        handle.shutdown()?;
        let controller = driver.await?;
        info!(
            "Telegram bot stopped with {} task(s) still open",
            controller.tasks().len()
        );

        Ok(())
    }
}
