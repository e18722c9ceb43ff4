use crate::{Error, Result};
use parley_config::TelegramConfig;
use parley_core::{ControllerHandle, DeliveryAck, Identity, IncomingMessage, OutgoingMessage};
use serde_json::json;
use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};
use teloxide::{Bot as Client, prelude::*};
use tokio::{runtime::Handle, time::sleep};
use tracing::{info, warn};

/// Seconds to wait after the given failed connection attempt:
/// 2s, 4s, 6s, 8s, then 10s from there on.
fn retry_delay_secs(attempt: u64) -> u64 {
    const INITIAL_DELAY_SECS: u64 = 2;
    const MAX_DELAY_SECS: u64 = 10;

    INITIAL_DELAY_SECS.saturating_mul(attempt).min(MAX_DELAY_SECS)
}

/// Telegram connector: receives updates through teloxide and sends the
/// controller's replies back to the originating chat.
pub struct TelegramBot {
    /// Teloxide bot instance
    pub bot: Client,
    /// Allowed chat IDs
    allowed_chats: Vec<i64>,
    /// Runtime that outgoing sends are spawned on
    runtime: Handle,
    /// Filled in from `get_me` once connected
    identity: OnceLock<Identity>,
}

impl TelegramBot {
    /// Create a new Telegram bot. Must be called from inside a tokio runtime.
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        if config.token.trim().is_empty() {
            return Err(Error::Config("telegram.token is empty".to_string()));
        }

        // Parse allowed chat IDs
        let allowed_chats = config
            .allow_from
            .iter()
            .filter_map(|s| s.parse::<i64>().ok())
            .collect();

        let runtime = Handle::try_current()
            .map_err(|e| Error::Config(format!("No tokio runtime available: {e}")))?;

        Ok(Self {
            bot: Client::new(config.token.clone()),
            allowed_chats,
            runtime,
            identity: OnceLock::new(),
        })
    }

    /// Check if a chat is allowed
    #[must_use]
    pub fn is_allowed(&self, chat_id: i64) -> bool {
        self.allowed_chats.is_empty() || self.allowed_chats.contains(&chat_id)
    }

    /// Test connection to Telegram API with linear backoff retry.
    /// Starts at 2s, increases by 2s each attempt, max 10s delay.
    /// Retries indefinitely until connection succeeds.
    async fn test_connection(&self) {
        let mut attempt = 1u64;
        loop {
            match self.bot.get_me().await {
                Ok(me) => {
                    let username = me
                        .user
                        .username
                        .clone()
                        .unwrap_or_else(|| "no username".to_string());
                    info!(
                        "Connected to Telegram API: @{username} (id: {})",
                        me.user.id
                    );
                    let _ = self.identity.set(Identity {
                        id: me.user.id.0.to_string(),
                        name: username,
                    });
                    return;
                }
                Err(e) => {
                    let delay_secs = retry_delay_secs(attempt);

                    warn!("Connection attempt {attempt} failed: {e}. Retrying in {delay_secs}s...");

                    if attempt == 1 {
                        warn!("This may be due to:");
                        warn!("  - Network connectivity issues");
                        warn!("  - Firewall blocking api.telegram.org");
                        warn!("  - Invalid bot token");
                    }

                    sleep(Duration::from_secs(delay_secs)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Run the bot until ctrl-c, forwarding messages to `controller`.
    pub async fn run(self: Arc<Self>, controller: ControllerHandle) -> Result<()> {
        use teloxide::dispatching::{Dispatcher, UpdateFilterExt};
        use teloxide::dptree;
        use teloxide::types::Update;

        self.test_connection().await;

        if let Err(e) = self
            .bot
            .set_my_commands(crate::Command::bot_commands())
            .await
        {
            warn!("Failed to register bot commands: {e}");
        }

        let client = self.bot.clone();

        let schema = dptree::entry().branch(Update::filter_message().endpoint({
            let bot = Arc::clone(&self);
            move |_client: Client, msg: Message| {
                let bot = Arc::clone(&bot);
                let controller = controller.clone();
                async move { crate::handler::handle_message(bot, controller, msg).await }
            }
        }));

        Dispatcher::builder(client, schema)
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        Ok(())
    }
}

impl parley_core::Bot for TelegramBot {
    fn identity(&self) -> Identity {
        self.identity.get().cloned().unwrap_or_default()
    }

    fn kind(&self) -> &str {
        "telegram"
    }

    fn reply(&self, _source: &IncomingMessage, message: OutgoingMessage, ack: DeliveryAck) {
        let Ok(chat_id) = message.channel.parse::<i64>() else {
            ack.complete(Err(format!("invalid chat id: {}", message.channel)));
            return;
        };
        let text = message.text_or_empty().to_string();
        if text.is_empty() {
            // attachments are not forwarded
            ack.complete(Ok(None));
            return;
        }

        let client = self.bot.clone();
        self.runtime.spawn(async move {
            match client.send_message(ChatId(chat_id), text).await {
                Ok(sent) => {
                    ack.complete(Ok(Some(json!({
                        "message_id": sent.id.0,
                        "chat_id": sent.chat.id.0,
                    }))));
                    ack.delivered();
                }
                Err(e) => {
                    warn!("Failed to send message to chat {chat_id}: {e}");
                    ack.complete(Err(e.to_string()));
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_grows_linearly_then_caps() {
        let delays: Vec<u64> = (1..=7).map(retry_delay_secs).collect();
        assert_eq!(delays, vec![2, 4, 6, 8, 10, 10, 10]);
        assert_eq!(retry_delay_secs(u64::MAX), 10);
    }
}
