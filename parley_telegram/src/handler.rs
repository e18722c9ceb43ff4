use parley_core::{ControllerHandle, IncomingMessage};
use serde_json::Value;
use std::sync::Arc;
use teloxide::{requests::Requester, types::Message};
use tracing::{info, warn};

use crate::{Command, Error, Result, TelegramBot};

/// Handle bot commands
pub async fn handle_command(bot: &TelegramBot, msg: &Message, cmd: Command) -> Result<()> {
    let username = username(msg);

    match cmd {
        Command::Start => {
            info!("[@{username}] Command: /start");
            bot.bot
                .send_message(msg.chat.id, Command::welcome_text())
                .await?;
        }
        Command::Help => {
            info!("[@{username}] Command: /help");
            bot.bot
                .send_message(msg.chat.id, Command::help_text())
                .await?;
        }
    }

    Ok(())
}

/// Handle any message: commands are answered here, everything else goes to
/// the controller.
pub async fn handle_message(
    bot: Arc<TelegramBot>,
    controller: ControllerHandle,
    msg: Message,
) -> Result<()> {
    let chat_id = msg.chat.id.0;
    if !bot.is_allowed(chat_id) {
        warn!("Ignoring message from chat {chat_id}: not in allow list");
        return Err(Error::Unauthorized(chat_id));
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };

    if let Some(cmd) = Command::parse_from_text(text) {
        return handle_command(&bot, &msg, cmd).await;
    }

    let username = username(&msg);
    info!("[@{username}] Message: {text}");

    let user_id = msg.from.as_ref().map(|u| u.id.0);
    let sender = msg.from.as_ref().and_then(|u| u.username.as_deref());
    let message = incoming(chat_id, user_id, sender, text);
    controller.receive(bot, message)?;

    Ok(())
}

fn username(msg: &Message) -> &str {
    msg.from
        .as_ref()
        .and_then(|u| u.username.as_deref())
        .unwrap_or("unknown")
}

/// Build the runtime message for a Telegram text message. The chat is the
/// channel, so replies go back to where the message came from.
pub(crate) fn incoming(
    chat_id: i64,
    user_id: Option<u64>,
    username: Option<&str>,
    text: &str,
) -> IncomingMessage {
    let user = user_id.map_or_else(|| chat_id.to_string(), |id| id.to_string());
    let mut message = IncomingMessage::new(user, chat_id.to_string(), text);
    if let Some(username) = username {
        message
            .extra
            .insert("username".to_string(), Value::from(username));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_becomes_channel_and_sender_becomes_user() {
        let message = incoming(-100_123, Some(42), Some("ada"), "hi");
        assert_eq!(message.user, "42");
        assert_eq!(message.channel, "-100123");
        assert_eq!(message.text(), "hi");
        assert_eq!(message.extra["username"], "ada");
    }

    #[test]
    fn anonymous_sender_falls_back_to_chat() {
        let message = incoming(7, None, None, "hi");
        assert_eq!(message.user, "7");
        assert!(message.extra.is_empty());
    }
}
