//! Synchronous, ordered event bus.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::Controller;
use crate::bot::Bot;
use crate::conversation::ConversationSummary;
use crate::message::IncomingMessage;
use crate::task::TaskSummary;

pub const MESSAGE_RECEIVED: &str = "message_received";
pub const CONVERSATION_STARTED: &str = "conversationStarted";
pub const CONVERSATION_ENDED: &str = "conversationEnded";
pub const TASK_ENDED: &str = "task_ended";
pub const HEARD_TRIGGER: &str = "heard_trigger";
pub const TICK: &str = "tick";

/// Returned by event handlers; `Stop` skips the handlers registered after
/// this one for the current trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

#[derive(Clone)]
pub enum Payload {
    /// An inbound message no conversation was waiting for.
    Message {
        bot: Arc<dyn Bot>,
        message: IncomingMessage,
    },
    /// A `hears` pattern matched and its callback ran.
    Heard {
        bot: Arc<dyn Bot>,
        message: IncomingMessage,
        pattern: String,
    },
    Conversation(ConversationSummary),
    Task(TaskSummary),
    Tick,
    Custom(Value),
}

impl Payload {
    #[must_use]
    pub const fn message(&self) -> Option<&IncomingMessage> {
        match self {
            Self::Message { message, .. } | Self::Heard { message, .. } => Some(message),
            _ => None,
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message { bot, message } => f
                .debug_struct("Message")
                .field("bot", &bot.kind())
                .field("message", message)
                .finish(),
            Self::Heard {
                bot,
                message,
                pattern,
            } => f
                .debug_struct("Heard")
                .field("bot", &bot.kind())
                .field("message", message)
                .field("pattern", pattern)
                .finish(),
            Self::Conversation(summary) => f.debug_tuple("Conversation").field(summary).finish(),
            Self::Task(summary) => f.debug_tuple("Task").field(summary).finish(),
            Self::Tick => f.write_str("Tick"),
            Self::Custom(value) => f.debug_tuple("Custom").field(value).finish(),
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&mut Controller, &Payload) -> Flow + Send + Sync>;

#[derive(Default)]
pub(crate) struct EventBus {
    handlers: HashMap<String, Vec<EventHandler>>,
}

impl EventBus {
    pub(crate) fn on(&mut self, event: String, handler: EventHandler) {
        self.handlers.entry(event).or_default().push(handler);
    }

    /// Handlers for `event` in registration order. Cloned so they can be
    /// called with the controller borrowed mutably.
    pub(crate) fn handlers(&self, event: &str) -> Vec<EventHandler> {
        self.handlers.get(event).cloned().unwrap_or_default()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.handlers.iter().map(|(event, list)| (event, list.len())))
            .finish()
    }
}
