//! Message types flowing through the runtime.
//!
//! [`IncomingMessage`] is what connectors hand in, [`ScriptMessage`] is one
//! authored step of a thread, and [`OutgoingMessage`] is the rendered copy
//! that is actually sent and tracked for back-pressure.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::conversation::{Conversation, Handler};

/// A message received from a connector.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Event name to fire when no conversation claims the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub user: String,
    pub channel: String,
    pub timestamp: DateTime<Utc>,
    /// Text of the question this message answered, set on capture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    /// Capture groups from the pattern that matched this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<String>,
    /// Connector-specific fields.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl IncomingMessage {
    pub fn new(user: impl Into<String>, channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind: None,
            text: Some(text.into()),
            user: user.into(),
            channel: channel.into(),
            timestamp: Utc::now(),
            question: None,
            matches: Vec::new(),
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Message text, empty when the message carries none.
    #[must_use]
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }

    /// Event fired for this message when no conversation is waiting on it.
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.kind.as_deref().unwrap_or("message_received")
    }
}

/// Text of a scripted message: fixed, or one of several variants picked at
/// random each time it is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageText {
    One(String),
    Variants(Vec<String>),
}

impl From<&str> for MessageText {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

impl From<String> for MessageText {
    fn from(value: String) -> Self {
        Self::One(value)
    }
}

impl From<Vec<String>> for MessageText {
    fn from(value: Vec<String>) -> Self {
        Self::Variants(value)
    }
}

/// How a captured answer is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureOptions {
    /// Storage key; defaults to the text of the question.
    #[serde(default)]
    pub key: Option<String>,
    /// Keep every answer instead of overwriting.
    #[serde(default)]
    pub multiple: bool,
}

impl CaptureOptions {
    #[must_use]
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            multiple: false,
        }
    }

    #[must_use]
    pub const fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }
}

/// What to do after a scripted message has been dequeued.
#[derive(Clone)]
pub enum Action {
    /// Queue the last sent message again.
    Repeat,
    /// Do nothing; keep waiting.
    Wait,
    Stop,
    Timeout,
    Goto(String),
    Call(Arc<dyn Fn(&mut Conversation) + Send + Sync>),
}

impl Action {
    pub fn call<F>(f: F) -> Self
    where
        F: Fn(&mut Conversation) + Send + Sync + 'static,
    {
        Self::Call(Arc::new(f))
    }
}

impl From<&str> for Action {
    fn from(value: &str) -> Self {
        match value {
            "repeat" => Self::Repeat,
            "wait" => Self::Wait,
            "stop" => Self::Stop,
            "timeout" => Self::Timeout,
            thread => Self::Goto(thread.to_string()),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repeat => f.write_str("Repeat"),
            Self::Wait => f.write_str("Wait"),
            Self::Stop => f.write_str("Stop"),
            Self::Timeout => f.write_str("Timeout"),
            Self::Goto(thread) => f.debug_tuple("Goto").field(thread).finish(),
            Self::Call(_) => f.write_str("Call(<fn>)"),
        }
    }
}

/// One authored step of a conversation thread.
///
/// Scripts are never mutated once authored: entering a thread copies its
/// messages into the live queue, and sending renders a fresh
/// [`OutgoingMessage`].
#[derive(Debug, Clone, Default)]
pub struct ScriptMessage {
    pub text: Option<MessageText>,
    pub attachments: Vec<Value>,
    pub channel: Option<String>,
    pub handler: Option<Handler>,
    pub capture_options: Option<CaptureOptions>,
    pub action: Option<Action>,
    /// Minimum gap after the previous message before this one is sent.
    pub delay: Option<Duration>,
    pub(crate) fire_at: Option<DateTime<Utc>>,
}

impl ScriptMessage {
    pub fn text(text: impl Into<MessageText>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// A message that carries only an action.
    pub fn action(action: impl Into<Action>) -> Self {
        Self {
            action: Some(action.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_action(mut self, action: impl Into<Action>) -> Self {
        self.action = Some(action.into());
        self
    }

    #[must_use]
    pub fn with_attachment(mut self, attachment: Value) -> Self {
        self.attachments.push(attachment);
        self
    }

    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn has_content(&self) -> bool {
        self.text.is_some() || !self.attachments.is_empty()
    }
}

impl From<&str> for ScriptMessage {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<String> for ScriptMessage {
    fn from(value: String) -> Self {
        Self::text(value)
    }
}

/// A rendered message handed to the connector, with its delivery state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OutgoingMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Value>,
    pub channel: String,
    #[serde(default)]
    pub sent: bool,
    #[serde(default)]
    pub delivered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_error: Option<String>,
}

impl OutgoingMessage {
    pub fn text(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            channel: channel.into(),
            ..Self::default()
        }
    }

    /// Message text, empty when only attachments were sent.
    #[must_use]
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}
