#![allow(dead_code)]

use parley_core::{
    Bot, ConversationRef, DeliveryAck, Identity, IncomingMessage, OutgoingMessage, Task,
};
use serde_json::json;
use std::sync::Mutex;

/// Records replies and acks them on the spot.
#[derive(Default)]
pub struct TestBot {
    pub replies: Mutex<Vec<OutgoingMessage>>,
}

impl TestBot {
    pub fn texts(&self) -> Vec<String> {
        self.replies
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.text_or_empty().to_string())
            .collect()
    }
}

impl Bot for TestBot {
    fn identity(&self) -> Identity {
        Identity {
            id: "B1".to_string(),
            name: "parley".to_string(),
        }
    }

    fn kind(&self) -> &str {
        "test"
    }

    fn reply(&self, _source: &IncomingMessage, message: OutgoingMessage, ack: DeliveryAck) {
        self.replies.lock().unwrap().push(message);
        ack.complete(Ok(Some(json!({"ok": true}))));
    }
}

/// Routes any message in a channel to the conversation running there, so
/// several users can answer one question.
#[derive(Default)]
pub struct BroadcastBot {
    pub inner: TestBot,
}

impl Bot for BroadcastBot {
    fn identity(&self) -> Identity {
        self.inner.identity()
    }

    fn reply(&self, source: &IncomingMessage, message: OutgoingMessage, ack: DeliveryAck) {
        self.inner.reply(source, message, ack);
    }

    fn find_conversation(&self, tasks: &[Task], message: &IncomingMessage) -> Option<ConversationRef> {
        tasks
            .iter()
            .filter(|task| task.is_active())
            .flat_map(|task| task.conversations().iter())
            .find(|convo| convo.is_active() && convo.source().channel == message.channel)
            .map(parley_core::Conversation::address)
    }
}

pub fn message(user: &str, text: &str) -> IncomingMessage {
    IncomingMessage::new(user, "C1", text)
}
