//! The contract a platform connector fulfils.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::message::{IncomingMessage, OutgoingMessage};
use crate::task::Task;

/// Who the bot is on its platform; exposed to templates as `identity`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
}

/// Address of one conversation inside the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationRef {
    pub task: u64,
    pub conversation: u64,
}

#[derive(Debug)]
pub(crate) enum Receipt {
    Sent {
        index: usize,
        result: std::result::Result<Option<Value>, String>,
    },
    Delivered {
        index: usize,
    },
}

/// Completion handle passed to [`Bot::reply`].
///
/// A conversation will not send its next message until the previous one has
/// been acknowledged through [`DeliveryAck::complete`] (and, when delivery
/// is required, [`DeliveryAck::delivered`]). Acks may be sent from any
/// thread and at any time; they are applied on the conversation's next tick.
#[derive(Debug, Clone)]
pub struct DeliveryAck {
    index: usize,
    tx: Option<UnboundedSender<Receipt>>,
}

impl DeliveryAck {
    pub(crate) const fn new(index: usize, tx: UnboundedSender<Receipt>) -> Self {
        Self {
            index,
            tx: Some(tx),
        }
    }

    /// An ack nobody listens to, for replies sent outside a conversation.
    #[must_use]
    pub const fn detached() -> Self {
        Self {
            index: 0,
            tx: None,
        }
    }

    /// Record the platform's answer to the send. Errors are kept on the sent
    /// message and never stop the conversation.
    pub fn complete(&self, result: std::result::Result<Option<Value>, String>) {
        self.push(Receipt::Sent {
            index: self.index,
            result,
        });
    }

    pub fn delivered(&self) {
        self.push(Receipt::Delivered { index: self.index });
    }

    fn push(&self, receipt: Receipt) {
        if let Some(tx) = &self.tx {
            if tx.send(receipt).is_err() {
                debug!("Dropping receipt for a conversation that no longer exists");
            }
        }
    }
}

/// A platform connector.
pub trait Bot: Send + Sync {
    fn identity(&self) -> Identity;

    /// Short platform name used in logs.
    fn kind(&self) -> &str {
        "generic"
    }

    /// Send `message` in response to `source`. Must eventually call
    /// `ack.complete(..)`, or the conversation waits forever.
    fn reply(&self, source: &IncomingMessage, message: OutgoingMessage, ack: DeliveryAck);

    /// Find the active conversation an inbound message belongs to.
    ///
    /// The default matches on the conversation's originating user and
    /// channel.
    fn find_conversation(&self, tasks: &[Task], message: &IncomingMessage) -> Option<ConversationRef> {
        tasks
            .iter()
            .filter(|task| task.is_active())
            .flat_map(|task| task.conversations().iter())
            .find(|convo| {
                convo.is_active()
                    && convo.source().user == message.user
                    && convo.source().channel == message.channel
            })
            .map(crate::conversation::Conversation::address)
    }
}
