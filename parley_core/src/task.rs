//! A unit of work spawned from one inbound trigger.
//!
//! A task owns every conversation started for that trigger and completes,
//! exactly once, when the last of them stops being active.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use crate::bot::Bot;
use crate::clock::Clock;
use crate::controller::Services;
use crate::conversation::{Conversation, ConversationSummary, Notice, Status};
use crate::error::{Error, Result};
use crate::message::IncomingMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Completed,
}

/// Snapshot of a task handed to controller-level event handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: u64,
    pub status: TaskStatus,
    pub source: IncomingMessage,
    pub conversations: Vec<ConversationSummary>,
}

/// Conversation ids, shared by every task of one controller.
#[derive(Debug, Clone, Default)]
pub(crate) struct IdSequence(Arc<AtomicU64>);

impl IdSequence {
    pub(crate) fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Lifecycle changes a task reports up to its controller.
#[derive(Debug, Clone)]
pub(crate) enum Lifecycle {
    ConversationStarted(ConversationSummary),
    ConversationEnded(ConversationSummary),
    TaskEnded(TaskSummary),
}

type ConversationListener = Arc<dyn Fn(&Task, &Conversation) + Send + Sync>;
type TaskListener = Arc<dyn Fn(&Task) + Send + Sync>;

pub struct Task {
    id: u64,
    bot: Arc<dyn Bot>,
    source: IncomingMessage,
    conversations: Vec<Conversation>,
    status: TaskStatus,
    started_at: DateTime<Utc>,
    time_limit: Option<Duration>,
    ids: IdSequence,
    clock: Arc<dyn Clock>,
    started_listeners: Vec<ConversationListener>,
    ended_listeners: Vec<ConversationListener>,
    end_listeners: Vec<TaskListener>,
}

impl Task {
    pub(crate) fn new(
        id: u64,
        bot: Arc<dyn Bot>,
        source: IncomingMessage,
        ids: IdSequence,
        clock: Arc<dyn Clock>,
        time_limit: Option<Duration>,
    ) -> Self {
        Self {
            id,
            bot,
            source,
            conversations: Vec::new(),
            status: TaskStatus::Active,
            started_at: clock.now(),
            time_limit,
            ids,
            clock,
            started_listeners: Vec::new(),
            ended_listeners: Vec::new(),
            end_listeners: Vec::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn bot(&self) -> &Arc<dyn Bot> {
        &self.bot
    }

    #[must_use]
    pub const fn source(&self) -> &IncomingMessage {
        &self.source
    }

    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Whether the task is still running. Reflects the task status only; a
    /// task whose conversations are all `Ending` is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == TaskStatus::Active
    }

    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub const fn time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    /// Answers older than `limit` (measured both from task start and from the
    /// last activity) time the waiting conversation out.
    pub const fn set_time_limit(&mut self, limit: Option<Duration>) {
        self.time_limit = limit;
    }

    #[must_use]
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    #[must_use]
    pub fn conversation(&self, id: u64) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id() == id)
    }

    pub fn conversation_mut(&mut self, id: u64) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id() == id)
    }

    /// Add a conversation with `message` as its source. It does nothing until
    /// activated.
    pub fn create_conversation(&mut self, message: IncomingMessage) -> &mut Conversation {
        let convo = Conversation::new(self.ids.next(), self.id, message, self.clock.now());
        self.conversations.push(convo);
        let last = self.conversations.len() - 1;
        &mut self.conversations[last]
    }

    pub fn start_conversation(&mut self, message: IncomingMessage) -> &mut Conversation {
        let convo = self.create_conversation(message);
        convo.activate();
        info!(
            "[Start] {} Conversation with {} in {}",
            convo.id(),
            convo.source().user,
            convo.source().channel
        );
        convo
    }

    /// Stop every active conversation with `status`.
    pub fn end_immediately(&mut self, status: Status) {
        debug!("Ending task {} immediately: {status}", self.id);
        for convo in &mut self.conversations {
            if convo.is_active() {
                convo.stop(status);
            }
        }
    }

    pub fn on_conversation_started<F>(&mut self, listener: F)
    where
        F: Fn(&Self, &Conversation) + Send + Sync + 'static,
    {
        self.started_listeners.push(Arc::new(listener));
    }

    pub fn on_conversation_ended<F>(&mut self, listener: F)
    where
        F: Fn(&Self, &Conversation) + Send + Sync + 'static,
    {
        self.ended_listeners.push(Arc::new(listener));
    }

    pub fn on_end<F>(&mut self, listener: F)
    where
        F: Fn(&Self) + Send + Sync + 'static,
    {
        self.end_listeners.push(Arc::new(listener));
    }

    /// Captured answers grouped as `user -> key -> answer`.
    #[must_use]
    pub fn responses_by_user(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        let mut users: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for convo in &self.conversations {
            users
                .entry(convo.source().user.clone())
                .or_default()
                .extend(convo.extract_responses());
        }
        users
    }

    /// Captured answers grouped as `key -> user -> answer`.
    #[must_use]
    pub fn responses_by_subject(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        let mut subjects: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for convo in &self.conversations {
            for (key, answer) in convo.extract_responses() {
                subjects
                    .entry(key)
                    .or_default()
                    .insert(convo.source().user.clone(), answer);
            }
        }
        subjects
    }

    #[must_use]
    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.id,
            status: self.status,
            source: self.source.clone(),
            conversations: self.conversations.iter().map(Conversation::summary).collect(),
        }
    }

    pub(crate) fn tick(&mut self, services: &Services) {
        let env = services.env(self.bot.as_ref(), self.started_at, self.time_limit);
        for convo in &mut self.conversations {
            if convo.is_active() {
                convo.tick(&env);
            }
        }
    }

    /// Route an answer to one of this task's conversations.
    pub(crate) fn handle(
        &mut self,
        conversation: u64,
        services: &Services,
        message: IncomingMessage,
    ) -> Result<()> {
        let env = services.env(self.bot.as_ref(), self.started_at, self.time_limit);
        let convo = self
            .conversations
            .iter_mut()
            .find(|c| c.id() == conversation)
            .ok_or(Error::ConversationNotFound {
                task: self.id,
                conversation,
            })?;
        convo.handle(&env, message);
        Ok(())
    }

    /// Announce lifecycle changes queued by conversations since the last
    /// call.
    pub(crate) fn settle(&mut self) -> Vec<Lifecycle> {
        let mut events = Vec::new();
        for index in 0..self.conversations.len() {
            for notice in self.conversations[index].take_notices() {
                match notice {
                    Notice::Started => {
                        let convo = &self.conversations[index];
                        for listener in &self.started_listeners {
                            listener(self, convo);
                        }
                        events.push(Lifecycle::ConversationStarted(convo.summary()));
                    }
                    Notice::Ended => self.conversation_ended(index, &mut events),
                }
            }
        }
        events
    }

    fn conversation_ended(&mut self, index: usize, events: &mut Vec<Lifecycle>) {
        let convo = &self.conversations[index];
        info!(
            "[End] {} Conversation with {} in {}: {}",
            convo.id(),
            convo.source().user,
            convo.source().channel,
            convo.status()
        );
        for listener in &self.ended_listeners {
            listener(self, convo);
        }
        events.push(Lifecycle::ConversationEnded(convo.summary()));
        convo.fire_end();

        if self.status == TaskStatus::Completed
            || self.conversations.iter().any(Conversation::is_active)
        {
            return;
        }
        self.status = TaskStatus::Completed;
        debug!("Task {} completed", self.id);
        for listener in &self.end_listeners {
            listener(self);
        }
        events.push(Lifecycle::TaskEnded(self.summary()));
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("bot", &self.bot.kind())
            .field("conversations", &self.conversations)
            .finish_non_exhaustive()
    }
}
