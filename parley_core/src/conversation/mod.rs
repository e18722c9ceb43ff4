//! Per-party dialog state machine.
//!
//! A conversation plays named threads of [`ScriptMessage`]s, one message per
//! tick, and blocks whenever the last message sent carries a [`Handler`].
//! Answers routed to a blocked conversation are captured under a key and
//! then dispatched to the handler.

mod handler;
mod render;
mod responses;

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, warn};

use crate::bot::{Bot, ConversationRef, DeliveryAck, Receipt};
use crate::clock::Clock;
use crate::matcher::Matcher;
use crate::message::{
    Action, CaptureOptions, IncomingMessage, MessageText, OutgoingMessage, ScriptMessage,
};
use crate::middleware::{Next, Pipeline, StepContext};

pub use handler::{Callback, Handler, PatternBranch};
pub(crate) use render::Renderer;
pub use responses::{Captured, ResponseView};

/// Thread every conversation starts in.
pub const DEFAULT_THREAD: &str = "default";
/// Thread played instead of a hard stop when a blocked conversation times out.
pub const TIMEOUT_THREAD: &str = "on_timeout";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    New,
    Active,
    /// Playing a farewell thread after a timeout; still ticks.
    Ending,
    Completed,
    Stopped,
    Timeout,
    UnknownThread,
    Inactive,
}

impl Status {
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active | Self::Ending)
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Stopped | Self::Timeout | Self::UnknownThread | Self::Inactive
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Active => "active",
            Self::Ending => "ending",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Timeout => "timeout",
            Self::UnknownThread => "unknown_thread",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "direction", rename_all = "snake_case")]
pub enum TranscriptEntry {
    Received(IncomingMessage),
    Sent(OutgoingMessage),
}

/// Snapshot of a conversation handed to controller-level event handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: u64,
    pub task_id: u64,
    pub status: Status,
    pub source: IncomingMessage,
    pub responses: BTreeMap<String, String>,
    pub vars: Map<String, Value>,
    pub sent: usize,
}

/// Lifecycle changes waiting to be announced by the owning task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Notice {
    Started,
    Ended,
}

/// Everything a conversation needs from its task and controller while it
/// ticks or handles an answer.
pub(crate) struct Env<'a> {
    pub bot: &'a dyn Bot,
    pub pipeline: &'a Pipeline,
    pub matcher: &'a dyn Matcher,
    pub clock: &'a dyn Clock,
    pub renderer: &'a Renderer,
    pub require_delivery: bool,
    pub task_started: DateTime<Utc>,
    pub time_limit: Option<Duration>,
}

type EndListener = Arc<dyn Fn(&Conversation) + Send + Sync>;
type SentListener = Arc<dyn Fn(&Conversation, Option<&Value>) + Send + Sync>;
type BeforeThreadHook = Arc<dyn Fn(&mut Conversation) -> anyhow::Result<()> + Send + Sync>;
type TimeoutHandler = Arc<dyn Fn(&mut Conversation) + Send + Sync>;

pub struct Conversation {
    id: u64,
    task_id: u64,
    status: Status,
    source: IncomingMessage,
    threads: HashMap<String, Vec<ScriptMessage>>,
    thread: String,
    queue: VecDeque<ScriptMessage>,
    sent: Vec<OutgoingMessage>,
    last_script: Option<ScriptMessage>,
    transcript: Vec<TranscriptEntry>,
    responses: BTreeMap<String, Captured>,
    vars: Map<String, Value>,
    handler: Option<Handler>,
    capture_options: CaptureOptions,
    started_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
    end_listeners: Vec<EndListener>,
    sent_listeners: Vec<SentListener>,
    before_hooks: HashMap<String, Vec<BeforeThreadHook>>,
    timeout_handler: Option<TimeoutHandler>,
    receipts_tx: UnboundedSender<Receipt>,
    receipts_rx: UnboundedReceiver<Receipt>,
    notices: Vec<Notice>,
}

impl Conversation {
    pub(crate) fn new(id: u64, task_id: u64, source: IncomingMessage, now: DateTime<Utc>) -> Self {
        let (receipts_tx, receipts_rx) = mpsc::unbounded_channel();
        let mut threads = HashMap::new();
        threads.insert(DEFAULT_THREAD.to_string(), Vec::new());
        Self {
            id,
            task_id,
            status: Status::New,
            source,
            threads,
            thread: DEFAULT_THREAD.to_string(),
            queue: VecDeque::new(),
            sent: Vec::new(),
            last_script: None,
            transcript: Vec::new(),
            responses: BTreeMap::new(),
            vars: Map::new(),
            handler: None,
            capture_options: CaptureOptions::default(),
            started_at: now,
            last_active: now,
            end_listeners: Vec::new(),
            sent_listeners: Vec::new(),
            before_hooks: HashMap::new(),
            timeout_handler: None,
            receipts_tx,
            receipts_rx,
            notices: Vec::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn task_id(&self) -> u64 {
        self.task_id
    }

    #[must_use]
    pub const fn address(&self) -> ConversationRef {
        ConversationRef {
            task: self.task_id,
            conversation: self.id,
        }
    }

    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }

    #[must_use]
    pub fn successful(&self) -> bool {
        self.status == Status::Completed
    }

    /// The message that started this conversation.
    #[must_use]
    pub const fn source(&self) -> &IncomingMessage {
        &self.source
    }

    /// Name of the thread currently playing.
    #[must_use]
    pub fn thread(&self) -> &str {
        &self.thread
    }

    #[must_use]
    pub fn has_thread(&self, thread: &str) -> bool {
        self.threads.contains_key(thread)
    }

    #[must_use]
    pub fn thread_messages(&self, thread: &str) -> Option<&[ScriptMessage]> {
        self.threads.get(thread).map(Vec::as_slice)
    }

    /// Messages still queued in the live copy of the current thread.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Whether the conversation is blocked on an answer.
    #[must_use]
    pub const fn is_waiting(&self) -> bool {
        self.handler.is_some()
    }

    #[must_use]
    pub fn sent(&self) -> &[OutgoingMessage] {
        &self.sent
    }

    #[must_use]
    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    #[must_use]
    pub const fn capture_options(&self) -> &CaptureOptions {
        &self.capture_options
    }

    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub const fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    // ---- script authoring ----

    fn bind_channel(&self, message: impl Into<ScriptMessage>) -> ScriptMessage {
        let mut message = message.into();
        if message.channel.is_none() {
            message.channel = Some(self.source.channel.clone());
        }
        message
    }

    /// Append a message to `thread` (the current thread when `None`). Adding
    /// to the thread that is playing also queues it live.
    pub fn add_message(&mut self, message: impl Into<ScriptMessage>, thread: Option<&str>) {
        let message = self.bind_channel(message);
        let thread = thread.map_or_else(|| self.thread.clone(), ToString::to_string);
        if thread == self.thread {
            self.queue.push_back(message.clone());
        }
        self.threads.entry(thread).or_default().push(message);
    }

    pub fn say(&mut self, message: impl Into<ScriptMessage>) {
        self.add_message(message, None);
    }

    /// Put a message at the head of the live queue without touching any
    /// thread.
    pub fn say_first(&mut self, message: impl Into<ScriptMessage>) {
        let message = self.bind_channel(message);
        self.queue.push_front(message);
    }

    pub fn add_question(
        &mut self,
        message: impl Into<ScriptMessage>,
        handler: Handler,
        capture: Option<CaptureOptions>,
        thread: Option<&str>,
    ) {
        let mut message = message.into();
        message.handler = Some(handler);
        if capture.is_some() {
            message.capture_options = capture;
        }
        self.add_message(message, thread);
    }

    /// Ask a question in the current thread.
    pub fn ask(
        &mut self,
        message: impl Into<ScriptMessage>,
        handler: Handler,
        capture: Option<CaptureOptions>,
    ) {
        self.add_question(message, handler, capture, None);
    }

    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn var(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    #[must_use]
    pub const fn vars(&self) -> &Map<String, Value> {
        &self.vars
    }

    /// Run `hook` every time the conversation is about to enter `thread`.
    pub fn before_thread<F>(&mut self, thread: impl Into<String>, hook: F)
    where
        F: Fn(&mut Self) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.before_hooks
            .entry(thread.into())
            .or_default()
            .push(Arc::new(hook));
    }

    /// Replace the default timeout behaviour.
    pub fn on_timeout<F>(&mut self, handler: F)
    where
        F: Fn(&mut Self) + Send + Sync + 'static,
    {
        self.timeout_handler = Some(Arc::new(handler));
    }

    pub fn on_end<F>(&mut self, listener: F)
    where
        F: Fn(&Self) + Send + Sync + 'static,
    {
        self.end_listeners.push(Arc::new(listener));
    }

    /// Called with the platform response each time a message is confirmed
    /// sent.
    pub fn on_sent<F>(&mut self, listener: F)
    where
        F: Fn(&Self, Option<&Value>) + Send + Sync + 'static,
    {
        self.sent_listeners.push(Arc::new(listener));
    }

    // ---- navigation and control ----

    pub fn activate(&mut self) {
        if self.status == Status::New {
            self.status = Status::Active;
            self.notices.push(Notice::Started);
        }
    }

    pub fn deactivate(&mut self) {
        self.stop(Status::Inactive);
    }

    /// Replace the live queue with a fresh copy of `thread`.
    ///
    /// `default` is created on demand; any other unknown thread stops the
    /// conversation with [`Status::UnknownThread`].
    pub fn goto_thread(&mut self, thread: &str) {
        if !self.threads.contains_key(thread) {
            if thread == DEFAULT_THREAD {
                self.threads.insert(DEFAULT_THREAD.to_string(), Vec::new());
            } else {
                warn!(
                    "Conversation {} tried to enter unknown thread {thread:?}",
                    self.id
                );
                self.stop(Status::UnknownThread);
                return;
            }
        }

        self.run_before_hooks(thread);
        if self.status.is_terminal() {
            return;
        }

        self.thread = thread.to_string();
        self.queue = self
            .threads
            .get(thread)
            .map(|messages| messages.iter().cloned().collect())
            .unwrap_or_default();
        self.handler = None;
        self.capture_options = CaptureOptions::default();
    }

    fn run_before_hooks(&mut self, thread: &str) {
        let Some(mut hooks) = self.before_hooks.remove(thread) else {
            return;
        };
        for hook in &hooks {
            if let Err(e) = hook(self) {
                error!(
                    "before_thread hook for {thread:?} failed on conversation {}: {e:#}",
                    self.id
                );
            }
        }
        // hooks registered while running go after the existing ones
        if let Some(added) = self.before_hooks.remove(thread) {
            hooks.extend(added);
        }
        self.before_hooks.insert(thread.to_string(), hooks);
    }

    /// Say `message` once, then continue in `thread`.
    pub fn transition_to(&mut self, thread: &str, message: impl Into<ScriptMessage>) {
        let name = format!("_transition_{thread}");
        let mut message = self.bind_channel(message);
        message.action = Some(Action::Goto(thread.to_string()));
        // replaced on every call so an earlier transition never replays
        self.threads.insert(name.clone(), vec![message]);
        self.goto_thread(&name);
    }

    /// Release the pending handler so the script continues.
    pub fn next(&mut self) {
        self.handler = None;
    }

    /// Queue the last sent message again, handler included.
    pub fn repeat(&mut self) {
        if let Some(script) = self.last_script.clone() {
            self.queue.push_back(script);
        }
    }

    pub const fn silent_repeat(&self) {}

    /// End the conversation. Only the first call has any effect; a
    /// non-terminal `status` ends it as [`Status::Stopped`].
    pub fn stop(&mut self, status: Status) {
        if self.status.is_terminal() {
            return;
        }
        let status = if status.is_terminal() {
            status
        } else {
            warn!(
                "Conversation {} cannot end as {status}, stopping it instead",
                self.id
            );
            Status::Stopped
        };
        // receipts that already arrived belong to the final record
        self.drain_receipts();
        self.handler = None;
        self.queue.clear();
        self.status = status;
        debug!("Conversation {} is over with status {status}", self.id);
        self.notices.push(Notice::Ended);
    }

    /// Normal end of script; a timed-out conversation keeps its timeout
    /// status after its farewell thread.
    fn finish(&mut self) {
        let status = if self.status == Status::Ending {
            Status::Timeout
        } else {
            Status::Completed
        };
        self.stop(status);
    }

    // ---- responses ----

    #[must_use]
    pub fn response(&self, key: &str) -> Option<&Captured> {
        self.responses.get(key)
    }

    #[must_use]
    pub const fn captured(&self) -> &BTreeMap<String, Captured> {
        &self.responses
    }

    /// Captured answer(s) for `key` as one string; empty when nothing was
    /// captured.
    #[must_use]
    pub fn extract_response(&self, key: &str) -> String {
        self.responses
            .get(key)
            .map(Captured::combined)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn extract_responses(&self) -> BTreeMap<String, String> {
        self.responses
            .iter()
            .map(|(key, captured)| (key.clone(), captured.combined()))
            .collect()
    }

    #[must_use]
    pub fn responses(&self) -> BTreeMap<String, ResponseView> {
        self.responses_as_list()
            .into_iter()
            .map(|view| (view.key.clone(), view))
            .collect()
    }

    #[must_use]
    pub fn responses_as_list(&self) -> Vec<ResponseView> {
        self.responses
            .iter()
            .map(|(key, captured)| ResponseView {
                question: captured.question().to_string(),
                key: key.clone(),
                answer: captured.combined(),
            })
            .collect()
    }

    #[must_use]
    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id,
            task_id: self.task_id,
            status: self.status,
            source: self.source.clone(),
            responses: self.extract_responses(),
            vars: self.vars.clone(),
            sent: self.sent.len(),
        }
    }

    // ---- runtime ----

    pub(crate) fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub(crate) fn fire_end(&self) {
        for listener in self.end_listeners.clone() {
            listener(self);
        }
    }

    /// Apply delivery receipts sent back by the connector.
    pub(crate) fn drain_receipts(&mut self) {
        while let Ok(receipt) = self.receipts_rx.try_recv() {
            match receipt {
                Receipt::Sent { index, result } => {
                    let Some(record) = self.sent.get_mut(index) else {
                        continue;
                    };
                    record.sent = true;
                    match result {
                        Ok(response) => {
                            record.api_response.clone_from(&response);
                            for listener in self.sent_listeners.clone() {
                                listener(self, response.as_ref());
                            }
                        }
                        Err(e) => {
                            error!(
                                "An error occurred while sending a message in conversation {}: {e}",
                                self.id
                            );
                            record.api_error = Some(e);
                        }
                    }
                }
                Receipt::Delivered { index } => {
                    if let Some(record) = self.sent.get_mut(index) {
                        record.delivered = true;
                    }
                }
            }
        }
    }

    /// Advance by at most one queued message.
    pub(crate) fn tick(&mut self, env: &Env<'_>) {
        self.drain_receipts();
        if !self.is_active() {
            return;
        }
        let now = env.clock.now();

        if self.handler.is_some() {
            self.check_timeout(env, now);
            return;
        }

        // nothing moves, not even completion, until the last send is acked
        if !self.last_acknowledged(env.require_delivery) {
            return;
        }

        if self.queue.is_empty() {
            if !self.sent.is_empty() {
                self.finish();
            }
            return;
        }

        if self
            .queue
            .front()
            .and_then(|m| m.fire_at)
            .is_none_or(|at| at <= now)
        {
            if let Some(message) = self.queue.pop_front() {
                self.dispatch_next(env, message, now);
            }
        }

        if self.is_active()
            && self.queue.is_empty()
            && self.handler.is_none()
            && self.last_acknowledged(env.require_delivery)
        {
            self.finish();
        }
    }

    fn last_acknowledged(&self, require_delivery: bool) -> bool {
        self.sent
            .last()
            .is_none_or(|last| last.sent && (!require_delivery || last.delivered))
    }

    fn dispatch_next(&mut self, env: &Env<'_>, message: ScriptMessage, now: DateTime<Utc>) {
        if let Some(next) = self.queue.front_mut() {
            if let Some(delay) = next.delay {
                next.fire_at = Some(now + delay);
            }
        }

        self.handler.clone_from(&message.handler);
        self.capture_options = message.capture_options.clone().unwrap_or_default();
        self.last_active = now;

        if message.has_content() {
            self.send(env, &message, now);
        }

        if let Some(action) = message.action {
            self.run_action(action);
        }
    }

    fn run_action(&mut self, action: Action) {
        match action {
            Action::Repeat => self.repeat(),
            Action::Wait => self.silent_repeat(),
            Action::Stop => self.stop(Status::Stopped),
            Action::Timeout => self.stop(Status::Timeout),
            Action::Goto(thread) => self.goto_thread(&thread),
            Action::Call(f) => f(self),
        }
    }

    fn check_timeout(&mut self, env: &Env<'_>, now: DateTime<Utc>) {
        let Some(limit) = env.time_limit else {
            return;
        };
        let since_start = now - env.task_started;
        let idle = now - self.last_active;
        if since_start <= limit || idle <= limit {
            return;
        }

        debug!("Conversation {} timed out after {idle} idle", self.id);
        if let Some(handler) = self.timeout_handler.clone() {
            handler(self);
        } else if self.has_thread(TIMEOUT_THREAD) {
            if self.status == Status::Active {
                self.status = Status::Ending;
            }
            self.goto_thread(TIMEOUT_THREAD);
        } else {
            self.stop(Status::Timeout);
        }
    }

    fn template_context(&self, bot: &dyn Bot) -> Value {
        json!({
            "identity": bot.identity(),
            "responses": self.extract_responses(),
            "origin": self.source,
            "vars": self.vars,
        })
    }

    fn render(&self, env: &Env<'_>, script: &ScriptMessage) -> OutgoingMessage {
        let ctx = self.template_context(env.bot);
        let raw = script.text.as_ref().and_then(|text| match text {
            MessageText::One(text) => Some(text.clone()),
            MessageText::Variants(variants) => variants.choose(&mut rand::thread_rng()).cloned(),
        });
        OutgoingMessage {
            text: raw.map(|raw| env.renderer.render_text(&raw, &ctx)),
            attachments: script
                .attachments
                .iter()
                .map(|attachment| env.renderer.render_value(attachment, &ctx))
                .collect(),
            channel: script
                .channel
                .clone()
                .unwrap_or_else(|| self.source.channel.clone()),
            ..OutgoingMessage::default()
        }
    }

    fn send(&mut self, env: &Env<'_>, script: &ScriptMessage, now: DateTime<Utc>) {
        let mut outbound = self.render(env, script);
        outbound.sent_at = Some(now);

        let ctx = StepContext::new(env.bot).with_conversation(self);
        let outcome = env.pipeline.send.run(&ctx, &mut outbound);
        let index = self.sent.len();
        self.last_script = Some(script.clone());

        match outcome {
            Ok(Next::Continue) => {
                self.sent.push(outbound.clone());
                self.transcript.push(TranscriptEntry::Sent(outbound.clone()));
                let ack = DeliveryAck::new(index, self.receipts_tx.clone());
                env.bot.reply(&self.source, outbound, ack);
            }
            Ok(Next::Halt) => {
                // never handed to the connector, so never acked
                self.sent.push(outbound);
            }
            Err(e) => {
                error!("Message not sent in conversation {}: {e}", self.id);
                outbound.sent = true;
                outbound.api_error = Some(e.to_string());
                self.transcript.push(TranscriptEntry::Sent(outbound.clone()));
                self.sent.push(outbound);
            }
        }
    }

    /// Capture an answer and pass it to the pending handler.
    pub(crate) fn handle(&mut self, env: &Env<'_>, mut message: IncomingMessage) {
        self.last_active = env.clock.now();
        self.transcript
            .push(TranscriptEntry::Received(message.clone()));
        debug!(
            "Handling message from {} in conversation {}",
            message.user, self.id
        );

        if !self.is_active() {
            return;
        }
        let Some(handler) = self.handler.clone() else {
            return;
        };

        let ctx = StepContext::new(env.bot).with_conversation(self);
        match env.pipeline.capture.run(&ctx, &mut message) {
            Ok(Next::Continue) => {}
            Ok(Next::Halt) => return,
            Err(e) => {
                self.report(env, &e.into(), Some(&message));
                return;
            }
        }

        let response = self.capture(message);
        self.dispatch(env, &handler, response);
    }

    fn capture(&mut self, mut response: IncomingMessage) -> IncomingMessage {
        response.text = Some(response.text().trim().to_string());
        let question = self
            .sent
            .last()
            .map(|m| m.text_or_empty().to_string())
            .unwrap_or_default();
        let key = self
            .capture_options
            .key
            .clone()
            .unwrap_or_else(|| question.clone());
        response.question = Some(question);

        if self.capture_options.multiple {
            match self.responses.get_mut(&key) {
                Some(captured) => captured.push(response.clone()),
                None => {
                    self.responses
                        .insert(key, Captured::Multiple(vec![response.clone()]));
                }
            }
        } else {
            self.responses
                .insert(key, Captured::Single(response.clone()));
        }
        response
    }

    fn dispatch(&mut self, env: &Env<'_>, handler: &Handler, mut response: IncomingMessage) {
        let branches = match handler {
            Handler::Simple(callback) => {
                if let Err(e) = callback(&response, self) {
                    self.report(env, &e, Some(&response));
                }
                return;
            }
            Handler::Patterns(branches) => branches,
        };

        let mut chosen = None;
        for branch in branches {
            let Some(pattern) = &branch.pattern else {
                continue;
            };
            let result = env.matcher.test(std::slice::from_ref(pattern), &response);
            if result.is_match() {
                response.matches = result.captures;
                chosen = Some(branch);
                break;
            }
        }
        let Some(branch) = chosen.or_else(|| branches.iter().find(|b| b.is_default)) else {
            debug!(
                "No branch matched {:?} in conversation {} and there is no default",
                response.text(),
                self.id
            );
            return;
        };

        let ctx = StepContext::new(env.bot).with_conversation(self);
        match env.pipeline.heard.run(&ctx, &mut response) {
            Ok(Next::Continue) => {}
            Ok(Next::Halt) => return,
            Err(e) => {
                self.report(env, &e.into(), Some(&response));
                return;
            }
        }

        if let Err(e) = (branch.callback)(&response, self) {
            self.report(env, &e, Some(&response));
        }
    }

    fn report(&self, env: &Env<'_>, err: &anyhow::Error, message: Option<&IncomingMessage>) {
        let ctx = StepContext::new(env.bot).with_conversation(self);
        env.pipeline.error.run(&ctx, err, message);
    }
}

impl fmt::Debug for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation")
            .field("id", &self.id)
            .field("task_id", &self.task_id)
            .field("status", &self.status)
            .field("thread", &self.thread)
            .field("queued", &self.queue.len())
            .field("sent", &self.sent.len())
            .field("waiting", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}
