//! The runtime root: tasks, events, `hears` routing and the tick scheduler.

pub mod events;
mod hears;
mod runtime;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::bot::{Bot, ConversationRef};
use crate::clock::{Clock, SystemClock};
use crate::conversation::{Conversation, Env, Renderer};
use crate::error::{Error, Result};
use crate::matcher::{Matcher, RegexMatcher};
use crate::message::IncomingMessage;
use crate::middleware::{Next, Pipeline, StepContext};
use crate::storage::Storage;
use crate::task::{IdSequence, Lifecycle, Task};

pub use events::{EventHandler, Flow, Payload};
pub use hears::{HearsCallback, HearsTest};
pub use runtime::{Command, ControllerHandle, Runtime};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Gap between scheduler sweeps.
    pub tick_interval: Duration,
    /// Hold the next message until the connector confirms delivery, not just
    /// the send.
    pub require_delivery: bool,
    /// Time limit given to every new task.
    pub default_time_limit: Option<ChronoDuration>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1500),
            require_delivery: false,
            default_time_limit: None,
        }
    }
}

/// State every conversation reads while it runs.
pub(crate) struct Services {
    pub(crate) pipeline: Pipeline,
    matcher: Box<dyn Matcher>,
    clock: Arc<dyn Clock>,
    renderer: Renderer,
    require_delivery: bool,
}

impl Services {
    pub(crate) fn new(config: &ControllerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            pipeline: Pipeline::new(),
            matcher: Box::new(RegexMatcher),
            clock,
            renderer: Renderer::new(),
            require_delivery: config.require_delivery,
        }
    }

    pub(crate) fn env<'a>(
        &'a self,
        bot: &'a dyn Bot,
        task_started: DateTime<Utc>,
        time_limit: Option<ChronoDuration>,
    ) -> Env<'a> {
        Env {
            bot,
            pipeline: &self.pipeline,
            matcher: self.matcher.as_ref(),
            clock: self.clock.as_ref(),
            renderer: &self.renderer,
            require_delivery: self.require_delivery,
            task_started,
            time_limit,
        }
    }
}

/// Owns every running task and drives them.
///
/// A controller is single-threaded: wrap it in a [`Runtime`] to feed it
/// messages and ticks from async connectors.
pub struct Controller {
    config: ControllerConfig,
    services: Services,
    events: events::EventBus,
    tasks: Vec<Task>,
    task_ids: u64,
    conversation_ids: IdSequence,
    storage: Storage,
    ticking: bool,
}

impl Controller {
    #[must_use]
    pub fn new(config: ControllerConfig) -> Self {
        let services = Services::new(&config, Arc::new(SystemClock));
        Self {
            config,
            services,
            events: events::EventBus::default(),
            tasks: Vec::new(),
            task_ids: 0,
            conversation_ids: IdSequence::default(),
            storage: Storage::memory(),
            ticking: false,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.services.clock = clock;
        self
    }

    #[must_use]
    pub fn with_storage(mut self, storage: Storage) -> Self {
        self.storage = storage;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    #[must_use]
    pub const fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.services.clock.now()
    }

    #[must_use]
    pub const fn middleware(&self) -> &Pipeline {
        &self.services.pipeline
    }

    pub const fn middleware_mut(&mut self) -> &mut Pipeline {
        &mut self.services.pipeline
    }

    /// Replace the matcher used by `hears` and pattern-branch questions.
    pub fn change_ears(&mut self, matcher: impl Matcher + 'static) -> &mut Self {
        self.services.matcher = Box::new(matcher);
        self
    }

    pub fn on<F>(&mut self, event: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&mut Self, &Payload) -> Flow + Send + Sync + 'static,
    {
        self.events.on(event.into(), Arc::new(handler));
        self
    }

    /// Call the handlers of `event` in registration order until one returns
    /// [`Flow::Stop`].
    pub fn trigger(&mut self, event: &str, payload: &Payload) -> Flow {
        let handlers = self.events.handlers(event);
        if !handlers.is_empty() {
            debug!("Triggering {event} for {} handler(s)", handlers.len());
        }
        for handler in handlers {
            if handler(self, payload) == Flow::Stop {
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    #[must_use]
    pub fn task(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id() == id)
    }

    pub fn task_mut(&mut self, id: u64) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id() == id)
    }

    #[must_use]
    pub fn conversation(&self, address: ConversationRef) -> Option<&Conversation> {
        self.task(address.task)
            .and_then(|task| task.conversation(address.conversation))
    }

    /// Lifecycle changes made through this reference are announced on the
    /// next tick.
    pub fn conversation_mut(&mut self, address: ConversationRef) -> Option<&mut Conversation> {
        self.task_mut(address.task)
            .and_then(|task| task.conversation_mut(address.conversation))
    }

    fn push_task(&mut self, bot: Arc<dyn Bot>, source: IncomingMessage) -> &mut Task {
        self.task_ids += 1;
        let id = self.task_ids;
        info!("[Start] Task {id} for {} in {}", source.user, source.channel);
        let task = Task::new(
            id,
            bot,
            source,
            self.conversation_ids.clone(),
            Arc::clone(&self.services.clock),
            self.config.default_time_limit,
        );
        self.tasks.push(task);
        let last = self.tasks.len() - 1;
        &mut self.tasks[last]
    }

    /// Start a task for `source` and let `script` populate it. Returns the
    /// task id.
    pub fn start_task<F>(&mut self, bot: Arc<dyn Bot>, source: IncomingMessage, script: F) -> u64
    where
        F: FnOnce(&mut Task),
    {
        let task = self.push_task(bot, source);
        script(task);
        let id = task.id();
        self.settle();
        id
    }

    /// Start a one-conversation task replying to `message`.
    pub fn start_conversation<F>(
        &mut self,
        bot: Arc<dyn Bot>,
        message: IncomingMessage,
        script: F,
    ) -> ConversationRef
    where
        F: FnOnce(&mut Conversation),
    {
        let task = self.push_task(bot, message.clone());
        let convo = task.start_conversation(message);
        script(convo);
        let address = convo.address();
        self.settle();
        address
    }

    /// Like [`Controller::start_conversation`], but the conversation stays
    /// idle until [`Conversation::activate`] is called.
    pub fn create_conversation<F>(
        &mut self,
        bot: Arc<dyn Bot>,
        message: IncomingMessage,
        script: F,
    ) -> ConversationRef
    where
        F: FnOnce(&mut Conversation),
    {
        let task = self.push_task(bot, message.clone());
        let convo = task.create_conversation(message);
        script(convo);
        convo.address()
    }

    /// Hand an answer to the conversation at `address`.
    pub fn deliver(&mut self, address: ConversationRef, message: IncomingMessage) -> Result<()> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id() == address.task)
            .ok_or(Error::TaskNotFound(address.task))?;
        task.handle(address.conversation, &self.services, message)?;
        self.settle();
        Ok(())
    }

    /// Entry point for every inbound message.
    pub fn receive_message(&mut self, bot: Arc<dyn Bot>, mut message: IncomingMessage) {
        let ctx = StepContext::new(bot.as_ref());
        match self.services.pipeline.receive.run(&ctx, &mut message) {
            Ok(Next::Continue) => {}
            Ok(Next::Halt) => {
                debug!("Receive middleware held message {}", message.id);
                return;
            }
            Err(e) => {
                error!("Dropping message {}: {e}", message.id);
                return;
            }
        }

        debug!(
            "Received {} from {} in {}: {:?}",
            message.event_name(),
            message.user,
            message.channel,
            message.text()
        );
        match bot.find_conversation(&self.tasks, &message) {
            Some(address) => {
                if let Err(e) = self.deliver(address, message) {
                    error!("Could not route message to conversation: {e}");
                }
            }
            None => {
                let event = message.event_name().to_string();
                self.trigger(&event, &Payload::Message { bot, message });
                self.settle();
            }
        }
    }

    /// One scheduler sweep: every task advances, finished tasks are dropped,
    /// then `tick` fires.
    pub fn tick(&mut self) {
        self.settle();
        for task in &mut self.tasks {
            task.tick(&self.services);
        }
        self.settle();

        let before = self.tasks.len();
        self.tasks.retain(Task::is_active);
        if self.tasks.len() < before {
            debug!("Removed {} completed task(s)", before - self.tasks.len());
        }
        self.trigger(events::TICK, &Payload::Tick);
    }

    pub fn start_ticking(&mut self) {
        if !self.ticking {
            info!(
                "Starting tick scheduler every {}ms",
                self.config.tick_interval.as_millis()
            );
            self.ticking = true;
        }
    }

    pub fn shutdown(&mut self) {
        if self.ticking {
            info!("Stopping tick scheduler");
            self.ticking = false;
        }
    }

    #[must_use]
    pub const fn is_ticking(&self) -> bool {
        self.ticking
    }

    /// Fire events for lifecycle changes until none are left; handlers may
    /// start or stop further conversations.
    fn settle(&mut self) {
        loop {
            let changes: Vec<Lifecycle> = self.tasks.iter_mut().flat_map(Task::settle).collect();
            if changes.is_empty() {
                return;
            }
            for change in changes {
                match change {
                    Lifecycle::ConversationStarted(summary) => {
                        self.trigger(events::CONVERSATION_STARTED, &Payload::Conversation(summary));
                    }
                    Lifecycle::ConversationEnded(summary) => {
                        self.trigger(events::CONVERSATION_ENDED, &Payload::Conversation(summary));
                    }
                    Lifecycle::TaskEnded(summary) => {
                        self.trigger(events::TASK_ENDED, &Payload::Task(summary));
                    }
                }
            }
        }
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(ControllerConfig::default())
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("config", &self.config)
            .field("events", &self.events)
            .field("tasks", &self.tasks.len())
            .field("ticking", &self.ticking)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::testing::RecordingBot;
    use std::sync::Mutex;

    #[test]
    fn stop_short_circuits_later_handlers() {
        let mut controller = Controller::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (a, b, c) = (Arc::clone(&log), Arc::clone(&log), Arc::clone(&log));
        controller
            .on("custom", move |_, _| {
                a.lock().unwrap().push(1);
                Flow::Continue
            })
            .on("custom", move |_, _| {
                b.lock().unwrap().push(2);
                Flow::Stop
            })
            .on("custom", move |_, _| {
                c.lock().unwrap().push(3);
                Flow::Continue
            });

        let flow = controller.trigger("custom", &Payload::Custom(serde_json::json!({})));
        assert_eq!(flow, Flow::Stop);
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
        assert_eq!(controller.trigger("nothing", &Payload::Tick), Flow::Continue);
    }

    #[test]
    fn ticking_is_idempotent() {
        let mut controller = Controller::default();
        controller.start_ticking();
        controller.start_ticking();
        assert!(controller.is_ticking());
        controller.shutdown();
        controller.shutdown();
        assert!(!controller.is_ticking());
    }

    #[test]
    fn tick_sweeps_completed_tasks_and_fires_tick() {
        let mut controller = Controller::default();
        let ticks = Arc::new(Mutex::new(0));
        let seen = Arc::clone(&ticks);
        controller.on(events::TICK, move |_, _| {
            *seen.lock().unwrap() += 1;
            Flow::Continue
        });
        let bot: Arc<dyn Bot> = Arc::new(RecordingBot::default());
        controller.start_conversation(bot, IncomingMessage::new("U1", "C1", "hi"), |convo| {
            convo.say("hello");
        });
        assert_eq!(controller.tasks().len(), 1);

        controller.tick();
        assert_eq!(controller.tasks().len(), 1);

        controller.tick();
        assert!(controller.tasks().is_empty());
        assert_eq!(*ticks.lock().unwrap(), 2);
    }

    #[test]
    fn default_time_limit_applies_to_new_tasks() {
        let config = ControllerConfig {
            default_time_limit: Some(ChronoDuration::seconds(30)),
            ..ControllerConfig::default()
        };
        let mut controller = Controller::new(config);
        let bot: Arc<dyn Bot> = Arc::new(RecordingBot::default());
        let id = controller.start_task(bot, IncomingMessage::new("U1", "C1", "hi"), |_| {});
        assert_eq!(
            controller.task(id).and_then(Task::time_limit),
            Some(ChronoDuration::seconds(30))
        );
    }

    #[test]
    fn deliver_to_missing_task_fails() {
        let mut controller = Controller::default();
        let address = ConversationRef {
            task: 4,
            conversation: 1,
        };
        let err = controller
            .deliver(address, IncomingMessage::new("U1", "C1", "x"))
            .unwrap_err();
        assert!(matches!(err, Error::TaskNotFound(4)));
    }
}
