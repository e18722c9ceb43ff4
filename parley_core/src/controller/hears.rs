//! Pattern-triggered handlers layered on the event bus.

use std::sync::Arc;
use tracing::debug;

use super::Controller;
use super::events::{Flow, HEARD_TRIGGER, Payload};
use crate::bot::Bot;
use crate::matcher::MatchResult;
use crate::message::IncomingMessage;
use crate::middleware::{Next, StepContext};

pub type HearsCallback =
    Arc<dyn Fn(&mut Controller, &Arc<dyn Bot>, &IncomingMessage) -> anyhow::Result<()> + Send + Sync>;

/// A per-`hears` replacement for the controller's matcher.
pub type HearsTest = Arc<dyn Fn(&[String], &IncomingMessage) -> MatchResult + Send + Sync>;

impl Controller {
    /// Run `callback` when a message on any of `events` matches one of
    /// `patterns`. A match stops later handlers for the same event.
    pub fn hears<F>(&mut self, patterns: &[&str], events: &[&str], callback: F) -> &mut Self
    where
        F: Fn(&mut Self, &Arc<dyn Bot>, &IncomingMessage) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.register_hears(patterns, events, None, Arc::new(callback))
    }

    /// Like [`Controller::hears`], with `test` deciding the match instead of
    /// the controller's matcher.
    pub fn hears_with<T, F>(
        &mut self,
        patterns: &[&str],
        events: &[&str],
        test: T,
        callback: F,
    ) -> &mut Self
    where
        T: Fn(&[String], &IncomingMessage) -> MatchResult + Send + Sync + 'static,
        F: Fn(&mut Self, &Arc<dyn Bot>, &IncomingMessage) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.register_hears(patterns, events, Some(Arc::new(test)), Arc::new(callback))
    }

    fn register_hears(
        &mut self,
        patterns: &[&str],
        events: &[&str],
        test: Option<HearsTest>,
        callback: HearsCallback,
    ) -> &mut Self {
        let patterns: Vec<String> = patterns.iter().map(ToString::to_string).collect();
        for event in events {
            let patterns = patterns.clone();
            let test = test.clone();
            let callback = Arc::clone(&callback);
            self.on(*event, move |controller, payload| {
                let Payload::Message { bot, message } = payload else {
                    return Flow::Continue;
                };
                let result = match &test {
                    Some(test) => test(&patterns, message),
                    None => controller.services.matcher.test(&patterns, message),
                };
                if !result.is_match() {
                    return Flow::Continue;
                }
                controller.heard(bot, message.clone(), result, &callback);
                Flow::Stop
            });
        }
        self
    }

    fn heard(
        &mut self,
        bot: &Arc<dyn Bot>,
        mut message: IncomingMessage,
        result: MatchResult,
        callback: &HearsCallback,
    ) {
        message.matches = result.captures;
        let pattern = result.matched.unwrap_or_default();
        debug!("Heard {pattern:?} in {:?} from {}", message.text(), message.user);

        let ctx = StepContext::new(bot.as_ref());
        let pipeline = &self.services.pipeline;
        match pipeline.heard.run(&ctx, &mut message) {
            Ok(Next::Continue) => {}
            Ok(Next::Halt) => return,
            Err(e) => {
                pipeline.error.run(&ctx, &e.into(), Some(&message));
                return;
            }
        }

        if let Err(e) = callback(self, bot, &message) {
            let ctx = StepContext::new(bot.as_ref());
            self.services.pipeline.error.run(&ctx, &e, Some(&message));
        }

        self.trigger(
            HEARD_TRIGGER,
            &Payload::Heard {
                bot: Arc::clone(bot),
                message,
                pattern,
            },
        );
    }
}
