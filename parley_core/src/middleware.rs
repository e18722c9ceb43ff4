//! Ordered middleware chains with explicit continuation.
//!
//! Every step must return [`Next::Continue`] for the message to move on.
//! [`Next::Halt`] stops the chain and the message goes no further; an `Err`
//! aborts the chain and is reported by the caller.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

use crate::bot::Bot;
use crate::conversation::Conversation;
use crate::error::MiddlewareError;
use crate::message::{IncomingMessage, OutgoingMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Continue,
    Halt,
}

/// What a step can see besides the message it transforms.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub bot: &'a dyn Bot,
    /// Set for `capture` and `send` steps, and for errors raised inside a
    /// conversation.
    pub conversation: Option<&'a Conversation>,
}

impl<'a> StepContext<'a> {
    #[must_use]
    pub fn new(bot: &'a dyn Bot) -> Self {
        Self {
            bot,
            conversation: None,
        }
    }

    #[must_use]
    pub const fn with_conversation(mut self, conversation: &'a Conversation) -> Self {
        self.conversation = Some(conversation);
        self
    }
}

pub type Step<M> = Arc<dyn Fn(&StepContext<'_>, &mut M) -> anyhow::Result<Next> + Send + Sync>;

pub struct Chain<M> {
    name: &'static str,
    steps: Vec<Step<M>>,
}

impl<M> Chain<M> {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
        }
    }

    /// Append a step to the end of the chain.
    pub fn add<F>(&mut self, step: F) -> &mut Self
    where
        F: Fn(&StepContext<'_>, &mut M) -> anyhow::Result<Next> + Send + Sync + 'static,
    {
        self.steps.push(Arc::new(step));
        self
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order over `message`.
    pub fn run(&self, ctx: &StepContext<'_>, message: &mut M) -> Result<Next, MiddlewareError> {
        for (step, f) in self.steps.iter().enumerate() {
            match f(ctx, message) {
                Ok(Next::Continue) => {}
                Ok(Next::Halt) => {
                    debug!("{} middleware halted at step {step}", self.name);
                    return Ok(Next::Halt);
                }
                Err(source) => {
                    return Err(MiddlewareError {
                        chain: self.name,
                        step,
                        source,
                    });
                }
            }
        }
        Ok(Next::Continue)
    }
}

impl<M> fmt::Debug for Chain<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("name", &self.name)
            .field("steps", &self.steps.len())
            .finish()
    }
}

pub type ErrorStep = Arc<
    dyn Fn(&StepContext<'_>, &anyhow::Error, Option<&IncomingMessage>) -> anyhow::Result<Next>
        + Send
        + Sync,
>;

/// Steps that observe errors raised by scripts, handlers and middleware.
///
/// A failure inside an error step is logged and dropped; it is never fed
/// back into this chain.
#[derive(Default)]
pub struct ErrorChain {
    steps: Vec<ErrorStep>,
}

impl ErrorChain {
    pub fn add<F>(&mut self, step: F) -> &mut Self
    where
        F: Fn(&StepContext<'_>, &anyhow::Error, Option<&IncomingMessage>) -> anyhow::Result<Next>
            + Send
            + Sync
            + 'static,
    {
        self.steps.push(Arc::new(step));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn run(
        &self,
        ctx: &StepContext<'_>,
        err: &anyhow::Error,
        message: Option<&IncomingMessage>,
    ) {
        if self.steps.is_empty() {
            error!("Unhandled error in dialog script: {err:#}");
            return;
        }
        for (step, f) in self.steps.iter().enumerate() {
            match f(ctx, err, message) {
                Ok(Next::Continue) => {}
                Ok(Next::Halt) => return,
                Err(e) => {
                    error!("Error handler {step} failed while handling {err:#}: {e:#}");
                    return;
                }
            }
        }
    }
}

impl fmt::Debug for ErrorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorChain")
            .field("steps", &self.steps.len())
            .finish()
    }
}

/// The controller's middleware chains.
#[derive(Debug)]
pub struct Pipeline {
    /// Inbound normalization and filtering.
    pub receive: Chain<IncomingMessage>,
    /// Outbound transform, run after rendering.
    pub send: Chain<OutgoingMessage>,
    /// Runs after a pattern matched and before its callback.
    pub heard: Chain<IncomingMessage>,
    /// Runs over an answer before it is stored.
    pub capture: Chain<IncomingMessage>,
    pub error: ErrorChain,
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self {
            receive: Chain::new("receive"),
            send: Chain::new("send"),
            heard: Chain::new("heard"),
            capture: Chain::new("capture"),
            error: ErrorChain::default(),
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::testing::RecordingBot;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn steps_run_in_order_and_transform() {
        let bot = RecordingBot::default();
        let mut chain: Chain<IncomingMessage> = Chain::new("receive");
        chain
            .add(|_, msg| {
                msg.text = Some(format!("{}-a", msg.text()));
                Ok(Next::Continue)
            })
            .add(|_, msg| {
                msg.text = Some(format!("{}-b", msg.text()));
                Ok(Next::Continue)
            });

        let mut msg = IncomingMessage::new("u", "c", "x");
        let next = chain.run(&StepContext::new(&bot), &mut msg).unwrap();
        assert_eq!(next, Next::Continue);
        assert_eq!(msg.text(), "x-a-b");
    }

    #[test]
    fn halt_stops_later_steps() {
        let bot = RecordingBot::default();
        let later = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&later);
        let mut chain: Chain<IncomingMessage> = Chain::new("heard");
        chain.add(|_, _| Ok(Next::Halt)).add(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(Next::Continue)
        });

        let mut msg = IncomingMessage::new("u", "c", "x");
        assert_eq!(
            chain.run(&StepContext::new(&bot), &mut msg).unwrap(),
            Next::Halt
        );
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn error_names_chain_and_step() {
        let bot = RecordingBot::default();
        let mut chain: Chain<IncomingMessage> = Chain::new("capture");
        chain
            .add(|_, _| Ok(Next::Continue))
            .add(|_, _| Err(anyhow::anyhow!("boom")));

        let mut msg = IncomingMessage::new("u", "c", "x");
        let err = chain.run(&StepContext::new(&bot), &mut msg).unwrap_err();
        assert_eq!(err.chain, "capture");
        assert_eq!(err.step, 1);
        assert_eq!(err.to_string(), "capture middleware step 1 failed: boom");
    }

    #[test]
    fn failing_error_step_is_not_reentered() {
        let bot = RecordingBot::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut chain = ErrorChain::default();
        chain.add(move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("handler broke too"))
        });

        chain.run(&StepContext::new(&bot), &anyhow::anyhow!("original"), None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
