//! Async driver that owns a [`Controller`] and feeds it commands and ticks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use super::Controller;
use crate::bot::Bot;
use crate::error::{Error, Result};
use crate::message::IncomingMessage;

/// `tokio::time::interval` rejects a zero period.
const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

type ControllerFn = Box<dyn FnOnce(&mut Controller) + Send>;

pub enum Command {
    Receive {
        bot: Arc<dyn Bot>,
        message: IncomingMessage,
    },
    /// Run a closure against the controller, e.g. to start a conversation.
    Call(ControllerFn),
    StartTicking,
    Shutdown,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Receive { bot, message } => f
                .debug_struct("Receive")
                .field("bot", &bot.kind())
                .field("message", message)
                .finish(),
            Self::Call(_) => f.write_str("Call(<fn>)"),
            Self::StartTicking => f.write_str("StartTicking"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Cloneable sender connectors use to reach the controller.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: UnboundedSender<Command>,
}

impl ControllerHandle {
    pub fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| Error::RuntimeClosed)
    }

    pub fn receive(&self, bot: Arc<dyn Bot>, message: IncomingMessage) -> Result<()> {
        self.send(Command::Receive { bot, message })
    }

    pub fn call<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Controller) + Send + 'static,
    {
        self.send(Command::Call(Box::new(f)))
    }

    pub fn start_ticking(&self) -> Result<()> {
        self.send(Command::StartTicking)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }
}

pub struct Runtime {
    controller: Controller,
    rx: UnboundedReceiver<Command>,
}

impl Runtime {
    #[must_use]
    pub fn new(controller: Controller) -> (Self, ControllerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { controller, rx }, ControllerHandle { tx })
    }

    pub const fn controller_mut(&mut self) -> &mut Controller {
        &mut self.controller
    }

    /// Process commands, and tick while ticking is on, until `Shutdown`
    /// arrives or every handle is dropped. Returns the controller.
    pub async fn run(mut self) -> Controller {
        let period = self.controller.config().tick_interval.max(MIN_TICK_INTERVAL);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Controller runtime started");

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(Command::Receive { bot, message }) => {
                        self.controller.receive_message(bot, message);
                    }
                    Some(Command::Call(f)) => f(&mut self.controller),
                    Some(Command::StartTicking) => self.controller.start_ticking(),
                    Some(Command::Shutdown) => {
                        self.controller.shutdown();
                        break;
                    }
                    None => {
                        debug!("All controller handles dropped");
                        self.controller.shutdown();
                        break;
                    }
                },
                _ = ticker.tick(), if self.controller.is_ticking() => self.controller.tick(),
            }
        }

        info!("Controller runtime stopped");
        self.controller
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}
