//! Terminal connector: every stdin line is a message from one local user.

use crate::command::CommandStrategy;
use parley_config::Config;
use parley_core::{Bot, DeliveryAck, Identity, IncomingMessage, OutgoingMessage, Runtime};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

const CONSOLE_USER: &str = "user";
const CONSOLE_CHANNEL: &str = "console";

/// Prints replies to stdout and acknowledges them on the spot.
#[derive(Debug, Default)]
struct ConsoleBot;

impl Bot for ConsoleBot {
    fn identity(&self) -> Identity {
        Identity {
            id: "console".to_string(),
            name: "parley".to_string(),
        }
    }

    fn kind(&self) -> &str {
        "console"
    }

    fn reply(&self, _source: &IncomingMessage, message: OutgoingMessage, ack: DeliveryAck) {
        println!("🤖 {}", message.text_or_empty());
        ack.complete(Ok(None));
        ack.delivered();
    }
}

/// Input for the console command.
pub struct ConsoleInput {
    /// Optional tick interval (overrides config)
    pub tick_ms: Option<u64>,
}

/// Strategy for chatting with the demo script in the terminal.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleStrategy;

impl CommandStrategy for ConsoleStrategy {
    type Input = ConsoleInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        // the console works without a config file, but not with a broken one
        let mut config = Config::load_or_default()?;
        if let Some(tick_ms) = input.tick_ms {
            config.runtime.tick_interval_ms = tick_ms;
        }

        let (runtime, handle) = Runtime::new(super::build_controller(&config));
        let driver = tokio::spawn(runtime.run());
        handle.start_ticking()?;

        println!("Say hello to start. Type 'exit' or 'quit' to leave.");
        let bot: Arc<dyn Bot> = Arc::new(ConsoleBot);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            if text == "exit" || text == "quit" {
                break;
            }
            handle.receive(
                Arc::clone(&bot),
                IncomingMessage::new(CONSOLE_USER, CONSOLE_CHANNEL, text),
            )?;
        }

        handle.shutdown()?;
        let controller = driver.await?;
        info!(
            "Console closed with {} task(s) still open",
            controller.tasks().len()
        );
        Ok(())
    }
}
