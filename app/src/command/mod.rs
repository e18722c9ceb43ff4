//! Static strategy pattern for CLI commands.
//!
//! Each command is a separate strategy with its own input type, dispatched
//! statically from `main`.

use parley_config::Config;
use parley_core::Controller;
use tracing::info;

mod console;
mod info;
mod init;
mod telegram;
mod version;

pub use console::{ConsoleInput, ConsoleStrategy};
pub use info::InfoStrategy;
pub use init::InitStrategy;
pub use telegram::{TelegramInput, TelegramStrategy};
pub use version::VersionStrategy;

/// Build a controller from `config` with the demo script installed.
fn build_controller(config: &Config) -> Controller {
    let controller_config = config.controller_config();
    info!(
        "Controller: tick every {}ms, require_delivery={}",
        controller_config.tick_interval.as_millis(),
        controller_config.require_delivery
    );
    let mut controller = Controller::new(controller_config);
    crate::script::install(&mut controller);
    controller
}

/// Core trait defining the contract for all command strategies.
///
/// # Example
/// ```rust,ignore
/// struct MyStrategy;
///
/// impl CommandStrategy for MyStrategy {
///     type Input = MyInput;
///
///     async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
///         // Command logic here
///         Ok(())
///     }
/// }
/// ```
pub trait CommandStrategy: Send + Sync + 'static {
    /// The input type this strategy accepts.
    type Input;

    /// Execute the command with the given input.
    ///
    /// # Errors
    /// Returns an error if command execution fails.
    async fn execute(&self, input: Self::Input) -> anyhow::Result<()>;
}
