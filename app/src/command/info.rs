use parley_config::Config;

/// Strategy for displaying configuration information.
///
/// Prints the runtime settings, log level and Telegram settings with the
/// bot token masked.
#[derive(Debug, Clone, Copy)]
pub struct InfoStrategy;

impl super::CommandStrategy for InfoStrategy {
    type Input = ();

    async fn execute(&self, _input: Self::Input) -> anyhow::Result<()> {
        let config = Config::load()?;

        println!("=== parley Configuration ===\n");

        println!("Config file: {}", Config::config_path()?.display());
        println!();

        println!("Runtime:");
        println!("  Tick Interval: {}ms", config.runtime.tick_interval_ms);
        println!("  Require Delivery: {}", config.runtime.require_delivery);
        match config.runtime.default_time_limit_ms {
            Some(ms) => println!("  Default Time Limit: {ms}ms"),
            None => println!("  Default Time Limit: (none)"),
        }
        println!();

        println!("Log:");
        println!("  Level: {}", config.log.level);
        println!();

        println!("Telegram:");
        println!("  Enabled: {}", config.telegram.enabled);
        println!("  Token: {}", mask_token(&config.telegram.token));
        if config.telegram.allow_from.is_empty() {
            println!("  Allow From: (empty - all users allowed)");
        } else {
            println!("  Allow From: {}", config.telegram.allow_from.join(", "));
        }

        Ok(())
    }
}

fn mask_token(token: &str) -> String {
    if token.is_empty() {
        "(not set)".to_string()
    } else if token.len() > 8 && token.is_char_boundary(8) {
        format!("{}...***", &token[..8])
    } else {
        "***".to_string()
    }
}
