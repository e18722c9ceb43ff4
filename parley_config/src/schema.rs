use parley_core::ControllerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    #[serde(default = "RuntimeConfig::default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default)]
    pub require_delivery: bool,
    /// Conversations waiting longer than this for an answer time out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_time_limit_ms: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: Self::default_tick_interval_ms(),
            require_delivery: false,
            default_time_limit_ms: None,
        }
    }
}

impl RuntimeConfig {
    const fn default_tick_interval_ms() -> u64 {
        1500
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct LogConfig {
    #[serde(default = "LogConfig::default_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

impl LogConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub token: String,
    /// Chat ids allowed to talk to the bot; empty allows everyone.
    #[serde(default)]
    pub allow_from: Vec<String>,
}

const CONFIG_TEMPLATE: &str = r#"{
  "runtime": {
    "tick_interval_ms": 1500,
    "require_delivery": false,
    "default_time_limit_ms": 300000
  },
  "log": {
    "level": "info"
  },
  "telegram": {
    "enabled": false,
    "token": "your-telegram-bot-token-here",
    "allow_from": []
  }
}"#;

impl Config {
    fn config_dir() -> anyhow::Result<PathBuf> {
        Ok(dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Cannot find home directory"))?
            .join("parley"))
    }

    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            anyhow::bail!(
                "Config file not found at: {}. Please run 'parley init' to create config.",
                config_path.display()
            );
        }

        Self::load_from(&config_path)
    }

    /// Like [`Config::load_from`], but a missing file yields the defaults.
    /// A file that exists and fails to parse is still an error.
    pub fn load_or_default_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(path).map_err(|e| {
            anyhow::anyhow!("Failed to load config from {}: {e}", path.display())
        })
    }

    pub fn load_or_default() -> anyhow::Result<Self> {
        Self::load_or_default_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn ensure_config_dir() -> anyhow::Result<PathBuf> {
        let config_dir = Self::config_dir()?;
        std::fs::create_dir_all(&config_dir)?;
        Ok(config_dir)
    }

    pub fn create_config() -> anyhow::Result<()> {
        let config_dir = Self::ensure_config_dir()?;
        let config_path = config_dir.join("config.json");

        if config_path.exists() {
            anyhow::bail!(
                "Config file already exists at: {}. Please edit it directly.",
                config_path.display()
            );
        }

        std::fs::write(&config_path, CONFIG_TEMPLATE)?;

        println!("✅ Created config file at: {}", config_path.display());
        println!();
        println!("📝 Next steps:");
        println!("   1. Run 'parley console' to try the demo script in your terminal");
        println!("   2. To use Telegram, set telegram.enabled and telegram.token");
        println!("   3. Run 'parley telegram' to start the Telegram bot");
        println!();
        println!("🔧 Configuration options:");
        println!("   - runtime.tick_interval_ms: Gap between scheduler sweeps");
        println!("   - runtime.require_delivery: Wait for delivery receipts before continuing");
        println!("   - runtime.default_time_limit_ms: Time out unanswered questions");
        println!("   - log.level: Default log filter when RUST_LOG is unset");
        println!();
        Ok(())
    }

    /// Scheduler settings for a new controller.
    #[must_use]
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            tick_interval: Duration::from_millis(self.runtime.tick_interval_ms.max(1)),
            require_delivery: self.runtime.require_delivery,
            default_time_limit: self
                .runtime
                .default_time_limit_ms
                .and_then(|ms| i64::try_from(ms).ok())
                .map(chrono::Duration::milliseconds),
        }
    }
}
