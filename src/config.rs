//! Runtime configuration

use std::path::PathBuf;

/// Default upper bound on intents per stack
pub const DEFAULT_MAX_STACK_DEPTH: usize = 100;

/// Default capacity of the background notification channel
pub const DEFAULT_EVENT_BUFFER: usize = 32;

/// Configuration for a dialog runtime
#[derive(Debug, Clone)]
pub struct DialogConfig {
    /// Identifies the bot in storage keys
    pub bot_id: i64,
    pub max_stack_depth: usize,
    pub event_buffer: usize,
    /// SQLite database for persistent storage; in-memory storage when unset
    pub db_path: Option<PathBuf>,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            bot_id: 0,
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
            event_buffer: DEFAULT_EVENT_BUFFER,
            db_path: None,
        }
    }
}

impl DialogConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bot_id: parse_var("DIALOG_BOT_ID").unwrap_or(defaults.bot_id),
            max_stack_depth: parse_var("DIALOG_MAX_STACK_DEPTH")
                .filter(|depth| *depth > 0)
                .unwrap_or(defaults.max_stack_depth),
            event_buffer: parse_var("DIALOG_EVENT_BUFFER")
                .filter(|size| *size > 0)
                .unwrap_or(defaults.event_buffer),
            db_path: std::env::var("DIALOG_DB_PATH").ok().map(PathBuf::from),
        }
    }

    pub fn with_bot_id(mut self, bot_id: i64) -> Self {
        self.bot_id = bot_id;
        self
    }

    pub fn with_max_stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = depth;
        self
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "Ignoring unparsable configuration value");
            None
        }
    }
}
