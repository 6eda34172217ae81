//! Intent (context) and stack records

use crate::dialog::State;
use crate::error::{DialogError, DialogResult};
use crate::message::SentMessageRecord;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Id of the per-user stack every chat starts with
pub const DEFAULT_STACK_ID: &str = "";

/// Short random id, safe to embed in callback data
pub fn new_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Principals allowed to interact with a shared stack
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessSettings {
    #[serde(default)]
    pub user_ids: Vec<i64>,
}

impl AccessSettings {
    pub fn new(user_ids: Vec<i64>) -> Self {
        Self { user_ids }
    }

    pub fn allows(&self, user_id: i64) -> bool {
        self.user_ids.contains(&user_id)
    }
}

// ============================================================================
// Context
// ============================================================================

/// One pushed navigation frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub id: String,
    pub stack_id: String,
    pub state: State,
    #[serde(default)]
    start_data: Value,
    #[serde(default)]
    pub dialog_data: Map<String, Value>,
    #[serde(default)]
    pub widget_data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_settings: Option<AccessSettings>,
}

impl Context {
    pub fn new(
        id: impl Into<String>,
        stack_id: impl Into<String>,
        state: State,
        start_data: Value,
    ) -> Self {
        Self {
            id: id.into(),
            stack_id: stack_id.into(),
            state,
            start_data,
            dialog_data: Map::new(),
            widget_data: Map::new(),
            access_settings: None,
        }
    }

    /// Payload the dialog was started with; fixed for the intent's lifetime
    pub fn start_data(&self) -> &Value {
        &self.start_data
    }
}

// ============================================================================
// Stack
// ============================================================================

/// Ordered intents of one scope; the last one is shown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stack {
    pub id: String,
    #[serde(default)]
    intents: Vec<String>,
    /// Messages delivered for the current top screen, by part index
    ///
    /// `None` marks a part whose delivery failed.
    #[serde(default)]
    pub sent_messages: Vec<Option<SentMessageRecord>>,
    #[serde(default)]
    pub last_income_media_group_id: Option<String>,
    #[serde(default)]
    pub access_settings: AccessSettings,
    /// Principal that created the stack
    #[serde(default)]
    pub owner_id: Option<i64>,
}

impl Stack {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            intents: Vec::new(),
            sent_messages: Vec::new(),
            last_income_media_group_id: None,
            access_settings: AccessSettings::default(),
            owner_id: None,
        }
    }

    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_STACK_ID
    }

    pub fn intents(&self) -> &[String] {
        &self.intents
    }

    pub fn top(&self) -> Option<&str> {
        self.intents.last().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    pub fn last_message(&self) -> Option<&SentMessageRecord> {
        self.sent_messages.iter().rev().flatten().next()
    }

    /// Push a new intent for `state`
    pub fn push(&mut self, state: State, start_data: Value, max_depth: usize) -> DialogResult<Context> {
        if self.intents.len() >= max_depth {
            return Err(DialogError::StackOverflow {
                stack_id: self.id.clone(),
                limit: max_depth,
            });
        }
        let mut id = new_id();
        while self.intents.contains(&id) {
            id = new_id();
        }
        self.intents.push(id.clone());
        Ok(Context::new(id, self.id.clone(), state, start_data))
    }

    pub fn pop(&mut self) -> Option<String> {
        self.intents.pop()
    }
}
