//! Persistence for navigation stacks and intents
//!
//! Everything is stored through a plain key/value contract
//! ([`KeyValueStorage`]); [`DialogStore`] adds typed access on top of it.

mod context;
mod locks;
mod memory;
mod sqlite;

pub use context::{new_id, AccessSettings, Context, Stack, DEFAULT_STACK_ID};
pub use locks::ScopeLocks;
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use crate::error::{DialogError, DialogResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

// ============================================================================
// Storage keys
// ============================================================================

/// What a stored record holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPurpose {
    Context,
    Stack,
}

impl KeyPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyPurpose::Context => "context",
            KeyPurpose::Stack => "stack",
        }
    }
}

/// Fully qualified key of one stored record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    pub bot_id: i64,
    pub chat_id: i64,
    pub purpose: KeyPurpose,
    pub id: String,
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.bot_id,
            self.chat_id,
            self.purpose.as_str(),
            self.id
        )
    }
}

/// Identifies one navigation stack
///
/// The default stack belongs to a single user inside a chat; every other
/// stack is addressed by its own id and may be shared by several users.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeId {
    pub chat_id: i64,
    pub user_id: i64,
    pub stack_id: String,
}

impl ScopeId {
    pub fn new(chat_id: i64, user_id: i64, stack_id: impl Into<String>) -> Self {
        Self {
            chat_id,
            user_id,
            stack_id: stack_id.into(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.stack_id == DEFAULT_STACK_ID
    }

    /// Storage id of the stack record; `~` never occurs in generated ids
    pub fn storage_id(&self) -> String {
        if self.is_default() {
            format!("~{}", self.user_id)
        } else {
            self.stack_id.clone()
        }
    }

    pub fn stack_key(&self, bot_id: i64) -> StorageKey {
        StorageKey {
            bot_id,
            chat_id: self.chat_id,
            purpose: KeyPurpose::Stack,
            id: self.storage_id(),
        }
    }
}

// ============================================================================
// Key/value contract
// ============================================================================

/// Storage engine contract consumed by [`DialogStore`]
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    async fn get(&self, key: &StorageKey) -> StorageResult<Option<Map<String, Value>>>;

    async fn set(&self, key: &StorageKey, value: Map<String, Value>) -> StorageResult<()>;

    async fn clear(&self, key: &StorageKey) -> StorageResult<()>;
}

#[async_trait]
impl<T: KeyValueStorage + ?Sized> KeyValueStorage for Arc<T> {
    async fn get(&self, key: &StorageKey) -> StorageResult<Option<Map<String, Value>>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &StorageKey, value: Map<String, Value>) -> StorageResult<()> {
        (**self).set(key, value).await
    }

    async fn clear(&self, key: &StorageKey) -> StorageResult<()> {
        (**self).clear(key).await
    }
}

// ============================================================================
// Typed store
// ============================================================================

/// Typed access to contexts and stacks of one bot
pub struct DialogStore<S> {
    storage: S,
    bot_id: i64,
}

impl<S: KeyValueStorage> DialogStore<S> {
    pub fn new(storage: S, bot_id: i64) -> Self {
        Self { storage, bot_id }
    }

    pub fn bot_id(&self) -> i64 {
        self.bot_id
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn context_key(&self, chat_id: i64, intent_id: &str) -> StorageKey {
        StorageKey {
            bot_id: self.bot_id,
            chat_id,
            purpose: KeyPurpose::Context,
            id: intent_id.to_string(),
        }
    }

    /// Load an intent; missing records fail with `UnknownIntent`
    pub async fn load_context(&self, chat_id: i64, intent_id: &str) -> DialogResult<Context> {
        let key = self.context_key(chat_id, intent_id);
        let Some(raw) = self.storage.get(&key).await? else {
            return Err(DialogError::UnknownIntent(intent_id.to_string()));
        };
        serde_json::from_value(Value::Object(raw)).map_err(|e| {
            tracing::warn!(key = %key, error = %e, "Stored context is unreadable");
            DialogError::UnknownState(format!("unreadable context {intent_id}: {e}"))
        })
    }

    pub async fn save_context(&self, chat_id: i64, context: &Context) -> DialogResult<()> {
        let key = self.context_key(chat_id, &context.id);
        self.storage.set(&key, to_map(context)?).await?;
        Ok(())
    }

    pub async fn remove_context(&self, chat_id: i64, intent_id: &str) -> DialogResult<()> {
        let key = self.context_key(chat_id, intent_id);
        self.storage.clear(&key).await?;
        Ok(())
    }

    /// Load a stack, or a fresh empty one when nothing is stored yet
    pub async fn load_stack(&self, scope: &ScopeId) -> DialogResult<Stack> {
        let key = scope.stack_key(self.bot_id);
        match self.storage.get(&key).await? {
            Some(raw) => match serde_json::from_value::<Stack>(Value::Object(raw)) {
                Ok(stack) => Ok(stack),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Stored stack is unreadable, starting empty");
                    Ok(Stack::new(scope.stack_id.clone()))
                }
            },
            None => Ok(Stack::new(scope.stack_id.clone())),
        }
    }

    pub async fn save_stack(&self, scope: &ScopeId, stack: &Stack) -> DialogResult<()> {
        let key = scope.stack_key(self.bot_id);
        self.storage.set(&key, to_map(stack)?).await?;
        Ok(())
    }

    pub async fn remove_stack(&self, scope: &ScopeId) -> DialogResult<()> {
        let key = scope.stack_key(self.bot_id);
        self.storage.clear(&key).await?;
        Ok(())
    }
}

fn to_map<T: Serialize>(value: &T) -> Result<Map<String, Value>, StorageError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::Backend(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}
