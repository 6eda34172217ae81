//! Crate-level error taxonomy

use crate::reconcile::TransportError;
use crate::store::StorageError;
use thiserror::Error;

pub type DialogResult<T> = Result<T, DialogError>;

/// Errors surfaced by navigation, storage and rendering
#[derive(Debug, Error)]
pub enum DialogError {
    /// Inbound event names neither a stack nor an intent
    #[error("Event carries neither a stack id nor an intent id")]
    InvalidScopeReference,

    /// Referenced intent is not the top of its stack
    #[error("Intent {intent_id} is outdated (stack top is {top:?})")]
    OutdatedIntent {
        intent_id: String,
        top: Option<String>,
    },

    #[error("Unknown intent: {0}")]
    UnknownIntent(String),

    /// Persisted state is not declared by any registered dialog
    #[error("Unknown state: {0}")]
    UnknownState(String),

    #[error("Stack {stack_id:?} overflow: depth limit {limit} reached")]
    StackOverflow { stack_id: String, limit: usize },

    #[error("Launch mode violation: {0}")]
    LaunchModeViolation(String),

    /// Manager used after its event finished
    #[error("Dialog manager is closed and cannot be used any more")]
    StaleManager,

    #[error("Cannot switch from group {current} to state {target}")]
    StateGroupMismatch { current: String, target: String },

    #[error("No state {direction} {state}")]
    NoAdjacentState {
        state: String,
        direction: &'static str,
    },

    #[error("No dialog is active in this scope")]
    NoContext,

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("Background channel closed")]
    ChannelClosed,

    #[error("Background channel is full")]
    BackgroundQueueFull,

    /// Dialog definitions rejected at startup
    #[error("Invalid dialog registration: {0}")]
    Registration(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl DialogError {
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render(message.into())
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    /// Errors that only concern the stored frame, fixed by discarding it
    pub fn is_unreadable_frame(&self) -> bool {
        matches!(self, Self::UnknownIntent(_) | Self::UnknownState(_))
    }
}
