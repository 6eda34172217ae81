//! Navigation requested from outside the event that owns a scope
//!
//! Requests are serialized into background events and re-enter the runtime
//! through its notification channel, so they are applied by the target
//! scope's single-writer pipeline like any other event.

use super::NavCommand;
use crate::dialog::{ShowMode, StartMode, State};
use crate::error::{DialogError, DialogResult};
use crate::event::{BackgroundUpdate, Chat, InboundEvent};
use serde_json::{Map, Value};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Cloneable handle targeting one stack or intent
#[derive(Debug, Clone)]
pub struct BackgroundManager {
    tx: mpsc::Sender<InboundEvent>,
    chat: Chat,
    user_id: i64,
    stack_id: Option<String>,
    intent_id: Option<String>,
}

impl BackgroundManager {
    pub(crate) fn new(
        tx: mpsc::Sender<InboundEvent>,
        chat: Chat,
        user_id: i64,
        stack_id: Option<String>,
        intent_id: Option<String>,
    ) -> Self {
        Self {
            tx,
            chat,
            user_id,
            stack_id,
            intent_id,
        }
    }

    /// Same principal and chat, aimed at the top of another stack
    pub fn for_stack(&self, stack_id: impl Into<String>) -> Self {
        Self {
            stack_id: Some(stack_id.into()),
            intent_id: None,
            ..self.clone()
        }
    }

    /// Aimed at a specific intent; dropped as outdated if it is no longer on top
    pub fn for_intent(&self, intent_id: impl Into<String>) -> Self {
        Self {
            intent_id: Some(intent_id.into()),
            ..self.clone()
        }
    }

    pub fn stack_id(&self) -> Option<&str> {
        self.stack_id.as_deref()
    }

    pub fn intent_id(&self) -> Option<&str> {
        self.intent_id.as_deref()
    }

    fn event(&self, action: NavCommand, show_mode: ShowMode) -> InboundEvent {
        InboundEvent::background(
            self.chat,
            self.user_id,
            BackgroundUpdate {
                action,
                stack_id: self.stack_id.clone(),
                intent_id: self.intent_id.clone(),
                show_mode,
            },
        )
    }

    /// Enqueue `action`, waiting for channel capacity
    pub async fn notify(&self, action: NavCommand, show_mode: ShowMode) -> DialogResult<()> {
        tracing::debug!(action = action.name(), stack_id = ?self.stack_id, intent_id = ?self.intent_id, "Queueing background update");
        self.tx
            .send(self.event(action, show_mode))
            .await
            .map_err(|_| DialogError::ChannelClosed)
    }

    /// Enqueue `action` without waiting; usable from synchronous handlers
    pub fn try_notify(&self, action: NavCommand, show_mode: ShowMode) -> DialogResult<()> {
        tracing::debug!(action = action.name(), stack_id = ?self.stack_id, intent_id = ?self.intent_id, "Queueing background update");
        self.tx
            .try_send(self.event(action, show_mode))
            .map_err(|e| match e {
                TrySendError::Full(_) => DialogError::BackgroundQueueFull,
                TrySendError::Closed(_) => DialogError::ChannelClosed,
            })
    }

    pub async fn start(&self, state: State, data: Value, mode: StartMode) -> DialogResult<()> {
        let action = NavCommand::Start {
            state,
            data,
            mode,
            access: None,
        };
        self.notify(action, ShowMode::Auto).await
    }

    pub async fn switch_to(&self, state: State) -> DialogResult<()> {
        self.notify(NavCommand::SwitchTo { state }, ShowMode::Auto)
            .await
    }

    pub async fn update(&self, data: Map<String, Value>) -> DialogResult<()> {
        self.notify(NavCommand::Update { data }, ShowMode::Auto).await
    }

    pub async fn done(&self, result: Value) -> DialogResult<()> {
        self.notify(NavCommand::Done { result }, ShowMode::Auto).await
    }
}
