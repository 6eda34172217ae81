//! Event processing runtime
//!
//! Resolves every inbound event to a scope, takes the scope lock, checks
//! access and intent freshness, then hands the event to a fresh
//! [`DialogManager`]. Background updates re-enter through the same path via
//! the notification channel.

#[cfg(test)]
pub mod testing;

use crate::access::{DefaultAccessValidator, StackAccessValidator};
use crate::config::DialogConfig;
use crate::dialog::DialogRegistry;
use crate::error::{DialogError, DialogResult};
use crate::event::{decode_callback, Chat, EventPayload, InboundEvent};
use crate::manager::{load_top, BackgroundManager, DialogManager};
use crate::reconcile::MessageTransport;
use crate::store::{
    Context, DialogStore, KeyValueStorage, ScopeId, ScopeLocks, SqliteStorage, Stack,
    DEFAULT_STACK_ID,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;

/// Runtime backed by the bundled SQLite storage
pub type SqliteRuntime<T> = DialogRuntime<SqliteStorage, T>;

/// What happened to an inbound event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Dispatched to the manager
    Handled,
    /// Rejected by the access validator; no state was touched
    Denied,
    /// Aimed at an intent that is no longer on top; no state was touched
    Outdated,
    /// Nothing in the scope claimed the event
    Ignored,
}

/// State shared between the runtime and the managers it creates
pub(crate) struct RuntimeShared<S, T> {
    pub(crate) config: DialogConfig,
    pub(crate) registry: DialogRegistry,
    pub(crate) store: DialogStore<S>,
    pub(crate) transport: T,
    pub(crate) validator: Arc<dyn StackAccessValidator>,
    pub(crate) locks: ScopeLocks,
    pub(crate) middleware_data: Map<String, Value>,
    pub(crate) background_tx: mpsc::Sender<InboundEvent>,
}

enum Resolution {
    Target {
        stack_id: String,
        intent_id: Option<String>,
    },
    /// Referenced intent no longer exists
    Outdated(String),
}

struct OpenScope {
    scope: ScopeId,
    stack: Stack,
    current: Option<Context>,
    /// Frames were dropped while loading and the stack is not saved yet
    healed: bool,
    guard: OwnedMutexGuard<()>,
}

pub struct DialogRuntimeBuilder<S, T> {
    registry: DialogRegistry,
    storage: S,
    transport: T,
    config: DialogConfig,
    validator: Arc<dyn StackAccessValidator>,
    middleware_data: Map<String, Value>,
}

impl<S, T> DialogRuntimeBuilder<S, T>
where
    S: KeyValueStorage + 'static,
    T: MessageTransport + 'static,
{
    pub fn config(mut self, config: DialogConfig) -> Self {
        self.config = config;
        self
    }

    pub fn validator(mut self, validator: impl StackAccessValidator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Data exposed to every render and handler under `middleware_data`
    pub fn middleware_data(mut self, data: Map<String, Value>) -> Self {
        self.middleware_data = data;
        self
    }

    pub fn build(self) -> DialogRuntime<S, T> {
        let (background_tx, background_rx) = mpsc::channel(self.config.event_buffer);
        tracing::info!(
            bot_id = self.config.bot_id,
            dialogs = self.registry.len(),
            max_stack_depth = self.config.max_stack_depth,
            "Dialog runtime created"
        );
        DialogRuntime {
            shared: Arc::new(RuntimeShared {
                store: DialogStore::new(self.storage, self.config.bot_id),
                config: self.config,
                registry: self.registry,
                transport: self.transport,
                validator: self.validator,
                locks: ScopeLocks::new(),
                middleware_data: self.middleware_data,
                background_tx,
            }),
            background_rx: RwLock::new(Some(background_rx)),
        }
    }
}

/// Entry point for inbound events
pub struct DialogRuntime<S, T> {
    shared: Arc<RuntimeShared<S, T>>,
    background_rx: RwLock<Option<mpsc::Receiver<InboundEvent>>>,
}

impl<S, T> DialogRuntime<S, T>
where
    S: KeyValueStorage + 'static,
    T: MessageTransport + 'static,
{
    pub fn builder(registry: DialogRegistry, storage: S, transport: T) -> DialogRuntimeBuilder<S, T> {
        DialogRuntimeBuilder {
            registry,
            storage,
            transport,
            config: DialogConfig::default(),
            validator: Arc::new(DefaultAccessValidator),
            middleware_data: Map::new(),
        }
    }

    pub fn config(&self) -> &DialogConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &DialogRegistry {
        &self.shared.registry
    }

    pub fn store(&self) -> &DialogStore<S> {
        &self.shared.store
    }

    /// Background handle aimed at the default stack of `user_id` in `chat`
    pub fn background(&self, chat: Chat, user_id: i64) -> BackgroundManager {
        BackgroundManager::new(
            self.shared.background_tx.clone(),
            chat,
            user_id,
            Some(DEFAULT_STACK_ID.to_string()),
            None,
        )
    }

    /// Process one inbound event to completion
    ///
    /// Navigation errors are returned after whatever was applied before the
    /// failure has been committed.
    pub async fn process(&self, event: InboundEvent) -> DialogResult<EventOutcome> {
        let (stack_id, intent_id) = match self.resolve_target(&event).await? {
            Resolution::Target {
                stack_id,
                intent_id,
            } => (stack_id, intent_id),
            Resolution::Outdated(intent_id) => {
                tracing::info!(chat_id = event.chat.id, intent_id = %intent_id, "Event references a closed intent");
                return Ok(EventOutcome::Outdated);
            }
        };

        let mut opened = self.open_scope(&event, stack_id).await?;
        if !self.shared.validator.is_allowed(
            &opened.stack,
            opened.current.as_ref(),
            &event,
            event.user_id,
        ) {
            tracing::warn!(
                chat_id = event.chat.id,
                user_id = event.user_id,
                stack_id = %opened.stack.id,
                "Access denied"
            );
            return Ok(EventOutcome::Denied);
        }
        self.save_healed(&mut opened).await?;
        if let Some(intent_id) = &intent_id {
            if opened.stack.top() != Some(intent_id.as_str()) {
                tracing::info!(
                    stack_id = %opened.stack.id,
                    intent_id = %intent_id,
                    top = ?opened.stack.top(),
                    "Event references an outdated intent"
                );
                return Ok(EventOutcome::Outdated);
            }
        }

        let mut manager = DialogManager::new(
            Arc::clone(&self.shared),
            event.clone(),
            opened.scope,
            opened.stack,
            opened.current,
            Some(opened.guard),
        );
        let outcome = Self::dispatch(&mut manager, event.payload).await;
        // Commit even after a failed command so partial progress is kept
        let closed = manager.close().await;
        let outcome = outcome?;
        closed?;
        Ok(outcome)
    }

    async fn dispatch(
        manager: &mut DialogManager<S, T>,
        payload: EventPayload,
    ) -> DialogResult<EventOutcome> {
        let handled = match payload {
            EventPayload::Callback { data, .. } => {
                if !manager.has_context() {
                    return Ok(EventOutcome::Ignored);
                }
                let (_, payload) = decode_callback(&data);
                manager.handle_callback(payload).await?
            }
            EventPayload::TextMessage { text, .. } => manager.handle_text(&text).await?,
            EventPayload::Background(update) => {
                manager.handle_background(update).await?;
                true
            }
        };
        Ok(if handled {
            EventOutcome::Handled
        } else {
            EventOutcome::Ignored
        })
    }

    /// Manager for application code handling `event` itself, such as a
    /// command that starts the first dialog
    ///
    /// The access validator is not consulted. The caller must
    /// [`close`](DialogManager::close) the manager to persist its changes.
    pub async fn manager(&self, event: InboundEvent) -> DialogResult<DialogManager<S, T>> {
        let (stack_id, intent_id) = match self.resolve_target(&event).await? {
            Resolution::Target {
                stack_id,
                intent_id,
            } => (stack_id, intent_id),
            Resolution::Outdated(intent_id) => {
                return Err(DialogError::OutdatedIntent {
                    intent_id,
                    top: None,
                })
            }
        };
        let mut opened = self.open_scope(&event, stack_id).await?;
        self.save_healed(&mut opened).await?;
        if let Some(intent_id) = intent_id {
            if opened.stack.top() != Some(intent_id.as_str()) {
                return Err(DialogError::OutdatedIntent {
                    intent_id,
                    top: opened.stack.top().map(str::to_string),
                });
            }
        }
        Ok(DialogManager::new(
            Arc::clone(&self.shared),
            event,
            opened.scope,
            opened.stack,
            opened.current,
            Some(opened.guard),
        ))
    }

    /// Work out which stack (and intent) an event is aimed at
    async fn resolve_target(&self, event: &InboundEvent) -> DialogResult<Resolution> {
        let chat_id = event.chat.id;
        match &event.payload {
            EventPayload::TextMessage { stack_hint, .. } => Ok(Resolution::Target {
                stack_id: stack_hint
                    .clone()
                    .unwrap_or_else(|| DEFAULT_STACK_ID.to_string()),
                intent_id: None,
            }),
            EventPayload::Callback { data, stack_hint } => {
                let fallback = stack_hint
                    .clone()
                    .unwrap_or_else(|| DEFAULT_STACK_ID.to_string());
                match decode_callback(data) {
                    (Some(intent_id), _) => self.resolve_intent(chat_id, intent_id, fallback).await,
                    (None, _) => Ok(Resolution::Target {
                        stack_id: fallback,
                        intent_id: None,
                    }),
                }
            }
            EventPayload::Background(update) => match (&update.intent_id, &update.stack_id) {
                (Some(intent_id), fallback) => {
                    let fallback = fallback
                        .clone()
                        .unwrap_or_else(|| DEFAULT_STACK_ID.to_string());
                    self.resolve_intent(chat_id, intent_id, fallback).await
                }
                (None, Some(stack_id)) => Ok(Resolution::Target {
                    stack_id: stack_id.clone(),
                    intent_id: None,
                }),
                (None, None) => Err(DialogError::InvalidScopeReference),
            },
        }
    }

    async fn resolve_intent(
        &self,
        chat_id: i64,
        intent_id: &str,
        fallback_stack: String,
    ) -> DialogResult<Resolution> {
        match self.shared.store.load_context(chat_id, intent_id).await {
            Ok(context) => Ok(Resolution::Target {
                stack_id: context.stack_id,
                intent_id: Some(intent_id.to_string()),
            }),
            Err(DialogError::UnknownIntent(id)) => Ok(Resolution::Outdated(id)),
            // Unreadable record: open the fallback stack and let healing drop it
            Err(DialogError::UnknownState(_)) => Ok(Resolution::Target {
                stack_id: fallback_stack,
                intent_id: Some(intent_id.to_string()),
            }),
            Err(e) => Err(e),
        }
    }

    /// Lock the scope and load its stack, healing unreadable frames
    async fn open_scope(&self, event: &InboundEvent, stack_id: String) -> DialogResult<OpenScope> {
        let shared = &self.shared;
        let scope = ScopeId::new(event.chat.id, event.user_id, stack_id);
        let lock_key = scope.stack_key(shared.store.bot_id()).to_string();
        let guard = shared.locks.acquire(&lock_key).await;

        let mut stack = shared.store.load_stack(&scope).await?;
        let (current, healed) =
            load_top(&shared.store, &shared.registry, scope.chat_id, &mut stack).await?;
        if healed {
            tracing::info!(stack_id = %stack.id, depth = stack.len(), "Stack healed");
        }
        Ok(OpenScope {
            scope,
            stack,
            current,
            healed,
            guard,
        })
    }

    /// Persist frames dropped by [`open_scope`](Self::open_scope)
    async fn save_healed(&self, opened: &mut OpenScope) -> DialogResult<()> {
        if !opened.healed {
            return Ok(());
        }
        let store = &self.shared.store;
        if opened.stack.is_empty() && opened.stack.sent_messages.is_empty() {
            store.remove_stack(&opened.scope).await?;
        } else {
            store.save_stack(&opened.scope, &opened.stack).await?;
        }
        opened.healed = false;
        Ok(())
    }

    async fn process_logged(&self, event: InboundEvent) {
        let chat_id = event.chat.id;
        match self.process(event).await {
            Ok(outcome) => tracing::debug!(chat_id, outcome = ?outcome, "Background update processed"),
            Err(e) => tracing::error!(chat_id, error = %e, "Background update failed"),
        }
    }

    /// Apply every queued background update; returns how many were processed
    ///
    /// Does nothing once the background handler owns the channel.
    pub async fn process_pending(&self) -> usize {
        let mut rx = self.background_rx.write().await;
        let Some(rx) = rx.as_mut() else {
            return 0;
        };
        let mut processed = 0;
        while let Ok(event) = rx.try_recv() {
            self.process_logged(event).await;
            processed += 1;
        }
        processed
    }

    /// Apply background updates as they arrive
    ///
    /// Returns immediately when another handler already owns the channel.
    pub async fn run(&self) {
        let Some(rx) = self.background_rx.write().await.take() else {
            tracing::warn!("Background channel already taken");
            return;
        };
        self.drain(rx).await;
    }

    /// Start a task running [`run`](Self::run)
    ///
    /// Must be called at most once; later calls return `None`.
    pub async fn start_background_handler(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let rx = self.background_rx.write().await.take()?;
        let runtime = Arc::clone(self);
        Some(tokio::spawn(async move { runtime.drain(rx).await }))
    }

    async fn drain(&self, mut rx: mpsc::Receiver<InboundEvent>) {
        while let Some(event) = rx.recv().await {
            self.process_logged(event).await;
        }
        tracing::info!("Background handler stopped");
    }
}

impl<T> SqliteRuntime<T>
where
    T: MessageTransport + 'static,
{
    /// Runtime storing state at `config.db_path`, or in an in-memory
    /// database when no path is configured
    pub fn sqlite(
        registry: DialogRegistry,
        transport: T,
        config: DialogConfig,
    ) -> DialogResult<Self> {
        let storage = match &config.db_path {
            Some(path) => SqliteStorage::open(path)?,
            None => SqliteStorage::open_in_memory()?,
        };
        Ok(Self::builder(registry, storage, transport)
            .config(config)
            .build())
    }
}
