//! Mock implementations for testing
//!
//! These mocks enable integration testing without a real chat provider.

use super::DialogRuntime;
use crate::config::DialogConfig;
use crate::dialog::{Dialog, DialogRegistry};
use crate::message::{ButtonAction, Markup, RenderedMessage, SentMessageRecord};
use crate::reconcile::{EditKind, MessageTransport, TransportError};
use crate::store::MemoryStorage;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// Route `tracing` output through the test harness; `RUST_LOG` selects levels
#[allow(dead_code)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Mock Transport
// ============================================================================

/// One provider call seen by [`MockTransport`], failed calls included
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Send { chat_id: i64, text: String },
    Edit { message_id: i64, kind: EditKind, text: String },
    Delete { message_id: i64 },
    ClearMarkup { message_id: i64 },
}

/// Transport that records calls and fails on demand
#[allow(dead_code)]
pub struct MockTransport {
    next_message_id: AtomicI64,
    calls: Mutex<Vec<TransportCall>>,
    sent: Mutex<Vec<RenderedMessage>>,
    /// Content of the most recently sent or edited message
    last_rendered: Mutex<Option<RenderedMessage>>,
    send_failures: Mutex<VecDeque<TransportError>>,
    edit_failures: Mutex<VecDeque<TransportError>>,
    delete_failures: Mutex<VecDeque<TransportError>>,
    clear_failures: Mutex<VecDeque<TransportError>>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self {
            next_message_id: AtomicI64::new(1),
            calls: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            last_rendered: Mutex::new(None),
            send_failures: Mutex::new(VecDeque::new()),
            edit_failures: Mutex::new(VecDeque::new()),
            delete_failures: Mutex::new(VecDeque::new()),
            clear_failures: Mutex::new(VecDeque::new()),
        }
    }

    pub fn fail_next_send(&self, error: TransportError) {
        self.send_failures.lock().unwrap().push_back(error);
    }

    pub fn fail_next_edit(&self, error: TransportError) {
        self.edit_failures.lock().unwrap().push_back(error);
    }

    pub fn fail_next_delete(&self, error: TransportError) {
        self.delete_failures.lock().unwrap().push_back(error);
    }

    pub fn fail_next_clear_markup(&self, error: TransportError) {
        self.clear_failures.lock().unwrap().push_back(error);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Messages delivered by successful sends
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last_sent(&self) -> Option<RenderedMessage> {
        self.sent.lock().unwrap().last().cloned()
    }

    pub fn last_rendered(&self) -> Option<RenderedMessage> {
        self.last_rendered.lock().unwrap().clone()
    }

    /// Callback data of the inline button labeled `text` on the latest screen
    pub fn button_data(&self, text: &str) -> Option<String> {
        let message = self.last_rendered()?;
        let Markup::InlineKeyboard { rows } = message.markup else {
            return None;
        };
        rows.into_iter()
            .flatten()
            .find(|button| button.text == text)
            .and_then(|button| match button.action {
                ButtonAction::Callback(data) => Some(data),
                ButtonAction::Url(_) => None,
            })
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn pop_failure(queue: &Mutex<VecDeque<TransportError>>) -> Option<TransportError> {
        queue.lock().unwrap().pop_front()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageTransport for MockTransport {
    async fn send(&self, message: &RenderedMessage) -> Result<SentMessageRecord, TransportError> {
        self.record(TransportCall::Send {
            chat_id: message.chat_id,
            text: message.text.clone(),
        });
        if let Some(error) = Self::pop_failure(&self.send_failures) {
            return Err(error);
        }
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(message.clone());
        *self.last_rendered.lock().unwrap() = Some(message.clone());
        Ok(SentMessageRecord::for_message(message_id, message))
    }

    async fn edit(
        &self,
        previous: &SentMessageRecord,
        message: &RenderedMessage,
        kind: EditKind,
    ) -> Result<SentMessageRecord, TransportError> {
        self.record(TransportCall::Edit {
            message_id: previous.message_id,
            kind,
            text: message.text.clone(),
        });
        if let Some(error) = Self::pop_failure(&self.edit_failures) {
            return Err(error);
        }
        *self.last_rendered.lock().unwrap() = Some(message.clone());
        Ok(SentMessageRecord::for_message(previous.message_id, message))
    }

    async fn delete(&self, previous: &SentMessageRecord) -> Result<(), TransportError> {
        self.record(TransportCall::Delete {
            message_id: previous.message_id,
        });
        match Self::pop_failure(&self.delete_failures) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn clear_markup(&self, previous: &SentMessageRecord) -> Result<(), TransportError> {
        self.record(TransportCall::ClearMarkup {
            message_id: previous.message_id,
        });
        match Self::pop_failure(&self.clear_failures) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Test Runtime Builder
// ============================================================================

pub type TestDialogRuntime = DialogRuntime<MemoryStorage, Arc<MockTransport>>;

/// Builds a runtime over in-memory storage and a [`MockTransport`]
pub struct TestRuntime {
    registry: DialogRegistry,
    config: DialogConfig,
    middleware_data: Map<String, Value>,
}

#[allow(dead_code)]
impl TestRuntime {
    pub fn new() -> Self {
        Self {
            registry: DialogRegistry::new(),
            config: DialogConfig::default().with_bot_id(1),
            middleware_data: Map::new(),
        }
    }

    pub fn with_dialog(mut self, dialog: Dialog) -> Self {
        self.registry
            .register(dialog)
            .expect("test dialog should be valid");
        self
    }

    pub fn max_stack_depth(mut self, depth: usize) -> Self {
        self.config = self.config.with_max_stack_depth(depth);
        self
    }

    pub fn middleware_data(mut self, data: Map<String, Value>) -> Self {
        self.middleware_data = data;
        self
    }

    pub fn build(self) -> (Arc<TestDialogRuntime>, Arc<MockTransport>) {
        init_test_tracing();
        let transport = Arc::new(MockTransport::new());
        let runtime = DialogRuntime::builder(self.registry, MemoryStorage::new(), Arc::clone(&transport))
            .config(self.config)
            .middleware_data(self.middleware_data)
            .build();
        (Arc::new(runtime), transport)
    }
}

impl Default for TestRuntime {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Integration Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::{ShowMode, StartMode, State, Window};
    use crate::error::DialogError;
    use crate::event::{BackgroundUpdate, Chat, InboundEvent};
    use crate::manager::NavCommand;
    use crate::runtime::{EventOutcome, SqliteRuntime};
    use crate::store::{AccessSettings, Context, ScopeId, SqliteStorage};
    use crate::widgets::{Action, Button, Counter, KeyboardNode, MessageInput, TextNode};
    use serde_json::json;
    use std::time::Duration;

    fn main_state(name: &str) -> State {
        State::new("Main", name)
    }

    fn wizard() -> Dialog {
        let window = |name: &str| {
            Window::new(main_state(name))
                .text(format!("step {name}"))
                .keyboard(KeyboardNode::row([
                    Button::new("back", "Back", Action::Back).into(),
                    Button::new("next", "Next", Action::Next).into(),
                ]))
        };
        Dialog::new("Main")
            .window(window("a"))
            .window(window("b"))
            .window(window("c"))
    }

    fn child() -> Dialog {
        Dialog::new("Child").window(
            Window::new(State::new("Child", "ask"))
                .text("child")
                .keyboard(Button::new("ok", "Ok", Action::Done(json!("ok")))),
        )
    }

    fn text_event(user_id: i64, text: &str) -> InboundEvent {
        InboundEvent::text(Chat::private(user_id), user_id, text)
    }

    fn click(chat: Chat, user_id: i64, data: String) -> InboundEvent {
        InboundEvent::callback(chat, user_id, data)
    }

    async fn start_main(runtime: &TestDialogRuntime, user_id: i64) {
        let mut manager = runtime.manager(text_event(user_id, "/start")).await.unwrap();
        manager
            .start(main_state("a"), Value::Null, StartMode::Normal)
            .await
            .unwrap();
        manager.close().await.unwrap();
    }

    async fn current_state(runtime: &TestDialogRuntime, user_id: i64) -> Option<State> {
        let manager = runtime.manager(text_event(user_id, "peek")).await.unwrap();
        manager.current_state().cloned()
    }

    #[tokio::test]
    async fn test_callback_navigates_and_edits() {
        let (runtime, transport) = TestRuntime::new().with_dialog(wizard()).build();
        start_main(&runtime, 1).await;

        let data = transport.button_data("Next").unwrap();
        let outcome = runtime
            .process(click(Chat::private(1), 1, data))
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::Handled);
        assert_eq!(current_state(&runtime, 1).await, Some(main_state("b")));

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(
            &calls[1],
            TransportCall::Edit { kind: EditKind::Text, text, .. } if text == "step b"
        ));
    }

    #[tokio::test]
    async fn test_outdated_callback_is_rejected_without_mutation() {
        let (runtime, transport) = TestRuntime::new()
            .with_dialog(wizard())
            .with_dialog(child())
            .build();
        start_main(&runtime, 1).await;
        let stale = transport.button_data("Next").unwrap();

        let mut manager = runtime.manager(text_event(1, "/child")).await.unwrap();
        manager
            .start(State::new("Child", "ask"), Value::Null, StartMode::Normal)
            .await
            .unwrap();
        manager.close().await.unwrap();

        let scope = ScopeId::new(1, 1, "");
        let before = runtime.store().load_stack(&scope).await.unwrap();
        let calls_before = transport.calls().len();

        let outcome = runtime
            .process(click(Chat::private(1), 1, stale.clone()))
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::Outdated);
        assert_eq!(runtime.store().load_stack(&scope).await.unwrap(), before);
        assert_eq!(transport.calls().len(), calls_before);

        // The same answer for app code asking for a manager
        assert!(matches!(
            runtime.manager(click(Chat::private(1), 1, stale)).await,
            Err(DialogError::OutdatedIntent { .. })
        ));
    }

    #[tokio::test]
    async fn test_callback_for_closed_intent_is_outdated() {
        let (runtime, transport) = TestRuntime::new()
            .with_dialog(wizard())
            .with_dialog(child())
            .build();
        start_main(&runtime, 1).await;
        let mut manager = runtime.manager(text_event(1, "/child")).await.unwrap();
        manager
            .start(State::new("Child", "ask"), Value::Null, StartMode::Normal)
            .await
            .unwrap();
        manager.close().await.unwrap();

        let ok = transport.button_data("Ok").unwrap();
        assert_eq!(
            runtime.process(click(Chat::private(1), 1, ok.clone())).await.unwrap(),
            EventOutcome::Handled
        );
        assert_eq!(current_state(&runtime, 1).await, Some(main_state("a")));
        assert_eq!(
            runtime.process(click(Chat::private(1), 1, ok)).await.unwrap(),
            EventOutcome::Outdated
        );
    }

    #[tokio::test]
    async fn test_shared_stack_denies_unlisted_principal() {
        let (runtime, transport) = TestRuntime::new().with_dialog(wizard()).build();
        let group = Chat::group(-100);
        let update = BackgroundUpdate {
            action: NavCommand::Start {
                state: main_state("a"),
                data: Value::Null,
                mode: StartMode::Normal,
                access: Some(AccessSettings::new(vec![1])),
            },
            stack_id: Some("shared".into()),
            intent_id: None,
            show_mode: ShowMode::Auto,
        };
        let outcome = runtime
            .process(InboundEvent::background(group, 1, update))
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::Handled);

        let data = transport.button_data("Next").unwrap();
        let calls_before = transport.calls().len();
        let denied = runtime.process(click(group, 2, data.clone())).await.unwrap();
        assert_eq!(denied, EventOutcome::Denied);
        assert_eq!(transport.calls().len(), calls_before);

        let allowed = runtime.process(click(group, 1, data)).await.unwrap();
        assert_eq!(allowed, EventOutcome::Handled);
        let stack = runtime
            .store()
            .load_stack(&ScopeId::new(-100, 2, "shared"))
            .await
            .unwrap();
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.owner_id, Some(1));
    }

    async fn start_shared(runtime: &TestDialogRuntime, user_id: i64, state: State, user_ids: Vec<i64>) {
        let update = BackgroundUpdate {
            action: NavCommand::Start {
                state,
                data: Value::Null,
                mode: StartMode::Normal,
                access: Some(AccessSettings::new(user_ids)),
            },
            stack_id: Some("shared".into()),
            intent_id: None,
            show_mode: ShowMode::Auto,
        };
        let outcome = runtime
            .process(InboundEvent::background(Chat::group(-100), user_id, update))
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::Handled);
    }

    #[tokio::test]
    async fn test_denied_principal_leaves_unreadable_frame_in_storage() {
        let (runtime, _transport) = TestRuntime::new()
            .with_dialog(wizard())
            .with_dialog(child())
            .build();
        start_shared(&runtime, 1, main_state("a"), vec![1]).await;
        start_shared(&runtime, 1, State::new("Child", "ask"), vec![1]).await;
        let scope = ScopeId::new(-100, 1, "shared");
        let top = runtime.store().load_stack(&scope).await.unwrap().top().unwrap().to_string();
        let orphan = Context::new(top, "shared", State::new("Removed", "gone"), Value::Null);
        runtime.store().save_context(-100, &orphan).await.unwrap();

        let denied = runtime
            .process(InboundEvent::text(Chat::group(-100), 2, "hi").with_stack_hint("shared"))
            .await
            .unwrap();
        assert_eq!(denied, EventOutcome::Denied);
        assert_eq!(runtime.store().load_stack(&scope).await.unwrap().len(), 2);

        let allowed = runtime
            .process(InboundEvent::text(Chat::group(-100), 1, "hi").with_stack_hint("shared"))
            .await
            .unwrap();
        assert_eq!(allowed, EventOutcome::Ignored);
        assert_eq!(runtime.store().load_stack(&scope).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_text_reaches_input_on_shared_stack() {
        let dialog = Dialog::new("Main")
            .window(
                Window::new(main_state("name"))
                    .text("Team name?")
                    .input(MessageInput::new(|ctx, text| {
                        ctx.dialog_data_mut().insert("name".into(), json!(text));
                        ctx.next();
                        Ok(())
                    })),
            )
            .window(Window::new(main_state("hello")).text(TextNode::format("Team {dialog_data.name}")));
        let (runtime, transport) = TestRuntime::new().with_dialog(dialog).build();
        start_shared(&runtime, 1, main_state("name"), vec![1, 2]).await;

        // Without a hint the text goes to the sender's empty default stack
        let outcome = runtime
            .process(InboundEvent::text(Chat::group(-100), 2, "Owls"))
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::Ignored);

        let outcome = runtime
            .process(InboundEvent::text(Chat::group(-100), 2, "Owls").with_stack_hint("shared"))
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::Handled);
        let stack = runtime
            .store()
            .load_stack(&ScopeId::new(-100, 2, "shared"))
            .await
            .unwrap();
        let top = runtime
            .store()
            .load_context(-100, stack.top().unwrap())
            .await
            .unwrap();
        assert_eq!(top.state, main_state("hello"));
        // Shared stacks in groups edit their screen in place
        assert!(matches!(
            transport.calls().last(),
            Some(TransportCall::Edit { text, .. }) if text == "Team Owls"
        ));
    }

    #[tokio::test]
    async fn test_new_stack_start_is_delivered_through_channel() {
        let (runtime, transport) = TestRuntime::new().with_dialog(wizard()).build();
        let mut manager = runtime.manager(text_event(1, "/start")).await.unwrap();
        manager
            .start(main_state("a"), Value::Null, StartMode::NewStack)
            .await
            .unwrap();
        assert!(manager.stack().is_empty());
        manager.close().await.unwrap();
        assert_eq!(transport.sent_count(), 0);

        assert_eq!(runtime.process_pending().await, 1);
        assert_eq!(transport.sent_count(), 1);
        // The default stack stays untouched
        assert_eq!(current_state(&runtime, 1).await, None);
    }

    #[tokio::test]
    async fn test_background_handler_applies_updates() {
        let (runtime, transport) = TestRuntime::new().with_dialog(wizard()).build();
        let handler = runtime.start_background_handler().await.unwrap();
        assert!(runtime.start_background_handler().await.is_none());

        runtime
            .background(Chat::private(1), 1)
            .start(main_state("a"), Value::Null, StartMode::Normal)
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while transport.sent_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(current_state(&runtime, 1).await, Some(main_state("a")));
        handler.abort();
    }

    #[tokio::test]
    async fn test_background_handle_for_other_stack_and_stale_intent() {
        let (runtime, transport) = TestRuntime::new().with_dialog(wizard()).build();
        let shared = runtime.background(Chat::group(-100), 1).for_stack("shared");
        shared
            .start(main_state("a"), Value::Null, StartMode::Normal)
            .await
            .unwrap();
        assert_eq!(runtime.process_pending().await, 1);
        let scope = ScopeId::new(-100, 1, "shared");
        let stack = runtime.store().load_stack(&scope).await.unwrap();
        assert_eq!(stack.len(), 1);
        let first_top = stack.top().unwrap().to_string();

        shared
            .start(main_state("b"), Value::Null, StartMode::Normal)
            .await
            .unwrap();
        assert_eq!(runtime.process_pending().await, 1);
        assert_eq!(runtime.store().load_stack(&scope).await.unwrap().len(), 2);

        // The first intent is no longer on top, so its update is dropped
        let calls_before = transport.calls().len();
        shared.for_intent(first_top).done(Value::Null).await.unwrap();
        assert_eq!(runtime.process_pending().await, 1);
        assert_eq!(runtime.store().load_stack(&scope).await.unwrap().len(), 2);
        assert_eq!(transport.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn test_background_without_target_is_invalid() {
        let (runtime, _transport) = TestRuntime::new().with_dialog(wizard()).build();
        let update = BackgroundUpdate {
            action: NavCommand::Next,
            stack_id: None,
            intent_id: None,
            show_mode: ShowMode::Auto,
        };
        let err = runtime
            .process(InboundEvent::background(Chat::private(1), 1, update))
            .await
            .unwrap_err();
        assert!(matches!(err, DialogError::InvalidScopeReference));
    }

    #[tokio::test]
    async fn test_unreadable_top_frame_is_dropped() {
        let (runtime, _transport) = TestRuntime::new()
            .with_dialog(wizard())
            .with_dialog(child())
            .build();
        start_main(&runtime, 1).await;
        let mut manager = runtime.manager(text_event(1, "/child")).await.unwrap();
        manager
            .start(State::new("Child", "ask"), Value::Null, StartMode::Normal)
            .await
            .unwrap();
        let top = manager.current_context().unwrap().id.clone();
        manager.close().await.unwrap();

        // A state no registered dialog declares any more
        let orphan = Context::new(top, "", State::new("Removed", "gone"), Value::Null);
        runtime.store().save_context(1, &orphan).await.unwrap();

        let manager = runtime.manager(text_event(1, "hi")).await.unwrap();
        assert_eq!(manager.stack().len(), 1);
        assert_eq!(manager.current_state(), Some(&main_state("a")));
        drop(manager);

        let stored = runtime.store().load_stack(&ScopeId::new(1, 1, "")).await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_text_goes_to_input_widget() {
        let dialog = Dialog::new("Main")
            .window(
                Window::new(main_state("name"))
                    .text("What is your name?")
                    .input(MessageInput::new(|ctx, text| {
                        ctx.dialog_data_mut().insert("name".into(), json!(text));
                        ctx.next();
                        Ok(())
                    })),
            )
            .window(Window::new(main_state("hello")).text(TextNode::format("Hello, {dialog_data.name}")));
        let (runtime, transport) = TestRuntime::new().with_dialog(dialog).build();
        let mut manager = runtime.manager(text_event(1, "/start")).await.unwrap();
        manager
            .start(main_state("name"), Value::Null, StartMode::Normal)
            .await
            .unwrap();
        manager.close().await.unwrap();

        let outcome = runtime.process(text_event(1, "Ada")).await.unwrap();
        assert_eq!(outcome, EventOutcome::Handled);
        assert_eq!(current_state(&runtime, 1).await, Some(main_state("hello")));
        // Text in a private default stack sends a fresh message
        assert_eq!(transport.sent_count(), 2);
        assert_eq!(transport.last_sent().unwrap().text, "Hello, Ada");
    }

    #[tokio::test]
    async fn test_text_without_dialog_is_ignored() {
        let (runtime, transport) = TestRuntime::new().with_dialog(wizard()).build();
        let outcome = runtime.process(text_event(1, "hello")).await.unwrap();
        assert_eq!(outcome, EventOutcome::Ignored);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_counter_state_survives_events() {
        let dialog = Dialog::new("Main").window(
            Window::new(main_state("count"))
                .text("Pick a number")
                .keyboard(Counter::new("qty").range(0, 3)),
        );
        let (runtime, transport) = TestRuntime::new().with_dialog(dialog).build();
        let mut manager = runtime.manager(text_event(1, "/start")).await.unwrap();
        manager
            .start(main_state("count"), Value::Null, StartMode::Normal)
            .await
            .unwrap();
        manager.close().await.unwrap();

        for _ in 0..5 {
            let plus = transport.button_data("+").unwrap();
            runtime.process(click(Chat::private(1), 1, plus)).await.unwrap();
        }
        assert!(transport.button_data("3").is_some());

        let manager = runtime.manager(text_event(1, "peek")).await.unwrap();
        let widget_data = &manager.current_context().unwrap().widget_data;
        assert_eq!(widget_data["qty"], json!(3));
    }

    #[tokio::test]
    async fn test_middleware_data_reaches_render() {
        let mut middleware = Map::new();
        middleware.insert("user_name".into(), json!("Grace"));
        let dialog = Dialog::new("Main").window(
            Window::new(main_state("a")).text(TextNode::format("Hi {middleware_data.user_name}")),
        );
        let (runtime, transport) = TestRuntime::new()
            .with_dialog(dialog)
            .middleware_data(middleware)
            .build();
        start_main(&runtime, 1).await;
        assert_eq!(transport.last_sent().unwrap().text, "Hi Grace");
    }

    #[tokio::test]
    async fn test_failed_send_is_reported_not_fatal() {
        let (runtime, transport) = TestRuntime::new().with_dialog(wizard()).build();
        transport.fail_next_send(TransportError::other("network down"));
        let mut manager = runtime.manager(text_event(1, "/start")).await.unwrap();
        manager
            .start(main_state("a"), Value::Null, StartMode::Normal)
            .await
            .unwrap();
        assert_eq!(manager.failures().len(), 1);
        assert!(manager.stack().sent_messages.is_empty());
        manager.close().await.unwrap();
        assert_eq!(current_state(&runtime, 1).await, Some(main_state("a")));
    }

    #[tokio::test]
    async fn test_sqlite_state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dialogs.db");
        let config = DialogConfig {
            db_path: Some(path.clone()),
            ..DialogConfig::default()
        };
        let registry = || DialogRegistry::new().with(wizard()).unwrap();

        {
            let transport = Arc::new(MockTransport::new());
            let runtime =
                SqliteRuntime::sqlite(registry(), Arc::clone(&transport), config.clone()).unwrap();
            let mut manager = runtime.manager(text_event(1, "/start")).await.unwrap();
            manager
                .start(main_state("a"), json!({"from": "sqlite"}), StartMode::Normal)
                .await
                .unwrap();
            manager.next().await.unwrap();
            manager.close().await.unwrap();
        }

        let storage = SqliteStorage::open(&path).unwrap();
        let runtime =
            DialogRuntime::builder(registry(), storage, Arc::new(MockTransport::new())).build();
        let manager = runtime.manager(text_event(1, "peek")).await.unwrap();
        let context = manager.current_context().unwrap();
        assert_eq!(context.state, main_state("b"));
        assert_eq!(context.start_data(), &json!({"from": "sqlite"}));
        assert_eq!(manager.stack().sent_messages.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_events_for_one_scope_are_serialized() {
        let (runtime, transport) = TestRuntime::new().with_dialog(wizard()).build();
        start_main(&runtime, 1).await;
        let data = transport.button_data("Next").unwrap();

        let first = {
            let runtime = Arc::clone(&runtime);
            let data = data.clone();
            tokio::spawn(async move { runtime.process(click(Chat::private(1), 1, data)).await })
        };
        let second = {
            let runtime = Arc::clone(&runtime);
            tokio::spawn(async move { runtime.process(click(Chat::private(1), 1, data)).await })
        };
        // Same intent both times: each press is applied in turn
        assert_eq!(first.await.unwrap().unwrap(), EventOutcome::Handled);
        assert_eq!(second.await.unwrap().unwrap(), EventOutcome::Handled);
        assert_eq!(current_state(&runtime, 1).await, Some(main_state("c")));
    }
}
