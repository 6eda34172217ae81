//! Navigation manager
//!
//! A manager is built for exactly one inbound event while the scope lock is
//! held. Every operation is turned into a [`NavCommand`] and appended to a
//! queue; the queue is drained in a loop (commands requested by hooks run
//! right after the command that triggered them), and the screen is rendered
//! once at the end. Nothing recurses, so a hook that navigates cannot grow
//! the call stack.
//!
//! After [`DialogManager::close`] the manager refuses every call.

mod action;
mod background;
#[cfg(test)]
mod proptests;

pub use action::{ActionContext, NavCommand, WidgetScope};
pub use background::BackgroundManager;

use crate::dialog::{Dialog, DialogRegistry, LaunchMode, ShowMode, StartMode, State, Window};
use crate::error::{DialogError, DialogResult};
use crate::event::{BackgroundUpdate, InboundEvent};
use crate::message::RenderedMessage;
use crate::reconcile::{clear_screen, deliver_screen, DeliveryFailure, MessageTransport};
use crate::runtime::RuntimeShared;
use crate::store::{
    new_id, AccessSettings, Context, DialogStore, KeyValueStorage, ScopeId, Stack,
};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

/// Render owed at the end of the current operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum PendingRender {
    #[default]
    None,
    Show,
    /// Stack emptied: strip keyboards from the delivered screen
    Cleanup,
}

/// Load the top intent, discarding frames that can no longer be read
///
/// Returns the readable top (if any) and whether frames were dropped.
pub(crate) async fn load_top<S: KeyValueStorage>(
    store: &DialogStore<S>,
    registry: &DialogRegistry,
    chat_id: i64,
    stack: &mut Stack,
) -> DialogResult<(Option<Context>, bool)> {
    let mut healed = false;
    while let Some(top) = stack.top().map(str::to_string) {
        let loaded = match store.load_context(chat_id, &top).await {
            Ok(context) => registry.find_dialog(&context.state).map(|_| context),
            Err(e) => Err(e),
        };
        match loaded {
            Ok(context) => return Ok((Some(context), healed)),
            Err(e) if e.is_unreadable_frame() => {
                tracing::warn!(stack_id = %stack.id, intent_id = %top, error = %e, "Dropping unreadable stack frame");
                stack.pop();
                store.remove_context(chat_id, &top).await?;
                healed = true;
            }
            Err(e) => return Err(e),
        }
    }
    Ok((None, healed))
}

/// Single-use navigation manager for one event in one scope
pub struct DialogManager<S, T> {
    shared: Arc<RuntimeShared<S, T>>,
    event: InboundEvent,
    scope: ScopeId,
    stack: Stack,
    current: Option<Context>,
    show_mode: ShowMode,
    pending: PendingRender,
    queue: VecDeque<NavCommand>,
    failures: Vec<DeliveryFailure>,
    dirty: bool,
    closed: bool,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<S, T> DialogManager<S, T>
where
    S: KeyValueStorage + 'static,
    T: MessageTransport + 'static,
{
    pub(crate) fn new(
        shared: Arc<RuntimeShared<S, T>>,
        event: InboundEvent,
        scope: ScopeId,
        stack: Stack,
        current: Option<Context>,
        guard: Option<OwnedMutexGuard<()>>,
    ) -> Self {
        Self {
            shared,
            event,
            scope,
            stack,
            current,
            show_mode: ShowMode::Auto,
            pending: PendingRender::None,
            queue: VecDeque::new(),
            failures: Vec::new(),
            dirty: false,
            closed: false,
            guard,
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn event(&self) -> &InboundEvent {
        &self.event
    }

    pub fn scope(&self) -> &ScopeId {
        &self.scope
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn current_context(&self) -> Option<&Context> {
        self.current.as_ref()
    }

    pub fn has_context(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_state(&self) -> Option<&State> {
        self.current.as_ref().map(|context| &context.state)
    }

    pub fn show_mode(&self) -> ShowMode {
        self.show_mode
    }

    pub fn set_show_mode(&mut self, mode: ShowMode) -> DialogResult<()> {
        self.ensure_open()?;
        self.show_mode = mode;
        Ok(())
    }

    /// Delivery failures collected during this event
    pub fn failures(&self) -> &[DeliveryFailure] {
        &self.failures
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Handle for navigating this stack after the event is over
    pub fn background(&self) -> BackgroundManager {
        BackgroundManager::new(
            self.shared.background_tx.clone(),
            self.event.chat,
            self.event.user_id,
            Some(self.stack.id.clone()),
            self.current.as_ref().map(|context| context.id.clone()),
        )
    }

    fn chat_id(&self) -> i64 {
        self.scope.chat_id
    }

    fn ensure_open(&self) -> DialogResult<()> {
        if self.closed {
            return Err(DialogError::StaleManager);
        }
        Ok(())
    }

    fn current_dialog(&self) -> DialogResult<Arc<Dialog>> {
        let context = self.current.as_ref().ok_or(DialogError::NoContext)?;
        self.shared
            .registry
            .find_dialog(&context.state)
            .map(Arc::clone)
    }

    fn mark_show(&mut self) {
        self.dirty = true;
        self.pending = PendingRender::Show;
    }

    // ------------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------------

    pub async fn start(&mut self, state: State, data: Value, mode: StartMode) -> DialogResult<()> {
        self.execute_command(NavCommand::Start {
            state,
            data,
            mode,
            access: None,
        })
        .await
    }

    /// Start with access settings; they also become the stack's settings
    /// when the stack was empty
    pub async fn start_with_access(
        &mut self,
        state: State,
        data: Value,
        mode: StartMode,
        access: AccessSettings,
    ) -> DialogResult<()> {
        self.execute_command(NavCommand::Start {
            state,
            data,
            mode,
            access: Some(access),
        })
        .await
    }

    pub async fn switch_to(&mut self, state: State) -> DialogResult<()> {
        self.execute_command(NavCommand::SwitchTo { state }).await
    }

    pub async fn next(&mut self) -> DialogResult<()> {
        self.execute_command(NavCommand::Next).await
    }

    pub async fn back(&mut self) -> DialogResult<()> {
        self.execute_command(NavCommand::Back).await
    }

    pub async fn done(&mut self, result: Value) -> DialogResult<()> {
        self.execute_command(NavCommand::Done { result }).await
    }

    pub async fn update(&mut self, data: Map<String, Value>) -> DialogResult<()> {
        self.execute_command(NavCommand::Update { data }).await
    }

    pub async fn reset_stack(&mut self) -> DialogResult<()> {
        self.execute_command(NavCommand::ResetStack).await
    }

    /// Render the current screen again
    pub async fn show(&mut self) -> DialogResult<()> {
        self.ensure_open()?;
        if self.current.is_some() {
            self.mark_show();
        }
        self.flush_render().await
    }

    /// Queue `command` and run it with everything it triggers
    pub async fn execute_command(&mut self, command: NavCommand) -> DialogResult<()> {
        self.ensure_open()?;
        self.queue.push_back(command);
        self.execute().await
    }

    async fn execute(&mut self) -> DialogResult<()> {
        let mut outcome = Ok(());
        while let Some(command) = self.queue.pop_front() {
            tracing::debug!(action = command.name(), stack_id = %self.stack.id, "Applying navigation command");
            if let Err(e) = self.apply(command).await {
                tracing::warn!(stack_id = %self.stack.id, error = %e, "Navigation command failed");
                self.queue.clear();
                outcome = Err(e);
                break;
            }
        }
        // Whatever was applied before a failure is still shown
        let rendered = self.flush_render().await;
        outcome.and(rendered)
    }

    async fn apply(&mut self, command: NavCommand) -> DialogResult<()> {
        match command {
            NavCommand::Start {
                state,
                data,
                mode,
                access,
            } => self.apply_start(state, data, mode, access).await,
            NavCommand::SwitchTo { state } => self.apply_switch(state),
            NavCommand::Next => {
                let dialog = self.current_dialog()?;
                let target = dialog.next_state(&self.current_required()?.state)?;
                self.apply_switch(target)
            }
            NavCommand::Back => {
                let dialog = self.current_dialog()?;
                let target = dialog.prev_state(&self.current_required()?.state)?;
                self.apply_switch(target)
            }
            NavCommand::Done { result } => self.apply_done(result).await,
            NavCommand::Update { data } => {
                let context = self.current.as_mut().ok_or(DialogError::NoContext)?;
                context.dialog_data.extend(data);
                self.mark_show();
                Ok(())
            }
            NavCommand::ResetStack => {
                self.apply_reset().await?;
                self.pending = PendingRender::Cleanup;
                Ok(())
            }
        }
    }

    fn current_required(&self) -> DialogResult<&Context> {
        self.current.as_ref().ok_or(DialogError::NoContext)
    }

    async fn apply_start(
        &mut self,
        state: State,
        data: Value,
        mode: StartMode,
        access: Option<AccessSettings>,
    ) -> DialogResult<()> {
        let dialog = Arc::clone(self.shared.registry.find_dialog(&state)?);
        match mode {
            StartMode::NewStack => return self.start_new_stack(state, data, access),
            StartMode::ResetStack => self.apply_reset().await?,
            StartMode::Normal => {}
        }

        if self.current.is_some() {
            let current_dialog = self.current_dialog()?;
            if current_dialog.get_launch_mode() == LaunchMode::Exclusive {
                return Err(DialogError::LaunchModeViolation(format!(
                    "cannot start {state} on top of exclusive dialog {}",
                    current_dialog.group()
                )));
            }
            match dialog.get_launch_mode() {
                LaunchMode::Root | LaunchMode::Exclusive => self.apply_reset().await?,
                LaunchMode::SingleTop if current_dialog.group() == dialog.group() => {
                    self.drop_current().await?;
                }
                LaunchMode::SingleTop | LaunchMode::Standard => {}
            }
        }

        self.push(state, data, access).await?;
        if let Some(hook) = dialog.start_hook().cloned() {
            let start_data = self.current_required()?.start_data().clone();
            self.with_action_context(|ctx| hook(ctx, &start_data))?;
        }
        Ok(())
    }

    async fn push(
        &mut self,
        state: State,
        data: Value,
        access: Option<AccessSettings>,
    ) -> DialogResult<()> {
        if let Some(previous) = &self.current {
            self.shared.store.save_context(self.chat_id(), previous).await?;
        }
        let was_empty = self.stack.is_empty();
        let mut context = self
            .stack
            .push(state, data, self.shared.config.max_stack_depth)?;

        if was_empty {
            if let Some(access) = &access {
                self.stack.access_settings = access.clone();
            }
        }
        if self.stack.owner_id.is_none() {
            self.stack.owner_id = Some(self.event.user_id);
        }
        context.access_settings = access;

        tracing::info!(
            stack_id = %self.stack.id,
            intent_id = %context.id,
            state = %context.state,
            depth = self.stack.len(),
            "Dialog started"
        );
        self.current = Some(context);
        self.mark_show();
        Ok(())
    }

    fn start_new_stack(
        &mut self,
        state: State,
        data: Value,
        access: Option<AccessSettings>,
    ) -> DialogResult<()> {
        let stack_id = new_id();
        tracing::info!(stack_id = %stack_id, state = %state, "Starting dialog in a new stack");
        BackgroundManager::new(
            self.shared.background_tx.clone(),
            self.event.chat,
            self.event.user_id,
            Some(stack_id),
            None,
        )
        .try_notify(
            NavCommand::Start {
                state,
                data,
                mode: StartMode::Normal,
                access,
            },
            ShowMode::Auto,
        )
    }

    fn apply_switch(&mut self, state: State) -> DialogResult<()> {
        let registry = &self.shared.registry;
        let context = self.current.as_mut().ok_or(DialogError::NoContext)?;
        if context.state.group() != state.group() {
            return Err(DialogError::StateGroupMismatch {
                current: context.state.group().to_string(),
                target: state.to_string(),
            });
        }
        registry.find_window(&state)?;
        tracing::debug!(intent_id = %context.id, from = %context.state, to = %state, "Switching state");
        context.state = state;
        self.mark_show();
        Ok(())
    }

    async fn apply_done(&mut self, result: Value) -> DialogResult<()> {
        let dialog = self.current_dialog()?;
        if let Some(hook) = dialog.close_hook().cloned() {
            self.with_action_context(|ctx| hook(ctx, &result))?;
        }

        let closed = self.current.take().ok_or(DialogError::NoContext)?;
        self.stack.pop();
        self.shared
            .store
            .remove_context(self.chat_id(), &closed.id)
            .await?;
        self.dirty = true;
        tracing::info!(stack_id = %self.stack.id, intent_id = %closed.id, state = %closed.state, "Dialog done");

        let (top, _) = load_top(
            &self.shared.store,
            &self.shared.registry,
            self.scope.chat_id,
            &mut self.stack,
        )
        .await?;
        self.current = top;
        if self.current.is_none() {
            self.pending = PendingRender::Cleanup;
            return Ok(());
        }

        let parent = self.current_dialog()?;
        if let Some(hook) = parent.result_hook().cloned() {
            let start_data = closed.start_data().clone();
            self.with_action_context(|ctx| hook(ctx, &start_data, &result))?;
        }
        self.mark_show();
        Ok(())
    }

    async fn apply_reset(&mut self) -> DialogResult<()> {
        self.current = None;
        let chat_id = self.chat_id();
        while let Some(intent_id) = self.stack.pop() {
            self.shared.store.remove_context(chat_id, &intent_id).await?;
        }
        tracing::info!(stack_id = %self.stack.id, "Stack reset");
        self.dirty = true;
        Ok(())
    }

    /// Remove the current intent without running hooks
    async fn drop_current(&mut self) -> DialogResult<()> {
        if let Some(context) = self.current.take() {
            self.stack.pop();
            self.shared
                .store
                .remove_context(self.chat_id(), &context.id)
                .await?;
            self.dirty = true;
        }
        Ok(())
    }

    /// Run a hook or handler against the current intent
    ///
    /// Navigation it requests is queued ahead of already pending commands.
    fn with_action_context<R>(
        &mut self,
        f: impl FnOnce(&mut ActionContext<'_>) -> DialogResult<R>,
    ) -> DialogResult<R> {
        let background = self.background();
        let context = self.current.as_mut().ok_or(DialogError::NoContext)?;
        let mut ctx = ActionContext::new(
            context,
            &self.event,
            &self.shared.middleware_data,
            background,
        );
        let result = f(&mut ctx);
        let (commands, show_mode) = ctx.finish();

        for command in commands.into_iter().rev() {
            self.queue.push_front(command);
        }
        if let Some(mode) = show_mode {
            self.show_mode = mode;
        }
        self.dirty = true;
        result
    }

    // ------------------------------------------------------------------------
    // Event dispatch
    // ------------------------------------------------------------------------

    /// Pass a raw callback payload to the current window
    ///
    /// Returns `false` when no widget claimed the payload.
    pub async fn handle_callback(&mut self, payload: &str) -> DialogResult<bool> {
        self.ensure_open()?;
        let dialog = self.current_dialog()?;
        let window = dialog.find_window(&self.current_required()?.state)?;

        let handled = match self.with_action_context(|ctx| window.process_callback(payload, ctx)) {
            Ok(handled) => handled,
            Err(e) => {
                self.queue.clear();
                return Err(e);
            }
        };
        if !handled {
            tracing::debug!(payload, "Callback not claimed by any widget");
            return Ok(false);
        }
        self.mark_show();
        self.execute().await?;
        Ok(true)
    }

    /// Pass a text message to the current window
    ///
    /// A label of the window's reply keyboard is handled as that button's
    /// callback; anything else goes to the input widget.
    pub async fn handle_text(&mut self, text: &str) -> DialogResult<bool> {
        self.ensure_open()?;
        if self.current.is_none() {
            return Ok(false);
        }
        let dialog = self.current_dialog()?;
        let context = self.current_required()?;
        let window = dialog.find_window(&context.state)?;
        let data = self.window_data(&dialog, window, context)?;
        let reply_payload = window.reply_payload(&data, &context.widget_data, text)?;

        let outcome = match &reply_payload {
            Some(payload) => {
                tracing::debug!(label = text, payload = %payload, "Reply keyboard button pressed");
                self.with_action_context(|ctx| window.process_callback(payload, ctx))
            }
            None => self.with_action_context(|ctx| window.process_message(text, ctx)),
        };
        let handled = match outcome {
            Ok(handled) => handled,
            Err(e) => {
                self.queue.clear();
                return Err(e);
            }
        };

        if handled {
            self.mark_show();
            self.execute().await?;
        }

        let media_group_id = self.event.media_group_id().map(str::to_string);
        if self.stack.last_income_media_group_id != media_group_id {
            self.stack.last_income_media_group_id = media_group_id;
            self.dirty = true;
        }
        Ok(handled)
    }

    /// Apply a navigation command delivered through the background channel
    pub async fn handle_background(&mut self, update: BackgroundUpdate) -> DialogResult<()> {
        self.ensure_open()?;
        self.show_mode = update.show_mode;
        self.execute_command(update.action).await
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    fn base_data(&self, context: &Context) -> DialogResult<Map<String, Value>> {
        let event = serde_json::to_value(&self.event)
            .map_err(|e| DialogError::render(format!("event not serializable: {e}")))?;
        let mut data = Map::new();
        data.insert(
            "dialog_data".to_string(),
            Value::Object(context.dialog_data.clone()),
        );
        data.insert("start_data".to_string(), context.start_data().clone());
        data.insert(
            "middleware_data".to_string(),
            Value::Object(self.shared.middleware_data.clone()),
        );
        data.insert("event".to_string(), event);
        Ok(data)
    }

    fn window_data(
        &self,
        dialog: &Dialog,
        window: &Window,
        context: &Context,
    ) -> DialogResult<Map<String, Value>> {
        window.load_data(dialog.load_data(self.base_data(context)?)?)
    }

    /// Render the current screen without delivering it
    pub fn render(&self) -> DialogResult<Vec<RenderedMessage>> {
        self.ensure_open()?;
        let Some(context) = &self.current else {
            return Ok(Vec::new());
        };
        let dialog = self.shared.registry.find_dialog(&context.state)?;
        let window = dialog.find_window(&context.state)?;
        let data = self.window_data(dialog, window, context)?;
        window.render(&data, &context.widget_data, self.event.chat.id, &context.id)
    }

    /// Concrete mode for the next render
    fn resolve_show_mode(&self) -> ShowMode {
        if self.show_mode != ShowMode::Auto {
            return self.show_mode;
        }
        let previous_had_reply_keyboard = self
            .stack
            .last_message()
            .is_some_and(|record| record.has_reply_keyboard);
        let same_media_group = self.event.media_group_id().is_some()
            && self.event.media_group_id() == self.stack.last_income_media_group_id.as_deref();

        if self.event.chat.is_private()
            && !previous_had_reply_keyboard
            && (!self.event.is_text_message() || same_media_group)
        {
            ShowMode::Edit
        } else if previous_had_reply_keyboard {
            ShowMode::DeleteAndSend
        } else if !self.stack.is_default() {
            ShowMode::Edit
        } else {
            ShowMode::Send
        }
    }

    async fn flush_render(&mut self) -> DialogResult<()> {
        let pending = std::mem::take(&mut self.pending);
        if pending != PendingRender::None && self.show_mode == ShowMode::NoUpdate {
            tracing::debug!(stack_id = %self.stack.id, "Render skipped, show mode is no_update");
            return Ok(());
        }
        match pending {
            PendingRender::None => Ok(()),
            PendingRender::Show => self.render_screen().await,
            PendingRender::Cleanup => {
                let failures = clear_screen(&self.shared.transport, &self.stack.sent_messages).await;
                self.failures.extend(failures);
                self.stack.sent_messages.clear();
                self.dirty = true;
                Ok(())
            }
        }
    }

    async fn render_screen(&mut self) -> DialogResult<()> {
        let messages = self.render()?;
        if messages.is_empty() {
            return Ok(());
        }
        let mode = self.resolve_show_mode();
        let delivery = deliver_screen(
            &self.shared.transport,
            &self.stack.sent_messages,
            &messages,
            mode,
        )
        .await;
        tracing::debug!(
            stack_id = %self.stack.id,
            mode = ?mode,
            actions = ?delivery.actions,
            failures = delivery.failures.len(),
            "Screen delivered"
        );
        self.stack.sent_messages = delivery.records;
        self.failures.extend(delivery.failures);
        self.dirty = true;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------------

    /// Persist changes and release the scope; the manager is stale afterwards
    pub async fn close(&mut self) -> DialogResult<()> {
        self.ensure_open()?;
        self.closed = true;
        let result = if self.dirty { self.commit().await } else { Ok(()) };
        self.guard.take();
        result
    }

    async fn commit(&mut self) -> DialogResult<()> {
        let chat_id = self.chat_id();
        if let Some(context) = &self.current {
            self.shared.store.save_context(chat_id, context).await?;
        }
        if self.stack.is_empty() && self.stack.sent_messages.is_empty() {
            self.shared.store.remove_stack(&self.scope).await?;
        } else {
            self.shared.store.save_stack(&self.scope, &self.stack).await?;
        }
        self.dirty = false;
        tracing::debug!(stack_id = %self.stack.id, depth = self.stack.len(), "Scope committed");
        Ok(())
    }
}

impl<S, T> Drop for DialogManager<S, T> {
    fn drop(&mut self) {
        if self.dirty && !self.closed {
            tracing::warn!(stack_id = %self.stack.id, "Dialog manager dropped without close, changes discarded");
        }
    }
}
