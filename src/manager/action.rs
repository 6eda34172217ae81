//! What hooks and widget handlers see while an event is processed
//!
//! Handlers are synchronous. Navigation they request is queued as
//! [`NavCommand`]s and carried out by the manager once the handler returns,
//! in request order.

use super::BackgroundManager;
use crate::dialog::{ShowMode, StartMode, State};
use crate::event::InboundEvent;
use crate::store::{AccessSettings, Context};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Serializable navigation step
///
/// The same commands drive the manager API, handler requests and
/// background updates replayed by the scope's pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum NavCommand {
    Start {
        state: State,
        #[serde(default)]
        data: Value,
        #[serde(default)]
        mode: StartMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        access: Option<AccessSettings>,
    },
    SwitchTo {
        state: State,
    },
    Next,
    Back,
    Done {
        #[serde(default)]
        result: Value,
    },
    /// Merge into the current intent's dialog data
    Update {
        data: Map<String, Value>,
    },
    ResetStack,
}

impl NavCommand {
    pub fn start(state: State) -> Self {
        Self::Start {
            state,
            data: Value::Null,
            mode: StartMode::Normal,
            access: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NavCommand::Start { .. } => "start",
            NavCommand::SwitchTo { .. } => "switch_to",
            NavCommand::Next => "next",
            NavCommand::Back => "back",
            NavCommand::Done { .. } => "done",
            NavCommand::Update { .. } => "update",
            NavCommand::ResetStack => "reset_stack",
        }
    }
}

/// Handler view of the current intent
pub struct ActionContext<'a> {
    context: &'a mut Context,
    event: &'a InboundEvent,
    middleware_data: &'a Map<String, Value>,
    background: BackgroundManager,
    commands: Vec<NavCommand>,
    show_mode: Option<ShowMode>,
}

impl<'a> ActionContext<'a> {
    pub(crate) fn new(
        context: &'a mut Context,
        event: &'a InboundEvent,
        middleware_data: &'a Map<String, Value>,
        background: BackgroundManager,
    ) -> Self {
        Self {
            context,
            event,
            middleware_data,
            background,
            commands: Vec::new(),
            show_mode: None,
        }
    }

    pub fn intent_id(&self) -> &str {
        &self.context.id
    }

    pub fn stack_id(&self) -> &str {
        &self.context.stack_id
    }

    pub fn state(&self) -> &State {
        &self.context.state
    }

    pub fn start_data(&self) -> &Value {
        self.context.start_data()
    }

    pub fn dialog_data(&self) -> &Map<String, Value> {
        &self.context.dialog_data
    }

    pub fn dialog_data_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.context.dialog_data
    }

    pub fn event(&self) -> &InboundEvent {
        self.event
    }

    pub fn middleware_data(&self) -> &Map<String, Value> {
        self.middleware_data
    }

    /// Slot of one stateful widget
    pub fn widget<'c>(&'c mut self, widget_id: &'c str) -> WidgetScope<'c> {
        WidgetScope {
            widget_data: &mut self.context.widget_data,
            widget_id,
        }
    }

    /// Handle for navigation outside this event
    pub fn background(&self) -> &BackgroundManager {
        &self.background
    }

    pub fn switch_to(&mut self, state: State) {
        self.commands.push(NavCommand::SwitchTo { state });
    }

    pub fn next(&mut self) {
        self.commands.push(NavCommand::Next);
    }

    pub fn back(&mut self) {
        self.commands.push(NavCommand::Back);
    }

    pub fn done(&mut self, result: Value) {
        self.commands.push(NavCommand::Done { result });
    }

    pub fn start(&mut self, state: State, data: Value, mode: StartMode) {
        self.commands.push(NavCommand::Start {
            state,
            data,
            mode,
            access: None,
        });
    }

    pub fn start_with_access(
        &mut self,
        state: State,
        data: Value,
        mode: StartMode,
        access: AccessSettings,
    ) {
        self.commands.push(NavCommand::Start {
            state,
            data,
            mode,
            access: Some(access),
        });
    }

    pub fn update(&mut self, data: Map<String, Value>) {
        self.commands.push(NavCommand::Update { data });
    }

    pub fn reset_stack(&mut self) {
        self.commands.push(NavCommand::ResetStack);
    }

    /// Show mode for the render that follows this event
    pub fn set_show_mode(&mut self, mode: ShowMode) {
        self.show_mode = Some(mode);
    }

    pub(crate) fn finish(self) -> (Vec<NavCommand>, Option<ShowMode>) {
        (self.commands, self.show_mode)
    }
}

/// One widget's slot in the intent's widget data
///
/// Borrows the slot map only; the widget never sees other widgets' slots.
pub struct WidgetScope<'c> {
    widget_data: &'c mut Map<String, Value>,
    widget_id: &'c str,
}

impl WidgetScope<'_> {
    pub fn id(&self) -> &str {
        self.widget_id
    }

    pub fn get(&self) -> Option<&Value> {
        self.widget_data.get(self.widget_id)
    }

    pub fn set(&mut self, value: Value) {
        self.widget_data.insert(self.widget_id.to_string(), value);
    }

    pub fn remove(&mut self) -> Option<Value> {
        self.widget_data.remove(self.widget_id)
    }
}
