//! Dialog definitions
//!
//! A dialog is a named group of windows, one per state, plus the hooks the
//! manager calls when the dialog starts, closes or receives a child's result.

mod registry;
mod state;
mod window;

pub use registry::DialogRegistry;
pub use state::{LaunchMode, ShowMode, StartMode, State};
pub use window::{MarkupStyle, Window, EMPTY_TEXT, MAX_TEXT_LENGTH};

use crate::error::{DialogError, DialogResult};
use crate::manager::ActionContext;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Loads render data; receives the data assembled so far
pub type Getter =
    Arc<dyn Fn(&Map<String, Value>) -> DialogResult<Map<String, Value>> + Send + Sync>;

/// Start and close hooks; the value is the start data or the result
pub type Hook = Arc<dyn Fn(&mut ActionContext<'_>, &Value) -> DialogResult<()> + Send + Sync>;

/// Called on the parent with the closed child's start data and result
pub type ResultHook =
    Arc<dyn Fn(&mut ActionContext<'_>, &Value, &Value) -> DialogResult<()> + Send + Sync>;

#[derive(Clone)]
pub struct Dialog {
    group: String,
    windows: Vec<Window>,
    launch_mode: LaunchMode,
    getter: Option<Getter>,
    on_start: Option<Hook>,
    on_close: Option<Hook>,
    on_process_result: Option<ResultHook>,
}

impl Dialog {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            windows: Vec::new(),
            launch_mode: LaunchMode::Standard,
            getter: None,
            on_start: None,
            on_close: None,
            on_process_result: None,
        }
    }

    /// Add a window; window order defines `next`/`back`
    pub fn window(mut self, window: Window) -> Self {
        self.windows.push(window);
        self
    }

    pub fn launch_mode(mut self, mode: LaunchMode) -> Self {
        self.launch_mode = mode;
        self
    }

    pub fn getter(
        mut self,
        getter: impl Fn(&Map<String, Value>) -> DialogResult<Map<String, Value>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.getter = Some(Arc::new(getter));
        self
    }

    pub fn on_start(
        mut self,
        hook: impl Fn(&mut ActionContext<'_>, &Value) -> DialogResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_start = Some(Arc::new(hook));
        self
    }

    pub fn on_close(
        mut self,
        hook: impl Fn(&mut ActionContext<'_>, &Value) -> DialogResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_close = Some(Arc::new(hook));
        self
    }

    pub fn on_process_result(
        mut self,
        hook: impl Fn(&mut ActionContext<'_>, &Value, &Value) -> DialogResult<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.on_process_result = Some(Arc::new(hook));
        self
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn get_launch_mode(&self) -> LaunchMode {
        self.launch_mode
    }

    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.windows.iter().map(Window::state)
    }

    /// First declared state; `None` only for a dialog without windows
    pub fn first_state(&self) -> Option<&State> {
        self.windows.first().map(Window::state)
    }

    pub fn find_window(&self, state: &State) -> DialogResult<&Window> {
        self.windows
            .iter()
            .find(|window| window.state() == state)
            .ok_or_else(|| DialogError::UnknownState(state.to_string()))
    }

    pub fn next_state(&self, state: &State) -> DialogResult<State> {
        self.adjacent(state, 1)
    }

    pub fn prev_state(&self, state: &State) -> DialogResult<State> {
        self.adjacent(state, -1)
    }

    fn adjacent(&self, state: &State, offset: isize) -> DialogResult<State> {
        let index = self
            .windows
            .iter()
            .position(|window| window.state() == state)
            .ok_or_else(|| DialogError::UnknownState(state.to_string()))?;
        let direction = if offset > 0 { "after" } else { "before" };
        index
            .checked_add_signed(offset)
            .and_then(|target| self.windows.get(target))
            .map(|window| window.state().clone())
            .ok_or(DialogError::NoAdjacentState {
                state: state.to_string(),
                direction,
            })
    }

    /// Dialog getter output merged over `data`
    pub fn load_data(&self, mut data: Map<String, Value>) -> DialogResult<Map<String, Value>> {
        if let Some(getter) = &self.getter {
            let extra = getter(&data)?;
            data.extend(extra);
        }
        Ok(data)
    }

    pub fn start_hook(&self) -> Option<&Hook> {
        self.on_start.as_ref()
    }

    pub fn close_hook(&self) -> Option<&Hook> {
        self.on_close.as_ref()
    }

    pub fn result_hook(&self) -> Option<&ResultHook> {
        self.on_process_result.as_ref()
    }

    fn validate(&self) -> DialogResult<()> {
        if self.group.is_empty() || self.group.contains(':') {
            return Err(DialogError::Registration(format!(
                "invalid dialog group {:?}",
                self.group
            )));
        }
        if self.windows.is_empty() {
            return Err(DialogError::Registration(format!(
                "dialog {} has no windows",
                self.group
            )));
        }
        for (i, window) in self.windows.iter().enumerate() {
            if window.state().group() != self.group {
                return Err(DialogError::Registration(format!(
                    "window {} does not belong to dialog {}",
                    window.state(),
                    self.group
                )));
            }
            if self.windows[..i].iter().any(|w| w.state() == window.state()) {
                return Err(DialogError::Registration(format!(
                    "state {} declared twice",
                    window.state()
                )));
            }
        }
        Ok(())
    }
}
