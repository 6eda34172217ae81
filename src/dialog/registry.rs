//! Registry of dialogs, built once at startup

use super::{Dialog, State, Window};
use crate::error::{DialogError, DialogResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Every dialog a runtime can navigate, keyed by group
#[derive(Clone, Default)]
pub struct DialogRegistry {
    dialogs: HashMap<String, Arc<Dialog>>,
}

impl DialogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dialog, rejecting duplicate groups and malformed windows
    pub fn register(&mut self, dialog: Dialog) -> DialogResult<()> {
        dialog.validate()?;
        if self.dialogs.contains_key(dialog.group()) {
            return Err(DialogError::Registration(format!(
                "dialog {} registered twice",
                dialog.group()
            )));
        }
        tracing::debug!(group = %dialog.group(), "Registered dialog");
        self.dialogs
            .insert(dialog.group().to_string(), Arc::new(dialog));
        Ok(())
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, dialog: Dialog) -> DialogResult<Self> {
        self.register(dialog)?;
        Ok(self)
    }

    pub fn get(&self, group: &str) -> Option<&Arc<Dialog>> {
        self.dialogs.get(group)
    }

    /// Dialog owning `state`; unknown groups and states are `UnknownState`
    pub fn find_dialog(&self, state: &State) -> DialogResult<&Arc<Dialog>> {
        let dialog = self
            .dialogs
            .get(state.group())
            .ok_or_else(|| DialogError::UnknownState(state.to_string()))?;
        dialog.find_window(state)?;
        Ok(dialog)
    }

    pub fn find_window(&self, state: &State) -> DialogResult<&Window> {
        self.find_dialog(state)?.find_window(state)
    }

    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<_> = self.dialogs.keys().cloned().collect();
        groups.sort();
        groups
    }

    pub fn len(&self) -> usize {
        self.dialogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dialogs.is_empty()
    }
}
