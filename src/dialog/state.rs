//! Screen states and navigation policies

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Screen identifier, `group:name`
///
/// The group names the dialog that owns the screen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct State {
    group: String,
    name: String,
}

impl State {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

impl FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((group, name)) if !group.is_empty() && !name.is_empty() => {
                Ok(Self::new(group, name))
            }
            _ => Err(format!("invalid state {s:?}, expected group:name")),
        }
    }
}

impl TryFrom<String> for State {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<State> for String {
    fn from(state: State) -> Self {
        state.to_string()
    }
}

/// How `start` treats the current stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartMode {
    #[default]
    Normal,
    ResetStack,
    /// Start in a freshly allocated stack
    NewStack,
}

/// Dialog-level policy applied when the dialog is started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMode {
    #[default]
    Standard,
    /// Always starts on an empty stack
    Root,
    /// Starts on an empty stack and nothing can be started on top of it
    Exclusive,
    /// Replaces itself instead of stacking a duplicate
    SingleTop,
}

/// How a render reaches the chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShowMode {
    #[default]
    Auto,
    Edit,
    Send,
    DeleteAndSend,
    /// Persist the transition without delivering anything
    NoUpdate,
}
