//! Inbound events and callback payload encoding

use crate::dialog::ShowMode;
use crate::manager::NavCommand;
use serde::{Deserialize, Serialize};

/// Separates the intent id from the widget payload in callback data
pub const CALLBACK_SEPARATOR: char = '\u{1d}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub kind: ChatKind,
}

impl Chat {
    pub fn private(id: i64) -> Self {
        Self {
            id,
            kind: ChatKind::Private,
        }
    }

    pub fn group(id: i64) -> Self {
        Self {
            id,
            kind: ChatKind::Group,
        }
    }

    pub fn is_private(&self) -> bool {
        self.kind == ChatKind::Private
    }
}

/// Navigation requested from outside the event that owns the scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundUpdate {
    pub action: NavCommand,
    #[serde(default)]
    pub stack_id: Option<String>,
    #[serde(default)]
    pub intent_id: Option<String>,
    #[serde(default)]
    pub show_mode: ShowMode,
}

/// Event kinds the runtime accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    TextMessage {
        text: String,
        #[serde(default)]
        media_group_id: Option<String>,
        /// Stack whose reply keyboard or input the text answers
        #[serde(default)]
        stack_hint: Option<String>,
    },
    Callback {
        data: String,
        /// Stack the pressed message belonged to, when the transport knows it
        #[serde(default)]
        stack_hint: Option<String>,
    },
    Background(BackgroundUpdate),
}

/// One inbound event with its principal and chat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub chat: Chat,
    pub user_id: i64,
    pub payload: EventPayload,
}

impl InboundEvent {
    pub fn text(chat: Chat, user_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat,
            user_id,
            payload: EventPayload::TextMessage {
                text: text.into(),
                media_group_id: None,
                stack_hint: None,
            },
        }
    }

    pub fn callback(chat: Chat, user_id: i64, data: impl Into<String>) -> Self {
        Self {
            chat,
            user_id,
            payload: EventPayload::Callback {
                data: data.into(),
                stack_hint: None,
            },
        }
    }

    pub fn background(chat: Chat, user_id: i64, update: BackgroundUpdate) -> Self {
        Self {
            chat,
            user_id,
            payload: EventPayload::Background(update),
        }
    }

    /// Aim the event at a specific stack instead of the default one
    ///
    /// Background events carry their target in the update and are left as is.
    pub fn with_stack_hint(mut self, stack_id: impl Into<String>) -> Self {
        match &mut self.payload {
            EventPayload::TextMessage { stack_hint, .. }
            | EventPayload::Callback { stack_hint, .. } => *stack_hint = Some(stack_id.into()),
            EventPayload::Background(_) => {}
        }
        self
    }

    /// Mark a text event as part of a media album
    pub fn with_media_group(mut self, group_id: impl Into<String>) -> Self {
        if let EventPayload::TextMessage { media_group_id, .. } = &mut self.payload {
            *media_group_id = Some(group_id.into());
        }
        self
    }

    pub fn stack_hint(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::TextMessage { stack_hint, .. }
            | EventPayload::Callback { stack_hint, .. } => stack_hint.as_deref(),
            EventPayload::Background(update) => update.stack_id.as_deref(),
        }
    }

    pub fn is_text_message(&self) -> bool {
        matches!(self.payload, EventPayload::TextMessage { .. })
    }

    pub fn media_group_id(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::TextMessage { media_group_id, .. } => media_group_id.as_deref(),
            _ => None,
        }
    }
}

/// Prefix widget callback data with the intent it belongs to
pub fn encode_callback(intent_id: &str, payload: &str) -> String {
    format!("{intent_id}{CALLBACK_SEPARATOR}{payload}")
}

/// Split callback data into `(intent_id, payload)`
///
/// Data without a usable prefix yields no intent id and is meant for the
/// scope's current top intent.
pub fn decode_callback(data: &str) -> (Option<&str>, &str) {
    match data.split_once(CALLBACK_SEPARATOR) {
        Some((intent_id, payload)) if !intent_id.is_empty() => (Some(intent_id), payload),
        Some((_, payload)) => (None, payload),
        None => (None, data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::State;

    #[test]
    fn test_callback_round_trip() {
        let data = encode_callback("abc", "btn:1");
        assert_eq!(decode_callback(&data), (Some("abc"), "btn:1"));
    }

    #[test]
    fn test_missing_prefix_targets_top() {
        assert_eq!(decode_callback("btn"), (None, "btn"));
        assert_eq!(decode_callback("\u{1d}btn"), (None, "btn"));
    }

    #[test]
    fn test_stack_hint_applies_to_text_and_callback() {
        let text = InboundEvent::text(Chat::group(-5), 3, "hi").with_stack_hint("s1");
        assert_eq!(text.stack_hint(), Some("s1"));
        let callback = InboundEvent::callback(Chat::group(-5), 3, "x").with_stack_hint("s2");
        assert_eq!(callback.stack_hint(), Some("s2"));
        assert_eq!(InboundEvent::text(Chat::private(1), 1, "hi").stack_hint(), None);
    }

    #[test]
    fn test_text_without_hint_deserializes() {
        let event: InboundEvent = serde_json::from_str(
            r#"{"chat":{"id":1,"kind":"private"},"user_id":1,"payload":{"type":"text_message","text":"hi"}}"#,
        )
        .unwrap();
        assert_eq!(event, InboundEvent::text(Chat::private(1), 1, "hi"));
    }

    #[test]
    fn test_background_event_serializes() {
        let event = InboundEvent::background(
            Chat::group(-5),
            3,
            BackgroundUpdate {
                action: NavCommand::SwitchTo {
                    state: State::new("Main", "b"),
                },
                stack_id: Some("s".into()),
                intent_id: None,
                show_mode: ShowMode::Auto,
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: InboundEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
