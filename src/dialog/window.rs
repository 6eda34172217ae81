//! One screen of a dialog

use super::{Getter, State};
use crate::error::DialogResult;
use crate::event::encode_callback;
use crate::manager::ActionContext;
use crate::message::{ButtonAction, InlineButton, Markup, ParseMode, RenderedMessage};
use crate::widgets::{
    InputWidget, KeyboardNode, KeyboardWidget, LinkPreview, LinkPreviewWidget, MediaNode,
    MediaWidget, RenderContext, TextNode, TextWidget,
};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Provider limit on the length of one text message
pub const MAX_TEXT_LENGTH: usize = 4096;

/// Shown instead of an empty text so the provider accepts the message
pub const EMPTY_TEXT: &str = "\u{200c}";

/// Kind of keyboard the window's buttons are rendered as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkupStyle {
    #[default]
    Inline,
    /// Keyboard replacing the user's input field; pressing sends the label
    Reply { resize: bool, one_time: bool },
    ForceReply,
}

#[derive(Clone)]
pub struct Window {
    state: State,
    text: Option<TextNode>,
    keyboard: Option<KeyboardNode>,
    media: Option<MediaNode>,
    input: Option<Arc<dyn InputWidget>>,
    link_preview: Option<LinkPreview>,
    getter: Option<Getter>,
    parse_mode: Option<ParseMode>,
    markup_style: MarkupStyle,
}

impl Window {
    pub fn new(state: State) -> Self {
        Self {
            state,
            text: None,
            keyboard: None,
            media: None,
            input: None,
            link_preview: None,
            getter: None,
            parse_mode: None,
            markup_style: MarkupStyle::Inline,
        }
    }

    pub fn text(mut self, text: impl Into<TextNode>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn keyboard(mut self, keyboard: impl Into<KeyboardNode>) -> Self {
        self.keyboard = Some(keyboard.into());
        self
    }

    pub fn media(mut self, media: impl Into<MediaNode>) -> Self {
        self.media = Some(media.into());
        self
    }

    pub fn input(mut self, input: impl InputWidget + 'static) -> Self {
        self.input = Some(Arc::new(input));
        self
    }

    pub fn link_preview(mut self, preview: LinkPreview) -> Self {
        self.link_preview = Some(preview);
        self
    }

    /// Data loaded for this window only, merged over the dialog's data
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

    pub fn parse_mode(mut self, mode: ParseMode) -> Self {
        self.parse_mode = Some(mode);
        self
    }

    pub fn markup_style(mut self, style: MarkupStyle) -> Self {
        self.markup_style = style;
        self
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Base data with the window getter's output merged in
    pub fn load_data(&self, mut data: Map<String, Value>) -> DialogResult<Map<String, Value>> {
        if let Some(getter) = &self.getter {
            let extra = getter(&data)?;
            data.extend(extra);
        }
        Ok(data)
    }

    /// Render into one or more messages for `chat_id`
    ///
    /// Callback data of inline buttons is prefixed with `intent_id`. Long
    /// texts are split at line boundaries; media goes with the first part
    /// and the markup with the last.
    pub fn render(
        &self,
        data: &Map<String, Value>,
        widget_data: &Map<String, Value>,
        chat_id: i64,
        intent_id: &str,
    ) -> DialogResult<Vec<RenderedMessage>> {
        let ctx = RenderContext::new(data, widget_data);

        let text = match &self.text {
            Some(node) => node.render_text(&ctx)?,
            None => String::new(),
        };
        let media = match &self.media {
            Some(node) => node.render_media(&ctx)?,
            None => None,
        };
        let link_preview = match &self.link_preview {
            Some(preview) => preview.render_link_preview(&ctx)?,
            None => None,
        };
        let rows = match &self.keyboard {
            Some(node) => node.render_keyboard(&ctx)?,
            None => Vec::new(),
        };
        let markup = self.build_markup(rows, intent_id);

        let text = if text.is_empty() && media.is_none() {
            EMPTY_TEXT.to_string()
        } else {
            text
        };

        let mut messages: Vec<RenderedMessage> = split_text(&text, MAX_TEXT_LENGTH)
            .into_iter()
            .map(|part| RenderedMessage {
                chat_id,
                text: part,
                markup: Markup::None,
                media: None,
                link_preview: link_preview.clone(),
                parse_mode: self.parse_mode,
            })
            .collect();
        if let Some(first) = messages.first_mut() {
            first.media = media;
        }
        if let Some(last) = messages.last_mut() {
            last.markup = markup;
        }
        Ok(messages)
    }

    fn build_markup(&self, rows: Vec<Vec<InlineButton>>, intent_id: &str) -> Markup {
        match self.markup_style {
            MarkupStyle::ForceReply => Markup::ForceReply,
            _ if rows.is_empty() => Markup::None,
            MarkupStyle::Inline => Markup::InlineKeyboard {
                rows: rows
                    .into_iter()
                    .map(|row| {
                        row.into_iter()
                            .map(|button| prefix_callback(button, intent_id))
                            .collect()
                    })
                    .collect(),
            },
            MarkupStyle::Reply { resize, one_time } => Markup::ReplyKeyboard {
                rows: rows
                    .into_iter()
                    .map(|row| row.into_iter().map(|button| button.text).collect())
                    .collect(),
                resize,
                one_time,
            },
        }
    }

    /// Raw callback payload of the reply-keyboard button labeled `label`
    pub fn reply_payload(
        &self,
        data: &Map<String, Value>,
        widget_data: &Map<String, Value>,
        label: &str,
    ) -> DialogResult<Option<String>> {
        if !matches!(self.markup_style, MarkupStyle::Reply { .. }) {
            return Ok(None);
        }
        let Some(keyboard) = &self.keyboard else {
            return Ok(None);
        };
        let rows = keyboard.render_keyboard(&RenderContext::new(data, widget_data))?;
        Ok(rows
            .into_iter()
            .flatten()
            .find(|button| button.text == label)
            .and_then(|button| button.callback_data().map(str::to_string)))
    }

    /// Dispatch a raw (unprefixed) callback payload to the keyboard
    pub fn process_callback(&self, payload: &str, ctx: &mut ActionContext<'_>) -> DialogResult<bool> {
        match &self.keyboard {
            Some(keyboard) => keyboard.process_callback(payload, ctx),
            None => Ok(false),
        }
    }

    pub fn process_message(&self, text: &str, ctx: &mut ActionContext<'_>) -> DialogResult<bool> {
        match &self.input {
            Some(input) => input.process_message(text, ctx),
            None => Ok(false),
        }
    }
}

fn prefix_callback(button: InlineButton, intent_id: &str) -> InlineButton {
    match button.action {
        ButtonAction::Callback(data) => InlineButton {
            text: button.text,
            action: ButtonAction::Callback(encode_callback(intent_id, &data)),
        },
        ButtonAction::Url(_) => button,
    }
}

/// Split at line boundaries into parts of at most `limit` chars
///
/// A single line longer than `limit` is cut hard.
fn split_text(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > limit {
            let chars: Vec<char> = line.chars().collect();
            for chunk in chars.chunks(limit) {
                if chunk.len() == limit {
                    parts.push(chunk.iter().collect());
                } else {
                    current = chunk.iter().collect();
                    current_len = chunk.len();
                }
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
        .into_iter()
        .map(|part| part.trim_end_matches('\n').to_string())
        .collect()
}
