//! Outbound message descriptions and delivery fingerprints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::PathBuf;

/// Text markup understood by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    Html,
    Markdown,
    MarkdownV2,
}

// ============================================================================
// Markup
// ============================================================================

/// What pressing an inline button does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ButtonAction {
    /// Callback data delivered back to the bot
    Callback(String),
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub text: String,
    pub action: ButtonAction,
}

impl InlineButton {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: ButtonAction::Callback(data.into()),
        }
    }

    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: ButtonAction::Url(url.into()),
        }
    }

    pub fn callback_data(&self) -> Option<&str> {
        match &self.action {
            ButtonAction::Callback(data) => Some(data),
            ButtonAction::Url(_) => None,
        }
    }
}

/// Keyboard attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Markup {
    #[default]
    None,
    InlineKeyboard {
        rows: Vec<Vec<InlineButton>>,
    },
    ReplyKeyboard {
        rows: Vec<Vec<String>>,
        resize: bool,
        one_time: bool,
    },
    ForceReply,
}

impl Markup {
    /// Reply keyboards and force-reply cannot be attached by editing
    pub fn is_reply_keyboard(&self) -> bool {
        matches!(self, Markup::ReplyKeyboard { .. } | Markup::ForceReply)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Markup::None)
    }

    /// Stable digest used to compare markups without storing them
    pub fn equality_key(&self) -> String {
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&encoded);
        let mut key = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(key, "{byte:02x}");
        }
        key
    }
}

// ============================================================================
// Media
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Text,
    Photo,
    Video,
    Animation,
    Audio,
    Document,
    Voice,
}

/// Where the provider takes the media from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MediaSource {
    /// Already uploaded, referenced by provider id
    FileId(String),
    Url(String),
    Path(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub content_type: ContentType,
    pub source: MediaSource,
}

impl MediaAttachment {
    pub fn new(content_type: ContentType, source: MediaSource) -> Self {
        Self {
            content_type,
            source,
        }
    }

    pub fn photo_url(url: impl Into<String>) -> Self {
        Self::new(ContentType::Photo, MediaSource::Url(url.into()))
    }

    /// Identity used to decide whether the media itself changed
    pub fn identity(&self) -> String {
        match &self.source {
            MediaSource::FileId(id) => format!("file_id:{id}"),
            MediaSource::Url(url) => format!("url:{url}"),
            MediaSource::Path(path) => format!("path:{}", path.display()),
        }
    }
}

/// Link preview directive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPreviewOptions {
    pub is_disabled: bool,
    pub url: Option<String>,
    pub prefer_small_media: bool,
    pub prefer_large_media: bool,
    pub show_above_text: bool,
}

// ============================================================================
// Rendered and sent messages
// ============================================================================

/// One concrete outbound message produced by rendering a window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub chat_id: i64,
    pub text: String,
    pub markup: Markup,
    pub media: Option<MediaAttachment>,
    pub link_preview: Option<LinkPreviewOptions>,
    pub parse_mode: Option<ParseMode>,
}

impl RenderedMessage {
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            markup: Markup::None,
            media: None,
            link_preview: None,
            parse_mode: None,
        }
    }

    pub fn with_markup(mut self, markup: Markup) -> Self {
        self.markup = markup;
        self
    }

    pub fn with_media(mut self, media: MediaAttachment) -> Self {
        self.media = Some(media);
        self
    }

    pub fn content_type(&self) -> ContentType {
        self.media
            .as_ref()
            .map_or(ContentType::Text, |media| media.content_type)
    }
}

/// Fingerprint of a delivered message, enough to diff the next render
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessageRecord {
    pub message_id: i64,
    pub chat_id: i64,
    pub has_reply_keyboard: bool,
    pub text: String,
    pub markup_key: String,
    pub media_id: Option<String>,
    pub content_type: ContentType,
    pub sent_at: DateTime<Utc>,
}

impl SentMessageRecord {
    /// Record that `message` is now shown as `message_id`
    pub fn for_message(message_id: i64, message: &RenderedMessage) -> Self {
        Self {
            message_id,
            chat_id: message.chat_id,
            has_reply_keyboard: message.markup.is_reply_keyboard(),
            text: message.text.clone(),
            markup_key: message.markup.equality_key(),
            media_id: message.media.as_ref().map(MediaAttachment::identity),
            content_type: message.content_type(),
            sent_at: Utc::now(),
        }
    }

    pub fn has_media(&self) -> bool {
        self.media_id.is_some()
    }
}
