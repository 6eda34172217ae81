//! Widget tree and rendering
//!
//! Widgets are grouped by capability: text, keyboard, media, input and link
//! preview. Each capability has a trait; the node enums implement it and
//! hold the combinators (`Multi`, `Or`, `Group`, ...) as variants.
//!
//! Rendering is a pure function of the data snapshot and the intent's
//! widget data, so rendering the same inputs twice gives the same output.

mod format;
pub mod input;
pub mod keyboard;
pub mod link_preview;
pub mod media;
pub mod stateful;
pub mod text;

pub use format::format_template;
pub use input::MessageInput;
pub use keyboard::{Action, Button, KeyboardNode, Url};
pub use link_preview::LinkPreview;
pub use media::MediaNode;
pub use stateful::{Checkbox, Counter, Select};
pub use text::{Case, TextNode};

use crate::error::DialogResult;
use crate::manager::ActionContext;
use crate::message::{InlineButton, LinkPreviewOptions, MediaAttachment};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::sync::Arc;

// ============================================================================
// Render context
// ============================================================================

/// Read-only inputs of a render
#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
    data: Cow<'a, Map<String, Value>>,
    widget_data: &'a Map<String, Value>,
}

impl<'a> RenderContext<'a> {
    pub fn new(data: &'a Map<String, Value>, widget_data: &'a Map<String, Value>) -> Self {
        Self {
            data: Cow::Borrowed(data),
            widget_data,
        }
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Dotted-path lookup: `user.name`, `items.0`
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.data, path)
    }

    /// Stored value of a stateful widget
    pub fn widget_value(&self, widget_id: &str) -> Option<&Value> {
        self.widget_data.get(widget_id)
    }

    /// Same context with extra top-level keys, for per-item rendering
    pub fn with_values<I>(&self, values: I) -> RenderContext<'_>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut data = self.data.as_ref().clone();
        data.extend(values);
        RenderContext {
            data: Cow::Owned(data),
            widget_data: self.widget_data,
        }
    }
}

pub fn lookup_path<'v>(data: &'v Map<String, Value>, path: &str) -> Option<&'v Value> {
    let mut parts = path.split('.');
    let mut current = data.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Truthiness used by visibility predicates
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

// ============================================================================
// Visibility predicates
// ============================================================================

type PredicateFn = dyn Fn(&RenderContext<'_>) -> bool + Send + Sync;

/// Decides whether a widget is shown
#[derive(Clone)]
pub enum Predicate {
    /// Data value at the path is truthy
    Key(String),
    Not(Box<Predicate>),
    Func(Arc<PredicateFn>),
}

impl Predicate {
    pub fn key(path: impl Into<String>) -> Self {
        Self::Key(path.into())
    }

    pub fn not_key(path: impl Into<String>) -> Self {
        Self::Not(Box::new(Self::Key(path.into())))
    }

    pub fn func(f: impl Fn(&RenderContext<'_>) -> bool + Send + Sync + 'static) -> Self {
        Self::Func(Arc::new(f))
    }

    pub fn evaluate(&self, ctx: &RenderContext<'_>) -> bool {
        match self {
            Predicate::Key(path) => ctx.lookup(path).is_some_and(is_truthy),
            Predicate::Not(inner) => !inner.evaluate(ctx),
            Predicate::Func(f) => f(ctx),
        }
    }
}

// ============================================================================
// Capability traits
// ============================================================================

/// Renders text; an empty string means nothing to show
pub trait TextWidget: Send + Sync {
    fn render_text(&self, ctx: &RenderContext<'_>) -> DialogResult<String>;
}

/// Renders keyboard rows and handles their callbacks
///
/// Rendered buttons carry the raw widget payload; the window prefixes it
/// with the intent id.
pub trait KeyboardWidget: Send + Sync {
    fn render_keyboard(&self, ctx: &RenderContext<'_>) -> DialogResult<Vec<Vec<InlineButton>>>;

    /// Returns `false` when the payload belongs to no widget of this node
    fn process_callback(&self, payload: &str, ctx: &mut ActionContext<'_>) -> DialogResult<bool>;
}

pub trait MediaWidget: Send + Sync {
    fn render_media(&self, ctx: &RenderContext<'_>) -> DialogResult<Option<MediaAttachment>>;
}

/// Handles messages typed by the user while a window is shown
pub trait InputWidget: Send + Sync {
    fn process_message(&self, text: &str, ctx: &mut ActionContext<'_>) -> DialogResult<bool>;
}

pub trait LinkPreviewWidget: Send + Sync {
    fn render_link_preview(&self, ctx: &RenderContext<'_>)
        -> DialogResult<Option<LinkPreviewOptions>>;
}
