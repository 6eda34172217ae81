//! Widgets that keep their own value in the intent's widget data
//!
//! Each widget owns exactly one slot, keyed by its id. An absent slot reads
//! as the widget's default.

use super::format::display_value;
use super::text::TextNode;
use super::{lookup_path, KeyboardWidget, RenderContext, TextWidget};
use crate::error::{DialogError, DialogResult};
use crate::manager::ActionContext;
use crate::message::InlineButton;
use serde_json::Value;
use std::sync::Arc;

pub type ValueHandler<T> =
    Arc<dyn Fn(&mut ActionContext<'_>, T) -> DialogResult<()> + Send + Sync>;

// ============================================================================
// Checkbox
// ============================================================================

#[derive(Clone)]
pub struct Checkbox {
    id: String,
    checked_text: TextNode,
    unchecked_text: TextNode,
    default: bool,
    on_changed: Option<ValueHandler<bool>>,
}

impl Checkbox {
    pub fn new(
        id: impl Into<String>,
        checked_text: impl Into<TextNode>,
        unchecked_text: impl Into<TextNode>,
    ) -> Self {
        Self {
            id: id.into(),
            checked_text: checked_text.into(),
            unchecked_text: unchecked_text.into(),
            default: false,
            on_changed: None,
        }
    }

    pub fn default_checked(mut self, checked: bool) -> Self {
        self.default = checked;
        self
    }

    pub fn on_changed(
        mut self,
        f: impl Fn(&mut ActionContext<'_>, bool) -> DialogResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_changed = Some(Arc::new(f));
        self
    }

    fn checked(&self, value: Option<&Value>) -> bool {
        value.and_then(Value::as_bool).unwrap_or(self.default)
    }

    pub fn is_checked(&self, ctx: &RenderContext<'_>) -> bool {
        self.checked(ctx.widget_value(&self.id))
    }
}

impl KeyboardWidget for Checkbox {
    fn render_keyboard(&self, ctx: &RenderContext<'_>) -> DialogResult<Vec<Vec<InlineButton>>> {
        let text = if self.is_checked(ctx) {
            self.checked_text.render_text(ctx)?
        } else {
            self.unchecked_text.render_text(ctx)?
        };
        if text.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![vec![InlineButton::callback(text, self.id.clone())]])
    }

    fn process_callback(&self, payload: &str, ctx: &mut ActionContext<'_>) -> DialogResult<bool> {
        if payload != self.id {
            return Ok(false);
        }
        let mut slot = ctx.widget(&self.id);
        let checked = !self.checked(slot.get());
        slot.set(Value::Bool(checked));
        tracing::debug!(widget = %self.id, checked, "Checkbox toggled");
        if let Some(handler) = &self.on_changed {
            handler(ctx, checked)?;
        }
        Ok(true)
    }
}

// ============================================================================
// Counter
// ============================================================================

/// `[-] value [+]` row clamped to `min..=max`
#[derive(Clone)]
pub struct Counter {
    id: String,
    text: TextNode,
    min: i64,
    max: i64,
    step: i64,
    default: i64,
    on_changed: Option<ValueHandler<i64>>,
}

impl Counter {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: TextNode::format("{value}"),
            min: 0,
            max: i64::MAX,
            step: 1,
            default: 0,
            on_changed: None,
        }
    }

    /// Middle button text, `{value}` is the current value
    pub fn text(mut self, text: impl Into<TextNode>) -> Self {
        self.text = text.into();
        self
    }

    pub fn range(mut self, min: i64, max: i64) -> Self {
        self.min = min;
        self.max = max.max(min);
        self
    }

    pub fn step(mut self, step: i64) -> Self {
        self.step = step;
        self
    }

    pub fn default_value(mut self, value: i64) -> Self {
        self.default = value;
        self
    }

    pub fn on_changed(
        mut self,
        f: impl Fn(&mut ActionContext<'_>, i64) -> DialogResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_changed = Some(Arc::new(f));
        self
    }

    fn value(&self, stored: Option<&Value>) -> i64 {
        stored
            .and_then(Value::as_i64)
            .unwrap_or(self.default)
            .clamp(self.min, self.max)
    }

    pub fn get_value(&self, ctx: &RenderContext<'_>) -> i64 {
        self.value(ctx.widget_value(&self.id))
    }

    fn payload(&self, op: &str) -> String {
        format!("{}:{op}", self.id)
    }
}

impl KeyboardWidget for Counter {
    fn render_keyboard(&self, ctx: &RenderContext<'_>) -> DialogResult<Vec<Vec<InlineButton>>> {
        let value = self.get_value(ctx);
        let scoped = ctx.with_values([("value".to_string(), Value::from(value))]);
        let text = self.text.render_text(&scoped)?;
        Ok(vec![vec![
            InlineButton::callback("-", self.payload("-")),
            InlineButton::callback(text, self.payload("=")),
            InlineButton::callback("+", self.payload("+")),
        ]])
    }

    fn process_callback(&self, payload: &str, ctx: &mut ActionContext<'_>) -> DialogResult<bool> {
        let Some(op) = payload
            .strip_prefix(self.id.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
        else {
            return Ok(false);
        };
        let mut slot = ctx.widget(&self.id);
        let current = self.value(slot.get());
        let next = match op {
            "-" => current.saturating_sub(self.step).max(self.min),
            "+" => current.saturating_add(self.step).min(self.max),
            "=" => return Ok(true),
            _ => return Ok(false),
        };
        if next == current {
            return Ok(true);
        }
        slot.set(Value::from(next));
        tracing::debug!(widget = %self.id, value = next, "Counter changed");
        if let Some(handler) = &self.on_changed {
            handler(ctx, next)?;
        }
        Ok(true)
    }
}

// ============================================================================
// Select (radio)
// ============================================================================

/// One button per item of a data list; remembers the checked item
#[derive(Clone)]
pub struct Select {
    id: String,
    checked_text: TextNode,
    unchecked_text: TextNode,
    items_key: String,
    item_id_key: Option<String>,
    on_click: Option<ValueHandler<String>>,
}

impl Select {
    /// Item texts see the item as `{item}` and its id as `{item_id}`
    pub fn new(
        id: impl Into<String>,
        checked_text: impl Into<TextNode>,
        unchecked_text: impl Into<TextNode>,
        items_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            checked_text: checked_text.into(),
            unchecked_text: unchecked_text.into(),
            items_key: items_key.into(),
            item_id_key: None,
            on_click: None,
        }
    }

    /// Path inside each item holding its id; the item itself otherwise
    pub fn item_id_key(mut self, key: impl Into<String>) -> Self {
        self.item_id_key = Some(key.into());
        self
    }

    pub fn on_click(
        mut self,
        f: impl Fn(&mut ActionContext<'_>, String) -> DialogResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_click = Some(Arc::new(f));
        self
    }

    pub fn checked_item(&self, ctx: &RenderContext<'_>) -> Option<String> {
        ctx.widget_value(&self.id)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn item_id(&self, item: &Value) -> DialogResult<String> {
        let Some(key) = &self.item_id_key else {
            return Ok(display_value(item));
        };
        let found = match item {
            Value::Object(map) => lookup_path(map, key),
            _ => None,
        };
        found.map(display_value).ok_or_else(|| {
            DialogError::render(format!("select {:?}: item has no {key:?}", self.id))
        })
    }
}

impl KeyboardWidget for Select {
    fn render_keyboard(&self, ctx: &RenderContext<'_>) -> DialogResult<Vec<Vec<InlineButton>>> {
        let items = match ctx.lookup(&self.items_key) {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(DialogError::render(format!(
                    "select {:?}: {:?} is not a list: {other}",
                    self.id, self.items_key
                )))
            }
        };
        let checked = self.checked_item(ctx);
        let mut row = Vec::with_capacity(items.len());
        for item in items {
            let item_id = self.item_id(&item)?;
            let is_checked = checked.as_deref() == Some(item_id.as_str());
            let scoped = ctx.with_values([
                ("item".to_string(), item),
                ("item_id".to_string(), Value::String(item_id.clone())),
            ]);
            let text = if is_checked {
                self.checked_text.render_text(&scoped)?
            } else {
                self.unchecked_text.render_text(&scoped)?
            };
            if text.is_empty() {
                continue;
            }
            row.push(InlineButton::callback(text, format!("{}:{item_id}", self.id)));
        }
        Ok(if row.is_empty() { Vec::new() } else { vec![row] })
    }

    fn process_callback(&self, payload: &str, ctx: &mut ActionContext<'_>) -> DialogResult<bool> {
        let Some(item_id) = payload
            .strip_prefix(self.id.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
        else {
            return Ok(false);
        };
        ctx.widget(&self.id).set(Value::String(item_id.to_string()));
        tracing::debug!(widget = %self.id, item_id, "Select item checked");
        if let Some(handler) = &self.on_click {
            handler(ctx, item_id.to_string())?;
        }
        Ok(true)
    }
}
