//! Text widgets

use super::format::{display_value, format_template};
use super::{Predicate, RenderContext, TextWidget};
use crate::error::DialogResult;
use std::sync::Arc;

/// Picks one text by the value found at `selector`
#[derive(Clone)]
pub struct Case {
    selector: String,
    cases: Vec<(String, TextNode)>,
    default: Option<Box<TextNode>>,
}

impl Case {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            cases: Vec::new(),
            default: None,
        }
    }

    /// Text used when the selected value displays as `value`
    pub fn case(mut self, value: impl Into<String>, text: impl Into<TextNode>) -> Self {
        self.cases.push((value.into(), text.into()));
        self
    }

    pub fn default(mut self, text: impl Into<TextNode>) -> Self {
        self.default = Some(Box::new(text.into()));
        self
    }

    fn render(&self, ctx: &RenderContext<'_>) -> DialogResult<String> {
        let selected = ctx.lookup(&self.selector).map(display_value);
        let chosen = selected
            .as_deref()
            .and_then(|key| self.cases.iter().find(|(value, _)| value == key))
            .map(|(_, text)| text)
            .or(self.default.as_deref());
        match chosen {
            Some(text) => text.render_text(ctx),
            None => Ok(String::new()),
        }
    }
}

/// Text node
#[derive(Clone)]
pub enum TextNode {
    Const(String),
    /// `{placeholder}` template
    Format(String),
    /// Non-empty children joined by `sep`
    Multi {
        children: Vec<TextNode>,
        sep: String,
    },
    /// First child that renders non-empty
    Or(Vec<TextNode>),
    Case(Case),
    When {
        predicate: Predicate,
        node: Box<TextNode>,
    },
    Custom(Arc<dyn TextWidget>),
}

impl TextNode {
    pub fn constant(text: impl Into<String>) -> Self {
        Self::Const(text.into())
    }

    pub fn format(template: impl Into<String>) -> Self {
        Self::Format(template.into())
    }

    /// Children joined by newlines
    pub fn multi(children: impl IntoIterator<Item = TextNode>) -> Self {
        Self::multi_sep(children, "\n")
    }

    pub fn multi_sep(children: impl IntoIterator<Item = TextNode>, sep: impl Into<String>) -> Self {
        Self::Multi {
            children: children.into_iter().collect(),
            sep: sep.into(),
        }
    }

    pub fn or(children: impl IntoIterator<Item = TextNode>) -> Self {
        Self::Or(children.into_iter().collect())
    }

    pub fn custom(widget: impl TextWidget + 'static) -> Self {
        Self::Custom(Arc::new(widget))
    }

    /// Show this node only when `predicate` holds
    pub fn when(self, predicate: Predicate) -> Self {
        Self::When {
            predicate,
            node: Box::new(self),
        }
    }
}

impl From<&str> for TextNode {
    fn from(text: &str) -> Self {
        Self::Const(text.to_string())
    }
}

impl From<String> for TextNode {
    fn from(text: String) -> Self {
        Self::Const(text)
    }
}

impl From<Case> for TextNode {
    fn from(case: Case) -> Self {
        Self::Case(case)
    }
}

impl TextWidget for TextNode {
    fn render_text(&self, ctx: &RenderContext<'_>) -> DialogResult<String> {
        match self {
            TextNode::Const(text) => Ok(text.clone()),
            TextNode::Format(template) => format_template(template, ctx),
            TextNode::Multi { children, sep } => {
                let mut parts = Vec::with_capacity(children.len());
                for child in children {
                    let part = child.render_text(ctx)?;
                    if !part.is_empty() {
                        parts.push(part);
                    }
                }
                Ok(parts.join(sep))
            }
            TextNode::Or(children) => {
                for child in children {
                    let text = child.render_text(ctx)?;
                    if !text.is_empty() {
                        return Ok(text);
                    }
                }
                Ok(String::new())
            }
            TextNode::Case(case) => case.render(ctx),
            TextNode::When { predicate, node } => {
                if predicate.evaluate(ctx) {
                    node.render_text(ctx)
                } else {
                    Ok(String::new())
                }
            }
            TextNode::Custom(widget) => widget.render_text(ctx),
        }
    }
}
