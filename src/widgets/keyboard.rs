//! Keyboard widgets and layout combinators

use super::stateful::{Checkbox, Counter, Select};
use super::text::TextNode;
use super::{KeyboardWidget, Predicate, RenderContext, TextWidget};
use crate::dialog::{StartMode, State};
use crate::error::DialogResult;
use crate::manager::ActionContext;
use crate::message::InlineButton;
use serde_json::Value;
use std::sync::Arc;

pub type ClickHandler = Arc<dyn Fn(&mut ActionContext<'_>) -> DialogResult<()> + Send + Sync>;

/// What a button does when pressed
#[derive(Clone)]
pub enum Action {
    Handler(ClickHandler),
    SwitchTo(State),
    Next,
    Back,
    /// Close the dialog with a result
    Done(Value),
    Start {
        state: State,
        data: Value,
        mode: StartMode,
    },
}

impl Action {
    pub fn handler(
        f: impl Fn(&mut ActionContext<'_>) -> DialogResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self::Handler(Arc::new(f))
    }

    pub fn cancel() -> Self {
        Self::Done(Value::Null)
    }

    pub fn start(state: State) -> Self {
        Self::Start {
            state,
            data: Value::Null,
            mode: StartMode::Normal,
        }
    }

    pub fn run(&self, ctx: &mut ActionContext<'_>) -> DialogResult<()> {
        match self {
            Action::Handler(handler) => handler(ctx),
            Action::SwitchTo(state) => {
                ctx.switch_to(state.clone());
                Ok(())
            }
            Action::Next => {
                ctx.next();
                Ok(())
            }
            Action::Back => {
                ctx.back();
                Ok(())
            }
            Action::Done(result) => {
                ctx.done(result.clone());
                Ok(())
            }
            Action::Start { state, data, mode } => {
                ctx.start(state.clone(), data.clone(), *mode);
                Ok(())
            }
        }
    }
}

/// Callback button
#[derive(Clone)]
pub struct Button {
    id: String,
    text: TextNode,
    action: Action,
}

impl Button {
    pub fn new(id: impl Into<String>, text: impl Into<TextNode>, action: Action) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            action,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl KeyboardWidget for Button {
    fn render_keyboard(&self, ctx: &RenderContext<'_>) -> DialogResult<Vec<Vec<InlineButton>>> {
        let text = self.text.render_text(ctx)?;
        if text.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![vec![InlineButton::callback(text, self.id.clone())]])
    }

    fn process_callback(&self, payload: &str, ctx: &mut ActionContext<'_>) -> DialogResult<bool> {
        if payload != self.id {
            return Ok(false);
        }
        tracing::debug!(button = %self.id, "Button pressed");
        self.action.run(ctx)?;
        Ok(true)
    }
}

/// Button opening a link
#[derive(Clone)]
pub struct Url {
    text: TextNode,
    url: TextNode,
}

impl Url {
    pub fn new(text: impl Into<TextNode>, url: impl Into<TextNode>) -> Self {
        Self {
            text: text.into(),
            url: url.into(),
        }
    }
}

impl KeyboardWidget for Url {
    fn render_keyboard(&self, ctx: &RenderContext<'_>) -> DialogResult<Vec<Vec<InlineButton>>> {
        let text = self.text.render_text(ctx)?;
        let url = self.url.render_text(ctx)?;
        if text.is_empty() || url.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![vec![InlineButton::url(text, url)]])
    }

    fn process_callback(&self, _payload: &str, _ctx: &mut ActionContext<'_>) -> DialogResult<bool> {
        Ok(false)
    }
}

/// How a group arranges its children's buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Keep the rows produced by children
    Rows,
    /// Everything on one row
    Row,
    /// One button per row
    Column,
    /// Rows of at most `n` buttons
    Width(usize),
}

impl Layout {
    fn arrange(self, rows: Vec<Vec<InlineButton>>) -> Vec<Vec<InlineButton>> {
        let rows: Vec<Vec<InlineButton>> = rows.into_iter().filter(|row| !row.is_empty()).collect();
        match self {
            Layout::Rows => rows,
            Layout::Row => {
                let row: Vec<InlineButton> = rows.into_iter().flatten().collect();
                if row.is_empty() {
                    Vec::new()
                } else {
                    vec![row]
                }
            }
            Layout::Column => rows.into_iter().flatten().map(|button| vec![button]).collect(),
            Layout::Width(width) => {
                let buttons: Vec<InlineButton> = rows.into_iter().flatten().collect();
                buttons
                    .chunks(width.max(1))
                    .map(<[InlineButton]>::to_vec)
                    .collect()
            }
        }
    }
}

/// Keyboard node
#[derive(Clone)]
pub enum KeyboardNode {
    Button(Button),
    Url(Url),
    Group {
        children: Vec<KeyboardNode>,
        layout: Layout,
    },
    Checkbox(Checkbox),
    Counter(Counter),
    Select(Select),
    When {
        predicate: Predicate,
        node: Box<KeyboardNode>,
    },
    Custom(Arc<dyn KeyboardWidget>),
}

impl KeyboardNode {
    pub fn group(children: impl IntoIterator<Item = KeyboardNode>) -> Self {
        Self::with_layout(children, Layout::Rows)
    }

    pub fn row(children: impl IntoIterator<Item = KeyboardNode>) -> Self {
        Self::with_layout(children, Layout::Row)
    }

    pub fn column(children: impl IntoIterator<Item = KeyboardNode>) -> Self {
        Self::with_layout(children, Layout::Column)
    }

    pub fn width(children: impl IntoIterator<Item = KeyboardNode>, width: usize) -> Self {
        Self::with_layout(children, Layout::Width(width))
    }

    fn with_layout(children: impl IntoIterator<Item = KeyboardNode>, layout: Layout) -> Self {
        Self::Group {
            children: children.into_iter().collect(),
            layout,
        }
    }

    pub fn custom(widget: impl KeyboardWidget + 'static) -> Self {
        Self::Custom(Arc::new(widget))
    }

    pub fn when(self, predicate: Predicate) -> Self {
        Self::When {
            predicate,
            node: Box::new(self),
        }
    }

    fn as_widget(&self) -> Option<&dyn KeyboardWidget> {
        match self {
            KeyboardNode::Button(w) => Some(w),
            KeyboardNode::Url(w) => Some(w),
            KeyboardNode::Checkbox(w) => Some(w),
            KeyboardNode::Counter(w) => Some(w),
            KeyboardNode::Select(w) => Some(w),
            KeyboardNode::Custom(w) => Some(w.as_ref()),
            KeyboardNode::Group { .. } | KeyboardNode::When { .. } => None,
        }
    }
}

impl From<Button> for KeyboardNode {
    fn from(button: Button) -> Self {
        Self::Button(button)
    }
}

impl From<Url> for KeyboardNode {
    fn from(url: Url) -> Self {
        Self::Url(url)
    }
}

impl From<Checkbox> for KeyboardNode {
    fn from(checkbox: Checkbox) -> Self {
        Self::Checkbox(checkbox)
    }
}

impl From<Counter> for KeyboardNode {
    fn from(counter: Counter) -> Self {
        Self::Counter(counter)
    }
}

impl From<Select> for KeyboardNode {
    fn from(select: Select) -> Self {
        Self::Select(select)
    }
}

impl KeyboardWidget for KeyboardNode {
    fn render_keyboard(&self, ctx: &RenderContext<'_>) -> DialogResult<Vec<Vec<InlineButton>>> {
        match self {
            KeyboardNode::Group { children, layout } => {
                let mut rows = Vec::new();
                for child in children {
                    rows.extend(child.render_keyboard(ctx)?);
                }
                Ok(layout.arrange(rows))
            }
            KeyboardNode::When { predicate, node } => {
                if predicate.evaluate(ctx) {
                    node.render_keyboard(ctx)
                } else {
                    Ok(Vec::new())
                }
            }
            leaf => match leaf.as_widget() {
                Some(widget) => widget.render_keyboard(ctx),
                None => Ok(Vec::new()),
            },
        }
    }

    fn process_callback(&self, payload: &str, ctx: &mut ActionContext<'_>) -> DialogResult<bool> {
        match self {
            KeyboardNode::Group { children, .. } => {
                for child in children {
                    if child.process_callback(payload, ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            KeyboardNode::When { node, .. } => node.process_callback(payload, ctx),
            leaf => match leaf.as_widget() {
                Some(widget) => widget.process_callback(payload, ctx),
                None => Ok(false),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn button(id: &str) -> KeyboardNode {
        Button::new(id, id.to_uppercase(), Action::cancel()).into()
    }

    fn render(node: &KeyboardNode, data: Value) -> Vec<Vec<String>> {
        let Value::Object(data) = data else {
            unreachable!()
        };
        let widget_data = Map::new();
        node.render_keyboard(&RenderContext::new(&data, &widget_data))
            .unwrap()
            .into_iter()
            .map(|row| row.into_iter().map(|b| b.text).collect())
            .collect()
    }

    #[test]
    fn test_layouts() {
        let children = || vec![button("a"), button("b"), button("c")];
        assert_eq!(render(&KeyboardNode::row(children()), json!({})), vec![vec!["A", "B", "C"]]);
        assert_eq!(
            render(&KeyboardNode::column(children()), json!({})),
            vec![vec!["A"], vec!["B"], vec!["C"]]
        );
        assert_eq!(
            render(&KeyboardNode::width(children(), 2), json!({})),
            vec![vec!["A", "B"], vec!["C"]]
        );
        assert_eq!(
            render(
                &KeyboardNode::group([KeyboardNode::row(children()), button("d")]),
                json!({})
            ),
            vec![vec!["A", "B", "C"], vec!["D"]]
        );
    }

    #[test]
    fn test_hidden_buttons_leave_no_empty_rows() {
        let node = KeyboardNode::column([
            button("a").when(Predicate::key("admin")),
            button("b"),
        ]);
        assert_eq!(render(&node, json!({"admin": false})), vec![vec!["B"]]);
    }

    #[test]
    fn test_url_button() {
        let node: KeyboardNode = Url::new("Docs", TextNode::format("{site}/docs")).into();
        let data = json!({"site": "https://example.com"});
        let Value::Object(data) = data else {
            unreachable!()
        };
        let widget_data = Map::new();
        let rows = node
            .render_keyboard(&RenderContext::new(&data, &widget_data))
            .unwrap();
        assert_eq!(rows[0][0], InlineButton::url("Docs", "https://example.com/docs"));
    }
}
