use super::{MediaWidget, Predicate, RenderContext};
use crate::error::{DialogError, DialogResult};
use crate::message::MediaAttachment;
use serde_json::Value;
use std::sync::Arc;

/// Media node
#[derive(Clone)]
pub enum MediaNode {
    Static(MediaAttachment),
    /// Attachment deserialized from the data value at `key`; null hides it
    Dynamic { key: String },
    When {
        predicate: Predicate,
        node: Box<MediaNode>,
    },
    Custom(Arc<dyn MediaWidget>),
}

impl MediaNode {
    pub fn dynamic(key: impl Into<String>) -> Self {
        Self::Dynamic { key: key.into() }
    }

    pub fn when(self, predicate: Predicate) -> Self {
        Self::When {
            predicate,
            node: Box::new(self),
        }
    }
}

impl From<MediaAttachment> for MediaNode {
    fn from(media: MediaAttachment) -> Self {
        Self::Static(media)
    }
}

impl MediaWidget for MediaNode {
    fn render_media(&self, ctx: &RenderContext<'_>) -> DialogResult<Option<MediaAttachment>> {
        match self {
            MediaNode::Static(media) => Ok(Some(media.clone())),
            MediaNode::Dynamic { key } => match ctx.lookup(key) {
                None | Some(Value::Null) => Ok(None),
                Some(value) => serde_json::from_value(value.clone())
                    .map(Some)
                    .map_err(|e| DialogError::render(format!("media at {key:?}: {e}"))),
            },
            MediaNode::When { predicate, node } => {
                if predicate.evaluate(ctx) {
                    node.render_media(ctx)
                } else {
                    Ok(None)
                }
            }
            MediaNode::Custom(widget) => widget.render_media(ctx),
        }
    }
}
