use super::text::TextNode;
use super::{LinkPreviewWidget, RenderContext, TextWidget};
use crate::error::DialogResult;
use crate::message::LinkPreviewOptions;

/// Link preview directive for the window's message
#[derive(Clone, Default)]
pub struct LinkPreview {
    url: Option<TextNode>,
    is_disabled: bool,
    prefer_small_media: bool,
    prefer_large_media: bool,
    show_above_text: bool,
}

impl LinkPreview {
    /// Preview of a specific url rather than the first one in the text
    pub fn url(url: impl Into<TextNode>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn disabled() -> Self {
        Self {
            is_disabled: true,
            ..Self::default()
        }
    }

    pub fn prefer_small_media(mut self) -> Self {
        self.prefer_small_media = true;
        self.prefer_large_media = false;
        self
    }

    pub fn prefer_large_media(mut self) -> Self {
        self.prefer_large_media = true;
        self.prefer_small_media = false;
        self
    }

    pub fn show_above_text(mut self) -> Self {
        self.show_above_text = true;
        self
    }
}

impl LinkPreviewWidget for LinkPreview {
    fn render_link_preview(
        &self,
        ctx: &RenderContext<'_>,
    ) -> DialogResult<Option<LinkPreviewOptions>> {
        let url = match &self.url {
            Some(node) => Some(node.render_text(ctx)?).filter(|url| !url.is_empty()),
            None => None,
        };
        Ok(Some(LinkPreviewOptions {
            is_disabled: self.is_disabled,
            url,
            prefer_small_media: self.prefer_small_media,
            prefer_large_media: self.prefer_large_media,
            show_above_text: self.show_above_text,
        }))
    }
}
