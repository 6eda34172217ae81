use super::InputWidget;
use crate::error::DialogResult;
use crate::manager::ActionContext;
use std::sync::Arc;

pub type InputHandler = Arc<dyn Fn(&mut ActionContext<'_>, &str) -> DialogResult<()> + Send + Sync>;

/// Passes every text message to a handler
#[derive(Clone)]
pub struct MessageInput {
    handler: InputHandler,
}

impl MessageInput {
    pub fn new(
        handler: impl Fn(&mut ActionContext<'_>, &str) -> DialogResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }
}

impl InputWidget for MessageInput {
    fn process_message(&self, text: &str, ctx: &mut ActionContext<'_>) -> DialogResult<bool> {
        (self.handler)(ctx, text)?;
        Ok(true)
    }
}
