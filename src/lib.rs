//! dialog_nav - navigation stacks for chat dialogs
//!
//! Keeps a persistent stack of screens per conversation scope, renders
//! screens into outbound messages and reconciles them against what was
//! delivered before (edit, resend or delete-and-resend).

pub mod access;
pub mod config;
pub mod dialog;
pub mod error;
pub mod event;
pub mod manager;
pub mod message;
pub mod reconcile;
pub mod runtime;
pub mod store;
pub mod widgets;

pub use access::{DefaultAccessValidator, StackAccessValidator};
pub use config::DialogConfig;
pub use dialog::{
    Dialog, DialogRegistry, LaunchMode, MarkupStyle, ShowMode, StartMode, State, Window,
};
pub use error::{DialogError, DialogResult};
pub use event::{BackgroundUpdate, Chat, ChatKind, EventPayload, InboundEvent};
pub use manager::{ActionContext, BackgroundManager, DialogManager, NavCommand};
pub use message::{Markup, MediaAttachment, RenderedMessage, SentMessageRecord};
pub use reconcile::{LoggingTransport, MessageTransport, TransportError, TransportErrorKind};
pub use runtime::{DialogRuntime, DialogRuntimeBuilder, EventOutcome, SqliteRuntime};
pub use store::{
    AccessSettings, Context, DialogStore, KeyValueStorage, MemoryStorage, ScopeId, SqliteStorage,
    Stack,
};
