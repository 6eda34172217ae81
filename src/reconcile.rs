//! Message reconciliation
//!
//! Decides the smallest provider action that turns the previously delivered
//! message into the new render, then carries it out with the fallbacks the
//! provider's error classes call for.

mod transport;

pub use transport::{LoggingTransport, MessageTransport, TransportError, TransportErrorKind};

use crate::dialog::ShowMode;
use crate::message::{Markup, MediaAttachment, RenderedMessage, SentMessageRecord};
use serde::{Deserialize, Serialize};

/// Part of a message an edit changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    Text,
    Caption,
    Media,
    /// Only the keyboard differs
    Markup,
}

/// Provider action for one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Send,
    DeleteThenSend,
    NoOp,
    Edit(EditKind),
}

/// Outcome of reconciling one message
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Action actually taken, after fallbacks
    pub action: Decision,
    pub record: SentMessageRecord,
}

/// Failure on one message of a screen
#[derive(Debug, Clone)]
pub struct DeliveryFailure {
    pub index: usize,
    pub error: TransportError,
}

/// Outcome of reconciling every message of a screen
#[derive(Debug, Clone, Default)]
pub struct ScreenDelivery {
    /// Records by part index; `None` where nothing was delivered
    pub records: Vec<Option<SentMessageRecord>>,
    pub actions: Vec<Decision>,
    pub failures: Vec<DeliveryFailure>,
}

/// Pure decision for one message
///
/// `mode` must already be resolved; `Auto` is treated like `Edit`.
pub fn decide(
    previous: Option<&SentMessageRecord>,
    new: &RenderedMessage,
    mode: ShowMode,
) -> Decision {
    let Some(previous) = previous else {
        return Decision::Send;
    };
    match mode {
        ShowMode::Send => return Decision::Send,
        ShowMode::DeleteAndSend => return Decision::DeleteThenSend,
        ShowMode::NoUpdate => return Decision::NoOp,
        ShowMode::Auto | ShowMode::Edit => {}
    }

    let new_media = new.media.as_ref().map(MediaAttachment::identity);
    let text_changed = previous.text != new.text;
    let markup_changed = previous.markup_key != new.markup.equality_key();
    let presence_changed = previous.has_media() != new_media.is_some();
    let media_changed = new_media.is_some() && previous.media_id != new_media;

    if !(text_changed || markup_changed || presence_changed || media_changed) {
        return Decision::NoOp;
    }

    // A message cannot gain or lose media, move chats or take a reply keyboard in place
    if presence_changed
        || previous.chat_id != new.chat_id
        || previous.has_reply_keyboard
        || new.markup.is_reply_keyboard()
    {
        return Decision::DeleteThenSend;
    }

    let kind = match (new_media.is_some(), media_changed, text_changed) {
        (true, true, _) => EditKind::Media,
        (true, false, true) => EditKind::Caption,
        (false, _, true) => EditKind::Text,
        _ => EditKind::Markup,
    };
    Decision::Edit(kind)
}

/// Reconcile one message against its predecessor
pub async fn reconcile_message<T: MessageTransport + ?Sized>(
    transport: &T,
    previous: Option<&SentMessageRecord>,
    new: &RenderedMessage,
    mode: ShowMode,
) -> Result<Delivery, TransportError> {
    let decision = decide(previous, new, mode);
    tracing::debug!(?decision, chat_id = new.chat_id, "Reconciling message");

    match (decision, previous) {
        (Decision::NoOp, Some(previous)) => Ok(Delivery {
            action: Decision::NoOp,
            record: previous.clone(),
        }),
        (Decision::DeleteThenSend, Some(previous)) => {
            delete_safe(transport, previous).await?;
            let record = transport.send(new).await?;
            Ok(Delivery {
                action: Decision::DeleteThenSend,
                record,
            })
        }
        (Decision::Edit(kind), Some(previous)) => {
            match transport.edit(previous, new, kind).await {
                Ok(record) => Ok(Delivery {
                    action: Decision::Edit(kind),
                    record,
                }),
                Err(e) if e.kind == TransportErrorKind::NotModified => Ok(Delivery {
                    action: Decision::NoOp,
                    record: previous.clone(),
                }),
                Err(e) if e.kind.falls_back_to_send() => {
                    tracing::debug!(error = %e, "Edit impossible, sending a new message");
                    let record = transport.send(new).await?;
                    Ok(Delivery {
                        action: Decision::Send,
                        record,
                    })
                }
                Err(e) => Err(e),
            }
        }
        (_, previous) => {
            if let Some(previous) = previous {
                clear_markup_safe(transport, previous).await?;
            }
            let record = transport.send(new).await?;
            Ok(Delivery {
                action: Decision::Send,
                record,
            })
        }
    }
}

/// Reconcile every message of a screen, pairing old and new by position
///
/// Failures are collected per message so later messages are still attempted.
pub async fn deliver_screen<T: MessageTransport + ?Sized>(
    transport: &T,
    previous: &[Option<SentMessageRecord>],
    rendered: &[RenderedMessage],
    mode: ShowMode,
) -> ScreenDelivery {
    let mut delivery = ScreenDelivery::default();

    for (index, message) in rendered.iter().enumerate() {
        let old = previous.get(index).and_then(Option::as_ref);
        match reconcile_message(transport, old, message, mode).await {
            Ok(done) => {
                delivery.actions.push(done.action);
                delivery.records.push(Some(done.record));
            }
            Err(error) => {
                tracing::error!(index, error = %error, "Failed to deliver message");
                // Keep tracking the old message so the next show can clean it up
                delivery.records.push(old.cloned());
                delivery.failures.push(DeliveryFailure { index, error });
            }
        }
    }
    while delivery.records.last().is_some_and(Option::is_none) {
        delivery.records.pop();
    }

    let surplus = previous.iter().enumerate().skip(rendered.len());
    for (index, old) in surplus.filter_map(|(index, old)| Some((index, old.as_ref()?))) {
        let result = if mode == ShowMode::Send {
            clear_markup_safe(transport, old).await
        } else {
            delete_safe(transport, old).await
        };
        if let Err(error) = result {
            tracing::warn!(index, error = %error, "Failed to remove surplus message");
            delivery.failures.push(DeliveryFailure { index, error });
        }
    }

    delivery
}

/// Remove keyboards from every delivered message; used when the stack empties
pub async fn clear_screen<T: MessageTransport + ?Sized>(
    transport: &T,
    previous: &[Option<SentMessageRecord>],
) -> Vec<DeliveryFailure> {
    let mut failures = Vec::new();
    let delivered = previous.iter().enumerate();
    for (index, old) in delivered.filter_map(|(index, old)| Some((index, old.as_ref()?))) {
        if let Err(error) = clear_markup_safe(transport, old).await {
            tracing::warn!(index, error = %error, "Failed to clear markup");
            failures.push(DeliveryFailure { index, error });
        }
    }
    failures
}

/// Delete a message, clearing its markup when it cannot be deleted
pub async fn delete_safe<T: MessageTransport + ?Sized>(
    transport: &T,
    previous: &SentMessageRecord,
) -> Result<(), TransportError> {
    match transport.delete(previous).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind.falls_back_to_clear() => {
            tracing::debug!(message_id = previous.message_id, error = %e, "Delete impossible, clearing markup");
            clear_markup_safe(transport, previous).await
        }
        Err(e) => Err(e),
    }
}

/// Clear inline markup, ignoring messages that are gone or already bare
pub async fn clear_markup_safe<T: MessageTransport + ?Sized>(
    transport: &T,
    previous: &SentMessageRecord,
) -> Result<(), TransportError> {
    if previous.has_reply_keyboard || previous.markup_key == Markup::None.equality_key() {
        return Ok(());
    }
    match transport.clear_markup(previous).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind != TransportErrorKind::Other => Ok(()),
        Err(e) => Err(e),
    }
}
