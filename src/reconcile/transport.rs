//! Outbound provider contract and error classification

use super::EditKind;
use crate::message::{RenderedMessage, SentMessageRecord};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Provider error with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_modified(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::NotModified, message)
    }

    pub fn cant_edit(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::CantEdit, message)
    }

    pub fn cant_delete(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::CantDelete, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::NotFound, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    /// Classify a provider error description
    pub fn classify(description: impl Into<String>) -> Self {
        let message = description.into();
        let lower = message.to_lowercase();
        let kind = if lower.contains("message is not modified") {
            TransportErrorKind::NotModified
        } else if lower.contains("message can't be edited") {
            TransportErrorKind::CantEdit
        } else if lower.contains("message can't be deleted") {
            TransportErrorKind::CantDelete
        } else if lower.contains("message to edit not found")
            || lower.contains("message to delete not found")
            || lower.contains("message not found")
        {
            TransportErrorKind::NotFound
        } else {
            TransportErrorKind::Other
        };
        Self { kind, message }
    }
}

/// Provider error classes the reconciler knows how to recover from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Edit would not change anything
    NotModified,
    CantEdit,
    CantDelete,
    /// Message no longer exists
    NotFound,
    /// Anything else - propagated
    Other,
}

impl TransportErrorKind {
    /// Edit failures answered by sending a fresh message
    pub fn falls_back_to_send(self) -> bool {
        matches!(self, Self::CantEdit | Self::NotFound)
    }

    /// Delete failures answered by clearing the markup instead
    pub fn falls_back_to_clear(self) -> bool {
        matches!(self, Self::CantDelete | Self::NotFound)
    }
}

/// Outbound message operations performed by the provider
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, message: &RenderedMessage) -> Result<SentMessageRecord, TransportError>;

    /// Change `previous` in place; `kind` says which part changed
    async fn edit(
        &self,
        previous: &SentMessageRecord,
        message: &RenderedMessage,
        kind: EditKind,
    ) -> Result<SentMessageRecord, TransportError>;

    async fn delete(&self, previous: &SentMessageRecord) -> Result<(), TransportError>;

    async fn clear_markup(&self, previous: &SentMessageRecord) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: MessageTransport + ?Sized> MessageTransport for Arc<T> {
    async fn send(&self, message: &RenderedMessage) -> Result<SentMessageRecord, TransportError> {
        (**self).send(message).await
    }

    async fn edit(
        &self,
        previous: &SentMessageRecord,
        message: &RenderedMessage,
        kind: EditKind,
    ) -> Result<SentMessageRecord, TransportError> {
        (**self).edit(previous, message, kind).await
    }

    async fn delete(&self, previous: &SentMessageRecord) -> Result<(), TransportError> {
        (**self).delete(previous).await
    }

    async fn clear_markup(&self, previous: &SentMessageRecord) -> Result<(), TransportError> {
        (**self).clear_markup(previous).await
    }
}

/// Logging wrapper for transports
pub struct LoggingTransport<T> {
    inner: T,
}

impl<T: MessageTransport> LoggingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    fn log<R>(operation: &str, chat_id: i64, started: std::time::Instant, result: &Result<R, TransportError>) {
        let duration_ms = started.elapsed().as_millis();
        match result {
            Ok(_) => tracing::debug!(operation, chat_id, duration_ms = %duration_ms, "Provider call completed"),
            Err(e) => tracing::warn!(
                operation,
                chat_id,
                duration_ms = %duration_ms,
                kind = ?e.kind,
                error = %e.message,
                "Provider call failed"
            ),
        }
    }
}

#[async_trait]
impl<T: MessageTransport> MessageTransport for LoggingTransport<T> {
    async fn send(&self, message: &RenderedMessage) -> Result<SentMessageRecord, TransportError> {
        let started = std::time::Instant::now();
        let result = self.inner.send(message).await;
        Self::log("send", message.chat_id, started, &result);
        result
    }

    async fn edit(
        &self,
        previous: &SentMessageRecord,
        message: &RenderedMessage,
        kind: EditKind,
    ) -> Result<SentMessageRecord, TransportError> {
        let started = std::time::Instant::now();
        let result = self.inner.edit(previous, message, kind).await;
        Self::log("edit", previous.chat_id, started, &result);
        result
    }

    async fn delete(&self, previous: &SentMessageRecord) -> Result<(), TransportError> {
        let started = std::time::Instant::now();
        let result = self.inner.delete(previous).await;
        Self::log("delete", previous.chat_id, started, &result);
        result
    }

    async fn clear_markup(&self, previous: &SentMessageRecord) -> Result<(), TransportError> {
        let started = std::time::Instant::now();
        let result = self.inner.clear_markup(previous).await;
        Self::log("clear_markup", previous.chat_id, started, &result);
        result
    }
}
