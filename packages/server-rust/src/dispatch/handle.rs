//! Completion handles and error types for dispatched tasks.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::{JoinError, JoinHandle};

/// Submission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatch pool is shutting down")]
    ShuttingDown,
    #[error("dispatch pool requires a tokio runtime")]
    NoRuntime,
}

/// How a task submitted through [`DispatchPool::submit`](super::DispatchPool::submit) failed.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The task returned an error.
    #[error("task failed: {0}")]
    Failed(#[from] anyhow::Error),
    /// The task panicked; carries the panic message.
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The runtime dropped the task before it finished.
    #[error("task was cancelled before completion")]
    Cancelled,
}

impl TaskError {
    pub(crate) fn from_join_error(err: JoinError) -> Self {
        if err.is_panic() {
            TaskError::Panicked(panic_message(err.into_panic().as_ref()))
        } else {
            TaskError::Cancelled
        }
    }

    pub(crate) fn outcome_label(&self) -> &'static str {
        match self {
            TaskError::Failed(_) => "failed",
            TaskError::Panicked(_) => "panicked",
            TaskError::Cancelled => "cancelled",
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Resolves when a dispatched task completes.
///
/// Awaiting the handle never fails: if the runtime drops the task, the
/// handle resolves to the fallback chosen by the submitting operation.
/// Dropping the handle does not cancel the task.
#[must_use = "dropping the handle detaches the task"]
pub struct DispatchHandle<T> {
    inner: JoinHandle<T>,
    on_join_error: fn(JoinError) -> T,
}

impl<T> DispatchHandle<T> {
    pub(crate) fn new(inner: JoinHandle<T>, on_join_error: fn(JoinError) -> T) -> Self {
        Self {
            inner,
            on_join_error,
        }
    }

    /// Whether the task has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

impl<T> Future for DispatchHandle<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll(cx) {
            Poll::Ready(Ok(value)) => Poll::Ready(value),
            Poll::Ready(Err(err)) => Poll::Ready((this.on_join_error)(err)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> std::fmt::Debug for DispatchHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchHandle")
            .field("finished", &self.inner.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_extracts_strings() {
        let s: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(s.as_ref()), "boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(owned.as_ref()), "owned boom");
        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    #[tokio::test]
    async fn handle_resolves_to_task_output() {
        let handle = DispatchHandle::new(tokio::spawn(async { 7 }), |_| 0);
        assert_eq!(handle.await, 7);
    }

    #[tokio::test]
    async fn handle_uses_fallback_when_task_is_aborted() {
        let inner = tokio::spawn(async {
            std::future::pending::<()>().await;
            7
        });
        inner.abort();
        let handle = DispatchHandle::new(inner, |_| -1);
        assert_eq!(handle.await, -1);
    }

    #[tokio::test]
    async fn join_error_classification() {
        let inner = tokio::spawn(async { std::future::pending::<()>().await });
        inner.abort();
        let err = inner.await.unwrap_err();
        assert!(matches!(TaskError::from_join_error(err), TaskError::Cancelled));

        let panicked = tokio::spawn(async { panic!("kaboom") }).await.unwrap_err();
        match TaskError::from_join_error(panicked) {
            TaskError::Panicked(msg) => assert_eq!(msg, "kaboom"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
