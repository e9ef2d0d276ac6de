//! Cancellable, deadline-bound execution scopes.
//!
//! A [`Scope`] travels through every store operation. Operations derive a child scope
//! bounded by their own timeout, so the effective deadline is always the earliest one in
//! the chain, and cancelling any ancestor cancels every descendant.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use docvault::scope::Scope;
//!
//! let request = Scope::with_timeout(Duration::from_secs(30));
//! let donor = donors.find(&request, "f47ac10b").await?;
//! ```

use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError, Weak},
    time::Duration,
};

use tokio::{sync::watch, time::Instant};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Cancellation flag of one scope, linked to the flags of the scopes derived from it.
#[derive(Debug)]
struct CancelToken {
    flag: watch::Sender<bool>,
    children: Mutex<Vec<Weak<CancelToken>>>,
}

impl CancelToken {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            flag: watch::channel(false).0,
            children: Mutex::new(Vec::new()),
        })
    }

    fn child(&self) -> Arc<Self> {
        let child = Self::new();

        // Registered under the lock so a concurrent cancel either sees the child or has
        // already raised the flag read below.
        let mut children = self.children.lock().unwrap_or_else(PoisonError::into_inner);
        children.retain(|weak| weak.strong_count() > 0);
        children.push(Arc::downgrade(&child));
        if self.is_cancelled() {
            child.flag.send_replace(true);
        }

        child
    }

    fn cancel(&self) {
        self.flag.send_replace(true);

        let children = std::mem::take(&mut *self.children.lock().unwrap_or_else(PoisonError::into_inner));
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }
}

/// A cancellable execution scope with an optional deadline.
///
/// Cloning a scope yields a handle to the same scope: cancelling either clone cancels
/// both. Use [`Scope::child`] to derive a narrower scope.
#[derive(Clone, Debug)]
pub struct Scope {
    deadline: Option<Instant>,
    budget: Option<Duration>,
    token: Arc<CancelToken>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::background()
    }
}

impl Scope {
    /// A root scope with no deadline.
    pub fn background() -> Self {
        Self {
            deadline: None,
            budget: None,
            token: CancelToken::new(),
        }
    }

    /// A root scope that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().child(timeout)
    }

    /// Derives a child scope that expires `timeout` from now, or at the parent's
    /// deadline if that comes first. Cancelling the parent cancels the child.
    pub fn child(&self, timeout: Duration) -> Self {
        let deadline = match (self.deadline, Instant::now().checked_add(timeout)) {
            (Some(parent), Some(own)) => Some(parent.min(own)),
            (parent, own) => parent.or(own),
        };

        Self {
            deadline,
            budget: Some(match self.budget {
                Some(parent) => parent.min(timeout),
                None => timeout,
            }),
            token: self.token.child(),
        }
    }

    /// Cancels this scope and every scope derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` if this scope or any of its ancestors has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The instant at which this scope expires, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, or `None` for an unbounded scope.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Resolves once this scope or one of its ancestors is cancelled.
    pub async fn cancelled(&self) {
        let mut receiver = self.token.flag.subscribe();
        // The sender lives as long as `self`, so this only returns once the flag is set.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }

    /// Drives `operation` to completion within this scope.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Cancelled`] if the scope is cancelled first and
    /// [`DocumentStoreError::Timeout`] if the deadline passes first. The in-flight
    /// future is dropped in both cases.
    pub async fn run<F, T>(&self, operation: F) -> DocumentStoreResult<T>
    where
        F: Future<Output = DocumentStoreResult<T>>,
    {
        if self.is_cancelled() {
            return Err(DocumentStoreError::Cancelled);
        }
        if self.remaining() == Some(Duration::ZERO) {
            return Err(self.timed_out());
        }

        let bounded = async {
            match self.deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, operation).await {
                    Ok(result) => result,
                    Err(_) => Err(self.timed_out()),
                },
                None => operation.await,
            }
        };

        tokio::select! {
            result = bounded => result,
            _ = self.cancelled() => Err(DocumentStoreError::Cancelled),
        }
    }

    fn timed_out(&self) -> DocumentStoreError {
        DocumentStoreError::Timeout(self.budget.unwrap_or_default())
    }
}
