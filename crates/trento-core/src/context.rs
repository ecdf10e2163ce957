// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request context passed explicitly through every gatherer and operator.
//!
//! A [`Context`] bundles a cancellation token, an optional deadline and an
//! optional per-request [`FactsCache`]. Children derived with
//! [`Context::with_cancel`] (or a deadline) are cancelled together with
//! their parent; cancelling a child never reaches the parent.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cache::FactsCache;

/// Why a context is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context canceled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
    cache: Option<Arc<FactsCache>>,
}

impl Context {
    /// A root context that is never done on its own.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a child that can be cancelled independently of its parent.
    pub fn with_cancel(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
            cache: self.cache.clone(),
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child with a deadline. The effective deadline never extends
    /// past the parent's.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut child = self.with_cancel();
        child.deadline = Some(match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        });
        child
    }

    /// Attach a memoization cache shared by everything using this context.
    pub fn with_cache(mut self, cache: Arc<FactsCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cache(&self) -> Option<&FactsCache> {
        self.cache.as_deref()
    }

    /// `None` while the context is live.
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.token.is_cancelled())
            .field("deadline", &self.deadline)
            .field("has_cache", &self.cache.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_is_live() {
        let ctx = Context::background();
        assert!(ctx.err().is_none());
        assert!(ctx.cache().is_none());
        assert!(ctx.deadline().is_none());
    }

    #[tokio::test]
    async fn test_parent_cancel_reaches_child() {
        let parent = Context::background();
        let child = parent.with_cancel();
        parent.cancel();
        assert_eq!(child.err(), Some(ContextError::Cancelled));
        child.done().await;
    }

    #[tokio::test]
    async fn test_child_cancel_does_not_reach_parent() {
        let parent = Context::background();
        let child = parent.with_cancel();
        child.cancel();
        assert!(child.is_done());
        assert!(parent.err().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let ctx = Context::background().with_timeout(Duration::from_secs(2));
        assert!(ctx.err().is_none());
        ctx.done().await;
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_deadline_capped_by_parent() {
        let parent = Context::background().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(child.err(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_cache_is_inherited_by_children() {
        let ctx = Context::background().with_cache(Arc::new(FactsCache::new()));
        let child = ctx.with_cancel();
        assert!(child.cache().is_some());
    }
}
