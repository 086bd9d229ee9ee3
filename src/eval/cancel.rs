use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Result, StreamError};

/// Cooperative cancellation flag shared by the tasks of one evaluation.
///
/// Tokens form a tree: cancelling a token cancels every token derived from it
/// with [`CancellationToken::child`], but not its parent.
#[derive(Clone, Default)]
pub(crate) struct CancellationToken {
    node: Arc<Node>,
}

#[derive(Default)]
struct Node {
    cancelled: AtomicBool,
    parent: Option<Arc<Node>>,
}

impl CancellationToken {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn child(&self) -> Self {
        Self {
            node: Arc::new(Node {
                cancelled: AtomicBool::new(false),
                parent: Some(Arc::clone(&self.node)),
            }),
        }
    }

    pub(crate) fn cancel(&self) {
        self.node.cancelled.store(true, Ordering::Release);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        let mut node = Some(&self.node);
        while let Some(current) = node {
            if current.cancelled.load(Ordering::Acquire) {
                return true;
            }
            node = current.parent.as_ref();
        }
        false
    }

    /// `Err(Cancelled)` once this token or an ancestor is cancelled
    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(StreamError::Cancelled)
        } else {
            Ok(())
        }
    }
}
