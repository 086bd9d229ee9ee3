//! Recursive fork-join evaluation of a planned segment
//!
//! ```text
//!              compute(segment)
//!                    |
//!      should_split && try_split?
//!         /                    \
//!   fork(remainder)       compute(prefix)     <- runs on this worker
//!         \                    /
//!          join  ->  merge(left, right)  ->  settle
//! ```
//!
//! Short-circuiting terminals cancel work that can no longer change the
//! result: unordered ones cancel the whole evaluation, ordered ones only the
//! tasks to the right of the satisfied leaf (its frontier).

use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::terminal::{ShortCircuit, Terminal};
use super::{BoxSegment, CancellationToken, ParallelContext};
use crate::error::{Result, StreamError};
use crate::parallel::SplitPolicy;
use crate::parallel::task;

/// Per-task view of one evaluation
struct Branch<T, Tm> {
    terminal: Arc<Tm>,
    policy: SplitPolicy,
    /// Cancels every task of the evaluation
    root: CancellationToken,
    /// Checked by this task; a child of `root`
    token: CancellationToken,
    _elements: PhantomData<fn(T)>,
}

impl<T, Tm> Branch<T, Tm> {
    fn with_token(&self, token: CancellationToken) -> Self {
        Self {
            terminal: Arc::clone(&self.terminal),
            policy: self.policy,
            root: self.root.clone(),
            token,
            _elements: PhantomData,
        }
    }
}

/// Tokens of the right siblings of every split enclosing a task
struct Frontier {
    token: CancellationToken,
    rest: Option<Arc<Frontier>>,
}

fn cancel_frontier(frontier: &Option<Arc<Frontier>>) {
    let mut next = frontier.as_deref();
    while let Some(current) = next {
        current.token.cancel();
        next = current.rest.as_deref();
    }
}

/// Evaluate `segment` on the current pool and return the root partial result
pub(super) fn evaluate<T, Tm>(
    segment: BoxSegment<T>,
    terminal: Arc<Tm>,
    context: &ParallelContext,
) -> Result<Tm::Partial>
where
    T: Send + 'static,
    Tm: Terminal<T>,
{
    let scheduler = &context.scheduler;
    let policy = SplitPolicy::new(
        segment.estimate_size(),
        segment.characteristics(),
        scheduler.parallelism(),
        scheduler.splitting(),
    );
    tracing::trace!(
        "Fork-join {} over {:?} elements, leaf threshold {}",
        terminal.name(),
        segment.estimate_size(),
        policy.threshold()
    );

    let root = context.token.child();
    let branch = Branch {
        terminal,
        policy,
        token: root.clone(),
        root,
        _elements: PhantomData,
    };
    compute(segment, branch, None)
}

fn compute<T, Tm>(
    segment: BoxSegment<T>,
    branch: Branch<T, Tm>,
    frontier: Option<Arc<Frontier>>,
) -> Result<Tm::Partial>
where
    T: Send + 'static,
    Tm: Terminal<T>,
{
    let result = split_or_leaf(segment, &branch, &frontier);
    settle(&branch, result, &frontier)
}

fn split_or_leaf<T, Tm>(
    mut segment: BoxSegment<T>,
    branch: &Branch<T, Tm>,
    frontier: &Option<Arc<Frontier>>,
) -> Result<Tm::Partial>
where
    T: Send + 'static,
    Tm: Terminal<T>,
{
    branch.token.check()?;

    let prefix = if branch.policy.should_split(segment.estimate_size()) {
        segment.try_split()
    } else {
        None
    };
    let Some(prefix) = prefix else {
        return branch.terminal.leaf(segment.as_mut(), &branch.token);
    };

    let ordered = branch.terminal.short_circuit() == ShortCircuit::Ordered;
    let right_token = if ordered {
        branch.token.child()
    } else {
        branch.token.clone()
    };

    let right_branch = branch.with_token(right_token.clone());
    let right_frontier = frontier.clone();
    let right = task::fork(move || compute(segment, right_branch, right_frontier));

    let left_frontier = if ordered {
        Some(Arc::new(Frontier {
            token: right_token,
            rest: frontier.clone(),
        }))
    } else {
        frontier.clone()
    };
    let left_branch = branch.with_token(branch.token.clone());
    let left = panic::catch_unwind(AssertUnwindSafe(move || {
        compute(prefix, left_branch, left_frontier)
    }))
    .unwrap_or_else(|payload| Err(StreamError::from_panic(payload)));

    let right = right
        .join()
        .unwrap_or_else(|payload| Err(StreamError::from_panic(payload)));

    merge::<T, Tm>(branch.terminal.as_ref(), left, right)
}

/// Combine sibling results, `left` first in encounter order
fn merge<T, Tm>(
    terminal: &Tm,
    left: Result<Tm::Partial>,
    right: Result<Tm::Partial>,
) -> Result<Tm::Partial>
where
    Tm: Terminal<T>,
{
    let mode = terminal.short_circuit();
    match (left, right) {
        (Ok(left), right) if mode != ShortCircuit::None && terminal.satisfied(&left) => {
            if let Err(error) = right {
                discard(mode, error);
            }
            Ok(left)
        }
        (left, Ok(right)) if mode == ShortCircuit::Unordered && terminal.satisfied(&right) => {
            if let Err(error) = left {
                discard(mode, error);
            }
            Ok(right)
        }
        (Ok(left), Ok(right)) => terminal.combine(left, right),
        (Err(left), Err(right)) => Err(left.absorb(right)),
        (Err(error), Ok(_)) | (Ok(_), Err(error)) => Err(error),
    }
}

/// Report an error that lost to a sibling's decided result
fn discard(mode: ShortCircuit, error: StreamError) {
    if error.is_cancellation() {
        return;
    }
    match mode {
        ShortCircuit::Unordered => {
            tracing::warn!("Suppressed error from sibling task after a match: {}", error)
        }
        // Elements right of a decided prefix are never part of the result
        ShortCircuit::Ordered | ShortCircuit::None => {
            tracing::debug!("Ignored error right of a decided prefix: {}", error)
        }
    }
}

/// Cancel the work a finished task made pointless
fn settle<T, Tm>(
    branch: &Branch<T, Tm>,
    result: Result<Tm::Partial>,
    frontier: &Option<Arc<Frontier>>,
) -> Result<Tm::Partial>
where
    Tm: Terminal<T>,
{
    let mode = branch.terminal.short_circuit();
    let decided = match &result {
        Ok(partial) => mode != ShortCircuit::None && branch.terminal.satisfied(partial),
        Err(error) => !error.is_cancellation(),
    };
    if decided {
        match mode {
            ShortCircuit::Ordered => cancel_frontier(frontier),
            ShortCircuit::Unordered | ShortCircuit::None => branch.root.cancel(),
        }
    }
    result
}
