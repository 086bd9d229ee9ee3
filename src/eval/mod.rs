//! Pipeline evaluation
//!
//! A terminal operation plans the stage chain into a tree of [`Segment`]s and
//! drives it. Sequential evaluation pushes every element from the source
//! through the segments into the terminal's sink. Parallel evaluation runs on
//! a fork-join pool: stateless segments split together with their source,
//! while stateful operations become synchronization points that materialize
//! their upstream before evaluation continues (see `barrier`).

mod barrier;
mod cancel;
mod fork_join;
mod segment;
mod stateful;
pub(crate) mod terminal;

use std::ops::ControlFlow;
use std::sync::Arc;

pub(crate) use cancel::CancellationToken;
pub(crate) use segment::SourceSegment;

use crate::error::Result;
use crate::parallel::{ExecutionStrategy, SchedulerHandle};
use crate::pipeline::stage::{Conversion, Op, Stage};
use crate::source::{Characteristics, Source};
use segment::{FilterSegment, FlatMapSegment, MapSegment, PeekSegment};
use terminal::Terminal;

/// Downstream of a segment; returns `Break` once it needs no more elements
pub(crate) type Sink<'a, T> = dyn FnMut(T) -> Result<ControlFlow<()>> + 'a;

/// Outcome of one [`Segment::advance`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// More elements may follow
    Continue,
    /// The upstream is exhausted or the sink asked to stop
    Done,
}

impl Step {
    pub(crate) fn from_flow(flow: ControlFlow<()>) -> Self {
        match flow {
            ControlFlow::Continue(()) => Step::Continue,
            ControlFlow::Break(()) => Step::Done,
        }
    }
}

/// Planned stage chain yielding elements of type `T`
pub(crate) trait Segment<T>: Send {
    /// Pull one element from the source through this segment, pushing
    /// whatever it produces into `sink`
    fn advance(&mut self, sink: &mut Sink<'_, T>) -> Result<Step>;

    /// Split off a prefix together with the source; only stateless segments split
    fn try_split(&mut self) -> Option<BoxSegment<T>> {
        None
    }

    /// Remaining source elements; drives splitting decisions
    fn estimate_size(&self) -> Option<u64>;

    fn characteristics(&self) -> Characteristics;
}

pub(crate) type BoxSegment<T> = Box<dyn Segment<T>>;

/// Pull elements through `segment` until it is done, checking `token` between elements
pub(crate) fn drive<T>(
    segment: &mut dyn Segment<T>,
    token: &CancellationToken,
    sink: &mut Sink<'_, T>,
) -> Result<()> {
    loop {
        token.check()?;
        if segment.advance(sink)? == Step::Done {
            return Ok(());
        }
    }
}

/// Where a stage chain is being planned
pub(crate) struct PlanContext<'a> {
    parallel: Option<&'a ParallelContext>,
}

/// Scheduler and cancellation scope of a parallel evaluation
pub(crate) struct ParallelContext {
    pub(crate) scheduler: SchedulerHandle,
    pub(crate) token: CancellationToken,
}

impl ParallelContext {
    pub(crate) fn new(scheduler: SchedulerHandle) -> Self {
        Self {
            scheduler,
            token: CancellationToken::new(),
        }
    }
}

impl PlanContext<'static> {
    pub(crate) fn sequential() -> Self {
        Self { parallel: None }
    }
}

impl<'a> PlanContext<'a> {
    pub(crate) fn parallel(context: &'a ParallelContext) -> Self {
        Self {
            parallel: Some(context),
        }
    }
}

impl<T: Send + 'static> Stage<T> {
    pub(crate) fn plan(self, context: &PlanContext<'_>) -> Result<BoxSegment<T>> {
        match self {
            Stage::Source(mut source) => {
                if let Some(parallel) = context.parallel {
                    source.set_batch_unit(parallel.scheduler.splitting().unsized_leaf_size);
                }
                Ok(Box::new(SourceSegment::new(source)))
            }
            Stage::Convert(converted) => converted.plan(context),
            Stage::Op { upstream, op } => {
                let upstream = upstream.plan(context)?;
                plan_op(upstream, op, context)
            }
        }
    }
}

fn plan_op<T: Send + 'static>(
    upstream: BoxSegment<T>,
    op: Op<T>,
    context: &PlanContext<'_>,
) -> Result<BoxSegment<T>> {
    match (op, context.parallel) {
        (Op::Filter(predicate), _) => Ok(Box::new(FilterSegment::new(upstream, predicate))),
        (Op::Peek(action), _) => Ok(Box::new(PeekSegment::new(upstream, action))),
        (op, Some(parallel)) => barrier::synchronize(upstream, op, parallel),
        (op, None) => Ok(stateful::chain(upstream, op)),
    }
}

/// Segment applying a type-changing stage
pub(crate) fn convert<I, O>(upstream: BoxSegment<I>, conversion: Conversion<I, O>) -> BoxSegment<O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    match conversion {
        Conversion::Map(mapper) => Box::new(MapSegment::new(upstream, mapper)),
        Conversion::FlatMap(mapper) => Box::new(FlatMapSegment::new(upstream, mapper)),
    }
}

/// Evaluate `stage` with `terminal` and finish the result
pub(crate) fn run<T, Tm>(stage: Stage<T>, terminal: Tm, strategy: &ExecutionStrategy) -> Result<Tm::Output>
where
    T: Send + 'static,
    Tm: Terminal<T>,
{
    let terminal = Arc::new(terminal);
    let partial = evaluate(stage, Arc::clone(&terminal), strategy)?;
    terminal.finish(partial)
}

fn evaluate<T, Tm>(stage: Stage<T>, terminal: Arc<Tm>, strategy: &ExecutionStrategy) -> Result<Tm::Partial>
where
    T: Send + 'static,
    Tm: Terminal<T>,
{
    let Some(scheduler) = strategy.scheduler() else {
        tracing::debug!("Evaluating {} sequentially", terminal.name());
        let mut segment = stage.plan(&PlanContext::sequential())?;
        return terminal.leaf(segment.as_mut(), &CancellationToken::new());
    };

    tracing::debug!(
        "Evaluating {} in parallel ({} workers)",
        terminal.name(),
        scheduler.parallelism()
    );
    let parallel = ParallelContext::new(scheduler.clone());
    scheduler.invoke(move || {
        let segment = stage.plan(&PlanContext::parallel(&parallel))?;
        fork_join::evaluate(segment, terminal, &parallel)
    })?
}
