//! Sequential stateful segments
//!
//! These never split. In parallel mode the same operations run as
//! synchronization points instead (see `barrier`).

use std::collections::VecDeque;
use std::ops::ControlFlow;

use super::{BoxSegment, Segment, Sink, Step};
use crate::error::{Result, StreamError};
use crate::pipeline::stage::{Comparator, Op, PredicateFn};
use crate::source::Characteristics;

/// Chain a sequential segment applying `op` onto `upstream`
pub(crate) fn chain<T: Send + 'static>(upstream: BoxSegment<T>, op: Op<T>) -> BoxSegment<T> {
    match op {
        Op::Filter(predicate) => Box::new(super::FilterSegment::new(upstream, predicate)),
        Op::Peek(action) => Box::new(super::PeekSegment::new(upstream, action)),
        Op::Sorted(comparator) => Box::new(SortedSegment {
            upstream,
            comparator,
            buffer: None,
        }),
        Op::Distinct(factory) => Box::new(DistinctSegment {
            upstream,
            first_seen: factory(),
        }),
        Op::Limit(count) => Box::new(LimitSegment::new(upstream, count)),
        Op::Skip(count) => Box::new(SkipSegment {
            upstream,
            remaining: count,
        }),
        Op::TakeWhile(predicate) => Box::new(TakeWhileSegment::new(upstream, predicate)),
        Op::DropWhile(predicate) => Box::new(DropWhileSegment {
            upstream,
            predicate,
            dropping: true,
        }),
    }
}

/// Collect every remaining element of `segment`
pub(crate) fn drain<T>(segment: &mut dyn Segment<T>) -> Result<Vec<T>> {
    let mut items = Vec::new();
    loop {
        let step = segment.advance(&mut |item| {
            items.push(item);
            Ok(ControlFlow::Continue(()))
        })?;
        if step == Step::Done {
            return Ok(items);
        }
    }
}

struct SortedSegment<T> {
    upstream: BoxSegment<T>,
    comparator: Comparator<T>,
    buffer: Option<VecDeque<T>>,
}

impl<T: Send + 'static> Segment<T> for SortedSegment<T> {
    fn advance(&mut self, sink: &mut Sink<'_, T>) -> Result<Step> {
        if self.buffer.is_none() {
            let mut items = drain(self.upstream.as_mut())?;
            let comparator = &self.comparator;
            items.sort_by(|a, b| comparator(a, b));
            self.buffer = Some(items.into());
        }
        match self.buffer.as_mut().and_then(VecDeque::pop_front) {
            Some(item) => Ok(Step::from_flow(sink(item)?)),
            None => Ok(Step::Done),
        }
    }

    fn estimate_size(&self) -> Option<u64> {
        match &self.buffer {
            Some(buffer) => Some(buffer.len() as u64),
            None => self.upstream.estimate_size(),
        }
    }

    fn characteristics(&self) -> Characteristics {
        self.upstream.characteristics() | Characteristics::ORDERED | Characteristics::SORTED
    }
}

struct DistinctSegment<T> {
    upstream: BoxSegment<T>,
    first_seen: Box<dyn FnMut(&T) -> bool + Send>,
}

impl<T: Send + 'static> Segment<T> for DistinctSegment<T> {
    fn advance(&mut self, sink: &mut Sink<'_, T>) -> Result<Step> {
        let first_seen = &mut self.first_seen;
        self.upstream.advance(&mut |item| {
            if first_seen(&item) {
                sink(item)
            } else {
                Ok(ControlFlow::Continue(()))
            }
        })
    }

    fn estimate_size(&self) -> Option<u64> {
        self.upstream.estimate_size()
    }

    fn characteristics(&self) -> Characteristics {
        self.upstream.characteristics().without(Characteristics::SIZED) | Characteristics::DISTINCT
    }
}

pub(crate) struct LimitSegment<T> {
    upstream: BoxSegment<T>,
    remaining: u64,
}

impl<T> LimitSegment<T> {
    pub(crate) fn new(upstream: BoxSegment<T>, count: u64) -> Self {
        Self {
            upstream,
            remaining: count,
        }
    }
}

impl<T: Send + 'static> Segment<T> for LimitSegment<T> {
    fn advance(&mut self, sink: &mut Sink<'_, T>) -> Result<Step> {
        if self.remaining == 0 {
            return Ok(Step::Done);
        }
        let remaining = &mut self.remaining;
        let step = self.upstream.advance(&mut |item| {
            if *remaining == 0 {
                return Ok(ControlFlow::Break(()));
            }
            *remaining -= 1;
            let flow = sink(item)?;
            // Stop pulling as soon as the quota is filled
            if *remaining == 0 {
                Ok(ControlFlow::Break(()))
            } else {
                Ok(flow)
            }
        })?;
        Ok(if self.remaining == 0 { Step::Done } else { step })
    }

    fn estimate_size(&self) -> Option<u64> {
        self.upstream
            .estimate_size()
            .map(|size| size.min(self.remaining))
    }

    fn characteristics(&self) -> Characteristics {
        self.upstream.characteristics().without(Characteristics::SIZED)
    }
}

struct SkipSegment<T> {
    upstream: BoxSegment<T>,
    remaining: u64,
}

impl<T: Send + 'static> Segment<T> for SkipSegment<T> {
    fn advance(&mut self, sink: &mut Sink<'_, T>) -> Result<Step> {
        let remaining = &mut self.remaining;
        self.upstream.advance(&mut |item| {
            if *remaining > 0 {
                *remaining -= 1;
                Ok(ControlFlow::Continue(()))
            } else {
                sink(item)
            }
        })
    }

    fn estimate_size(&self) -> Option<u64> {
        self.upstream
            .estimate_size()
            .map(|size| size.saturating_sub(self.remaining))
    }

    fn characteristics(&self) -> Characteristics {
        self.upstream.characteristics().without(Characteristics::SIZED)
    }
}

pub(crate) struct TakeWhileSegment<T> {
    upstream: BoxSegment<T>,
    predicate: PredicateFn<T>,
    finished: bool,
}

impl<T> TakeWhileSegment<T> {
    pub(crate) fn new(upstream: BoxSegment<T>, predicate: PredicateFn<T>) -> Self {
        Self {
            upstream,
            predicate,
            finished: false,
        }
    }
}

impl<T: Send + 'static> Segment<T> for TakeWhileSegment<T> {
    fn advance(&mut self, sink: &mut Sink<'_, T>) -> Result<Step> {
        if self.finished {
            return Ok(Step::Done);
        }
        let predicate = &self.predicate;
        let finished = &mut self.finished;
        self.upstream.advance(&mut |item| {
            if predicate(&item).map_err(StreamError::callback)? {
                sink(item)
            } else {
                *finished = true;
                Ok(ControlFlow::Break(()))
            }
        })
    }

    fn estimate_size(&self) -> Option<u64> {
        self.upstream.estimate_size()
    }

    fn characteristics(&self) -> Characteristics {
        self.upstream.characteristics().without(Characteristics::SIZED)
    }
}

struct DropWhileSegment<T> {
    upstream: BoxSegment<T>,
    predicate: PredicateFn<T>,
    dropping: bool,
}

impl<T: Send + 'static> Segment<T> for DropWhileSegment<T> {
    fn advance(&mut self, sink: &mut Sink<'_, T>) -> Result<Step> {
        let predicate = &self.predicate;
        let dropping = &mut self.dropping;
        self.upstream.advance(&mut |item| {
            if *dropping && predicate(&item).map_err(StreamError::callback)? {
                return Ok(ControlFlow::Continue(()));
            }
            *dropping = false;
            sink(item)
        })
    }

    fn estimate_size(&self) -> Option<u64> {
        self.upstream.estimate_size()
    }

    fn characteristics(&self) -> Characteristics {
        self.upstream.characteristics().without(Characteristics::SIZED)
    }
}
