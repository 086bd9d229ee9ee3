//! Stateless segments; each splits together with its upstream

use std::ops::ControlFlow;
use std::sync::Arc;

use super::{BoxSegment, Segment, Sink, Step};
use crate::error::{Result, StreamError};
use crate::pipeline::stage::{ActionFn, FlatMapFn, MapFn, PredicateFn};
use crate::source::{BoxSource, Characteristics};

/// Head of every segment chain
pub(crate) struct SourceSegment<T> {
    source: BoxSource<T>,
}

impl<T> SourceSegment<T> {
    pub(crate) fn new(source: BoxSource<T>) -> Self {
        Self { source }
    }
}

impl<T: Send + 'static> Segment<T> for SourceSegment<T> {
    fn advance(&mut self, sink: &mut Sink<'_, T>) -> Result<Step> {
        match self.source.next() {
            Some(item) => Ok(Step::from_flow(sink(item)?)),
            None => Ok(Step::Done),
        }
    }

    fn try_split(&mut self) -> Option<BoxSegment<T>> {
        let prefix = self.source.try_split()?;
        Some(Box::new(SourceSegment::new(prefix)))
    }

    fn estimate_size(&self) -> Option<u64> {
        self.source.estimate_size()
    }

    fn characteristics(&self) -> Characteristics {
        self.source.characteristics()
    }
}

pub(crate) struct MapSegment<I, O> {
    upstream: BoxSegment<I>,
    mapper: MapFn<I, O>,
}

impl<I, O> MapSegment<I, O> {
    pub(crate) fn new(upstream: BoxSegment<I>, mapper: MapFn<I, O>) -> Self {
        Self { upstream, mapper }
    }
}

impl<I, O> Segment<O> for MapSegment<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn advance(&mut self, sink: &mut Sink<'_, O>) -> Result<Step> {
        let mapper = &self.mapper;
        self.upstream
            .advance(&mut |item| sink(mapper(item).map_err(StreamError::callback)?))
    }

    fn try_split(&mut self) -> Option<BoxSegment<O>> {
        let prefix = self.upstream.try_split()?;
        Some(Box::new(MapSegment::new(prefix, Arc::clone(&self.mapper))))
    }

    fn estimate_size(&self) -> Option<u64> {
        self.upstream.estimate_size()
    }

    fn characteristics(&self) -> Characteristics {
        self.upstream.characteristics().without(
            Characteristics::SORTED | Characteristics::DISTINCT | Characteristics::NONNULL,
        )
    }
}

pub(crate) struct FlatMapSegment<I, O> {
    upstream: BoxSegment<I>,
    mapper: FlatMapFn<I, O>,
}

impl<I, O> FlatMapSegment<I, O> {
    pub(crate) fn new(upstream: BoxSegment<I>, mapper: FlatMapFn<I, O>) -> Self {
        Self { upstream, mapper }
    }
}

impl<I, O> Segment<O> for FlatMapSegment<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn advance(&mut self, sink: &mut Sink<'_, O>) -> Result<Step> {
        let mapper = &self.mapper;
        self.upstream.advance(&mut |item| {
            for expanded in mapper(item).map_err(StreamError::callback)? {
                if sink(expanded)?.is_break() {
                    return Ok(ControlFlow::Break(()));
                }
            }
            Ok(ControlFlow::Continue(()))
        })
    }

    fn try_split(&mut self) -> Option<BoxSegment<O>> {
        let prefix = self.upstream.try_split()?;
        Some(Box::new(FlatMapSegment::new(prefix, Arc::clone(&self.mapper))))
    }

    fn estimate_size(&self) -> Option<u64> {
        self.upstream.estimate_size()
    }

    fn characteristics(&self) -> Characteristics {
        // SUBSIZED stays: it tracks the source's split cost, not output counts
        self.upstream.characteristics().without(
            Characteristics::SORTED
                | Characteristics::DISTINCT
                | Characteristics::SIZED
                | Characteristics::NONNULL,
        )
    }
}

pub(crate) struct FilterSegment<T> {
    upstream: BoxSegment<T>,
    predicate: PredicateFn<T>,
}

impl<T> FilterSegment<T> {
    pub(crate) fn new(upstream: BoxSegment<T>, predicate: PredicateFn<T>) -> Self {
        Self {
            upstream,
            predicate,
        }
    }
}

impl<T: Send + 'static> Segment<T> for FilterSegment<T> {
    fn advance(&mut self, sink: &mut Sink<'_, T>) -> Result<Step> {
        let predicate = &self.predicate;
        self.upstream.advance(&mut |item| {
            if predicate(&item).map_err(StreamError::callback)? {
                sink(item)
            } else {
                Ok(ControlFlow::Continue(()))
            }
        })
    }

    fn try_split(&mut self) -> Option<BoxSegment<T>> {
        let prefix = self.upstream.try_split()?;
        Some(Box::new(FilterSegment::new(
            prefix,
            Arc::clone(&self.predicate),
        )))
    }

    fn estimate_size(&self) -> Option<u64> {
        self.upstream.estimate_size()
    }

    fn characteristics(&self) -> Characteristics {
        self.upstream.characteristics().without(Characteristics::SIZED)
    }
}

pub(crate) struct PeekSegment<T> {
    upstream: BoxSegment<T>,
    action: ActionFn<T>,
}

impl<T> PeekSegment<T> {
    pub(crate) fn new(upstream: BoxSegment<T>, action: ActionFn<T>) -> Self {
        Self { upstream, action }
    }
}

impl<T: Send + 'static> Segment<T> for PeekSegment<T> {
    fn advance(&mut self, sink: &mut Sink<'_, T>) -> Result<Step> {
        let action = &self.action;
        self.upstream.advance(&mut |item| {
            action(&item).map_err(StreamError::callback)?;
            sink(item)
        })
    }

    fn try_split(&mut self) -> Option<BoxSegment<T>> {
        let prefix = self.upstream.try_split()?;
        Some(Box::new(PeekSegment::new(prefix, Arc::clone(&self.action))))
    }

    fn estimate_size(&self) -> Option<u64> {
        self.upstream.estimate_size()
    }

    fn characteristics(&self) -> Characteristics {
        self.upstream.characteristics()
    }
}
