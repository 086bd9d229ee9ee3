use std::collections::VecDeque;
use std::fmt;
use std::ops::ControlFlow;

use crate::error::{Result, StreamError};
use crate::eval::{BoxSegment, Step};

/// Pull-based iterator over a sequentially evaluated pipeline
///
/// Elements are pulled from the source one at a time; a flat-map expansion
/// is buffered. A failure is yielded once, after the elements produced
/// before it, and ends the iteration.
pub struct PipelineIter<T> {
    segment: Option<BoxSegment<T>>,
    buffer: VecDeque<T>,
    pending: Option<StreamError>,
}

impl<T> PipelineIter<T> {
    pub(crate) fn new(segment: BoxSegment<T>) -> Self {
        Self {
            segment: Some(segment),
            buffer: VecDeque::new(),
            pending: None,
        }
    }

    pub(crate) fn failed(error: StreamError) -> Self {
        Self {
            segment: None,
            buffer: VecDeque::new(),
            pending: Some(error),
        }
    }
}

impl<T> Iterator for PipelineIter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if let Some(error) = self.pending.take() {
                return Some(Err(error));
            }

            let segment = self.segment.as_mut()?;
            let buffer = &mut self.buffer;
            let step = segment.advance(&mut |item| {
                buffer.push_back(item);
                Ok(ControlFlow::Continue(()))
            });
            match step {
                Ok(Step::Continue) => {}
                Ok(Step::Done) => self.segment = None,
                Err(error) => {
                    self.segment = None;
                    self.pending = Some(error);
                }
            }
        }
    }
}

impl<T> fmt::Debug for PipelineIter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineIter")
            .field("exhausted", &self.segment.is_none())
            .field("buffered", &self.buffer.len())
            .finish()
    }
}
