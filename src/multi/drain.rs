// src/multi/drain.rs

use crate::transfer::{Completion, Exchange};

use std::collections::VecDeque;
use std::fmt;
use std::io::Write;

/// A terminal transfer waiting to be reported, with the resources it still
/// holds until then.
pub(crate) struct PendingCompletion {
  pub(crate) completion: Completion,
  pub(crate) exchange: Option<Box<dyn Exchange>>,
  pub(crate) sink: Box<dyn Write + Send>,
}

impl fmt::Debug for PendingCompletion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PendingCompletion")
      .field("completion", &self.completion)
      .field("holds_exchange", &self.exchange.is_some())
      .finish_non_exhaustive()
  }
}

/// Lazy iterator over finished transfers, returned by `Multi::poll_completions`.
///
/// Each completion is yielded once and its exchange and sink are released as
/// it is yielded. Items not pulled stay queued for the next call.
pub struct Drain<'a> {
  queue: &'a mut VecDeque<PendingCompletion>,
}

impl<'a> Drain<'a> {
  pub(crate) fn new(queue: &'a mut VecDeque<PendingCompletion>) -> Self {
    Self { queue }
  }
}

impl Iterator for Drain<'_> {
  type Item = Completion;

  fn next(&mut self) -> Option<Completion> {
    let PendingCompletion {
      completion,
      exchange,
      mut sink,
    } = self.queue.pop_front()?;
    if let Err(e) = sink.flush() {
      tracing::warn!(handle = %completion.handle, error = %e, "Flushing transfer sink failed");
    }
    drop(exchange);
    drop(sink);
    tracing::trace!(handle = %completion.handle, status = completion.status.kind(), "Completion drained");
    Some(completion)
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    (self.queue.len(), Some(self.queue.len()))
  }
}
