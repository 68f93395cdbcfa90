// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cursor state machine shared by tables and indexes.
//
// A cursor moves through three states:
//
// ```text
// NoCursor --step--> Positioned --step--> Positioned ... --step (no more)--> Exhausted
//    ^                                                                          |
//    +-------------------------- step / reset ---------------------------------+
// ```
//
// Entering `Exhausted` releases everything the cursor held; stepping again
// starts a new pass from the first record. The cursor does not hold an
// engine handle between steps. It buffers one batch of records and resumes
// with "primary key after the last one returned", which is how every
// backend paginates (see `crate::backend`).

use std::collections::VecDeque;

use crate::backend::Record;
use crate::error::DataResult;

/// Observable position of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No iteration in progress.
    NoCursor,
    /// At least one record has been returned and more may follow.
    Positioned,
    /// The last pass ran off the end; the next step starts over.
    Exhausted,
}

/// Exclusively owned iteration position over a table or index.
#[derive(Debug)]
pub struct Cursor {
    state: CursorState,
    buffer: VecDeque<Record>,
    last_key: Option<String>,
    more: bool,
    batch_size: usize,
}

impl Cursor {
    /// A cursor that refills `batch_size` records at a time (minimum 1).
    pub fn new(batch_size: usize) -> Self {
        Self {
            state: CursorState::NoCursor,
            buffer: VecDeque::new(),
            last_key: None,
            more: true,
            batch_size: batch_size.max(1),
        }
    }

    /// Current state.
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Whether a pass is in progress.
    pub fn is_open(&self) -> bool {
        self.state == CursorState::Positioned
    }

    /// Advance by one record.
    ///
    /// `fetch(after, limit)` must return up to `limit` records whose primary
    /// key sorts strictly after `after` (`None` = from the beginning). A fetch
    /// error closes the cursor before it is returned.
    pub fn step<F>(&mut self, mut fetch: F) -> DataResult<Option<Record>>
    where
        F: FnMut(Option<&str>, usize) -> DataResult<Vec<Record>>,
    {
        if self.state != CursorState::Positioned {
            self.reset();
            self.state = CursorState::Positioned;
        }

        if self.buffer.is_empty() && self.more {
            let batch = match fetch(self.last_key.as_deref(), self.batch_size) {
                Ok(batch) => batch,
                Err(err) => {
                    self.reset();
                    return Err(err);
                }
            };
            self.more = batch.len() >= self.batch_size;
            self.buffer.extend(batch);
        }

        match self.buffer.pop_front() {
            Some(record) => {
                self.last_key = Some(record.0.clone());
                Ok(Some(record))
            }
            None => {
                self.release();
                self.state = CursorState::Exhausted;
                Ok(None)
            }
        }
    }

    /// Abandon any pass in progress.
    pub fn reset(&mut self) {
        self.release();
        self.state = CursorState::NoCursor;
    }

    fn release(&mut self) {
        self.buffer.clear();
        self.last_key = None;
        self.more = true;
    }
}

/// Anything that can be stepped like a cursor.
pub trait RecordSource {
    /// Advance by one record; `Ok(None)` ends the pass.
    fn step(&mut self) -> DataResult<Option<Record>>;

    /// Abandon the pass in progress so the next step starts from the beginning.
    fn reset(&mut self);

    /// Start a fresh pass and return it as an iterator.
    fn records(&mut self) -> Records<'_, Self>
    where
        Self: Sized,
    {
        self.reset();
        Records {
            source: self,
            finished: false,
        }
    }
}

/// Fused iterator over one pass of a [`RecordSource`].
///
/// Dropping it early leaves the cursor positioned; the next
/// [`RecordSource::records`] call starts over anyway.
pub struct Records<'s, S: RecordSource> {
    source: &'s mut S,
    finished: bool,
}

impl<S: RecordSource> Iterator for Records<'_, S> {
    type Item = DataResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.source.step() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

impl<S: RecordSource> std::iter::FusedIterator for Records<'_, S> {}
