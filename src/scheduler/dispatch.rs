//! The ordered queue of pending entries
//!
//! Total order: priority ascending (lower value = more urgent), then entry
//! id ascending (submission order as the tie-break). Insertion keeps the
//! order with a stable insertion-point scan; expected queue sizes make the
//! O(n) scan a non-issue.

use crate::entry::{EntryId, EntrySnapshot};
use crate::error::QueueError;

/// A pending entry together with whatever the owner needs to dispatch it
/// (the queue core stores the boxed action and result channel here).
#[derive(Debug)]
pub(crate) struct Pending<P> {
    pub entry: EntrySnapshot,
    pub payload: P,
}

#[derive(Debug)]
pub(crate) struct DispatchQueue<P> {
    items: Vec<Pending<P>>,
}

impl<P> DispatchQueue<P> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Insert at the position preserving (priority asc, id asc).
    pub fn insert(&mut self, item: Pending<P>) {
        let mut index = 0;
        while let Some(existing) = self.items.get(index) {
            let ahead = existing.entry.priority < item.entry.priority
                || (existing.entry.priority == item.entry.priority
                    && existing.entry.id < item.entry.id);
            if !ahead {
                break;
            }
            index += 1;
        }
        self.items.insert(index, item);
    }

    /// The most urgent pending entry, without removing it.
    pub fn peek_head(&self) -> Option<&Pending<P>> {
        self.items.first()
    }

    pub fn head_mut(&mut self) -> Option<&mut Pending<P>> {
        self.items.first_mut()
    }

    /// Remove and return the most urgent pending entry.
    pub fn pop_head(&mut self) -> Option<Pending<P>> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    /// Remove an arbitrary still-pending entry. No side effect beyond queue
    /// membership; resolving the removed entry's ticket is the caller's job.
    pub fn remove(&mut self, id: EntryId) -> Result<Pending<P>, QueueError> {
        let position = self
            .items
            .iter()
            .position(|item| item.entry.id == id)
            .ok_or(QueueError::EntryNotFound(id))?;
        Ok(self.items.remove(position))
    }

    /// Drain every pending entry, head first.
    pub fn drain_all(&mut self) -> Vec<Pending<P>> {
        self.items.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pending<P>> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
