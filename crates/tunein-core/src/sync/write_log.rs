//! Sequence of local writes, used to keep a slow remote read from
//! overwriting entries written while it was in flight.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::EntryId;

#[derive(Debug, Default)]
pub(crate) struct WriteLog {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    seq: u64,
    last_write: HashMap<EntryId, u64>,
    cleared_at: u64,
}

impl WriteLog {
    /// Current position; writes recorded afterwards compare greater.
    pub fn mark(&self) -> u64 {
        self.lock().seq
    }

    pub fn touch(&self, id: EntryId) {
        let mut state = self.lock();
        state.seq += 1;
        let seq = state.seq;
        state.last_write.insert(id, seq);
    }

    /// Record a wipe of every entry.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.seq += 1;
        state.cleared_at = state.seq;
        state.last_write.clear();
    }

    /// Ids written after `mark`, or `None` if the journal was wiped since.
    pub fn touched_since(&self, mark: u64) -> Option<HashSet<EntryId>> {
        let state = self.lock();
        if state.cleared_at > mark {
            return None;
        }
        Some(
            state
                .last_write
                .iter()
                .filter(|&(_, &seq)| seq > mark)
                .map(|(id, _)| *id)
                .collect(),
        )
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
