use super::{CountTables, Productive, StateFields, StateId};

/// A single reversible mutation. Records are replayed in reverse order.
#[derive(Clone, Debug)]
pub(crate) enum UndoRecord {
    Fields(StateId, StateFields),
    Edge {
        state: StateId,
        symbol: usize,
        target: Option<StateId>,
        count: u32,
    },
    Productive(StateId, Productive),
    Column {
        state: StateId,
        accepting: Box<[f64]>,
        rejecting: Box<[f64]>,
    },
    Tables(CountTables),
}

/// Everything needed to revert one call to [`super::Automaton::tree_merge`]. Hand it back to
/// [`super::Automaton::undo_merge`] to restore the automaton, or drop it to make the merge
/// permanent.
#[derive(Debug)]
#[must_use = "dropping an UndoInfo makes the merge permanent"]
pub struct UndoInfo {
    pub(crate) records: Vec<UndoRecord>,
    pub(crate) live: usize,
    pub(crate) cached_score: Option<(&'static str, f64)>,
    pub(crate) productive_counts: [usize; 2],
}

impl UndoInfo {
    /// Number of recorded mutations.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Free list of record buffers, scoped to a single automaton so that concurrently running
/// searches never share one.
#[derive(Clone, Debug, Default)]
pub(crate) struct UndoPool {
    free: Vec<Vec<UndoRecord>>,
}

impl UndoPool {
    const MAX_FREE: usize = 16;

    pub(crate) fn take(&mut self) -> Vec<UndoRecord> {
        self.free.pop().unwrap_or_default()
    }

    pub(crate) fn give(&mut self, mut records: Vec<UndoRecord>) {
        if self.free.len() < Self::MAX_FREE {
            records.clear();
            self.free.push(records);
        }
    }
}
