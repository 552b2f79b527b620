//! Undo/redo log.
//!
//! Every mutation of an aspect is recorded as an explicit [`Change`] value.
//! Changes made between `start_action` and `end_action` form one
//! [`Transaction`], undone and redone as a unit.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::component::{Component, Placement};
use super::connection::ComponentId;

/// One reversible mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    /// Component inserted at `position` in z-order.
    Add {
        id: ComponentId,
        position: usize,
        component: Component,
    },
    /// Component taken out of z-order `position`.
    Remove {
        id: ComponentId,
        position: usize,
        component: Component,
    },
    Move {
        id: ComponentId,
        dx: i64,
        dy: i64,
    },
    Rotate {
        id: ComponentId,
        from: Placement,
        to: Placement,
    },
    UpdateProperties {
        id: ComponentId,
        old: BTreeMap<String, String>,
        new: BTreeMap<String, String>,
    },
}

impl Change {
    pub fn component_id(&self) -> ComponentId {
        match self {
            Change::Add { id, .. }
            | Change::Remove { id, .. }
            | Change::Move { id, .. }
            | Change::Rotate { id, .. }
            | Change::UpdateProperties { id, .. } => *id,
        }
    }
}

/// Changes that are undone and redone together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    changes: Vec<Change>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Committed transactions plus a cursor. Entries before the cursor are
/// applied; entries at and after it can be redone.
#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    transactions: Vec<Transaction>,
    cursor: usize,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transaction, discarding any redo history.
    pub fn commit(&mut self, transaction: Transaction) {
        self.transactions.truncate(self.cursor);
        self.transactions.push(transaction);
        self.cursor = self.transactions.len();
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.transactions.len()
    }

    /// Step back over the most recent applied transaction.
    pub fn step_back(&mut self) -> Option<Transaction> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.transactions.get(self.cursor).cloned()
    }

    /// Step forward over the next undone transaction.
    pub fn step_forward(&mut self) -> Option<Transaction> {
        let transaction = self.transactions.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(transaction)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moved(n: u64) -> Transaction {
        let mut t = Transaction::new();
        t.push(Change::Move {
            id: ComponentId(n),
            dx: 1,
            dy: 0,
        });
        t
    }

    #[test]
    fn test_cursor_tracks_undo_redo() {
        let mut log = ActionLog::new();
        assert!(!log.can_undo());
        log.commit(moved(1));
        log.commit(moved(2));
        assert_eq!(log.cursor(), 2);

        let t = log.step_back().unwrap();
        assert_eq!(t.changes()[0].component_id(), ComponentId(2));
        assert!(log.can_redo());

        let t = log.step_forward().unwrap();
        assert_eq!(t.changes()[0].component_id(), ComponentId(2));
        assert!(!log.can_redo());
        assert!(log.step_forward().is_none());
    }

    #[test]
    fn test_commit_truncates_redo_history() {
        let mut log = ActionLog::new();
        log.commit(moved(1));
        log.commit(moved(2));
        log.step_back();
        log.step_back();
        log.commit(moved(3));
        assert_eq!(log.len(), 1);
        assert!(!log.can_redo());
        assert_eq!(log.step_back().unwrap().changes()[0].component_id(), ComponentId(3));
    }
}
