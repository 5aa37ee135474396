//! Linear edit history.
//!
//! Each record describes one applied edit as `(op, location, text)`, where
//! `text` carries `\n` for crossed block separators so re-applying or
//! inverting a record restores block structure, not just chars. Undo walks
//! the applied prefix backwards handing out inverted records; pushing a new
//! edit drops the unapplied (redo) tail.

use crate::context::TextLoc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditOp {
    Insert,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditRecord {
    pub op: EditOp,
    /// Location `text` occupies: its start for an insertion, the collapse
    /// point for a deletion.
    pub loc: TextLoc,
    pub text: String,
}

impl EditRecord {
    /// The record that exactly reverses this one.
    pub fn inverted(&self) -> EditRecord {
        EditRecord {
            op: match self.op {
                EditOp::Insert => EditOp::Delete,
                EditOp::Delete => EditOp::Insert,
            },
            loc: self.loc,
            text: self.text.clone(),
        }
    }
}

#[derive(Debug)]
pub struct EditHistory {
    records: VecDeque<EditRecord>,
    /// Records `[0, applied)` are in effect; the rest is the redo tail.
    applied: usize,
    capacity: usize,
}

impl Default for EditHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl EditHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            records: VecDeque::new(),
            applied: 0,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        self.applied > 0
    }

    pub fn can_redo(&self) -> bool {
        self.applied < self.records.len()
    }

    /// Record an applied edit. Forks the timeline: any redo tail is gone.
    /// The oldest record falls off once the capacity is reached.
    pub fn push(&mut self, record: EditRecord) {
        self.records.truncate(self.applied);
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
        self.applied = self.records.len();
    }

    /// Step back, returning the record that reverses the last applied edit.
    pub fn undo(&mut self) -> Option<EditRecord> {
        if self.applied == 0 {
            return None;
        }
        self.applied -= 1;
        Some(self.records[self.applied].inverted())
    }

    /// Step forward, returning the next unapplied record as recorded.
    pub fn redo(&mut self) -> Option<EditRecord> {
        if self.applied == self.records.len() {
            return None;
        }
        let record = self.records[self.applied].clone();
        self.applied += 1;
        Some(record)
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.applied = 0;
    }
}
