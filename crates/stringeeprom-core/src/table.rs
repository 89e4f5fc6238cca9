//! Device string table mirror
//!
//! Holds the ordered collection of named string slots mirrored from the
//! device. Only the session engine mutates the table; collaborators read
//! through owned snapshots.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One named string slot, addressed by 1-based position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Position in the device table (1-based, contiguous)
    pub index: usize,
    /// Display name; defaults to the decimal position when unconfigured
    pub label: String,
    /// Current slot contents (possibly empty)
    pub value: String,
}

/// Table access errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("Position {position} outside table of size {size}")]
    OutOfRange { position: usize, size: usize },
}

/// In-memory mirror of the device's string table
#[derive(Debug, Default)]
pub struct EntryTable {
    entries: Vec<Entry>,
}

impl EntryTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the table holds no slots
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the table with `n` fresh entries.
    ///
    /// The label for position `i` (1-based) comes from `labeler(i)`;
    /// values start empty.
    pub fn resize(&mut self, n: usize, labeler: impl Fn(usize) -> String) {
        self.entries = (1..=n)
            .map(|i| Entry {
                index: i,
                label: labeler(i),
                value: String::new(),
            })
            .collect();
    }

    /// Drop all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Set the value of the slot at `position` (1-based)
    pub fn set_value(&mut self, position: usize, value: String) -> Result<(), TableError> {
        let size = self.entries.len();
        let entry = position
            .checked_sub(1)
            .and_then(|i| self.entries.get_mut(i))
            .ok_or(TableError::OutOfRange { position, size })?;
        entry.value = value;
        Ok(())
    }

    /// Get the entry at `position` (1-based)
    pub fn get(&self, position: usize) -> Result<&Entry, TableError> {
        let size = self.entries.len();
        position
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .ok_or(TableError::OutOfRange { position, size })
    }

    /// Owned copy of all entries for read-only rendering
    pub fn snapshot(&self) -> Vec<Entry> {
        self.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resize_populates_positions_and_labels() {
        let mut table = EntryTable::new();
        table.resize(3, |i| format!("label {}", i));

        assert_eq!(table.len(), 3);
        for (i, entry) in table.snapshot().iter().enumerate() {
            assert_eq!(entry.index, i + 1);
            assert_eq!(entry.label, format!("label {}", i + 1));
            assert_eq!(entry.value, "");
        }
    }

    #[test]
    fn test_resize_to_zero() {
        let mut table = EntryTable::new();
        table.resize(5, |i| i.to_string());
        table.resize(0, |i| i.to_string());
        assert!(table.is_empty());
    }

    #[test]
    fn test_resize_discards_old_values() {
        let mut table = EntryTable::new();
        table.resize(2, |i| i.to_string());
        table.set_value(1, "kept?".to_string()).unwrap();

        table.resize(2, |i| i.to_string());
        assert_eq!(table.get(1).unwrap().value, "");
    }

    #[test]
    fn test_set_and_get() {
        let mut table = EntryTable::new();
        table.resize(2, |i| i.to_string());

        table.set_value(2, "B".to_string()).unwrap();
        assert_eq!(table.get(2).unwrap().value, "B");
        assert_eq!(table.get(1).unwrap().value, "");
    }

    #[test]
    fn test_out_of_range() {
        let mut table = EntryTable::new();
        table.resize(3, |i| i.to_string());

        assert_eq!(
            table.set_value(9, "x".to_string()),
            Err(TableError::OutOfRange {
                position: 9,
                size: 3
            })
        );
        // Positions are 1-based; 0 is never valid
        assert_eq!(
            table.set_value(0, "x".to_string()),
            Err(TableError::OutOfRange {
                position: 0,
                size: 3
            })
        );
        assert!(table.get(4).is_err());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut table = EntryTable::new();
        table.resize(1, |i| i.to_string());

        let snap = table.snapshot();
        table.set_value(1, "changed".to_string()).unwrap();
        assert_eq!(snap[0].value, "");
    }
}
