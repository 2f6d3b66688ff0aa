//! Bounded linear undo/redo history

use skrew_input::Operation;
use std::collections::VecDeque;

/// One committed state and the operations that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry<T> {
    pub state: T,
    pub operations: Vec<Operation>,
}

/// Linear history with a cursor
///
/// Adding while the cursor is behind the newest entry discards the redo
/// branch. Entries that fall out (redo branch or capacity eviction) are
/// handed back to the caller so their backing resources can be released.
#[derive(Debug)]
pub struct HistoryStore<T> {
    entries: VecDeque<HistoryEntry<T>>,
    cursor: usize,
    capacity: usize,
}

impl<T> HistoryStore<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: 0,
            capacity: capacity.max(1),
        }
    }

    /// Append a state after the cursor and move the cursor onto it
    ///
    /// Returns every entry removed by the operation.
    #[must_use = "dropped entries may own resources that need releasing"]
    pub fn add(&mut self, state: T, operations: Vec<Operation>) -> Vec<HistoryEntry<T>> {
        let mut dropped = Vec::new();
        if !self.entries.is_empty() {
            dropped.extend(self.entries.drain(self.cursor + 1..));
        }

        self.entries.push_back(HistoryEntry { state, operations });
        while self.entries.len() > self.capacity {
            dropped.extend(self.entries.pop_front());
        }
        self.cursor = self.entries.len() - 1;
        dropped
    }

    pub fn undo(&mut self) -> Option<&HistoryEntry<T>> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor)
    }

    pub fn redo(&mut self) -> Option<&HistoryEntry<T>> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.entries.get(self.cursor)
    }

    pub fn current(&self) -> Option<&HistoryEntry<T>> {
        self.entries.get(self.cursor)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry<T>> {
        self.entries.iter()
    }

    /// Operations from the first entry up to the cursor, in order
    pub fn applied_operations(&self) -> Vec<&Operation> {
        self.entries
            .iter()
            .take(self.cursor + 1)
            .flat_map(|entry| entry.operations.iter())
            .collect()
    }

    /// `State i/n: ops` line for the entry at the cursor
    pub fn status(&self) -> String {
        let ops = match self.current() {
            Some(entry) if !entry.operations.is_empty() => entry
                .operations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" -> "),
            _ => "Original".to_string(),
        };
        format!("State {}/{}: {}", self.cursor + 1, self.entries.len(), ops)
    }

    /// Remove everything, returning the entries
    pub fn clear(&mut self) -> Vec<HistoryEntry<T>> {
        self.cursor = 0;
        self.entries.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skrew_input::parse;

    fn ops(text: &str) -> Vec<Operation> {
        parse(text)
    }

    fn states(history: &HistoryStore<u32>) -> Vec<u32> {
        history.iter().map(|e| e.state).collect()
    }

    #[test]
    fn test_empty_store() {
        let mut history: HistoryStore<u32> = HistoryStore::new(5);
        assert!(history.is_empty());
        assert!(!history.can_undo());
        assert!(!history.can_redo());
        assert!(history.undo().is_none());
        assert!(history.redo().is_none());
        assert!(history.current().is_none());
    }

    #[test]
    fn test_undo_redo_moves_one_step() {
        let mut history = HistoryStore::new(10);
        for state in 0..3u32 {
            assert!(history.add(state, vec![]).is_empty());
        }
        assert_eq!(history.cursor(), 2);
        assert!(history.can_undo());
        assert!(!history.can_redo());

        assert_eq!(history.undo().map(|e| e.state), Some(1));
        assert_eq!(history.undo().map(|e| e.state), Some(0));
        assert!(history.undo().is_none());
        assert_eq!(history.cursor(), 0);
        assert!(!history.can_undo());

        assert_eq!(history.redo().map(|e| e.state), Some(1));
        assert!(history.can_redo());
    }

    #[test]
    fn test_add_discards_redo_branch() {
        let mut history = HistoryStore::new(10);
        for state in 0..4u32 {
            let _ = history.add(state, vec![]);
        }
        history.undo();
        history.undo();

        let dropped = history.add(9, ops("p:1;"));
        assert_eq!(dropped.iter().map(|e| e.state).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(states(&history), vec![0, 1, 9]);
        assert_eq!(history.cursor(), 2);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut history = HistoryStore::new(3);
        let mut evicted = Vec::new();
        for state in 0..5u32 {
            evicted.extend(history.add(state, vec![]).into_iter().map(|e| e.state));
        }
        assert_eq!(evicted, vec![0, 1]);
        assert_eq!(states(&history), vec![2, 3, 4]);
        assert_eq!(history.cursor(), 2);
    }

    #[test]
    fn test_flags_track_cursor_through_mixed_sequence() {
        let mut history = HistoryStore::new(4);
        let script = "aauaaruuurraaaauuu";
        let mut next = 0u32;
        for step in script.chars() {
            match step {
                'a' => {
                    let _ = history.add(next, vec![]);
                    next += 1;
                }
                'u' => {
                    history.undo();
                }
                _ => {
                    history.redo();
                }
            }
            assert_eq!(history.can_undo(), history.cursor() > 0);
            assert_eq!(history.can_redo(), history.cursor() + 1 < history.len());
            assert!(history.len() <= 4);
        }
    }

    #[test]
    fn test_status_line() {
        let mut history = HistoryStore::new(5);
        let _ = history.add(0u32, vec![]);
        assert_eq!(history.status(), "State 1/1: Original");
        let _ = history.add(1, ops("p:2;loop:2:8:4;"));
        assert_eq!(history.status(), "State 2/2: p:2 -> loop:2:8:4");
        history.undo();
        assert_eq!(history.status(), "State 1/2: Original");
    }

    #[test]
    fn test_applied_operations() {
        let mut history = HistoryStore::new(5);
        let _ = history.add(0u32, vec![]);
        let _ = history.add(1, ops("p:2;"));
        let _ = history.add(2, ops("t:1.5;rev:1:2:1;"));
        assert_eq!(history.applied_operations().len(), 3);
        history.undo();
        assert_eq!(history.applied_operations().len(), 1);
    }
}
