//! Selection set
//!
//! The entries chosen for transfer, keyed by `remote_id`. Toggles are
//! idempotent and snapshots come back in order of first selection.

use provider_google_drive::CatalogEntry;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    order: Vec<String>,
    entries: HashMap<String, CatalogEntry>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select or deselect `entry`. Returns whether membership changed.
    pub fn toggle(&mut self, entry: &CatalogEntry, selected: bool) -> bool {
        if selected {
            if self.entries.contains_key(&entry.remote_id) {
                return false;
            }
            self.order.push(entry.remote_id.clone());
            self.entries.insert(entry.remote_id.clone(), entry.clone());
            true
        } else {
            self.remove(&entry.remote_id)
        }
    }

    /// Deselect by id. Returns whether the id was selected.
    pub fn remove(&mut self, remote_id: &str) -> bool {
        if self.entries.remove(remote_id).is_none() {
            return false;
        }
        self.order.retain(|id| id != remote_id);
        true
    }

    pub fn contains(&self, remote_id: &str) -> bool {
        self.entries.contains_key(remote_id)
    }

    pub fn snapshot(&self) -> Vec<CatalogEntry> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> CatalogEntry {
        CatalogEntry::new(id, format!("name-{}", id), "text/plain")
    }

    #[test]
    fn test_select_twice_is_idempotent() {
        let mut once = SelectionSet::new();
        once.toggle(&entry("a"), true);

        let mut twice = SelectionSet::new();
        assert!(twice.toggle(&entry("a"), true));
        assert!(!twice.toggle(&entry("a"), true));

        assert_eq!(once, twice);
        assert_eq!(twice.len(), 1);
    }

    #[test]
    fn test_deselect_unselected_is_noop() {
        let mut selection = SelectionSet::new();
        selection.toggle(&entry("a"), true);
        let before = selection.clone();

        assert!(!selection.toggle(&entry("b"), false));
        assert_eq!(selection, before);
    }

    #[test]
    fn test_snapshot_keeps_first_selection_order() {
        let mut selection = SelectionSet::new();
        selection.toggle(&entry("c"), true);
        selection.toggle(&entry("a"), true);
        selection.toggle(&entry("b"), true);
        selection.toggle(&entry("c"), true);

        let ids: Vec<_> = selection
            .snapshot()
            .into_iter()
            .map(|e| e.remote_id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_deselect_by_id_not_by_metadata() {
        let mut selection = SelectionSet::new();
        let first = CatalogEntry::new("1", "same", "text/plain");
        let second = CatalogEntry::new("2", "same", "text/plain");
        selection.toggle(&first, true);
        selection.toggle(&second, true);

        selection.toggle(&second, false);

        assert!(selection.contains("1"));
        assert!(!selection.contains("2"));
    }

    #[test]
    fn test_clear() {
        let mut selection = SelectionSet::new();
        selection.toggle(&entry("a"), true);
        selection.clear();

        assert!(selection.is_empty());
        assert!(selection.snapshot().is_empty());
    }
}
