//! Fixed-capacity history that keeps the most recent entries.
//!
//! Pushing past capacity evicts the oldest entry first. The history
//! serializes as a plain JSON array; deserializing an array longer than the
//! capacity keeps only its tail, so a persisted list written by an older build
//! with a larger cap still loads within bounds.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::VecDeque;

/// Append-only list capped at `N` entries.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedHistory<T, const N: usize> {
    entries: VecDeque<T>,
}

impl<T, const N: usize> BoundedHistory<T, N> {
    /// Create an empty history.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(N),
        }
    }

    /// Maximum number of retained entries.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Append an entry, returning the evicted oldest entry if the cap was hit.
    pub fn push(&mut self, entry: T) -> Option<T> {
        if N == 0 {
            return Some(entry);
        }
        let evicted = if self.entries.len() >= N {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order, oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    /// Most recently inserted entry.
    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Keep only entries matching the predicate, preserving order.
    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&T) -> bool,
    {
        self.entries.retain(keep);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T: Clone, const N: usize> BoundedHistory<T, N> {
    /// Snapshot of the entries, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

impl<const N: usize> BoundedHistory<u64, N> {
    /// Arithmetic mean of the retained samples.
    pub fn average(&self) -> Option<f64> {
        if self.entries.is_empty() {
            return None;
        }
        let sum: u64 = self.entries.iter().sum();
        Some(sum as f64 / self.entries.len() as f64)
    }
}

impl<T, const N: usize> Default for BoundedHistory<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> FromIterator<T> for BoundedHistory<T, N> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut history = Self::new();
        for entry in iter {
            history.push(entry);
        }
        history
    }
}

impl<T: Serialize, const N: usize> Serialize for BoundedHistory<T, N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.iter())
    }
}

impl<'de, T: DeserializeOwned, const N: usize> Deserialize<'de> for BoundedHistory<T, N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<T>::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_most_recent_entries_in_insertion_order() {
        let mut history: BoundedHistory<u32, 20> = BoundedHistory::new();
        for i in 0..25 {
            history.push(i);
        }

        assert_eq!(history.len(), 20);
        assert_eq!(history.to_vec(), (5..25).collect::<Vec<_>>());
    }

    #[test]
    fn test_push_reports_evicted_entry() {
        let mut history: BoundedHistory<&str, 2> = BoundedHistory::new();
        assert_eq!(history.push("a"), None);
        assert_eq!(history.push("b"), None);
        assert_eq!(history.push("c"), Some("a"));
        assert_eq!(history.latest(), Some(&"c"));
    }

    #[test]
    fn test_average_of_samples() {
        let history: BoundedHistory<u64, 10> = [1000, 2000, 3000].into_iter().collect();
        assert_eq!(history.average(), Some(2000.0));

        let empty: BoundedHistory<u64, 10> = BoundedHistory::new();
        assert_eq!(empty.average(), None);
    }

    #[test]
    fn test_serializes_as_plain_array() {
        let history: BoundedHistory<u32, 3> = [1, 2, 3].into_iter().collect();
        assert_eq!(serde_json::to_string(&history).unwrap(), "[1,2,3]");
    }

    #[test]
    fn test_deserializing_oversized_array_keeps_tail() {
        let history: BoundedHistory<u32, 3> = serde_json::from_str("[1,2,3,4,5]").unwrap();
        assert_eq!(history.to_vec(), vec![3, 4, 5]);
    }

    #[test]
    fn test_retain_preserves_order() {
        let mut history: BoundedHistory<u32, 5> = (1..=5).collect();
        history.retain(|value| value % 2 == 1);
        assert_eq!(history.to_vec(), vec![1, 3, 5]);
    }
}
