//! Min-heap ordered by a caller-supplied key.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

struct Keyed<K, T> {
    key: K,
    item: T,
}

impl<K: Ord, T> PartialEq for Keyed<K, T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<K: Ord, T> Eq for Keyed<K, T> {}

impl<K: Ord, T> PartialOrd for Keyed<K, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so the std max-heap pops the smallest key first.
impl<K: Ord, T> Ord for Keyed<K, T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key.cmp(&self.key)
    }
}

/// A min-heap whose ordering is given by `key`. The key is computed once per
/// item on insertion.
pub struct PriorityQueue<T, K, F>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    heap: BinaryHeap<Keyed<K, T>>,
    key: F,
}

impl<T, K, F> PriorityQueue<T, K, F>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    pub fn new(key: F) -> Self {
        Self {
            heap: BinaryHeap::new(),
            key,
        }
    }

    /// Build a heap from `items` in O(n).
    pub fn init(items: impl IntoIterator<Item = T>, key: F) -> Self {
        let keyed: Vec<_> = items
            .into_iter()
            .map(|item| Keyed {
                key: key(&item),
                item,
            })
            .collect();

        Self {
            heap: BinaryHeap::from(keyed),
            key,
        }
    }

    pub fn push(&mut self, item: T) {
        let key = (self.key)(&item);
        self.heap.push(Keyed { key, item });
    }

    /// Remove and return the item with the smallest key.
    pub fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|keyed| keyed.item)
    }

    pub fn peek(&self) -> Option<&T> {
        self.heap.peek().map(|keyed| &keyed.item)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
