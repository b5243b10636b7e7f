use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use super::error::{TraderError, TraderResult};

/// Stable identity of a queued position
///
/// Ids are handed out in insertion order and double as the tie-break key:
/// positions bought at the same price pop oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A recorded buy waiting for a matching sell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: String,
    pub price: f64, // purchase price, the heap key
    pub quantity: f64,
    pub opened_at: DateTime<Utc>,
}

/// Min-heap of open buy positions keyed by purchase price
///
/// Array-backed binary heap. `slots` maps every queued id to its current
/// array index and is kept in sync on every swap, which is what lets
/// [`update_in_place`](Self::update_in_place) find and re-sift an element in
/// O(log n).
#[derive(Debug, Default)]
pub struct OpenPositionQueue {
    heap: Vec<Position>,
    slots: HashMap<PositionId, usize>,
    next_id: u64,
}

impl OpenPositionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Record a new position and return its id
    pub fn push(&mut self, symbol: impl Into<String>, price: f64, quantity: f64) -> PositionId {
        let id = PositionId(self.next_id);
        self.next_id += 1;

        self.insert(Position {
            id,
            symbol: symbol.into(),
            price,
            quantity,
            opened_at: Utc::now(),
        });
        id
    }

    /// Put a previously popped position back, keeping its id
    pub fn reinsert(&mut self, position: Position) -> TraderResult<()> {
        if self.slots.contains_key(&position.id) {
            return Err(TraderError::DuplicatePosition(position.id.0));
        }
        self.next_id = self.next_id.max(position.id.0 + 1);
        self.insert(position);
        Ok(())
    }

    /// Remove and return the cheapest position
    pub fn pop_min(&mut self) -> TraderResult<Position> {
        if self.heap.is_empty() {
            return Err(TraderError::EmptyQueue);
        }

        let last = self.heap.len() - 1;
        self.swap(0, last);
        let position = self.heap.pop().ok_or(TraderError::EmptyQueue)?;
        self.slots.remove(&position.id);

        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Ok(position)
    }

    pub fn peek_min(&self) -> Option<&Position> {
        self.heap.first()
    }

    pub fn get(&self, id: PositionId) -> Option<&Position> {
        self.slots.get(&id).map(|&slot| &self.heap[slot])
    }

    /// Overwrite a queued position's fields and restore heap order
    pub fn update_in_place(
        &mut self,
        id: PositionId,
        symbol: &str,
        price: f64,
        quantity: f64,
    ) -> TraderResult<()> {
        let slot = *self
            .slots
            .get(&id)
            .ok_or(TraderError::UnknownPosition(id.0))?;

        let position = &mut self.heap[slot];
        position.symbol = symbol.to_string();
        position.price = price;
        position.quantity = quantity;

        if !self.sift_up(slot) {
            self.sift_down(slot);
        }
        Ok(())
    }

    /// Snapshot of all positions, cheapest first
    pub fn sorted(&self) -> Vec<Position> {
        let mut positions = self.heap.clone();
        positions.sort_by(|a, b| Self::order(a, b));
        positions
    }

    /// Total quantity held across all open positions
    pub fn total_quantity(&self) -> f64 {
        self.heap.iter().map(|p| p.quantity).sum()
    }

    fn insert(&mut self, position: Position) {
        let slot = self.heap.len();
        self.slots.insert(position.id, slot);
        self.heap.push(position);
        self.sift_up(slot);
    }

    fn order(a: &Position, b: &Position) -> Ordering {
        a.price.total_cmp(&b.price).then(a.id.cmp(&b.id))
    }

    fn less(&self, i: usize, j: usize) -> bool {
        Self::order(&self.heap[i], &self.heap[j]) == Ordering::Less
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.heap.swap(i, j);
        self.slots.insert(self.heap[i].id, i);
        self.slots.insert(self.heap[j].id, j);
    }

    /// Returns true if the element moved
    fn sift_up(&mut self, mut i: usize) -> bool {
        let start = i;
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.less(i, parent) {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
        i != start
    }

    fn sift_down(&mut self, mut i: usize) {
        let n = self.heap.len();
        loop {
            let left = 2 * i + 1;
            if left >= n {
                break;
            }
            let right = left + 1;
            let child = if right < n && self.less(right, left) {
                right
            } else {
                left
            };
            if !self.less(child, i) {
                break;
            }
            self.swap(i, child);
            i = child;
        }
    }

    #[cfg(test)]
    fn assert_invariants(&self) {
        assert_eq!(self.heap.len(), self.slots.len());
        for (i, position) in self.heap.iter().enumerate() {
            assert_eq!(self.slots.get(&position.id), Some(&i), "stale slot for {}", position.id);
            if i > 0 {
                let parent = (i - 1) / 2;
                assert!(
                    Self::order(&self.heap[parent], position) != Ordering::Greater,
                    "heap order broken at slot {}",
                    i
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_pop_returns_cheapest_first() {
        let mut queue = OpenPositionQueue::new();
        queue.push("BTCUSDT", 101.0, 0.1);
        queue.push("BTCUSDT", 97.5, 0.2);
        queue.push("BTCUSDT", 99.0, 0.3);

        let prices: Vec<f64> = (0..3).map(|_| queue.pop_min().unwrap().price).collect();
        assert_eq!(prices, vec![97.5, 99.0, 101.0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_empty_is_error() {
        let mut queue = OpenPositionQueue::new();
        assert_eq!(queue.pop_min(), Err(TraderError::EmptyQueue));
    }

    #[test]
    fn test_equal_prices_pop_in_insertion_order() {
        let mut queue = OpenPositionQueue::new();
        let first = queue.push("BTCUSDT", 100.0, 1.0);
        let second = queue.push("BTCUSDT", 100.0, 2.0);
        let third = queue.push("BTCUSDT", 100.0, 3.0);

        assert_eq!(queue.pop_min().unwrap().id, first);
        assert_eq!(queue.pop_min().unwrap().id, second);
        assert_eq!(queue.pop_min().unwrap().id, third);
    }

    #[test]
    fn test_reinsert_keeps_identity_and_order() {
        let mut queue = OpenPositionQueue::new();
        queue.push("BTCUSDT", 100.0, 1.0);
        queue.push("BTCUSDT", 100.0, 2.0);

        let popped = queue.pop_min().unwrap();
        queue.reinsert(popped.clone()).unwrap();

        let again = queue.pop_min().unwrap();
        assert_eq!(again, popped);
        queue.assert_invariants();
    }

    #[test]
    fn test_reinsert_duplicate_rejected() {
        let mut queue = OpenPositionQueue::new();
        let id = queue.push("BTCUSDT", 100.0, 1.0);
        let copy = queue.get(id).cloned().unwrap();

        assert_eq!(queue.reinsert(copy), Err(TraderError::DuplicatePosition(id.0)));
    }

    #[test]
    fn test_update_in_place_resifts() {
        let mut queue = OpenPositionQueue::new();
        let a = queue.push("BTCUSDT", 90.0, 1.0);
        let b = queue.push("BTCUSDT", 95.0, 1.0);
        queue.push("BTCUSDT", 99.0, 1.0);

        // Cheapest becomes most expensive
        queue.update_in_place(a, "BTCUSDT", 120.0, 0.5).unwrap();
        queue.assert_invariants();
        assert_eq!(queue.peek_min().unwrap().id, b);

        // And back to the top
        queue.update_in_place(a, "BTCUSDT", 10.0, 0.5).unwrap();
        queue.assert_invariants();
        let top = queue.pop_min().unwrap();
        assert_eq!(top.id, a);
        assert_eq!(top.quantity, 0.5);
    }

    #[test]
    fn test_update_unknown_position() {
        let mut queue = OpenPositionQueue::new();
        let result = queue.update_in_place(PositionId(7), "BTCUSDT", 1.0, 1.0);
        assert_eq!(result, Err(TraderError::UnknownPosition(7)));
    }

    #[test]
    fn test_sorted_and_total_quantity() {
        let mut queue = OpenPositionQueue::new();
        queue.push("BTCUSDT", 3.0, 0.25);
        queue.push("BTCUSDT", 1.0, 0.5);
        queue.push("BTCUSDT", 2.0, 0.25);

        let prices: Vec<f64> = queue.sorted().iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![1.0, 2.0, 3.0]);
        assert_eq!(queue.total_quantity(), 1.0);
        assert_eq!(queue.len(), 3);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push(f64),
        Pop,
        Update(usize, f64),
        PopAndReinsert,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1.0f64..1000.0).prop_map(Op::Push),
            Just(Op::Pop),
            (0usize..64, 1.0f64..1000.0).prop_map(|(i, p)| Op::Update(i, p)),
            Just(Op::PopAndReinsert),
        ]
    }

    proptest! {
        #[test]
        fn prop_heap_invariants_hold(ops in prop::collection::vec(op_strategy(), 0..200)) {
            let mut queue = OpenPositionQueue::new();

            for op in ops {
                match op {
                    Op::Push(price) => {
                        queue.push("BTCUSDT", price, 1.0);
                    }
                    Op::Pop => {
                        let before = queue.peek_min().cloned();
                        match queue.pop_min() {
                            Ok(popped) => prop_assert_eq!(Some(popped), before),
                            Err(e) => prop_assert_eq!(e, TraderError::EmptyQueue),
                        }
                    }
                    Op::Update(i, price) => {
                        let ids: Vec<PositionId> = queue.sorted().iter().map(|p| p.id).collect();
                        if !ids.is_empty() {
                            let id = ids[i % ids.len()];
                            queue.update_in_place(id, "BTCUSDT", price, 1.0).unwrap();
                            prop_assert_eq!(queue.get(id).map(|p| p.price), Some(price));
                        }
                    }
                    Op::PopAndReinsert => {
                        if let Ok(popped) = queue.pop_min() {
                            queue.reinsert(popped.clone()).unwrap();
                            prop_assert_eq!(queue.peek_min(), Some(&popped));
                        }
                    }
                }
                queue.assert_invariants();
            }

            let mut last = f64::MIN;
            while let Ok(position) = queue.pop_min() {
                prop_assert!(position.price >= last);
                last = position.price;
            }
        }
    }
}
