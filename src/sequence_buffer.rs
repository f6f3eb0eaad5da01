/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Fixed-capacity store of values addressed by monotonically increasing sequence numbers.
//!
//! A [`SequenceBuffer`] with capacity `C` keeps (at most) the `C` most recently sequenced values. A
//! value with sequence number `s` is stored in slot `s mod C`, so writing `s + C` evicts `s`.
//!
//! ## Retained window
//!
//! At any moment the buffer has a *retained window*: the range
//! `[max(earliest, latest - C + 1), latest]`, where `latest` is the highest sequence number accepted
//! so far and `earliest` is the boundary set by [`remove_older_than`](SequenceBuffer::remove_older_than).
//! [`remove_newer_than`](SequenceBuffer::remove_newer_than) also raises `earliest` to the start of the
//! window it rolls back, so values that capacity evicted are never retained again.
//! A sequence number `s` [`exists`](SequenceBuffer::exists) in the buffer if and only if `s` is in the
//! retained window and `s` was the last sequence number written into slot `s mod C`.
//!
//! ## Out-of-order writes
//!
//! The buffer does not reject writes whose sequence number is not greater than `latest`; the write
//! overwrites whatever occupies the target slot. Such writes usually point to a sequencing bug
//! upstream, so each one is counted (see
//! [`out_of_order_insertions`](SequenceBuffer::out_of_order_insertions)) and logged at `warn` level.
//!
//! ## Ownership
//!
//! `SequenceBuffer` has no internal synchronization. It is meant to be owned by a single pipeline
//! stage.

/// The value returned by [`SequenceBuffer::next_index`] for a buffer that has never retained anything.
pub const FIRST_INDEX: i64 = 0;

struct SequencedSlot<T> {
    sequence_number: i64,
    value: T,
}

/// See the [module-level documentation](self).
pub struct SequenceBuffer<T> {
    slots: Vec<Option<SequencedSlot<T>>>,
    latest: Option<i64>,
    earliest: i64,
    out_of_order_insertions: u64,
}

impl<T> SequenceBuffer<T> {
    /// Create an empty buffer that can retain `capacity` sequence numbers.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "SequenceBuffer capacity must be at least 1");
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            latest: None,
            earliest: i64::MIN,
            out_of_order_insertions: 0,
        }
    }

    /// Get the number of sequence numbers this buffer can retain.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Store `value` under `sequence_number`, overwriting the previous occupant of its slot.
    pub fn add(&mut self, sequence_number: i64, value: T) {
        if let Some(latest) = self.latest {
            if sequence_number <= latest {
                self.out_of_order_insertions += 1;
                log::warn!(
                    "SequenceBuffer received out-of-order sequence number {} (latest is {})",
                    sequence_number,
                    latest
                );
            }
        }

        let index = self.index(sequence_number);
        self.slots[index] = Some(SequencedSlot {
            sequence_number,
            value,
        });

        if self.latest.map_or(true, |latest| sequence_number > latest) {
            self.latest = Some(sequence_number);
        }
    }

    /// Get the value stored under `sequence_number`, if it is still retained.
    pub fn get(&self, sequence_number: i64) -> Option<&T> {
        if !self.in_window(sequence_number) {
            return None;
        }
        match &self.slots[self.index(sequence_number)] {
            Some(slot) if slot.sequence_number == sequence_number => Some(&slot.value),
            _ => None,
        }
    }

    /// Check whether a value is retained under `sequence_number`.
    pub fn exists(&self, sequence_number: i64) -> bool {
        self.get(sequence_number).is_some()
    }

    /// Get the highest sequence number accepted so far, or `None` if the buffer is empty.
    pub fn latest(&self) -> Option<i64> {
        self.latest
    }

    /// Get the sequence number that the next in-order [`add`](Self::add) should use.
    ///
    /// Saturates at `i64::MAX`: once `latest` reaches it, there is no further in-order index.
    pub fn next_index(&self) -> i64 {
        match self.latest {
            Some(latest) => latest.saturating_add(1),
            None => self.earliest.max(FIRST_INDEX),
        }
    }

    /// Get the lowest sequence number in the retained window, or `None` if the window is empty.
    pub fn earliest_retained(&self) -> Option<i64> {
        let latest = self.latest?;
        let start = self.window_start(latest);
        if start <= latest {
            Some(start)
        } else {
            None
        }
    }

    /// Check whether the retained window is empty.
    pub fn is_empty(&self) -> bool {
        self.earliest_retained().is_none()
    }

    /// Evict every value whose sequence number is smaller than `sequence_number`.
    pub fn remove_older_than(&mut self, sequence_number: i64) {
        self.earliest = self.earliest.max(sequence_number);
    }

    /// Evict every value whose sequence number is greater than `sequence_number`, rolling `latest`
    /// back to `sequence_number`. If no part of the retained window survives, the buffer becomes
    /// empty and [`latest`](Self::latest) returns `None`.
    ///
    /// Runs in time proportional to `min(capacity, latest - sequence_number)`.
    pub fn remove_newer_than(&mut self, sequence_number: i64) {
        let latest = match self.latest {
            Some(latest) if sequence_number < latest => latest,
            _ => return,
        };

        let start = self.window_start(latest);
        let mut evicted = latest;
        while evicted > sequence_number && evicted >= start {
            let index = self.index(evicted);
            if matches!(&self.slots[index], Some(slot) if slot.sequence_number == evicted) {
                self.slots[index] = None;
            }
            evicted -= 1;
        }

        // Values that capacity already evicted must not reappear in the lowered window.
        self.earliest = self.earliest.max(start);
        self.latest = if sequence_number < start {
            None
        } else {
            Some(sequence_number)
        };
    }

    /// Evict everything and forget every boundary, returning the buffer to its initial state.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.latest = None;
        self.earliest = i64::MIN;
    }

    /// Get how many times [`add`](Self::add) was called with a sequence number not greater than
    /// [`latest`](Self::latest).
    pub fn out_of_order_insertions(&self) -> u64 {
        self.out_of_order_insertions
    }

    fn index(&self, sequence_number: i64) -> usize {
        sequence_number.rem_euclid(self.slots.len() as i64) as usize
    }

    fn window_start(&self, latest: i64) -> i64 {
        let oldest_in_capacity = latest.saturating_sub(self.slots.len() as i64 - 1);
        self.earliest.max(oldest_in_capacity)
    }

    fn in_window(&self, sequence_number: i64) -> bool {
        match self.latest {
            Some(latest) => {
                sequence_number <= latest && sequence_number >= self.window_start(latest)
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_one_keeps_only_latest() {
        let mut buffer = SequenceBuffer::new(1);
        buffer.add(0, "a");
        buffer.add(1, "b");

        assert_eq!(buffer.get(0), None);
        assert_eq!(buffer.get(1), Some(&"b"));
        assert_eq!(buffer.latest(), Some(1));
        assert_eq!(buffer.next_index(), 2);
    }

    #[test]
    fn empty_buffer() {
        let buffer: SequenceBuffer<u32> = SequenceBuffer::new(4);
        assert_eq!(buffer.latest(), None);
        assert_eq!(buffer.next_index(), FIRST_INDEX);
        assert_eq!(buffer.earliest_retained(), None);
        assert!(!buffer.exists(0));
    }

    #[test]
    fn keeps_the_last_capacity_values() {
        let mut buffer = SequenceBuffer::new(4);
        for seq in 0..10 {
            buffer.add(seq, seq * 10);
        }

        for seq in 0..6 {
            assert!(!buffer.exists(seq), "{} should have been evicted", seq);
        }
        for seq in 6..10 {
            assert_eq!(buffer.get(seq), Some(&(seq * 10)));
        }
        assert_eq!(buffer.earliest_retained(), Some(6));
        assert!(!buffer.exists(10));
        assert_eq!(buffer.out_of_order_insertions(), 0);
    }

    #[test]
    fn gaps_are_absent() {
        let mut buffer = SequenceBuffer::new(4);
        buffer.add(0, 'a');
        buffer.add(1, 'b');
        buffer.add(5, 'f');

        // 1 shares a slot with 5, and 0 is outside of the window [2, 5].
        assert!(!buffer.exists(0));
        assert!(!buffer.exists(1));
        assert!(!buffer.exists(2));
        assert_eq!(buffer.get(5), Some(&'f'));
    }

    #[test]
    fn remove_older_than_evicts_prefix() {
        let mut buffer = SequenceBuffer::new(8);
        for seq in 0..6 {
            buffer.add(seq, seq);
        }
        buffer.remove_older_than(3);

        assert!(!buffer.exists(0));
        assert!(!buffer.exists(2));
        assert!(buffer.exists(3));
        assert!(buffer.exists(5));
        assert_eq!(buffer.earliest_retained(), Some(3));
        assert_eq!(buffer.latest(), Some(5));

        // The boundary never moves backwards.
        buffer.remove_older_than(1);
        assert!(!buffer.exists(2));
    }

    #[test]
    fn remove_newer_than_rolls_back() {
        let mut buffer = SequenceBuffer::new(8);
        for seq in 0..6 {
            buffer.add(seq, seq);
        }
        buffer.remove_newer_than(3);

        assert!(buffer.exists(3));
        assert!(!buffer.exists(4));
        assert!(!buffer.exists(5));
        assert_eq!(buffer.latest(), Some(3));
        assert_eq!(buffer.next_index(), 4);

        // Rewriting past the rollback point does not resurrect evicted values.
        buffer.add(5, 50);
        assert!(!buffer.exists(4));
        assert_eq!(buffer.get(5), Some(&50));
    }

    #[test]
    fn rollback_does_not_restore_values_evicted_by_capacity() {
        let mut buffer = SequenceBuffer::new(4);
        buffer.add(0, 'a');
        buffer.add(1, 'b');
        buffer.add(6, 'g');
        assert!(!buffer.exists(0));
        assert!(!buffer.exists(1));

        buffer.remove_newer_than(3);
        assert!(!buffer.exists(0));
        assert!(!buffer.exists(1));
        assert!(!buffer.exists(6));
        assert_eq!(buffer.latest(), Some(3));
        assert_eq!(buffer.earliest_retained(), Some(3));

        buffer.add(4, 'e');
        assert_eq!(buffer.get(4), Some(&'e'));
        assert!(!buffer.exists(0));
    }

    #[test]
    fn next_index_saturates() {
        let mut buffer = SequenceBuffer::new(2);
        buffer.add(i64::MAX, ());
        assert_eq!(buffer.next_index(), i64::MAX);
    }

    #[test]
    fn remove_newer_than_can_empty_the_buffer() {
        let mut buffer = SequenceBuffer::new(4);
        for seq in 10..14 {
            buffer.add(seq, seq);
        }
        buffer.remove_newer_than(9);

        assert_eq!(buffer.latest(), None);
        for seq in 10..14 {
            assert!(!buffer.exists(seq));
        }
        assert_eq!(buffer.next_index(), 10);
    }

    #[test]
    fn out_of_order_writes_overwrite_and_are_counted() {
        let mut buffer = SequenceBuffer::new(4);
        buffer.add(4, "four");
        buffer.add(5, "five");
        buffer.add(1, "one");

        // 1 overwrites 5 (same slot) but lies outside of the window [2, 5].
        assert!(!buffer.exists(1));
        assert!(!buffer.exists(5));
        assert!(buffer.exists(4));
        assert_eq!(buffer.latest(), Some(5));

        buffer.add(4, "four again");
        assert_eq!(buffer.get(4), Some(&"four again"));
        assert_eq!(buffer.out_of_order_insertions(), 2);
    }

    #[test]
    fn negative_sequence_numbers() {
        let mut buffer = SequenceBuffer::new(3);
        buffer.add(-2, 'x');
        buffer.add(-1, 'y');
        assert_eq!(buffer.get(-2), Some(&'x'));
        assert_eq!(buffer.get(-1), Some(&'y'));
        assert_eq!(buffer.next_index(), 0);
    }

    #[test]
    fn clear_resets_everything() {
        let mut buffer = SequenceBuffer::new(4);
        for seq in 0..4 {
            buffer.add(seq, seq);
        }
        buffer.remove_older_than(2);
        buffer.clear();

        assert_eq!(buffer.latest(), None);
        assert_eq!(buffer.next_index(), FIRST_INDEX);
        buffer.add(0, 100);
        assert_eq!(buffer.get(0), Some(&100));
    }
}
