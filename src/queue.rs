//! The queue of undecided key presses.
//!
//! Every press that qukeys holds back lands here, oldest first.  The entry at
//! the head is the one whose fate is being decided; everything behind it waits
//! its turn, even ordinary keys, so that the host sees presses in the order
//! they happened.
//!
//! The queue also caches the qukey definition of its head.  The engine
//! consults it on nearly every event, and it must always describe whatever key
//! is at index 0, so the cache is recomputed inside every operation that can
//! change the head, rather than being left to the caller.

use arraydeque::ArrayDeque;

use crate::key::{Keymap, Qukey, QukeyTable};
use crate::{KeyAddr, Ticks};

/// Default capacity of the queue.
pub const QUEUE_MAX: usize = 8;

/// A press that hasn't been sent to the host yet.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueEntry {
    pub addr: KeyAddr,
    /// When the key went down.  While a release is pending, this is instead
    /// the deadline the grace window is measured against.
    pub start_time: Ticks,
    /// The key has been released, but the release is being held back in case
    /// the key is pressed again.
    release_pending: bool,
}

impl QueueEntry {
    pub fn new(addr: KeyAddr, start_time: Ticks) -> Self {
        QueueEntry {
            addr,
            start_time,
            release_pending: false,
        }
    }

    pub fn is_release_pending(&self) -> bool {
        self.release_pending
    }

    /// Hold back this key's release until `deadline`.
    pub fn delay_release(&mut self, deadline: Ticks) {
        self.start_time = deadline;
        self.release_pending = true;
    }

    /// The key came back down before its delayed release was committed.  It
    /// is held again, as of `now`.
    pub fn cancel_release(&mut self, now: Ticks) {
        self.start_time = now;
        self.release_pending = false;
    }
}

/// Fixed capacity FIFO of pending presses.
pub struct KeyQueue<const N: usize = QUEUE_MAX> {
    entries: ArrayDeque<QueueEntry, N>,
    /// Qukey definition of the entry at the head, if it is a qukey.
    head: Option<Qukey>,
}

impl<const N: usize> Default for KeyQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> KeyQueue<N> {
    pub fn new() -> Self {
        KeyQueue {
            entries: ArrayDeque::new(),
            head: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.is_full()
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn front(&self) -> Option<&QueueEntry> {
        self.entries.front()
    }

    /// Mutable access to the head.  The address can't be changed through
    /// here, so the cached definition stays valid.
    pub fn front_mut(&mut self) -> Option<&mut QueueEntry> {
        self.entries.front_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    /// Qukey definition for the key at the head of the queue.
    pub fn head_qukey(&self) -> Option<&Qukey> {
        self.head.as_ref()
    }

    /// Release delay of the head key, zero for anything but a qukey.
    pub fn release_delay(&self) -> u8 {
        self.head.map_or(0, |q| q.release_delay)
    }

    /// Position of the earliest entry for this key.
    pub fn find(&self, addr: KeyAddr) -> Option<usize> {
        self.entries.iter().position(|e| e.addr == addr)
    }

    /// Append a press.  When the queue is full, the entry is handed back;
    /// making room is the caller's job, since it means resolving a key.
    pub fn push_back<K: Keymap>(
        &mut self,
        entry: QueueEntry,
        table: &QukeyTable<'_, K>,
    ) -> Result<(), QueueEntry> {
        let was_empty = self.entries.is_empty();
        self.entries.push_back(entry).map_err(|e| e.element)?;
        if was_empty {
            self.head = table.lookup(entry.addr);
        }
        Ok(())
    }

    /// Remove the head, and return it along with the qukey definition it had
    /// while it was the head.
    pub fn pop_front<K: Keymap>(
        &mut self,
        table: &QukeyTable<'_, K>,
    ) -> Option<(QueueEntry, Option<Qukey>)> {
        let entry = self.entries.pop_front()?;
        let qukey = self.head.take();
        self.head = self.entries.front().and_then(|e| table.lookup(e.addr));
        Some((entry, qukey))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use crate::Keyboard;

    static QUKEYS: [Qukey; 2] = [
        Qukey::new(Key::Keyboard(Keyboard::A), Key::Keyboard(Keyboard::LeftShift)),
        Qukey::new(Key::Keyboard(Keyboard::S), Key::Keyboard(Keyboard::LeftControl))
            .with_release_delay(30),
    ];

    static KEYMAP: [Key; 4] = [
        Key::Qukey(0),
        Key::Keyboard(Keyboard::B),
        Key::Qukey(1),
        Key::Keyboard(Keyboard::C),
    ];

    #[test]
    fn head_tracks_pops() {
        let table = QukeyTable::new(&QUKEYS, &KEYMAP);
        let mut queue: KeyQueue<4> = KeyQueue::new();

        assert!(queue.head_qukey().is_none());
        assert_eq!(queue.push_back(QueueEntry::new(KeyAddr(1), 0), &table), Ok(()));
        assert!(queue.head_qukey().is_none());
        assert_eq!(queue.release_delay(), 0);

        // Pushing behind the head leaves the cache alone.
        queue.push_back(QueueEntry::new(KeyAddr(2), 5), &table).unwrap();
        queue.push_back(QueueEntry::new(KeyAddr(0), 9), &table).unwrap();
        assert!(queue.head_qukey().is_none());

        let (entry, qukey) = queue.pop_front(&table).unwrap();
        assert_eq!(entry.addr, KeyAddr(1));
        assert_eq!(qukey, None);
        assert_eq!(queue.head_qukey(), Some(&QUKEYS[1]));
        assert_eq!(queue.release_delay(), 30);

        let (entry, qukey) = queue.pop_front(&table).unwrap();
        assert_eq!(entry.addr, KeyAddr(2));
        assert_eq!(qukey, Some(QUKEYS[1]));
        assert_eq!(queue.head_qukey(), Some(&QUKEYS[0]));
        assert_eq!(queue.release_delay(), 0);

        queue.pop_front(&table).unwrap();
        assert!(queue.is_empty());
        assert!(queue.head_qukey().is_none());
        assert!(queue.pop_front(&table).is_none());
    }

    #[test]
    fn full_queue_hands_entry_back() {
        let table = QukeyTable::new(&QUKEYS, &KEYMAP);
        let mut queue: KeyQueue<2> = KeyQueue::new();

        queue.push_back(QueueEntry::new(KeyAddr(0), 1), &table).unwrap();
        queue.push_back(QueueEntry::new(KeyAddr(3), 2), &table).unwrap();
        assert!(queue.is_full());

        let extra = QueueEntry::new(KeyAddr(1), 3);
        assert_eq!(queue.push_back(extra, &table), Err(extra));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.head_qukey(), Some(&QUKEYS[0]));
    }

    #[test]
    fn find_returns_earliest() {
        let table = QukeyTable::new(&QUKEYS, &KEYMAP);
        let mut queue: KeyQueue = KeyQueue::new();

        queue.push_back(QueueEntry::new(KeyAddr(3), 0), &table).unwrap();
        queue.push_back(QueueEntry::new(KeyAddr(0), 1), &table).unwrap();
        queue.push_back(QueueEntry::new(KeyAddr(0), 2), &table).unwrap();

        assert_eq!(queue.find(KeyAddr(0)), Some(1));
        assert_eq!(queue.find(KeyAddr(3)), Some(0));
        assert_eq!(queue.find(KeyAddr(2)), None);
        assert_eq!(queue.capacity(), QUEUE_MAX);
    }

    #[test]
    fn delayed_release_round_trip() {
        let mut entry = QueueEntry::new(KeyAddr(2), 100);
        entry.delay_release(100 + 4096);
        assert!(entry.is_release_pending());
        assert_eq!(entry.start_time, 4196);

        entry.cancel_release(110);
        assert!(!entry.is_release_pending());
        assert_eq!(entry.start_time, 110);
    }
}
