//! Doubly-linked list stored in a slot arena.
//!
//! `SlotList` keeps its elements in a vector of slots linked by indices rather
//! than by pointers embedded in the elements. Insertion and removal are O(1),
//! vacated slots are recycled through an internal free list, and every element
//! is addressed by a [`SlotKey`] that carries a generation counter, so a stale
//! key can never reach an element that reused the same slot.
//!
//! The list is circular around a sentinel: the sentinel's `next` is the head
//! and its `prev` is the tail. An empty list's sentinel points to itself.
//!
//! ```rust
//! # use hyperdrive::queues::slot::SlotList;
//! let mut list = SlotList::new();
//!
//! let b = list.add_tail('b').unwrap();
//! list.add_head('a').unwrap();
//! list.add_tail('c').unwrap();
//!
//! assert_eq!(list.remove(b), Some('b'));
//! assert_eq!(list.remove(b), None); // Stale key
//!
//! assert_eq!(list.iter().map(|(_, c)| *c).collect::<String>(), "ac");
//! assert_eq!(list.pop_head(), Some('a'));
//! ```
use alloc::vec::Vec;

/// Index used to designate the sentinel.
const SENTINEL: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Handle to an element of a `SlotList`.
pub struct SlotKey {
    index: usize,
    generation: u32,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
/// Returned when the list cannot grow to store a new element.
///
/// The element that could not be inserted is handed back to the caller.
pub struct SlotAllocError<T>(T);

impl<T> SlotAllocError<T> {
    #[must_use]
    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> core::fmt::Display for SlotAllocError<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Slot list allocation failed")
    }
}

impl<T> core::fmt::Debug for SlotAllocError<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SlotAllocError").finish()
    }
}

impl<T> core::error::Error for SlotAllocError<T> {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Links {
    prev: usize,
    next: usize,
}

impl Links {
    const DETACHED: Self = Self {
        prev: SENTINEL,
        next: SENTINEL,
    };
}

#[derive(Debug)]
struct Slot<T> {
    /// `None` when the slot is on the free list.
    value: Option<T>,
    generation: u32,
    /// For a vacant slot, `links.next` is the next vacant slot.
    links: Links,
}

#[derive(Debug)]
pub struct SlotList<T> {
    slots: Vec<Slot<T>>,
    sentinel: Links,
    free_head: usize,
    len: usize,
}

impl<T> Default for SlotList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SlotList<T> {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            sentinel: Links::DETACHED,
            free_head: SENTINEL,
            len: 0,
        }
    }

    #[must_use]
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.sentinel.next == SENTINEL
    }

    #[inline]
    /// Inserts `value` at the head of the list.
    ///
    /// ## Errors
    ///
    /// Returns the value back if the backing storage cannot grow.
    pub fn add_head(&mut self, value: T) -> Result<SlotKey, SlotAllocError<T>> {
        let index = self.vacant_slot(value)?;
        self.link_after(SENTINEL, index);
        Ok(self.key_of(index))
    }

    #[inline]
    /// Inserts `value` at the tail of the list.
    ///
    /// ## Errors
    ///
    /// Returns the value back if the backing storage cannot grow.
    pub fn add_tail(&mut self, value: T) -> Result<SlotKey, SlotAllocError<T>> {
        let index = self.vacant_slot(value)?;
        let tail = self.sentinel.prev;
        self.link_after(tail, index);
        Ok(self.key_of(index))
    }

    /// Unlinks the element designated by `key` and returns it.
    ///
    /// Returns `None` if the key is stale.
    pub fn remove(&mut self, key: SlotKey) -> Option<T> {
        if !self.contains(key) {
            return None;
        }
        self.unlink(key.index);
        self.release(key.index)
    }

    #[must_use]
    /// Unlinks the head of the list and returns it.
    pub fn pop_head(&mut self) -> Option<T> {
        self.pop_head_with_key().map(|(_, value)| value)
    }

    #[must_use]
    /// Unlinks the head of the list and returns it with its (now stale) key.
    pub fn pop_head_with_key(&mut self) -> Option<(SlotKey, T)> {
        let head = self.sentinel.next;
        if head == SENTINEL {
            return None;
        }
        let key = self.key_of(head);
        self.unlink(head);
        self.release(head).map(|value| (key, value))
    }

    #[must_use]
    pub fn head_key(&self) -> Option<SlotKey> {
        let head = self.sentinel.next;
        (head != SENTINEL).then(|| self.key_of(head))
    }

    #[must_use]
    pub fn contains(&self, key: SlotKey) -> bool {
        self.slots
            .get(key.index)
            .is_some_and(|slot| slot.generation == key.generation && slot.value.is_some())
    }

    #[must_use]
    pub fn get(&self, key: SlotKey) -> Option<&T> {
        self.slots
            .get(key.index)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    #[must_use]
    pub fn get_mut(&mut self, key: SlotKey) -> Option<&mut T> {
        self.slots
            .get_mut(key.index)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    #[must_use]
    #[inline]
    /// Iterates from head to tail. The iterator can be reversed.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            front: self.sentinel.next,
            back: self.sentinel.prev,
            remaining: self.len,
        }
    }

    /// Returns the key of the first element, from the head, matching `predicate`.
    pub fn find_key(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<SlotKey> {
        self.iter()
            .find(|(_, value)| predicate(value))
            .map(|(key, _)| key)
    }

    /// Calls `f` on every element, from head to tail.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(SlotKey, &mut T)) {
        let mut cursor = self.sentinel.next;
        while cursor != SENTINEL {
            let key = self.key_of(cursor);
            let slot = &mut self.slots[cursor];
            let next = slot.links.next;
            if let Some(value) = slot.value.as_mut() {
                f(key, value);
            }
            cursor = next;
        }
    }

    /// Keeps only the elements for which `keep` returns `true`.
    ///
    /// This is the removal-safe traversal: the successor of an element is read
    /// before the element is unlinked.
    pub fn retain(&mut self, mut keep: impl FnMut(SlotKey, &mut T) -> bool) {
        let mut cursor = self.sentinel.next;
        while cursor != SENTINEL {
            let key = self.key_of(cursor);
            let next = self.slots[cursor].links.next;
            let kept = self.slots[cursor]
                .value
                .as_mut()
                .is_none_or(|value| keep(key, value));
            if !kept {
                self.unlink(cursor);
                drop(self.release(cursor));
            }
            cursor = next;
        }
    }

    fn key_of(&self, index: usize) -> SlotKey {
        SlotKey {
            index,
            generation: self.slots[index].generation,
        }
    }

    /// Fills a vacant slot with `value` and returns its index, detached.
    fn vacant_slot(&mut self, value: T) -> Result<usize, SlotAllocError<T>> {
        if self.free_head != SENTINEL {
            let index = self.free_head;
            let slot = &mut self.slots[index];
            self.free_head = slot.links.next;
            slot.value = Some(value);
            slot.links = Links::DETACHED;
            self.len += 1;
            return Ok(index);
        }

        if self.slots.try_reserve(1).is_err() {
            return Err(SlotAllocError(value));
        }
        self.slots.push(Slot {
            value: Some(value),
            generation: 0,
            links: Links::DETACHED,
        });
        self.len += 1;
        Ok(self.slots.len() - 1)
    }

    /// Takes the value out of a detached slot and puts the slot on the free list.
    fn release(&mut self, index: usize) -> Option<T> {
        let slot = &mut self.slots[index];
        slot.generation = slot.generation.wrapping_add(1);
        slot.links = Links {
            prev: SENTINEL,
            next: self.free_head,
        };
        self.free_head = index;
        self.len -= 1;
        slot.value.take()
    }

    fn links_mut(&mut self, index: usize) -> &mut Links {
        if index == SENTINEL {
            &mut self.sentinel
        } else {
            &mut self.slots[index].links
        }
    }

    fn link_after(&mut self, prev: usize, index: usize) {
        let next = self.links_mut(prev).next;
        *self.links_mut(index) = Links { prev, next };
        self.links_mut(prev).next = index;
        self.links_mut(next).prev = index;
    }

    fn unlink(&mut self, index: usize) {
        let Links { prev, next } = self.slots[index].links;
        self.links_mut(prev).next = next;
        self.links_mut(next).prev = prev;
        self.slots[index].links = Links::DETACHED;
    }
}

/// Iterator over the elements of a `SlotList`.
pub struct Iter<'a, T> {
    list: &'a SlotList<T>,
    front: usize,
    back: usize,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (SlotKey, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.front;
        let slot = &self.list.slots[index];
        self.front = slot.links.next;
        self.remaining -= 1;
        slot.value.as_ref().map(|value| (self.list.key_of(index), value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.back;
        let slot = &self.list.slots[index];
        self.back = slot.links.prev;
        self.remaining -= 1;
        slot.value.as_ref().map(|value| (self.list.key_of(index), value))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
