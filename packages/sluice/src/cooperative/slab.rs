// index-linked list part of the cooperative context.

use std::mem::replace;


// singly linked list of entries, stored in a slab of slots linked by index rather than by pointer.
// entries are pushed onto and popped from the front, so it behaves as a stack.
pub(crate) struct Slab<T> {
    // slots, occupied or vacant. never shrinks.
    slots: Vec<Slot<T>>,
    // most recently pushed entry, unless empty.
    head: Option<usize>,
    // most recently vacated slot, unless there are no vacant slots.
    free: Option<usize>,
    // number of occupied slots.
    len: usize,
}

enum Slot<T> {
    Occupied {
        // next entry towards the back.
        next: Option<usize>,
        value: T,
    },
    Vacant {
        // next vacant slot.
        next_free: Option<usize>,
    },
}

impl<T> Slab<T> {
    // construct empty.
    pub(crate) fn new() -> Self {
        Slab {
            slots: Vec::new(),
            head: None,
            free: None,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    // link a new entry at the front, reusing a vacant slot if there is one. returns its slot index.
    pub(crate) fn push_front(&mut self, value: T) -> usize {
        let slot = Slot::Occupied { next: self.head, value };
        let index = match self.free {
            Some(index) => {
                match replace(&mut self.slots[index], slot) {
                    Slot::Vacant { next_free } => self.free = next_free,
                    Slot::Occupied { .. } => unreachable!("free list links an occupied slot"),
                }
                index
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        };
        self.head = Some(index);
        self.len += 1;
        index
    }

    // unlink and return the front entry, vacating its slot.
    pub(crate) fn pop_front(&mut self) -> Option<T> {
        let index = self.head?;
        let vacant = Slot::Vacant { next_free: self.free };
        match replace(&mut self.slots[index], vacant) {
            Slot::Occupied { next, value } => {
                self.head = next;
                self.free = Some(index);
                self.len -= 1;
                Some(value)
            }
            Slot::Vacant { .. } => unreachable!("list links a vacant slot"),
        }
    }

    // number of slots, occupied or vacant.
    #[cfg(test)]
    fn capacity(&self) -> usize {
        self.slots.len()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_pcg::Pcg32;

    fn new_rng() -> impl Rng {
        Pcg32::from_seed(0xdeadbeefdeadbeefdeadbeefdeadbeefu128.to_le_bytes())
    }

    #[test]
    fn lifo_order() {
        let mut slab = Slab::new();
        for c in ['a', 'b', 'c'] {
            slab.push_front(c);
        }
        assert_eq!(slab.len(), 3);
        assert_eq!(slab.pop_front(), Some('c'));
        assert_eq!(slab.pop_front(), Some('b'));
        assert_eq!(slab.pop_front(), Some('a'));
        assert_eq!(slab.pop_front(), None);
        assert!(slab.is_empty());
    }

    #[test]
    fn vacant_slots_reused() {
        let mut slab = Slab::new();
        let first = slab.push_front(1);
        slab.push_front(2);
        slab.pop_front();
        slab.pop_front();
        assert_eq!(slab.push_front(3), first);
        assert_eq!(slab.capacity(), 2);
    }

    #[test]
    fn random_against_vec() {
        let mut rng = new_rng();
        let mut slab = Slab::new();
        let mut model = Vec::new();
        let mut high_water = 0;
        for i in 0..10_000 {
            if rng.gen_ratio(55, 100) {
                slab.push_front(i);
                model.push(i);
            } else {
                assert_eq!(slab.pop_front(), model.pop());
            }
            high_water = high_water.max(model.len());
            assert_eq!(slab.len(), model.len());
        }
        assert_eq!(slab.capacity(), high_water);
        while let Some(i) = model.pop() {
            assert_eq!(slab.pop_front(), Some(i));
        }
        assert!(slab.is_empty());
    }
}
