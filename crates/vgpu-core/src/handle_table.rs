//! Host-side handle tables.
//!
//! A handle packs a slot index and that slot's generation:
//! `generation << 32 | (index + 1)`. The low half is never zero, so the null
//! handle is never issued, and a handle whose slot has since been released
//! carries an old generation and is rejected instead of aliasing the new
//! occupant.
//!
//! Fresh slots are used before released ones are recycled. Until a table has
//! touched `capacity` slots, handles are therefore issued as 1, 2, 3, ... and
//! strictly increase.

use tracing::debug;

use vgpu_protocol::Handle;

use crate::error::CoreError;

/// Largest capacity a table accepts; the slot index must fit the low half.
pub const MAX_CAPACITY: usize = (u32::MAX - 1) as usize;

struct Slot<T> {
    generation: u32,
    /// Insertion order of the current occupant.
    sequence: u64,
    value: Option<T>,
}

/// Growable, capacity-bounded table mapping [`Handle`]s to values.
pub struct HandleTable<T> {
    kind: &'static str,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    next_sequence: u64,
    len: usize,
    capacity: usize,
}

impl<T> HandleTable<T> {
    /// `kind` names the table in errors and logs ("instance", "device").
    pub fn new(kind: &'static str, capacity: usize) -> Self {
        Self {
            kind,
            slots: Vec::new(),
            free: Vec::new(),
            next_sequence: 0,
            len: 0,
            capacity: capacity.min(MAX_CAPACITY),
        }
    }

    /// Store a value and issue its handle.
    pub fn insert(&mut self, value: T) -> Result<Handle, CoreError> {
        if self.is_full() {
            return Err(CoreError::CapacityExceeded {
                kind: self.kind,
                capacity: self.capacity,
            });
        }

        let index = if self.slots.len() < self.capacity {
            self.slots.push(Slot {
                generation: 0,
                sequence: 0,
                value: None,
            });
            self.slots.len() - 1
        } else {
            // len < capacity == slots.len(), so a released slot exists.
            match self.free.pop() {
                Some(index) => index as usize,
                None => {
                    return Err(CoreError::CapacityExceeded {
                        kind: self.kind,
                        capacity: self.capacity,
                    })
                }
            }
        };

        let slot = &mut self.slots[index];
        slot.value = Some(value);
        slot.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.len += 1;

        let handle = encode(index, slot.generation);
        debug!(kind = self.kind, %handle, "handle issued");
        Ok(handle)
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        let (index, generation) = decode(handle)?;
        let slot = self.slots.get(index)?;
        if slot.generation != generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let (index, generation) = decode(handle)?;
        let slot = self.slots.get_mut(index)?;
        if slot.generation != generation {
            return None;
        }
        slot.value.as_mut()
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Release a handle. Its slot's generation advances, so the old handle
    /// stops resolving.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let (index, generation) = decode(handle)?;
        let slot = self.slots.get_mut(index)?;
        if slot.generation != generation {
            return None;
        }
        let value = slot.value.take()?;
        self.len -= 1;

        // A slot whose generation would wrap is retired for good.
        if let Some(next) = slot.generation.checked_add(1) {
            slot.generation = next;
            self.free.push(index as u32);
        }
        Some(value)
    }

    /// The most recently inserted live entry. Recycled slots can issue lower
    /// handles than older entries, so this follows insertion order.
    pub fn newest(&self) -> Option<Handle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.value.is_some())
            .max_by_key(|(_, slot)| slot.sequence)
            .map(|(index, slot)| encode(index, slot.generation))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (encode(index, slot.generation), value))
        })
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.capacity
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

fn encode(index: usize, generation: u32) -> Handle {
    Handle(((generation as u64) << 32) | (index as u64 + 1))
}

fn decode(handle: Handle) -> Option<(usize, u32)> {
    let low = handle.raw() & 0xffff_ffff;
    if low == 0 {
        return None;
    }
    Some(((low - 1) as usize, (handle.raw() >> 32) as u32))
}
