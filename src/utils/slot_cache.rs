/// Why a slot holds a durable negative result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Miss {
    InvalidAssetId,
    CorruptRecord,
    UnsupportedFormat,
    CapacityExceeded,
    UploadFailure,
}

#[derive(Debug, Clone, Default)]
pub enum Slot<T> {
    #[default]
    Empty,
    Resident(T),
    Missing(Miss),
}

impl<T> Slot<T> {
    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }
}

/// Dense id-keyed slot array. Slots are created empty, filled once, and only
/// ever cleared all together.
#[derive(Debug, Default)]
pub struct SlotCache<T> {
    slots: Vec<Slot<T>>,
    resident: usize,
}

impl<T> SlotCache<T> {
    pub fn new(len: usize) -> Self {
        let mut slots = Vec::with_capacity(len);
        slots.resize_with(len, Slot::default);
        Self { slots, resident: 0 }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn resident_count(&self) -> usize {
        self.resident
    }

    pub fn get(&self, id: usize) -> Option<&Slot<T>> {
        self.slots.get(id)
    }

    /// Fills an empty slot. Returns `false` when `id` is out of range or the
    /// slot was already populated.
    pub fn fill(&mut self, id: usize, payload: T) -> bool {
        match self.slots.get_mut(id) {
            Some(slot @ Slot::Empty) => {
                *slot = Slot::Resident(payload);
                self.resident += 1;
                true
            }
            _ => false,
        }
    }

    pub fn mark_missing(&mut self, id: usize, miss: Miss) -> bool {
        match self.slots.get_mut(id) {
            Some(slot @ Slot::Empty) => {
                *slot = Slot::Missing(miss);
                true
            }
            _ => false,
        }
    }

    /// Empties every slot, keeping the length.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = Slot::Empty);
        self.resident = 0;
    }
}
