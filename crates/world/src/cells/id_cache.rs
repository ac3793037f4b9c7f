use super::index::CellId;

pub const DEFAULT_ID_CACHE_SIZE: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdCacheSlot {
    pub name: String,
    pub cell: Option<CellId>,
}

/// Fixed number of `(name, cell)` slots overwritten in write order. Reads never reorder.
#[derive(Debug, Clone)]
pub struct IdCache {
    slots: Vec<IdCacheSlot>,
    cursor: usize,
}

impl Default for IdCache {
    fn default() -> Self {
        Self::new(DEFAULT_ID_CACHE_SIZE)
    }
}

impl IdCache {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![IdCacheSlot::default(); capacity.max(1)],
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[IdCacheSlot] {
        &self.slots
    }

    /// Slot the next [`IdCache::record_hit`] writes to.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn record_hit(&mut self, name: &str, cell: CellId) {
        let slot = &mut self.slots[self.cursor];
        slot.name.clear();
        slot.name.push_str(name);
        slot.cell = Some(cell);
        self.cursor = (self.cursor + 1) % self.slots.len();
    }

    /// Cells previously recorded for `name`, in slot order. Empty slots never match.
    pub fn candidates(&self, name: &str) -> Vec<CellId> {
        self.slots
            .iter()
            .filter(|slot| slot.name == name)
            .filter_map(|slot| slot.cell)
            .collect()
    }

    pub fn contains(&self, name: &str, cell: CellId) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.name == name && slot.cell == Some(cell))
    }
}
