use std::sync::Arc;

use crate::content::{CellRef, ObjectCategory, ObjectDef};

use super::container::ContainerStore;
use super::index::CellId;
use super::store::CellStore;

/// Handle to one placed object: the owning cell, the category list it lives in and its slot.
///
/// A handle never owns the instance. Absence is expressed as `Option<Ptr>`, so a `Ptr` value
/// always names a slot that existed when it was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ptr {
    cell: CellId,
    category: ObjectCategory,
    index: usize,
}

impl Ptr {
    pub(crate) fn new(cell: CellId, category: ObjectCategory, index: usize) -> Self {
        Self {
            cell,
            category,
            index,
        }
    }

    pub fn cell(self) -> CellId {
        self.cell
    }

    pub fn category(self) -> ObjectCategory {
        self.category
    }

    pub fn index(self) -> usize {
        self.index
    }
}

/// Mutable runtime state overlaid on an immutable [`ObjectDef`].
#[derive(Debug, Clone, PartialEq)]
pub struct RefData {
    count: i32,
    position: [f32; 3],
    inventory: Option<ContainerStore>,
}

impl RefData {
    pub fn from_cell_ref(cell_ref: &CellRef) -> Self {
        Self {
            count: cell_ref.count,
            position: cell_ref.position,
            inventory: None,
        }
    }

    pub fn count(&self) -> i32 {
        self.count
    }

    /// A count of zero or less removes the object logically while keeping the instance.
    pub fn set_count(&mut self, count: i32) {
        self.count = count;
    }

    pub fn position(&self) -> [f32; 3] {
        self.position
    }

    pub fn inventory(&self) -> Option<&ContainerStore> {
        self.inventory.as_ref()
    }

    pub(crate) fn inventory_or_default(&mut self) -> &mut ContainerStore {
        self.inventory.get_or_insert_with(ContainerStore::default)
    }
}

#[derive(Debug, Clone)]
pub struct LiveCellRef {
    pub base: Arc<ObjectDef>,
    /// The reference as authored. Runtime changes go to `data` and never write back here.
    pub cell_ref: CellRef,
    pub data: RefData,
}

impl LiveCellRef {
    pub fn new(base: Arc<ObjectDef>, cell_ref: CellRef) -> Self {
        let data = RefData::from_cell_ref(&cell_ref);
        Self {
            base,
            cell_ref,
            data,
        }
    }

    pub fn id(&self) -> &str {
        &self.base.id
    }
}

/// Borrowed view of a resolved object together with the cell that owns it.
#[derive(Debug, Clone, Copy)]
pub struct ObjectView<'a> {
    pub ptr: Ptr,
    pub cell: &'a CellStore,
    pub object: &'a LiveCellRef,
}

impl<'a> ObjectView<'a> {
    pub fn category(&self) -> ObjectCategory {
        self.ptr.category()
    }

    pub fn base(&self) -> &'a ObjectDef {
        &self.object.base
    }

    pub fn data(&self) -> &'a RefData {
        &self.object.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_changes_leave_the_authored_reference_alone() {
        let base = Arc::new(ObjectDef {
            id: "gold_001".to_string(),
            category: ObjectCategory::Miscellaneous,
            label: "Gold".to_string(),
            inventory: Vec::new(),
        });
        let mut live = LiveCellRef::new(base, CellRef::new("gold_001", 5));

        live.data.set_count(0);
        assert_eq!(live.data.count(), 0);
        assert_eq!(live.cell_ref.count, 5);
        assert_eq!(live.id(), "gold_001");
    }

    #[test]
    fn handles_keep_full_width_indices() {
        let index = usize::MAX;
        let ptr = Ptr::new(CellId::new(index), ObjectCategory::Weapon, index);
        assert_eq!(ptr.cell().index(), index);
        assert_eq!(ptr.index(), index);
    }
}
