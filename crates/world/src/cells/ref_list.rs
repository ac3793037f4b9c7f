use std::sync::Arc;

use crate::content::{CellRef, ObjectCategory, ObjectDef};

use super::object::LiveCellRef;

/// Live instances of one object category inside one cell.
#[derive(Debug, Clone)]
pub struct CellRefList {
    category: ObjectCategory,
    list: Vec<LiveCellRef>,
}

impl CellRefList {
    pub fn new(category: ObjectCategory) -> Self {
        Self {
            category,
            list: Vec::new(),
        }
    }

    pub fn category(&self) -> ObjectCategory {
        self.category
    }

    /// Slot of the first instance whose base id is exactly `name`.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.list.iter().position(|live| live.base.id == name)
    }

    pub fn get(&self, index: usize) -> Option<&LiveCellRef> {
        self.list.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut LiveCellRef> {
        self.list.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LiveCellRef> {
        self.list.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut LiveCellRef> {
        self.list.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Appends an instance and returns its slot.
    pub(crate) fn load(&mut self, base: Arc<ObjectDef>, cell_ref: CellRef) -> usize {
        self.list.push(LiveCellRef::new(base, cell_ref));
        self.list.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(id: &str) -> Arc<ObjectDef> {
        Arc::new(ObjectDef {
            id: id.to_string(),
            category: ObjectCategory::Weapon,
            label: id.to_string(),
            inventory: Vec::new(),
        })
    }

    #[test]
    fn find_is_exact_and_returns_first_slot() {
        let mut list = CellRefList::new(ObjectCategory::Weapon);
        assert_eq!(list.load(def("sword"), CellRef::new("sword", 1)), 0);
        assert_eq!(list.load(def("axe"), CellRef::new("axe", 1)), 1);
        assert_eq!(list.load(def("sword"), CellRef::new("sword", 3)), 2);

        assert_eq!(list.find("sword"), Some(0));
        assert_eq!(list.find("axe"), Some(1));
        assert_eq!(list.find("Sword"), None);
        assert_eq!(list.len(), 3);
    }
}
