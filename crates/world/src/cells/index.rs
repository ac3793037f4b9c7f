use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::content::{CellDef, CellIdentity};

use super::store::CellStore;

/// Stable handle to a cell store. Stores are never removed or reordered, so an id stays
/// valid for the lifetime of the index that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(usize);

impl CellId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell#{}", self.0)
    }
}

/// Owns every materialised cell store: interiors by name, exteriors by grid coordinate.
#[derive(Debug, Default)]
pub struct SpatialIndex {
    stores: Vec<CellStore>,
    interiors: HashMap<String, CellId>,
    exteriors: HashMap<(i32, i32), CellId>,
    interior_order: Vec<CellId>,
    exterior_order: Vec<CellId>,
}

impl SpatialIndex {
    /// Returns the store for the definition's identity, creating an unloaded one on first use.
    pub fn get_or_insert(&mut self, def: Arc<CellDef>) -> CellId {
        if let Some(id) = self.cell_id(&def.identity) {
            return id;
        }
        let id = CellId::new(self.stores.len());
        match &def.identity {
            CellIdentity::Interior(name) => {
                self.interiors.insert(name.clone(), id);
                self.interior_order.push(id);
            }
            CellIdentity::Exterior { x, y } => {
                self.exteriors.insert((*x, *y), id);
                self.exterior_order.push(id);
            }
        }
        self.stores.push(CellStore::new(id, def));
        id
    }

    pub fn cell_id(&self, identity: &CellIdentity) -> Option<CellId> {
        match identity {
            CellIdentity::Interior(name) => self.interiors.get(name).copied(),
            CellIdentity::Exterior { x, y } => self.exteriors.get(&(*x, *y)).copied(),
        }
    }

    pub fn get(&self, id: CellId) -> Option<&CellStore> {
        self.stores.get(id.index())
    }

    pub fn get_mut(&mut self, id: CellId) -> Option<&mut CellStore> {
        self.stores.get_mut(id.index())
    }

    /// Interior stores in the order they were first requested.
    pub fn interior_ids(&self) -> &[CellId] {
        &self.interior_order
    }

    /// Exterior stores in the order they were first requested.
    pub fn exterior_ids(&self) -> &[CellId] {
        &self.exterior_order
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}
