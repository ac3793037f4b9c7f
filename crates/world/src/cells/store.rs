use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::content::{
    CellDef, CellIdentity, CellRef, ObjectCategory, ObjectDef, ReaderError, RecordReader,
    WorldDatabase,
};

use super::class::{ClassError, ObjectClasses};
use super::index::CellId;
use super::object::{LiveCellRef, Ptr};
use super::ref_list::CellRefList;

/// Load progress of a cell. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CellState {
    Unloaded,
    /// Membership ids known, no instances built.
    Preloaded,
    Loaded,
}

#[derive(Debug, Error)]
pub enum CellLoadError {
    #[error(transparent)]
    Reader(#[from] ReaderError),
    #[error("cell {cell} references unknown object '{ref_id}'")]
    UnresolvedReference { cell: CellIdentity, ref_id: String },
    #[error(transparent)]
    Class(#[from] ClassError),
    #[error("cell {cell} is not loaded")]
    NotLoaded { cell: CellIdentity },
    #[error("{cell} does not belong to this world")]
    UnknownCell { cell: CellId },
}

#[derive(Debug)]
pub struct CellStore {
    id: CellId,
    def: Arc<CellDef>,
    state: CellState,
    // Lower-cased and sorted for binary search.
    ids: Vec<String>,
    lists: [CellRefList; ObjectCategory::COUNT],
}

impl CellStore {
    pub(crate) fn new(id: CellId, def: Arc<CellDef>) -> Self {
        Self {
            id,
            def,
            state: CellState::Unloaded,
            ids: Vec::new(),
            lists: ObjectCategory::SCAN_ORDER.map(CellRefList::new),
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn identity(&self) -> &CellIdentity {
        &self.def.identity
    }

    pub fn state(&self) -> CellState {
        self.state
    }

    pub fn preload(&mut self, reader: &dyn RecordReader) -> Result<(), CellLoadError> {
        if self.state != CellState::Unloaded {
            return Ok(());
        }
        self.ids = sorted_lowercase(reader.read_cell_ids(&self.def)?);
        self.state = CellState::Preloaded;
        debug!(cell = %self.def.identity, id_count = self.ids.len(), "cell_preloaded");
        Ok(())
    }

    /// Builds every instance of the cell and fills the inventory of each container, creature
    /// and npc. Returns `true` only for the call that moved the cell into
    /// [`CellState::Loaded`]; a failed read, resolve or fill leaves the store untouched.
    pub fn load(
        &mut self,
        database: &WorldDatabase,
        reader: &dyn RecordReader,
        classes: &dyn ObjectClasses,
    ) -> Result<bool, CellLoadError> {
        if self.state == CellState::Loaded {
            return Ok(false);
        }

        let refs = reader.read_cell_refs(&self.def)?;
        let mut lists = ObjectCategory::SCAN_ORDER.map(CellRefList::new);
        let mut ids = Vec::<String>::with_capacity(refs.len());
        for cell_ref in refs {
            let Some(base) = database.object_def(&cell_ref.ref_id) else {
                return Err(CellLoadError::UnresolvedReference {
                    cell: self.def.identity.clone(),
                    ref_id: cell_ref.ref_id,
                });
            };
            ids.push(cell_ref.ref_id.clone());
            lists[base.category.index()].load(Arc::clone(base), cell_ref);
        }
        let filled = fill_containers(&mut lists, database, classes)?;

        self.lists = lists;
        if self.state == CellState::Unloaded {
            self.ids = sorted_lowercase(ids);
        }
        self.state = CellState::Loaded;
        debug!(
            cell = %self.def.identity,
            ref_count = self.ref_count(),
            filled,
            "cell_loaded"
        );
        Ok(true)
    }

    /// Case-insensitive membership test against the preloaded ids.
    pub fn has_id(&self, name: &str) -> bool {
        self.ids
            .binary_search(&name.to_lowercase())
            .is_ok()
    }

    /// Walks every category in scan order. When several categories hold `name`, the one
    /// scanned last wins.
    pub fn search(&self, name: &str) -> Option<Ptr> {
        let mut found = None;
        for list in &self.lists {
            if let Some(index) = list.find(name) {
                found = Some(Ptr::new(self.id, list.category(), index));
            }
        }
        found
    }

    pub fn list(&self, category: ObjectCategory) -> &CellRefList {
        &self.lists[category.index()]
    }

    pub fn ref_count(&self) -> usize {
        self.lists.iter().map(CellRefList::len).sum()
    }

    pub fn get(&self, ptr: Ptr) -> Option<&LiveCellRef> {
        if ptr.cell() != self.id {
            return None;
        }
        self.lists[ptr.category().index()].get(ptr.index())
    }

    pub fn get_mut(&mut self, ptr: Ptr) -> Option<&mut LiveCellRef> {
        if ptr.cell() != self.id {
            return None;
        }
        self.lists[ptr.category().index()].get_mut(ptr.index())
    }

    /// Places a new instance into a loaded cell.
    pub fn insert_object(
        &mut self,
        base: Arc<ObjectDef>,
        cell_ref: CellRef,
    ) -> Result<Ptr, CellLoadError> {
        if self.state != CellState::Loaded {
            return Err(CellLoadError::NotLoaded {
                cell: self.def.identity.clone(),
            });
        }
        let id = base.id.to_lowercase();
        if let Err(slot) = self.ids.binary_search(&id) {
            self.ids.insert(slot, id);
        }
        let category = base.category;
        let index = self.lists[category.index()].load(base, cell_ref);
        Ok(Ptr::new(self.id, category, index))
    }
}

/// Hands the authored inventory of every container, creature and npc to its store.
fn fill_containers(
    lists: &mut [CellRefList; ObjectCategory::COUNT],
    database: &WorldDatabase,
    classes: &dyn ObjectClasses,
) -> Result<usize, ClassError> {
    let mut filled = 0usize;
    for category in ObjectCategory::WITH_INVENTORY {
        for live in lists[category.index()].iter_mut() {
            let base = Arc::clone(&live.base);
            classes.container_store(live)?.fill(&base.inventory, database);
            filled += 1;
        }
    }
    Ok(filled)
}

fn sorted_lowercase(ids: Vec<String>) -> Vec<String> {
    let mut ids = ids
        .into_iter()
        .map(|id| id.to_lowercase())
        .collect::<Vec<_>>();
    ids.sort();
    ids.dedup();
    ids
}
