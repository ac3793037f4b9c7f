use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use super::category::ObjectCategory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    pub item: String,
    pub count: u32,
}

/// Immutable base definition shared by every placed instance of an object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDef {
    pub id: String,
    pub category: ObjectCategory,
    pub label: String,
    pub inventory: Vec<InventoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellIdentity {
    Interior(String),
    Exterior { x: i32, y: i32 },
}

impl fmt::Display for CellIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interior(name) => f.write_str(name),
            Self::Exterior { x, y } => write!(f, "({x}, {y})"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CellFlags(pub u32);

impl CellFlags {
    pub const INTERIOR: u32 = 1 << 0;
    pub const HAS_WATER: u32 = 1 << 1;

    pub fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }
}

/// Where a cell's placed references live inside the record source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSpan {
    pub offset: u32,
    pub len: u32,
    pub ref_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellDef {
    pub identity: CellIdentity,
    pub flags: CellFlags,
    pub water_level: f32,
    pub map_color: u32,
    /// `None` for cells without authored references, synthetic exteriors included.
    pub records: Option<RecordSpan>,
}

impl CellDef {
    pub fn interior(name: impl Into<String>) -> Self {
        Self {
            identity: CellIdentity::Interior(name.into()),
            flags: CellFlags(CellFlags::INTERIOR),
            water_level: 0.0,
            map_color: 0,
            records: None,
        }
    }

    /// Minimal record for an exterior coordinate nobody authored.
    pub fn synthetic_exterior(x: i32, y: i32) -> Self {
        Self {
            identity: CellIdentity::Exterior { x, y },
            flags: CellFlags::default(),
            water_level: 0.0,
            map_color: 0,
            records: None,
        }
    }
}

/// One authored placement of an object inside a cell, as stored by the record source.
#[derive(Debug, Clone, PartialEq)]
pub struct CellRef {
    pub ref_id: String,
    pub count: i32,
    pub position: [f32; 3],
}

impl CellRef {
    pub fn new(ref_id: impl Into<String>, count: i32) -> Self {
        Self {
            ref_id: ref_id.into(),
            count,
            position: [0.0; 3],
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct WorldDatabase {
    objects: HashMap<String, Arc<ObjectDef>>,
    interiors: BTreeMap<String, Arc<CellDef>>,
    exteriors: BTreeMap<(i32, i32), Arc<CellDef>>,
}

impl WorldDatabase {
    pub fn from_defs(objects: Vec<ObjectDef>, cells: Vec<CellDef>) -> Self {
        let mut database = Self {
            objects: objects
                .into_iter()
                .map(|def| (def.id.clone(), Arc::new(def)))
                .collect(),
            ..Self::default()
        };
        for cell in cells {
            database.insert_cell(Arc::new(cell));
        }
        database
    }

    fn insert_cell(&mut self, cell: Arc<CellDef>) {
        match &cell.identity {
            CellIdentity::Interior(name) => {
                self.interiors.insert(name.clone(), cell);
            }
            CellIdentity::Exterior { x, y } => {
                self.exteriors.insert((*x, *y), cell);
            }
        }
    }

    pub fn object_def(&self, id: &str) -> Option<&Arc<ObjectDef>> {
        self.objects.get(id)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn find_interior(&self, name: &str) -> Option<&Arc<CellDef>> {
        self.interiors.get(name)
    }

    pub fn find_exterior(&self, x: i32, y: i32) -> Option<&Arc<CellDef>> {
        self.exteriors.get(&(x, y))
    }

    pub fn find_cell(&self, identity: &CellIdentity) -> Option<&Arc<CellDef>> {
        match identity {
            CellIdentity::Interior(name) => self.find_interior(name),
            CellIdentity::Exterior { x, y } => self.find_exterior(*x, *y),
        }
    }

    /// Registers a cell created at runtime. A cell already known under the same identity
    /// wins and is returned unchanged.
    pub fn register_synthetic_cell(&mut self, cell: CellDef) -> Arc<CellDef> {
        if let Some(existing) = self.find_cell(&cell.identity) {
            return Arc::clone(existing);
        }
        let cell = Arc::new(cell);
        self.insert_cell(Arc::clone(&cell));
        cell
    }

    pub fn interior_cells(&self) -> impl Iterator<Item = &Arc<CellDef>> {
        self.interiors.values()
    }

    pub fn exterior_cells(&self) -> impl Iterator<Item = &Arc<CellDef>> {
        self.exteriors.values()
    }

    pub fn cell_count(&self) -> usize {
        self.interiors.len() + self.exteriors.len()
    }
}
