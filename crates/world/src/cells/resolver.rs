use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::content::{CellDef, CellIdentity, RecordReader, WorldDatabase};

use super::class::ObjectClasses;
use super::id_cache::{IdCache, DEFAULT_ID_CACHE_SIZE};
use super::index::{CellId, SpatialIndex};
use super::object::{LiveCellRef, ObjectView, Ptr};
use super::store::{CellLoadError, CellState, CellStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CellsConfig {
    pub id_cache_size: usize,
}

impl Default for CellsConfig {
    fn default() -> Self {
        Self {
            id_cache_size: DEFAULT_ID_CACHE_SIZE,
        }
    }
}

/// Runtime cell registry of one world and the object lookup built on top of it.
///
/// The database and reader are borrowed for the lifetime of the registry; the only write to
/// the database is registering synthetic exterior cells.
pub struct Cells<'w> {
    database: &'w mut WorldDatabase,
    reader: &'w dyn RecordReader,
    classes: &'w dyn ObjectClasses,
    index: SpatialIndex,
    id_cache: IdCache,
}

impl<'w> Cells<'w> {
    pub fn new(
        database: &'w mut WorldDatabase,
        reader: &'w dyn RecordReader,
        classes: &'w dyn ObjectClasses,
    ) -> Self {
        Self::with_config(database, reader, classes, CellsConfig::default())
    }

    pub fn with_config(
        database: &'w mut WorldDatabase,
        reader: &'w dyn RecordReader,
        classes: &'w dyn ObjectClasses,
        config: CellsConfig,
    ) -> Self {
        Self {
            database,
            reader,
            classes,
            index: SpatialIndex::default(),
            id_cache: IdCache::new(config.id_cache_size),
        }
    }

    /// Loaded store for an exterior coordinate. Coordinates without an authored cell get an
    /// empty synthetic one, registered with the database on first request.
    pub fn get_exterior(&mut self, x: i32, y: i32) -> Result<&mut CellStore, CellLoadError> {
        let id = self.acquire_exterior(x, y);
        self.ensure_loaded(id)?;
        self.index_store_mut(id)
    }

    /// Loaded store for a named interior, or `None` when no such interior exists.
    pub fn get_interior(&mut self, name: &str) -> Result<Option<&mut CellStore>, CellLoadError> {
        let Some(id) = self.acquire_interior(name) else {
            return Ok(None);
        };
        self.ensure_loaded(id)?;
        Ok(Some(self.index_store_mut(id)?))
    }

    /// Looks `name` up inside one cell, loading it only if its membership ids contain the name.
    pub fn resolve_in(&mut self, name: &str, cell: CellId) -> Result<Option<Ptr>, CellLoadError> {
        let Some(store) = self.index.get_mut(cell) else {
            return Ok(None);
        };
        if store.state() == CellState::Unloaded {
            store.preload(self.reader)?;
        }
        if store.state() == CellState::Preloaded {
            if !store.has_id(name) {
                return Ok(None);
            }
            store.load(&*self.database, self.reader, self.classes)?;
        }

        let found = store
            .search(name)
            .filter(|ptr| store.get(*ptr).is_some_and(|live| live.data.count() > 0));
        Ok(found)
    }

    /// Looks `name` up anywhere in the world: cached cells, then materialised interiors and
    /// exteriors, then every remaining cell the database knows about.
    pub fn resolve(&mut self, name: &str) -> Result<Option<Ptr>, CellLoadError> {
        for cell in self.id_cache.candidates(name) {
            if let Some(ptr) = self.resolve_in(name, cell)? {
                debug!(id = %name, cell = %self.cell_label(cell), "id_cache_hit");
                return Ok(Some(ptr));
            }
        }

        let materialised = self
            .index
            .interior_ids()
            .iter()
            .chain(self.index.exterior_ids())
            .copied()
            .collect::<Vec<_>>();
        for cell in materialised {
            if let Some(ptr) = self.resolve_in(name, cell)? {
                return Ok(Some(self.record_hit(name, ptr)));
            }
        }

        let interiors = self.unmaterialised(self.database.interior_cells());
        let exteriors = self.unmaterialised(self.database.exterior_cells());
        for def in interiors.into_iter().chain(exteriors) {
            let cell = self.index.get_or_insert(def);
            if let Some(ptr) = self.resolve_in(name, cell)? {
                return Ok(Some(self.record_hit(name, ptr)));
            }
        }

        debug!(id = %name, scanned_cells = self.index.len(), "object_not_found");
        Ok(None)
    }

    pub fn get(&self, ptr: Ptr) -> Option<&LiveCellRef> {
        self.index.get(ptr.cell())?.get(ptr)
    }

    pub fn get_mut(&mut self, ptr: Ptr) -> Option<&mut LiveCellRef> {
        self.index.get_mut(ptr.cell())?.get_mut(ptr)
    }

    pub fn view(&self, ptr: Ptr) -> Option<ObjectView<'_>> {
        let cell = self.index.get(ptr.cell())?;
        let object = cell.get(ptr)?;
        Some(ObjectView { ptr, cell, object })
    }

    pub fn store(&self, cell: CellId) -> Option<&CellStore> {
        self.index.get(cell)
    }

    pub fn database(&self) -> &WorldDatabase {
        &*self.database
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn id_cache(&self) -> &IdCache {
        &self.id_cache
    }

    fn acquire_exterior(&mut self, x: i32, y: i32) -> CellId {
        let identity = CellIdentity::Exterior { x, y };
        if let Some(id) = self.index.cell_id(&identity) {
            return id;
        }
        let authored = self.database.find_exterior(x, y).cloned();
        let def = match authored {
            Some(def) => def,
            None => {
                debug!(x, y, "synthetic_exterior_cell_created");
                self.database
                    .register_synthetic_cell(CellDef::synthetic_exterior(x, y))
            }
        };
        self.index.get_or_insert(def)
    }

    fn acquire_interior(&mut self, name: &str) -> Option<CellId> {
        let identity = CellIdentity::Interior(name.to_string());
        if let Some(id) = self.index.cell_id(&identity) {
            return Some(id);
        }
        let def = self.database.find_interior(name).cloned()?;
        Some(self.index.get_or_insert(def))
    }

    fn ensure_loaded(&mut self, cell: CellId) -> Result<(), CellLoadError> {
        let store = self
            .index
            .get_mut(cell)
            .ok_or(CellLoadError::UnknownCell { cell })?;
        store.load(&*self.database, self.reader, self.classes)?;
        Ok(())
    }

    fn index_store_mut(&mut self, cell: CellId) -> Result<&mut CellStore, CellLoadError> {
        self.index
            .get_mut(cell)
            .ok_or(CellLoadError::UnknownCell { cell })
    }

    fn unmaterialised<'a>(
        &self,
        defs: impl Iterator<Item = &'a Arc<CellDef>>,
    ) -> Vec<Arc<CellDef>> {
        defs.filter(|def| self.index.cell_id(&def.identity).is_none())
            .cloned()
            .collect()
    }

    fn record_hit(&mut self, name: &str, ptr: Ptr) -> Ptr {
        self.id_cache.record_hit(name, ptr.cell());
        debug!(
            id = %name,
            cell = %self.cell_label(ptr.cell()),
            category = %ptr.category(),
            "object_resolved"
        );
        ptr
    }

    fn cell_label(&self, cell: CellId) -> String {
        self.index
            .get(cell)
            .map_or_else(|| cell.to_string(), |store| store.identity().to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::HashMap;

    use super::*;
    use crate::cells::class::{ClassError, StandardClasses};
    use crate::cells::container::ContainerStore;
    use crate::content::{
        CellRef, InventoryEntry, ObjectCategory, ObjectDef, ReaderError, RecordSpan,
    };

    /// Serves refs per cell identity and counts every read.
    #[derive(Default)]
    struct FakeReader {
        refs: HashMap<CellIdentity, Vec<CellRef>>,
        ref_reads: Cell<usize>,
        id_reads: Cell<usize>,
    }

    impl FakeReader {
        fn reads(&self) -> usize {
            self.ref_reads.get() + self.id_reads.get()
        }
    }

    impl RecordReader for FakeReader {
        fn read_cell_refs(&self, cell: &CellDef) -> Result<Vec<CellRef>, ReaderError> {
            self.ref_reads.set(self.ref_reads.get() + 1);
            Ok(self.refs.get(&cell.identity).cloned().unwrap_or_default())
        }

        fn read_cell_ids(&self, cell: &CellDef) -> Result<Vec<String>, ReaderError> {
            self.id_reads.set(self.id_reads.get() + 1);
            Ok(self
                .refs
                .get(&cell.identity)
                .map(|refs| refs.iter().map(|r| r.ref_id.clone()).collect())
                .unwrap_or_default())
        }
    }

    struct FailingReader;

    impl RecordReader for FailingReader {
        fn read_cell_refs(&self, cell: &CellDef) -> Result<Vec<CellRef>, ReaderError> {
            Err(ReaderError::Malformed {
                cell: cell.identity.clone(),
                message: "truncated".to_string(),
            })
        }

        fn read_cell_ids(&self, cell: &CellDef) -> Result<Vec<String>, ReaderError> {
            self.read_cell_refs(cell).map(|_| Vec::new())
        }
    }

    fn object(id: &str, category: ObjectCategory) -> ObjectDef {
        ObjectDef {
            id: id.to_string(),
            category,
            label: id.to_string(),
            inventory: Vec::new(),
        }
    }

    fn authored(def: CellDef, ref_count: u32) -> CellDef {
        CellDef {
            records: Some(RecordSpan {
                offset: 0,
                len: 0,
                ref_count,
            }),
            ..def
        }
    }

    fn exterior(x: i32, y: i32) -> CellDef {
        CellDef::synthetic_exterior(x, y)
    }

    /// Cave holds gold, a chest and a removed key; Mine holds a pick; (1, 2) holds a torch.
    fn world() -> (WorldDatabase, FakeReader) {
        let mut chest = object("chest_small", ObjectCategory::Container);
        chest.inventory = vec![InventoryEntry {
            item: "gold_001".to_string(),
            count: 25,
        }];
        let database = WorldDatabase::from_defs(
            vec![
                object("gold_001", ObjectCategory::Miscellaneous),
                object("key_cave", ObjectCategory::Miscellaneous),
                object("pick_iron", ObjectCategory::Lockpick),
                object("torch", ObjectCategory::Light),
                chest,
            ],
            vec![
                authored(CellDef::interior("Cave"), 3),
                authored(CellDef::interior("Mine"), 1),
                authored(exterior(1, 2), 1),
            ],
        );

        let mut reader = FakeReader::default();
        reader.refs.insert(
            CellIdentity::Interior("Cave".to_string()),
            vec![
                CellRef::new("gold_001", 5),
                CellRef::new("chest_small", 1),
                CellRef::new("key_cave", 0),
            ],
        );
        reader.refs.insert(
            CellIdentity::Interior("Mine".to_string()),
            vec![CellRef::new("pick_iron", 1)],
        );
        reader.refs.insert(
            CellIdentity::Exterior { x: 1, y: 2 },
            vec![CellRef::new("torch", 1)],
        );
        (database, reader)
    }

    #[test]
    fn fresh_world_resolution_loads_the_owning_cell_and_caches_it() {
        let (mut database, reader) = world();
        let mut cells = Cells::new(&mut database, &reader, &StandardClasses);

        let ptr = cells.resolve("gold_001").expect("resolve").expect("found");
        let view = cells.view(ptr).expect("view");
        assert_eq!(view.data().count(), 5);
        assert_eq!(view.base().id, "gold_001");
        assert_eq!(
            view.cell.identity(),
            &CellIdentity::Interior("Cave".to_string())
        );
        assert_eq!(view.cell.state(), CellState::Loaded);
        assert!(cells.id_cache().contains("gold_001", ptr.cell()));

        let reads_after_first = reader.reads();
        let cells_after_first = cells.index().len();
        let again = cells.resolve("gold_001").expect("resolve").expect("found");
        assert_eq!(again, ptr);
        assert_eq!(reader.reads(), reads_after_first);
        assert_eq!(cells.index().len(), cells_after_first);
    }

    #[test]
    fn misses_scan_every_cell_without_loading_any() {
        let (mut database, reader) = world();
        let mut cells = Cells::new(&mut database, &reader, &StandardClasses);

        assert_eq!(cells.resolve("sword").expect("resolve"), None);
        assert_eq!(cells.index().len(), 3);
        for &cell in cells
            .index()
            .interior_ids()
            .iter()
            .chain(cells.index().exterior_ids())
        {
            let store = cells.store(cell).expect("store");
            assert_eq!(store.state(), CellState::Preloaded);
            assert_eq!(store.ref_count(), 0);
        }
        assert_eq!(reader.ref_reads.get(), 0);
        assert!(cells.id_cache().slots().iter().all(|slot| slot.cell.is_none()));
    }

    #[test]
    fn membership_is_case_insensitive_but_lookup_is_exact() {
        let (mut database, reader) = world();
        let mut cells = Cells::new(&mut database, &reader, &StandardClasses);

        assert_eq!(cells.resolve("GOLD_001").expect("resolve"), None);
        let cave = cells.index().interior_ids()[0];
        // The membership hit loaded the cell even though the exact lookup failed.
        assert_eq!(
            cells.store(cave).map(CellStore::state),
            Some(CellState::Loaded)
        );
    }

    #[test]
    fn zero_count_references_are_absent() {
        let (mut database, reader) = world();
        let mut cells = Cells::new(&mut database, &reader, &StandardClasses);

        assert_eq!(cells.resolve("key_cave").expect("resolve"), None);

        let gold = cells.resolve("gold_001").expect("resolve").expect("gold");
        cells
            .get_mut(gold)
            .expect("live gold")
            .data
            .set_count(0);
        assert_eq!(cells.resolve_in("gold_001", gold.cell()).expect("resolve"), None);
        assert_eq!(cells.resolve("gold_001").expect("resolve"), None);

        let cave = cells.store(gold.cell()).expect("cave");
        let listed = cave
            .list(ObjectCategory::Miscellaneous)
            .iter()
            .map(LiveCellRef::id)
            .collect::<Vec<_>>();
        assert_eq!(listed, vec!["gold_001", "key_cave"]);
    }

    #[test]
    fn resolve_in_skips_loading_cells_without_the_name() {
        let (mut database, reader) = world();
        let mut cells = Cells::new(&mut database, &reader, &StandardClasses);

        // Materialise the cell handle without loading it.
        assert!(cells.resolve("pick_iron").expect("resolve").is_some());
        let cave = cells
            .index()
            .cell_id(&CellIdentity::Interior("Cave".to_string()))
            .expect("cave indexed");
        assert_eq!(cells.store(cave).map(CellStore::state), Some(CellState::Preloaded));

        assert_eq!(cells.resolve_in("pick_iron", cave).expect("resolve"), None);
        assert_eq!(cells.store(cave).map(CellStore::state), Some(CellState::Preloaded));

        let chest = cells
            .resolve_in("chest_small", cave)
            .expect("resolve")
            .expect("chest");
        assert_eq!(chest.category(), ObjectCategory::Container);
        assert_eq!(cells.store(cave).map(CellStore::state), Some(CellState::Loaded));
    }

    #[test]
    fn fill_runs_once_per_cell() {
        let (mut database, reader) = world();
        let mut cells = Cells::new(&mut database, &reader, &StandardClasses);

        let chest = cells
            .resolve("chest_small")
            .expect("resolve")
            .expect("chest");
        cells.get_interior("Cave").expect("cave").expect("known");
        cells.get_interior("Cave").expect("cave").expect("known");

        let inventory = cells
            .get(chest)
            .and_then(|live| live.data.inventory())
            .expect("inventory");
        assert_eq!(inventory.count_of("gold_001"), 25);
        assert_eq!(reader.ref_reads.get(), 1);
    }

    #[test]
    fn unknown_exterior_is_synthesised_once() {
        let (mut database, reader) = world();
        let mut cells = Cells::new(&mut database, &reader, &StandardClasses);

        let first = {
            let store = cells.get_exterior(7, -3).expect("exterior");
            assert_eq!(store.state(), CellState::Loaded);
            assert_eq!(store.ref_count(), 0);
            store.id()
        };
        let second = cells.get_exterior(7, -3).expect("exterior").id();
        assert_eq!(first, second);
        assert_eq!(cells.index().exterior_ids(), &[first]);
        assert!(cells.database().find_exterior(7, -3).is_some());
    }

    #[test]
    fn authored_exterior_keeps_its_references() {
        let (mut database, reader) = world();
        let mut cells = Cells::new(&mut database, &reader, &StandardClasses);

        let store = cells.get_exterior(1, 2).expect("exterior");
        assert_eq!(store.ref_count(), 1);
        assert!(store.search("torch").is_some());
    }

    #[test]
    fn unknown_interior_is_none() {
        let (mut database, reader) = world();
        let mut cells = Cells::new(&mut database, &reader, &StandardClasses);

        assert!(cells.get_interior("Nowhere").expect("lookup").is_none());
        assert!(cells.index().is_empty());
    }

    #[test]
    fn lookup_order_prefers_materialised_cells() {
        let (mut database, mut reader) = world();
        reader.refs.insert(
            CellIdentity::Exterior { x: 1, y: 2 },
            vec![CellRef::new("torch", 1), CellRef::new("gold_001", 9)],
        );
        let mut cells = Cells::new(&mut database, &reader, &StandardClasses);

        cells.get_exterior(1, 2).expect("exterior");
        let gold = cells.resolve("gold_001").expect("resolve").expect("gold");
        assert_eq!(cells.get(gold).map(|live| live.data.count()), Some(9));
        assert_eq!(cells.index().len(), 1);
    }

    #[test]
    fn stale_cache_entries_fall_through_to_a_scan() {
        let (mut database, mut reader) = world();
        reader.refs.insert(
            CellIdentity::Interior("Mine".to_string()),
            vec![CellRef::new("pick_iron", 1), CellRef::new("gold_001", 2)],
        );
        let mut cells = Cells::new(&mut database, &reader, &StandardClasses);

        let cave_gold = cells.resolve("gold_001").expect("resolve").expect("gold");
        cells
            .get_mut(cave_gold)
            .expect("live")
            .data
            .set_count(0);

        let mine_gold = cells.resolve("gold_001").expect("resolve").expect("gold");
        assert_ne!(mine_gold.cell(), cave_gold.cell());
        assert!(cells.id_cache().contains("gold_001", mine_gold.cell()));
        assert_eq!(cells.id_cache().cursor(), 2);
    }

    #[test]
    fn cache_size_comes_from_config() {
        let (mut database, reader) = world();
        let cells = Cells::with_config(
            &mut database,
            &reader,
            &StandardClasses,
            CellsConfig { id_cache_size: 3 },
        );
        assert_eq!(cells.id_cache().capacity(), 3);
    }

    #[test]
    fn spawned_objects_are_resolvable() {
        let (mut database, reader) = world();
        let torch = Arc::clone(database.object_def("torch").expect("torch"));
        let mut cells = Cells::new(&mut database, &reader, &StandardClasses);

        let ptr = cells
            .get_interior("Mine")
            .expect("mine")
            .expect("known")
            .insert_object(torch, CellRef::new("torch", 2))
            .expect("spawn");
        assert_eq!(cells.resolve("torch").expect("resolve"), Some(ptr));
    }

    #[test]
    fn reader_failures_are_fatal_to_the_load() {
        let mut database =
            WorldDatabase::from_defs(Vec::new(), vec![authored(CellDef::interior("Cave"), 1)]);
        let mut cells = Cells::new(&mut database, &FailingReader, &StandardClasses);

        assert!(matches!(
            cells.resolve("gold_001"),
            Err(CellLoadError::Reader(ReaderError::Malformed { .. }))
        ));
        assert!(matches!(
            cells.get_interior("Cave"),
            Err(CellLoadError::Reader(_))
        ));
    }

    /// Refuses the first inventory request, then behaves like [`StandardClasses`].
    struct FailFirstFill {
        calls: Cell<usize>,
    }

    impl ObjectClasses for FailFirstFill {
        fn container_store<'a>(
            &self,
            object: &'a mut LiveCellRef,
        ) -> Result<&'a mut ContainerStore, ClassError> {
            self.calls.set(self.calls.get() + 1);
            if self.calls.get() == 1 {
                return Err(ClassError::NoContainerStore {
                    category: object.base.category,
                    id: object.base.id.clone(),
                });
            }
            StandardClasses.container_store(object)
        }
    }

    #[test]
    fn failed_fill_is_retried_on_next_request() {
        let (mut database, reader) = world();
        let classes = FailFirstFill {
            calls: Cell::new(0),
        };
        let mut cells = Cells::new(&mut database, &reader, &classes);

        assert!(matches!(
            cells.get_interior("Cave"),
            Err(CellLoadError::Class(ClassError::NoContainerStore { .. }))
        ));
        let cave = cells
            .index()
            .cell_id(&CellIdentity::Interior("Cave".to_string()))
            .expect("cave indexed");
        assert_eq!(cells.store(cave).map(CellStore::state), Some(CellState::Unloaded));

        cells.get_interior("Cave").expect("retry").expect("known");
        assert_eq!(cells.store(cave).map(CellStore::state), Some(CellState::Loaded));
        assert_eq!(classes.calls.get(), 2);

        let chest = cells
            .resolve_in("chest_small", cave)
            .expect("resolve")
            .expect("chest");
        let inventory = cells
            .get(chest)
            .and_then(|live| live.data.inventory())
            .expect("inventory");
        assert_eq!(inventory.count_of("gold_001"), 25);
    }

    #[test]
    fn count_filter_applies_to_the_last_matching_category() {
        let (mut database, reader) = world();
        let mut cells = Cells::new(&mut database, &reader, &StandardClasses);

        let mine = cells.get_interior("Mine").expect("mine").expect("known");
        let tool = mine
            .insert_object(
                Arc::new(object("lever", ObjectCategory::Activator)),
                CellRef::new("lever", 5),
            )
            .expect("activator");
        let blade = mine
            .insert_object(
                Arc::new(object("lever", ObjectCategory::Weapon)),
                CellRef::new("lever", 1),
            )
            .expect("weapon");
        let mine = mine.id();

        assert_eq!(cells.resolve_in("lever", mine).expect("resolve"), Some(blade));

        cells.get_mut(blade).expect("live blade").data.set_count(0);
        assert_eq!(cells.resolve_in("lever", mine).expect("resolve"), None);
        assert_eq!(cells.get(tool).map(|live| live.data.count()), Some(5));
    }
}
