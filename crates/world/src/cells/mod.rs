mod class;
mod container;
mod id_cache;
mod index;
mod object;
mod ref_list;
mod resolver;
mod store;

pub use class::{ClassError, ObjectClasses, StandardClasses};
pub use container::{ContainerStore, ItemStack};
pub use id_cache::{IdCache, IdCacheSlot, DEFAULT_ID_CACHE_SIZE};
pub use index::{CellId, SpatialIndex};
pub use object::{LiveCellRef, ObjectView, Ptr, RefData};
pub use ref_list::CellRefList;
pub use resolver::{Cells, CellsConfig};
pub use store::{CellLoadError, CellState, CellStore};
