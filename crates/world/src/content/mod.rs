mod category;
mod compiler;
mod database;
mod discovery;
mod hashing;
mod pack;
mod pipeline;
mod reader;
mod types;

pub use category::ObjectCategory;
pub use compiler::{
    compile_world_content, CompiledCell, CompiledContent, ContentCompileError, ContentErrorCode,
    SourceLocation,
};
pub use database::{
    CellDef, CellFlags, CellIdentity, CellRef, InventoryEntry, ObjectDef, RecordSpan,
    WorldDatabase,
};
pub use pack::{
    read_world_pack, write_world_pack, WorldPack, WorldPackError, WorldPackMeta,
    WORLD_PACK_FORMAT_VERSION,
};
pub use pipeline::{build_or_load_world, ContentPipelineError, LoadedWorld, PackAction, PackReason};
pub use reader::{ReaderError, RecordReader};
pub use types::{ContentPlanError, ContentRequest};
