use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

use crate::AppPaths;

use super::compiler::{compile_sources, ContentCompileError};
use super::database::WorldDatabase;
use super::discovery::discover_mod_sources;
use super::hashing::{hash_content_inputs, ContentInputHash};
use super::pack::{
    read_world_pack, write_world_pack, WorldPack, WorldPackError, WorldPackMeta,
    WORLD_PACK_FORMAT_VERSION,
};
use super::types::{ContentPlanError, ContentRequest};

const WORLD_PACK_FILE_NAME: &str = "world.pack";

#[derive(Debug, Error)]
pub enum ContentPipelineError {
    #[error(transparent)]
    Plan(#[from] ContentPlanError),
    #[error(transparent)]
    Compile(#[from] ContentCompileError),
    #[error(transparent)]
    Pack(#[from] WorldPackError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackAction {
    Compiled,
    CacheHit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackReason {
    CacheValid,
    PackMissing,
    PackUnreadable,
    FormatMismatch,
    VersionMismatch,
    InputHashMismatch,
}

/// Headers plus the reader that serves per-cell references out of the same pack.
#[derive(Debug)]
pub struct LoadedWorld {
    pub database: WorldDatabase,
    pub pack: WorldPack,
    pub action: PackAction,
    pub reason: PackReason,
}

pub fn build_or_load_world(
    app_paths: &AppPaths,
    request: &ContentRequest,
) -> Result<LoadedWorld, ContentPipelineError> {
    let sources = discover_mod_sources(app_paths, request)?;
    let input_hash = hash_content_inputs(&sources)?;
    fs::create_dir_all(&app_paths.cache_dir).map_err(|source| {
        ContentPlanError::CreateCacheDir {
            path: app_paths.cache_dir.clone(),
            source,
        }
    })?;
    let pack_path = app_paths.cache_dir.join(WORLD_PACK_FILE_NAME);

    let (pack, database, action, reason) = match try_load_cached(&pack_path, request, &input_hash)
    {
        Ok((pack, database)) => {
            info!(
                pack_path = %pack_path.display(),
                input_hash = %input_hash.hash_hex(),
                "world_pack_cache_hit"
            );
            (pack, database, PackAction::CacheHit, PackReason::CacheValid)
        }
        Err(reason) => {
            if reason != PackReason::PackMissing {
                warn!(
                    pack_path = %pack_path.display(),
                    reason = ?reason,
                    "world_pack_invalid_rebuilding"
                );
            }
            let content = compile_sources(&sources)?;
            let meta = WorldPackMeta {
                format_version: WORLD_PACK_FORMAT_VERSION,
                compiler_version: request.compiler_version.clone(),
                input_hash: input_hash.hash,
            };
            write_world_pack(&pack_path, &meta, &content)?;
            let (pack, database) = read_world_pack(&pack_path)?;
            (pack, database, PackAction::Compiled, reason)
        }
    };

    info!(
        total_mods = sources.len(),
        xml_file_count = input_hash.xml_file_count,
        object_count = database.object_count(),
        cell_count = database.cell_count(),
        action = ?action,
        reason = ?reason,
        input_hash = %input_hash.hash_hex(),
        "content_pipeline_summary"
    );

    Ok(LoadedWorld {
        database,
        pack,
        action,
        reason,
    })
}

fn try_load_cached(
    pack_path: &Path,
    request: &ContentRequest,
    input_hash: &ContentInputHash,
) -> Result<(WorldPack, WorldDatabase), PackReason> {
    if !pack_path.is_file() {
        return Err(PackReason::PackMissing);
    }
    let (pack, database) = read_world_pack(pack_path).map_err(|_| PackReason::PackUnreadable)?;
    let meta = pack.meta();
    if meta.format_version != WORLD_PACK_FORMAT_VERSION {
        return Err(PackReason::FormatMismatch);
    }
    if meta.compiler_version != request.compiler_version {
        return Err(PackReason::VersionMismatch);
    }
    if meta.input_hash != input_hash.hash {
        return Err(PackReason::InputHashMismatch);
    }
    Ok((pack, database))
}
