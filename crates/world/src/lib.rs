use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod cells;
pub mod content;

pub use cells::{
    CellId, CellLoadError, CellRefList, CellState, CellStore, Cells, CellsConfig, ClassError,
    ContainerStore, IdCache, IdCacheSlot, ItemStack, LiveCellRef, ObjectClasses, ObjectView, Ptr,
    RefData, SpatialIndex, StandardClasses, DEFAULT_ID_CACHE_SIZE,
};
pub use content::{
    build_or_load_world, compile_world_content, read_world_pack, write_world_pack,
    CellDef, CellFlags, CellIdentity, CellRef, CompiledCell, CompiledContent, ContentCompileError,
    ContentErrorCode, ContentPipelineError, ContentPlanError, ContentRequest, InventoryEntry,
    LoadedWorld, ObjectCategory, ObjectDef, PackAction, PackReason, ReaderError, RecordReader,
    RecordSpan, SourceLocation, WorldDatabase, WorldPack, WorldPackError, WorldPackMeta,
    WORLD_PACK_FORMAT_VERSION,
};

pub const ROOT_ENV_VAR: &str = "CELLWORLD_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub base_content_dir: PathBuf,
    pub mods_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl AppPaths {
    pub fn from_root(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            base_content_dir: root.join("assets").join("base"),
            mods_dir: root.join("mods"),
            cache_dir: root.join("cache"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error("failed to create cache directory at {path}: {source}")]
    CreateCacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "CELLWORLD_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or assets/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or assets/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/cellworld\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    let paths = AppPaths::from_root(&root);

    fs::create_dir_all(&paths.cache_dir).map_err(|source| StartupError::CreateCacheDir {
        path: paths.cache_dir.clone(),
        source,
    })?;

    Ok(paths)
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let normalized = normalize_path(&PathBuf::from(value));
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            exe_dir
                .ancestors()
                .find(|candidate| is_repo_marker(candidate))
                .map(normalize_path)
                .ok_or_else(|| StartupError::RootNotFound {
                    start_dir: normalize_path(&exe_dir),
                    env_var: ROOT_ENV_VAR,
                })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_assets = path.join("assets").is_dir();

    cargo_toml && (has_crates || has_assets)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn repo_marker_requires_cargo_toml() {
        let temp = TempDir::new().expect("temp");
        fs::create_dir_all(temp.path().join("assets")).expect("assets");
        assert!(!is_repo_marker(temp.path()));

        fs::write(temp.path().join("Cargo.toml"), "[workspace]").expect("cargo toml");
        assert!(is_repo_marker(temp.path()));
    }

    #[test]
    fn app_paths_layout_hangs_off_root() {
        let paths = AppPaths::from_root(Path::new("/srv/world"));
        assert_eq!(paths.base_content_dir, Path::new("/srv/world/assets/base"));
        assert_eq!(paths.mods_dir, Path::new("/srv/world/mods"));
        assert_eq!(paths.cache_dir, Path::new("/srv/world/cache"));
    }
}
