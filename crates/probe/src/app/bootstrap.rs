use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use world::{resolve_app_paths, AppPaths, CellsConfig, ContentRequest};

use super::probe::Query;

const ENABLED_MODS_ENV_VAR: &str = "CELLWORLD_ENABLED_MODS";
const PROBE_CONFIG_ENV_VAR: &str = "CELLWORLD_PROBE_CONFIG";

/// Optional JSON file named by `CELLWORLD_PROBE_CONFIG`.
#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ProbeConfig {
    pub(crate) id_cache_size: Option<usize>,
    pub(crate) enabled_mods: Vec<String>,
}

pub(crate) struct ProbeWiring {
    pub(crate) app_paths: AppPaths,
    pub(crate) content_request: ContentRequest,
    pub(crate) cells_config: CellsConfig,
    pub(crate) queries: Vec<Query>,
}

pub(crate) fn build_app(args: &[String]) -> Result<ProbeWiring, String> {
    init_tracing();
    info!("=== Cellworld Probe Startup ===");

    let queries = args
        .iter()
        .map(|raw| Query::parse(raw))
        .collect::<Result<Vec<_>, _>>()?;
    let config = match env::var_os(PROBE_CONFIG_ENV_VAR) {
        Some(path) => load_probe_config(Path::new(&path))?,
        None => ProbeConfig::default(),
    };
    let env_mods = parse_enabled_mods(env::var(ENABLED_MODS_ENV_VAR).ok().as_deref());
    let enabled_mods = if env_mods.is_empty() {
        config.enabled_mods
    } else {
        env_mods
    };
    let cells_config = CellsConfig {
        id_cache_size: config
            .id_cache_size
            .unwrap_or(CellsConfig::default().id_cache_size),
    };
    let app_paths = resolve_app_paths().map_err(|error| error.to_string())?;

    info!(
        root = %app_paths.root.display(),
        enabled_mods = ?enabled_mods,
        id_cache_size = cells_config.id_cache_size,
        query_count = queries.len(),
        "probe_configured"
    );

    Ok(ProbeWiring {
        app_paths,
        content_request: ContentRequest {
            enabled_mods,
            compiler_version: env!("CARGO_PKG_VERSION").to_string(),
        },
        cells_config,
        queries,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn parse_enabled_mods(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(ToString::to_string)
            .collect::<Vec<_>>()
    })
    .unwrap_or_default()
}

fn load_probe_config(path: &Path) -> Result<ProbeConfig, String> {
    let raw = fs::read_to_string(path)
        .map_err(|error| format!("read probe config '{}': {error}", path.display()))?;
    parse_probe_config_json(&raw)
}

fn parse_probe_config_json(raw: &str) -> Result<ProbeConfig, String> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, ProbeConfig>(&mut deserializer) {
        Ok(config) => Ok(config),
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            if path.is_empty() || path == "." {
                Err(format!("parse probe config json: {source}"))
            } else {
                Err(format!("parse probe config json at {path}: {source}"))
            }
        }
    }
}
