use std::fmt;
use std::io::{self, Write};
use std::process::ExitCode;

use tracing::{error, info, warn};
use world::{build_or_load_world, CellLoadError, Cells, StandardClasses};

use super::bootstrap::ProbeWiring;

/// One command line argument: `NAME`, `NAME@CELL` or `@X,Y`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Query {
    Object { name: String },
    ObjectIn { name: String, cell: String },
    Exterior { x: i32, y: i32 },
}

impl Query {
    pub(crate) fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if let Some(coords) = raw.strip_prefix('@') {
            let (x, y) = coords
                .split_once(',')
                .ok_or_else(|| format!("exterior query '{raw}' must look like @X,Y"))?;
            let parse_axis = |value: &str| {
                value
                    .trim()
                    .parse::<i32>()
                    .map_err(|error| format!("exterior query '{raw}': {error}"))
            };
            return Ok(Self::Exterior {
                x: parse_axis(x)?,
                y: parse_axis(y)?,
            });
        }

        match raw.split_once('@') {
            Some((name, cell)) if !name.is_empty() && !cell.is_empty() => Ok(Self::ObjectIn {
                name: name.to_string(),
                cell: cell.to_string(),
            }),
            Some(_) => Err(format!("query '{raw}' must look like NAME@CELL")),
            None if raw.is_empty() => Err("query cannot be empty".to_string()),
            None => Ok(Self::Object {
                name: raw.to_string(),
            }),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object { name } => f.write_str(name),
            Self::ObjectIn { name, cell } => write!(f, "{name}@{cell}"),
            Self::Exterior { x, y } => write!(f, "@{x},{y}"),
        }
    }
}

pub(crate) fn run(wiring: ProbeWiring) -> ExitCode {
    let world = match build_or_load_world(&wiring.app_paths, &wiring.content_request) {
        Ok(world) => world,
        Err(err) => {
            error!(error = %err, "startup_failed");
            return ExitCode::FAILURE;
        }
    };
    info!(
        pack_path = %world.pack.path().display(),
        action = ?world.action,
        "world_ready"
    );
    if wiring.queries.is_empty() {
        warn!("probe_no_queries");
    }

    let mut database = world.database;
    let pack = world.pack;
    let classes = StandardClasses;
    let mut cells = Cells::with_config(&mut database, &pack, &classes, wiring.cells_config);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for query in &wiring.queries {
        let line = match answer(&mut cells, query) {
            Ok(line) => line,
            Err(err) => {
                error!(query = %query, error = %err, "probe_query_failed");
                return ExitCode::FAILURE;
            }
        };
        if let Err(err) = writeln!(out, "{line}") {
            error!(error = %err, "probe_output_failed");
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}

/// Answers one query as a single output line.
pub(crate) fn answer(cells: &mut Cells<'_>, query: &Query) -> Result<String, CellLoadError> {
    let found = match query {
        Query::Object { name } => cells.resolve(name)?,
        Query::ObjectIn { name, cell } => {
            let Some(store) = cells.get_interior(cell)? else {
                return Ok(format!("{query} -> no such interior"));
            };
            let cell = store.id();
            cells.resolve_in(name, cell)?
        }
        Query::Exterior { x, y } => {
            let store = cells.get_exterior(*x, *y)?;
            return Ok(format!(
                "{query} -> {} {:?}, {} refs",
                store.identity(),
                store.state(),
                store.ref_count()
            ));
        }
    };

    let Some(view) = found.and_then(|ptr| cells.view(ptr)) else {
        return Ok(format!("{query} -> not found"));
    };
    Ok(format!(
        "{query} -> {} '{}' in {} (count {})",
        view.category(),
        view.base().label,
        view.cell.identity(),
        view.data().count()
    ))
}
