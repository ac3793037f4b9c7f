use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use roxmltree::{Document, Node};

use crate::AppPaths;

use super::category::ObjectCategory;
use super::database::{CellDef, CellFlags, CellIdentity, CellRef, InventoryEntry, ObjectDef};
use super::discovery::{collect_xml_files, discover_mod_sources, ModSource};
use super::types::{ContentPlanError, ContentRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    Discovery,
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateDefInMod,
    UnknownReference,
}

#[derive(Debug, Clone)]
pub struct ContentCompileError {
    pub code: ContentErrorCode,
    pub message: String,
    pub mod_id: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
    pub def_name: Option<String>,
}

impl fmt::Display for ContentCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}: {} (mod={}, file={}",
            self.code,
            self.message,
            self.mod_id,
            self.file_path.display()
        )?;
        if let Some(def_name) = &self.def_name {
            write!(f, ", def={def_name}")?;
        }
        if let Some(loc) = self.location {
            write!(f, ", line={}, column={}", loc.line, loc.column)?;
        }
        f.write_str(")")
    }
}

impl std::error::Error for ContentCompileError {}

#[derive(Debug, Clone)]
pub struct CompiledCell {
    pub def: CellDef,
    pub refs: Vec<CellRef>,
}

/// Merged authored content of every enabled mod, sorted by object id and cell identity.
#[derive(Debug, Clone, Default)]
pub struct CompiledContent {
    pub objects: Vec<ObjectDef>,
    pub cells: Vec<CompiledCell>,
}

#[derive(Debug, Clone)]
struct Origin {
    mod_id: String,
    file_path: PathBuf,
    location: SourceLocation,
}

#[derive(Debug, Clone)]
struct PendingObject {
    def: ObjectDef,
    origin: Origin,
}

#[derive(Debug, Clone)]
struct PendingCell {
    cell: CompiledCell,
    origin: Origin,
}

#[derive(Debug, Clone)]
enum PendingDef {
    Object(PendingObject),
    Cell(PendingCell),
}

pub fn compile_world_content(
    app_paths: &AppPaths,
    request: &ContentRequest,
) -> Result<CompiledContent, ContentCompileError> {
    let sources = discover_mod_sources(app_paths, request)
        .map_err(|error| map_discovery_error(error, &app_paths.root))?;
    compile_sources(&sources)
}

pub(crate) fn compile_sources(
    sources: &[ModSource],
) -> Result<CompiledContent, ContentCompileError> {
    let mut objects = BTreeMap::<String, PendingObject>::new();
    let mut cells = BTreeMap::<CellIdentity, PendingCell>::new();

    for source in sources {
        let xml_files = collect_xml_files(&source.source_dir)
            .map_err(|error| map_discovery_error(error, &source.source_dir))?;
        let mut seen_objects = HashSet::<String>::new();
        let mut seen_cells = HashSet::<CellIdentity>::new();

        for (_, xml_file) in xml_files {
            let raw = fs::read_to_string(&xml_file)
                .map_err(|source_err| read_error(&source.mod_id, xml_file.clone(), source_err))?;
            for def in parse_defs_document(&source.mod_id, &xml_file, &raw)? {
                // Cross-mod duplicates are intentional override points (last mod wins).
                match def {
                    PendingDef::Object(object) => {
                        if !seen_objects.insert(object.def.id.clone()) {
                            return Err(duplicate_in_mod(&object.origin, &object.def.id));
                        }
                        objects.insert(object.def.id.clone(), object);
                    }
                    PendingDef::Cell(cell) => {
                        let identity = cell.cell.def.identity.clone();
                        if !seen_cells.insert(identity.clone()) {
                            return Err(duplicate_in_mod(&cell.origin, &identity.to_string()));
                        }
                        cells.insert(identity, cell);
                    }
                }
            }
        }
    }

    validate_references(&objects, &cells)?;

    Ok(CompiledContent {
        objects: objects.into_values().map(|pending| pending.def).collect(),
        cells: cells.into_values().map(|pending| pending.cell).collect(),
    })
}

fn validate_references(
    objects: &BTreeMap<String, PendingObject>,
    cells: &BTreeMap<CellIdentity, PendingCell>,
) -> Result<(), ContentCompileError> {
    for object in objects.values() {
        for entry in &object.def.inventory {
            if !objects.contains_key(&entry.item) {
                return Err(unknown_reference(
                    &object.origin,
                    &object.def.id,
                    format!(
                        "inventory of '{}' lists unknown object '{}'",
                        object.def.id, entry.item
                    ),
                ));
            }
        }
    }
    for cell in cells.values() {
        for cell_ref in &cell.cell.refs {
            if !objects.contains_key(&cell_ref.ref_id) {
                return Err(unknown_reference(
                    &cell.origin,
                    &cell.cell.def.identity.to_string(),
                    format!(
                        "cell '{}' places unknown object '{}'",
                        cell.cell.def.identity, cell_ref.ref_id
                    ),
                ));
            }
        }
    }
    Ok(())
}

struct DocContext<'a, 'input> {
    mod_id: &'a str,
    file_path: &'a Path,
    doc: &'a Document<'input>,
}

impl DocContext<'_, '_> {
    fn location(&self, node: Node<'_, '_>) -> SourceLocation {
        let pos = self.doc.text_pos_at(node.range().start);
        SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }
    }

    fn origin(&self, node: Node<'_, '_>) -> Origin {
        Origin {
            mod_id: self.mod_id.to_string(),
            file_path: self.file_path.to_path_buf(),
            location: self.location(node),
        }
    }

    fn error_at(
        &self,
        code: ContentErrorCode,
        message: String,
        node: Node<'_, '_>,
    ) -> ContentCompileError {
        ContentCompileError {
            code,
            message,
            mod_id: self.mod_id.to_string(),
            file_path: self.file_path.to_path_buf(),
            location: Some(self.location(node)),
            def_name: None,
        }
    }

    fn required_text(
        &self,
        node: Node<'_, '_>,
        field_name: &str,
    ) -> Result<String, ContentCompileError> {
        let value = node.text().map(str::trim).unwrap_or_default().to_string();
        if value.is_empty() {
            return Err(self.error_at(
                ContentErrorCode::MissingField,
                format!("field <{field_name}> must not be empty"),
                node,
            ));
        }
        Ok(value)
    }

    fn parse_text<T: FromStr>(
        &self,
        node: Node<'_, '_>,
        field_name: &str,
    ) -> Result<T, ContentCompileError> {
        let value = self.required_text(node, field_name)?;
        value.parse::<T>().map_err(|_| {
            self.error_at(
                ContentErrorCode::InvalidValue,
                format!("{field_name} '{value}' is not a valid number"),
                node,
            )
        })
    }

    fn required_attr(
        &self,
        node: Node<'_, '_>,
        attr: &str,
    ) -> Result<String, ContentCompileError> {
        match node.attribute(attr).map(str::trim) {
            Some(value) if !value.is_empty() => Ok(value.to_string()),
            _ => Err(self.error_at(
                ContentErrorCode::MissingField,
                format!(
                    "missing required attribute '{attr}' on <{}>",
                    node.tag_name().name()
                ),
                node,
            )),
        }
    }

    fn optional_attr<T: FromStr>(
        &self,
        node: Node<'_, '_>,
        attr: &str,
    ) -> Result<Option<T>, ContentCompileError> {
        let Some(raw) = node.attribute(attr) else {
            return Ok(None);
        };
        raw.trim().parse::<T>().map(Some).map_err(|_| {
            self.error_at(
                ContentErrorCode::InvalidValue,
                format!(
                    "attribute '{attr}' on <{}> has invalid value '{raw}'",
                    node.tag_name().name()
                ),
                node,
            )
        })
    }

    fn check_duplicate_field(
        &self,
        seen: &mut HashSet<String>,
        field: Node<'_, '_>,
        def_type: &str,
    ) -> Result<(), ContentCompileError> {
        let field_name = field.tag_name().name();
        if seen.insert(field_name.to_string()) {
            return Ok(());
        }
        Err(self.error_at(
            ContentErrorCode::DuplicateField,
            format!("duplicate field <{field_name}> in <{def_type}>"),
            field,
        ))
    }
}

fn parse_defs_document(
    mod_id: &str,
    file_path: &Path,
    raw: &str,
) -> Result<Vec<PendingDef>, ContentCompileError> {
    let doc = Document::parse(raw).map_err(|error| ContentCompileError {
        code: ContentErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        mod_id: mod_id.to_string(),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
        def_name: None,
    })?;
    let ctx = DocContext {
        mod_id,
        file_path,
        doc: &doc,
    };

    let root = doc.root_element();
    if root.tag_name().name() != "Defs" {
        return Err(ctx.error_at(
            ContentErrorCode::InvalidRoot,
            "root element must be <Defs>".to_string(),
            root,
        ));
    }

    let mut defs = Vec::<PendingDef>::new();
    for child in root.children().filter(|node| node.is_element()) {
        match child.tag_name().name() {
            "ObjectDef" => defs.push(PendingDef::Object(parse_object_def(&ctx, child)?)),
            "CellDef" => defs.push(PendingDef::Cell(parse_cell_def(&ctx, child)?)),
            other => {
                return Err(ctx.error_at(
                    ContentErrorCode::UnknownDefType,
                    format!("unsupported def type <{other}>; expected <ObjectDef> or <CellDef>"),
                    child,
                ))
            }
        }
    }

    Ok(defs)
}

fn parse_object_def(
    ctx: &DocContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<PendingObject, ContentCompileError> {
    let mut seen_fields = HashSet::<String>::new();
    let mut def_name: Option<String> = None;
    let mut category: Option<ObjectCategory> = None;
    let mut label: Option<String> = None;
    let mut inventory: Option<(Vec<InventoryEntry>, Node<'_, '_>)> = None;

    for field in node.children().filter(|child| child.is_element()) {
        ctx.check_duplicate_field(&mut seen_fields, field, "ObjectDef")?;
        match field.tag_name().name() {
            "defName" => def_name = Some(ctx.required_text(field, "defName")?),
            "category" => {
                let value = ctx.required_text(field, "category")?;
                let parsed = ObjectCategory::from_name(&value).ok_or_else(|| {
                    ctx.error_at(
                        ContentErrorCode::InvalidValue,
                        format!("invalid category '{value}'"),
                        field,
                    )
                })?;
                category = Some(parsed);
            }
            "label" => label = Some(ctx.required_text(field, "label")?),
            "inventory" => inventory = Some((parse_inventory(ctx, field)?, field)),
            other => {
                return Err(ctx.error_at(
                    ContentErrorCode::UnknownField,
                    format!("unknown field <{other}> in <ObjectDef>"),
                    field,
                ))
            }
        }
    }

    let Some(def_name) = def_name else {
        return Err(ctx.error_at(
            ContentErrorCode::MissingField,
            "missing required field <defName> in <ObjectDef>".to_string(),
            node,
        ));
    };
    let Some(category) = category else {
        return Err(ctx.error_at(
            ContentErrorCode::MissingField,
            format!("missing required field <category> in <ObjectDef> '{def_name}'"),
            node,
        ));
    };
    let inventory = match inventory {
        Some((_, field)) if !category.has_inventory() => {
            return Err(ctx.error_at(
                ContentErrorCode::InvalidValue,
                format!("objects of category {category} cannot carry an <inventory>"),
                field,
            ))
        }
        Some((entries, _)) => entries,
        None => Vec::new(),
    };

    Ok(PendingObject {
        def: ObjectDef {
            label: label.unwrap_or_else(|| def_name.clone()),
            id: def_name,
            category,
            inventory,
        },
        origin: ctx.origin(node),
    })
}

fn parse_inventory(
    ctx: &DocContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<Vec<InventoryEntry>, ContentCompileError> {
    let mut entries = Vec::<InventoryEntry>::new();
    for item in node.children().filter(|child| child.is_element()) {
        if item.tag_name().name() != "item" {
            return Err(ctx.error_at(
                ContentErrorCode::UnknownField,
                format!(
                    "unknown element <{}> in <inventory>; expected <item>",
                    item.tag_name().name()
                ),
                item,
            ));
        }
        let id = ctx.required_attr(item, "id")?;
        let count = ctx.optional_attr::<u32>(item, "count")?.unwrap_or(1);
        if count == 0 {
            return Err(ctx.error_at(
                ContentErrorCode::InvalidValue,
                format!("inventory item '{id}' must have count > 0"),
                item,
            ));
        }
        entries.push(InventoryEntry { item: id, count });
    }
    Ok(entries)
}

fn parse_cell_def(
    ctx: &DocContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<PendingCell, ContentCompileError> {
    let mut seen_fields = HashSet::<String>::new();
    let mut name: Option<String> = None;
    let mut grid: Option<(i32, i32)> = None;
    let mut water_level: Option<f32> = None;
    let mut map_color: Option<u32> = None;
    let mut refs = Vec::<CellRef>::new();

    for field in node.children().filter(|child| child.is_element()) {
        ctx.check_duplicate_field(&mut seen_fields, field, "CellDef")?;
        match field.tag_name().name() {
            "name" => name = Some(ctx.required_text(field, "name")?),
            "grid" => {
                let x = ctx.optional_attr::<i32>(field, "x")?;
                let y = ctx.optional_attr::<i32>(field, "y")?;
                let (Some(x), Some(y)) = (x, y) else {
                    return Err(ctx.error_at(
                        ContentErrorCode::MissingField,
                        "<grid> requires both 'x' and 'y' attributes".to_string(),
                        field,
                    ));
                };
                grid = Some((x, y));
            }
            "waterLevel" => {
                let parsed = ctx.parse_text::<f32>(field, "waterLevel")?;
                if !parsed.is_finite() {
                    return Err(ctx.error_at(
                        ContentErrorCode::InvalidValue,
                        "waterLevel must be finite".to_string(),
                        field,
                    ));
                }
                water_level = Some(parsed);
            }
            "mapColor" => map_color = Some(ctx.parse_text::<u32>(field, "mapColor")?),
            "refs" => refs = parse_refs(ctx, field)?,
            other => {
                return Err(ctx.error_at(
                    ContentErrorCode::UnknownField,
                    format!("unknown field <{other}> in <CellDef>"),
                    field,
                ))
            }
        }
    }

    let (identity, mut flags) = match (name, grid) {
        (Some(name), None) => (CellIdentity::Interior(name), CellFlags(CellFlags::INTERIOR)),
        (None, Some((x, y))) => (CellIdentity::Exterior { x, y }, CellFlags::default()),
        (Some(_), Some(_)) => {
            return Err(ctx.error_at(
                ContentErrorCode::InvalidValue,
                "<CellDef> must have either <name> or <grid>, not both".to_string(),
                node,
            ))
        }
        (None, None) => {
            return Err(ctx.error_at(
                ContentErrorCode::MissingField,
                "missing required field <name> or <grid> in <CellDef>".to_string(),
                node,
            ))
        }
    };
    if water_level.is_some() {
        flags.0 |= CellFlags::HAS_WATER;
    }

    Ok(PendingCell {
        cell: CompiledCell {
            def: CellDef {
                identity,
                flags,
                water_level: water_level.unwrap_or(0.0),
                map_color: map_color.unwrap_or(0),
                records: None,
            },
            refs,
        },
        origin: ctx.origin(node),
    })
}

fn parse_refs(
    ctx: &DocContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<Vec<CellRef>, ContentCompileError> {
    let mut refs = Vec::<CellRef>::new();
    for item in node.children().filter(|child| child.is_element()) {
        if item.tag_name().name() != "ref" {
            return Err(ctx.error_at(
                ContentErrorCode::UnknownField,
                format!(
                    "unknown element <{}> in <refs>; expected <ref>",
                    item.tag_name().name()
                ),
                item,
            ));
        }
        let mut position = [0.0f32; 3];
        for (axis, attr) in ["x", "y", "z"].into_iter().enumerate() {
            if let Some(value) = ctx.optional_attr::<f32>(item, attr)? {
                position[axis] = value;
            }
        }
        refs.push(CellRef {
            ref_id: ctx.required_attr(item, "id")?,
            count: ctx.optional_attr::<i32>(item, "count")?.unwrap_or(1),
            position,
        });
    }
    Ok(refs)
}

fn duplicate_in_mod(origin: &Origin, def_name: &str) -> ContentCompileError {
    ContentCompileError {
        code: ContentErrorCode::DuplicateDefInMod,
        message: format!(
            "duplicate def '{}' in mod '{}'; each mod may define an object or cell only once",
            def_name, origin.mod_id
        ),
        mod_id: origin.mod_id.clone(),
        file_path: origin.file_path.clone(),
        location: Some(origin.location),
        def_name: Some(def_name.to_string()),
    }
}

fn unknown_reference(origin: &Origin, def_name: &str, message: String) -> ContentCompileError {
    ContentCompileError {
        code: ContentErrorCode::UnknownReference,
        message,
        mod_id: origin.mod_id.clone(),
        file_path: origin.file_path.clone(),
        location: Some(origin.location),
        def_name: Some(def_name.to_string()),
    }
}

fn read_error(mod_id: &str, path: PathBuf, source: std::io::Error) -> ContentCompileError {
    ContentCompileError {
        code: ContentErrorCode::ReadFile,
        message: format!("failed to read XML file: {source}"),
        mod_id: mod_id.to_string(),
        file_path: path,
        location: None,
        def_name: None,
    }
}

fn map_discovery_error(error: ContentPlanError, root: &Path) -> ContentCompileError {
    match error {
        ContentPlanError::EnabledModMissing {
            mod_id,
            expected_dir,
        } => ContentCompileError {
            code: ContentErrorCode::Discovery,
            message: format!(
                "enabled mod '{}' not found at {}; check enabled mod list",
                mod_id,
                expected_dir.display()
            ),
            mod_id,
            file_path: expected_dir,
            location: None,
            def_name: None,
        },
        other => ContentCompileError {
            code: ContentErrorCode::Discovery,
            message: other.to_string(),
            mod_id: "<discovery>".to_string(),
            file_path: root.to_path_buf(),
            location: None,
            def_name: None,
        },
    }
}
