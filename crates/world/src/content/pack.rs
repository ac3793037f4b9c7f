use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use super::category::ObjectCategory;
use super::compiler::CompiledContent;
use super::database::{
    CellDef, CellFlags, CellIdentity, CellRef, InventoryEntry, ObjectDef, RecordSpan,
    WorldDatabase,
};
use super::hashing::to_hex_lower;
use super::reader::{ReaderError, RecordReader};

const MAGIC: &[u8; 4] = b"CWPK";
pub const WORLD_PACK_FORMAT_VERSION: u16 = 1;

const CELL_KIND_INTERIOR: u8 = 0;
const CELL_KIND_EXTERIOR: u8 = 1;
// id length prefix aside, every reference is count + xyz.
const REF_FIXED_TAIL_LEN: usize = 4 + 3 * 4;
const REF_MIN_LEN: usize = 2 + REF_FIXED_TAIL_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldPackMeta {
    pub format_version: u16,
    pub compiler_version: String,
    pub input_hash: [u8; 32],
}

impl WorldPackMeta {
    pub fn input_hash_hex(&self) -> String {
        to_hex_lower(&self.input_hash)
    }
}

#[derive(Debug, Error)]
pub enum WorldPackError {
    #[error("failed to read/write file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("pack at {path} has invalid format: {message}")]
    InvalidFormat { path: PathBuf, message: String },
}

/// An opened world pack. Holds the reference blocks of every authored cell and decodes a
/// block only when that cell is preloaded or loaded.
#[derive(Debug, Clone)]
pub struct WorldPack {
    path: PathBuf,
    meta: WorldPackMeta,
    ref_bytes: Vec<u8>,
}

impl WorldPack {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta(&self) -> &WorldPackMeta {
        &self.meta
    }

    fn ref_block<'a>(&'a self, cell: &CellDef, span: RecordSpan) -> Result<&'a [u8], ReaderError> {
        let start = span.offset as usize;
        let end = start.saturating_add(span.len as usize);
        self.ref_bytes
            .get(start..end)
            .ok_or_else(|| ReaderError::SpanOutOfBounds {
                cell: cell.identity.clone(),
                offset: span.offset,
                len: span.len,
                available: self.ref_bytes.len(),
            })
    }
}

impl RecordReader for WorldPack {
    fn read_cell_refs(&self, cell: &CellDef) -> Result<Vec<CellRef>, ReaderError> {
        let Some(span) = cell.records else {
            return Ok(Vec::new());
        };
        let block = self.ref_block(cell, span)?;
        decode_ref_block(block, span.ref_count as usize).map_err(|message| {
            ReaderError::Malformed {
                cell: cell.identity.clone(),
                message: message.to_string(),
            }
        })
    }

    fn read_cell_ids(&self, cell: &CellDef) -> Result<Vec<String>, ReaderError> {
        let Some(span) = cell.records else {
            return Ok(Vec::new());
        };
        let block = self.ref_block(cell, span)?;
        let malformed = |message: &str| ReaderError::Malformed {
            cell: cell.identity.clone(),
            message: message.to_string(),
        };
        let mut cursor = Cursor::new(block);
        let mut ids = Vec::<String>::with_capacity(capacity_hint(span.ref_count as usize, block));
        for _ in 0..span.ref_count {
            ids.push(cursor.read_string().map_err(malformed)?);
            cursor.read_exact(REF_FIXED_TAIL_LEN).map_err(malformed)?;
        }
        if !cursor.is_at_end() {
            return Err(malformed("reference block length mismatch"));
        }
        Ok(ids)
    }
}

pub fn write_world_pack(
    path: &Path,
    meta: &WorldPackMeta,
    content: &CompiledContent,
) -> Result<(), WorldPackError> {
    let payload = encode_payload(content).map_err(|message| invalid_format(path, message))?;
    let payload_hash = sha256_bytes(&payload);

    let mut bytes = Vec::<u8>::new();
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&meta.format_version.to_le_bytes());
    write_string(&mut bytes, &meta.compiler_version).map_err(|m| invalid_format(path, m))?;
    bytes.extend_from_slice(&meta.input_hash);
    bytes.extend_from_slice(&(content.objects.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&(content.cells.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&payload_hash);
    bytes.extend_from_slice(&payload);

    write_bytes_atomic(path, &bytes).map_err(|source| WorldPackError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Opens a pack, returning the reference reader and the database of its headers.
pub fn read_world_pack(path: &Path) -> Result<(WorldPack, WorldDatabase), WorldPackError> {
    let bytes = fs::read(path).map_err(|source| WorldPackError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let fail = |message: &str| invalid_format(path, message);
    let mut cursor = Cursor::new(&bytes);

    if cursor.read_exact(4).map_err(fail)? != MAGIC {
        return Err(fail("invalid magic"));
    }
    let format_version = cursor.read_u16().map_err(fail)?;
    let compiler_version = cursor.read_string().map_err(fail)?;
    let input_hash = cursor.read_hash().map_err(fail)?;
    let object_count = cursor.read_u32().map_err(fail)? as usize;
    let cell_count = cursor.read_u32().map_err(fail)? as usize;
    let payload_len = cursor.read_u32().map_err(fail)? as usize;
    let expected_payload_hash = cursor.read_hash().map_err(fail)?;
    let payload = cursor.read_exact(payload_len).map_err(fail)?;
    if !cursor.is_at_end() {
        return Err(fail("unexpected trailing bytes"));
    }
    if sha256_bytes(payload) != expected_payload_hash {
        return Err(fail("payload hash mismatch"));
    }

    let (objects, cells, ref_bytes) =
        decode_payload(payload, object_count, cell_count).map_err(fail)?;
    let pack = WorldPack {
        path: path.to_path_buf(),
        meta: WorldPackMeta {
            format_version,
            compiler_version,
            input_hash,
        },
        ref_bytes,
    };
    Ok((pack, WorldDatabase::from_defs(objects, cells)))
}

fn encode_payload(content: &CompiledContent) -> Result<Vec<u8>, &'static str> {
    let mut payload = Vec::<u8>::new();

    for object in &content.objects {
        write_string(&mut payload, &object.id)?;
        payload.push(object.category.index() as u8);
        write_string(&mut payload, &object.label)?;
        if object.inventory.len() > u16::MAX as usize {
            return Err("too many inventory entries");
        }
        payload.extend_from_slice(&(object.inventory.len() as u16).to_le_bytes());
        for entry in &object.inventory {
            write_string(&mut payload, &entry.item)?;
            payload.extend_from_slice(&entry.count.to_le_bytes());
        }
    }

    let mut ref_bytes = Vec::<u8>::new();
    for cell in &content.cells {
        let span = if cell.refs.is_empty() {
            None
        } else {
            let offset = ref_bytes.len();
            for cell_ref in &cell.refs {
                write_string(&mut ref_bytes, &cell_ref.ref_id)?;
                ref_bytes.extend_from_slice(&cell_ref.count.to_le_bytes());
                for axis in cell_ref.position {
                    ref_bytes.extend_from_slice(&axis.to_le_bytes());
                }
            }
            Some(RecordSpan {
                offset: offset as u32,
                len: (ref_bytes.len() - offset) as u32,
                ref_count: cell.refs.len() as u32,
            })
        };

        match &cell.def.identity {
            CellIdentity::Interior(name) => {
                payload.push(CELL_KIND_INTERIOR);
                write_string(&mut payload, name)?;
            }
            CellIdentity::Exterior { x, y } => {
                payload.push(CELL_KIND_EXTERIOR);
                payload.extend_from_slice(&x.to_le_bytes());
                payload.extend_from_slice(&y.to_le_bytes());
            }
        }
        payload.extend_from_slice(&cell.def.flags.0.to_le_bytes());
        payload.extend_from_slice(&cell.def.water_level.to_le_bytes());
        payload.extend_from_slice(&cell.def.map_color.to_le_bytes());
        match span {
            Some(span) => {
                payload.push(1);
                payload.extend_from_slice(&span.offset.to_le_bytes());
                payload.extend_from_slice(&span.len.to_le_bytes());
                payload.extend_from_slice(&span.ref_count.to_le_bytes());
            }
            None => payload.push(0),
        }
    }

    payload.extend_from_slice(&(ref_bytes.len() as u32).to_le_bytes());
    payload.extend_from_slice(&ref_bytes);
    Ok(payload)
}

type DecodedPayload = (Vec<ObjectDef>, Vec<CellDef>, Vec<u8>);

fn decode_payload(
    payload: &[u8],
    object_count: usize,
    cell_count: usize,
) -> Result<DecodedPayload, &'static str> {
    // Header counts sit outside the hashed payload, so never size allocations from them alone.
    let mut cursor = Cursor::new(payload);

    let mut objects = Vec::<ObjectDef>::with_capacity(object_count.min(payload.len()));
    for _ in 0..object_count {
        let id = cursor.read_string()?;
        let category = ObjectCategory::from_index(cursor.read_u8()? as usize)
            .ok_or("invalid object category")?;
        let label = cursor.read_string()?;
        let inventory_len = cursor.read_u16()? as usize;
        let mut inventory = Vec::<InventoryEntry>::with_capacity(inventory_len);
        for _ in 0..inventory_len {
            inventory.push(InventoryEntry {
                item: cursor.read_string()?,
                count: cursor.read_u32()?,
            });
        }
        objects.push(ObjectDef {
            id,
            category,
            label,
            inventory,
        });
    }

    let mut cells = Vec::<CellDef>::with_capacity(cell_count.min(payload.len()));
    for _ in 0..cell_count {
        let identity = match cursor.read_u8()? {
            CELL_KIND_INTERIOR => CellIdentity::Interior(cursor.read_string()?),
            CELL_KIND_EXTERIOR => CellIdentity::Exterior {
                x: cursor.read_i32()?,
                y: cursor.read_i32()?,
            },
            _ => return Err("invalid cell kind"),
        };
        let flags = CellFlags(cursor.read_u32()?);
        let water_level = cursor.read_f32()?;
        let map_color = cursor.read_u32()?;
        let records = match cursor.read_u8()? {
            0 => None,
            1 => Some(RecordSpan {
                offset: cursor.read_u32()?,
                len: cursor.read_u32()?,
                ref_count: cursor.read_u32()?,
            }),
            _ => return Err("invalid record span marker"),
        };
        cells.push(CellDef {
            identity,
            flags,
            water_level,
            map_color,
            records,
        });
    }

    let ref_len = cursor.read_u32()? as usize;
    let ref_bytes = cursor.read_exact(ref_len)?.to_vec();
    if !cursor.is_at_end() {
        return Err("payload length mismatch");
    }
    Ok((objects, cells, ref_bytes))
}

fn decode_ref_block(block: &[u8], ref_count: usize) -> Result<Vec<CellRef>, &'static str> {
    let mut cursor = Cursor::new(block);
    let mut refs = Vec::<CellRef>::with_capacity(capacity_hint(ref_count, block));
    for _ in 0..ref_count {
        refs.push(CellRef {
            ref_id: cursor.read_string()?,
            count: cursor.read_i32()?,
            position: [cursor.read_f32()?, cursor.read_f32()?, cursor.read_f32()?],
        });
    }
    if !cursor.is_at_end() {
        return Err("reference block length mismatch");
    }
    Ok(refs)
}

fn capacity_hint(ref_count: usize, block: &[u8]) -> usize {
    ref_count.min(block.len() / REF_MIN_LEN)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn is_at_end(&self) -> bool {
        self.pos == self.bytes.len()
    }

    fn read_exact(&mut self, len: usize) -> Result<&'a [u8], &'static str> {
        let end = self.pos.saturating_add(len);
        if end > self.bytes.len() {
            return Err("unexpected end of data");
        }
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], &'static str> {
        self.read_exact(N)?
            .try_into()
            .map_err(|_| "invalid fixed-width encoding")
    }

    fn read_u8(&mut self) -> Result<u8, &'static str> {
        Ok(self.read_array::<1>()?[0])
    }

    fn read_u16(&mut self) -> Result<u16, &'static str> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    fn read_u32(&mut self) -> Result<u32, &'static str> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn read_i32(&mut self) -> Result<i32, &'static str> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    fn read_f32(&mut self) -> Result<f32, &'static str> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    fn read_hash(&mut self) -> Result<[u8; 32], &'static str> {
        self.read_array()
    }

    fn read_string(&mut self) -> Result<String, &'static str> {
        let len = self.read_u16()? as usize;
        let raw = self.read_exact(len)?;
        std::str::from_utf8(raw)
            .map(str::to_string)
            .map_err(|_| "invalid UTF-8 string")
    }
}

fn write_string(target: &mut Vec<u8>, value: &str) -> Result<(), &'static str> {
    let bytes = value.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err("string too long for u16 length");
    }
    target.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    target.extend_from_slice(bytes);
    Ok(())
}

fn sha256_bytes(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

fn invalid_format(path: &Path, message: &str) -> WorldPackError {
    WorldPackError::InvalidFormat {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

/// Writes next to the destination and renames over it, so readers never observe a
/// half-written pack.
fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("world.pack");
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));
    fs::write(&tmp_path, bytes)?;

    match fs::remove_file(path) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(error);
        }
    }
    if let Err(error) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }
    Ok(())
}
