use thiserror::Error;

use super::database::{CellDef, CellIdentity, CellRef};

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error(
        "references of cell {cell} lie outside the record data \
(offset={offset}, len={len}, available={available})"
    )]
    SpanOutOfBounds {
        cell: CellIdentity,
        offset: u32,
        len: u32,
        available: usize,
    },
    #[error("references of cell {cell} are malformed: {message}")]
    Malformed { cell: CellIdentity, message: String },
}

/// Source of truth for the references placed in a cell.
///
/// Cell stores query it on every preload and load; implementations must answer the same
/// cell the same way every time.
pub trait RecordReader {
    fn read_cell_refs(&self, cell: &CellDef) -> Result<Vec<CellRef>, ReaderError>;

    /// Only the object ids of the cell's references, for membership tests.
    fn read_cell_ids(&self, cell: &CellDef) -> Result<Vec<String>, ReaderError> {
        Ok(self
            .read_cell_refs(cell)?
            .into_iter()
            .map(|cell_ref| cell_ref.ref_id)
            .collect())
    }
}
