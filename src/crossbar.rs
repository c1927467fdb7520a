//! DMA crossbar configuration.
//!
//! Every stream that enters or leaves the datapath goes through a crossbar.
//! Input streams use a pull crossbar that moves words from the order in which
//! they arrive in a DDR burst to the chunk and lane where the datapath expects
//! them. Output streams use a push crossbar that does the opposite. Records do
//! not need to be a multiple of the datapath width, so the boundary between
//! two records can fall in the middle of a chunk.
//!
//! Computing a crossbar configuration is done in two steps. The
//! [`specifier`] checks that a record specification is realizable and expands
//! it to an [`ExpandedSpecification`] that covers the whole burst. The
//! [`setup`] turns the expanded specification into one
//! [`ChunkRegisterTable`] per buffer chunk.

use crate::constants::{DATAPATH_WIDTH, DEFAULT_CHUNK, DEFAULT_POSITION};
use std::fmt;

pub mod setup;
pub mod specifier;

/// Contents of a slot of an expanded specification.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SlotAssignment {
    /// The slot is connected to this slot index on the other side of the
    /// crossbar.
    Data(usize),
    /// The contents of the slot are not needed.
    DontCare,
    /// The slot lies between two records and is discarded.
    Junk,
}

impl SlotAssignment {
    /// Returns the slot index if this is a [`SlotAssignment::Data`].
    pub fn data(self) -> Option<usize> {
        match self {
            SlotAssignment::Data(index) => Some(index),
            SlotAssignment::DontCare | SlotAssignment::Junk => None,
        }
    }

    /// Returns `true` for [`SlotAssignment::DontCare`] and
    /// [`SlotAssignment::Junk`].
    pub fn is_sentinel(self) -> bool {
        self.data().is_none()
    }
}

impl fmt::Display for SlotAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            SlotAssignment::Data(index) => write!(f, "{index}"),
            SlotAssignment::DontCare => write!(f, "-"),
            SlotAssignment::Junk => write!(f, "x"),
        }
    }
}

/// Crossbar specification covering a whole burst.
///
/// For input streams, entry `s` gives the burst slot that buffer slot `s`
/// pulls from. For output streams, entry `s` gives the buffer slot whose word
/// is pushed to the interface. Slots are indexed as `chunk * DATAPATH_WIDTH +
/// lane`, and the lane order within each chunk is mirrored, because the
/// interface places the first word of a chunk on the highest lane.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ExpandedSpecification(Vec<SlotAssignment>);

impl ExpandedSpecification {
    /// Returns the slot assignments.
    pub fn as_slice(&self) -> &[SlotAssignment] {
        &self.0
    }

    /// Returns `true` if any slot is a [`SlotAssignment::DontCare`] or a
    /// [`SlotAssignment::Junk`].
    pub fn has_sentinels(&self) -> bool {
        self.0.iter().any(|slot| slot.is_sentinel())
    }
}

impl std::ops::Deref for ExpandedSpecification {
    type Target = [SlotAssignment];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<SlotAssignment>> for ExpandedSpecification {
    fn from(slots: Vec<SlotAssignment>) -> ExpandedSpecification {
        ExpandedSpecification(slots)
    }
}

impl fmt::Display for ExpandedSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        for chunk in self.0.chunks(DATAPATH_WIDTH) {
            let row = chunk
                .iter()
                .map(|slot| format!("{:>3}", slot.to_string()))
                .collect::<Vec<_>>();
            writeln!(f, "{}", row.join(" "))?;
        }
        Ok(())
    }
}

/// Crossbar registers of a single buffer chunk.
///
/// The crossbar works in two steps. Each lane first selects a chunk
/// (`chunk_selection`) and then a position within the selected data
/// (`position_selection`).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ChunkRegisterTable {
    /// Chunk selected for each lane.
    pub chunk_selection: [usize; DATAPATH_WIDTH],
    /// Position selected for each lane.
    pub position_selection: [usize; DATAPATH_WIDTH],
}

impl Default for ChunkRegisterTable {
    fn default() -> ChunkRegisterTable {
        ChunkRegisterTable {
            chunk_selection: [DEFAULT_CHUNK; DATAPATH_WIDTH],
            position_selection: [DEFAULT_POSITION; DATAPATH_WIDTH],
        }
    }
}

impl From<&ChunkRegisterTable> for dma_crossbar_json::ChunkRegisters {
    fn from(table: &ChunkRegisterTable) -> dma_crossbar_json::ChunkRegisters {
        dma_crossbar_json::ChunkRegisters {
            chunk_selection: table.chunk_selection.to_vec(),
            position_selection: table.position_selection.to_vec(),
        }
    }
}

/// Formats a list of register tables for logging.
///
/// Position selections are listed first, followed by chunk selections, with
/// one row per buffer chunk.
#[derive(Debug, Copy, Clone)]
pub struct TableListing<'a>(pub &'a [ChunkRegisterTable]);

impl fmt::Display for TableListing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fn row(values: &[usize]) -> String {
            values
                .iter()
                .map(|v| format!("{v:>2}"))
                .collect::<Vec<_>>()
                .join(" ")
        }

        writeln!(f, "position selection:")?;
        for table in self.0 {
            writeln!(f, "{}", row(&table.position_selection))?;
        }
        writeln!(f, "chunk selection:")?;
        for table in self.0 {
            writeln!(f, "{}", row(&table.chunk_selection))?;
        }
        Ok(())
    }
}

/// Mirrors the lane of a slot index within its chunk.
///
/// This is an involution: mirroring twice gives back the same index.
pub fn mirror(index: usize) -> usize {
    let chunk = index / DATAPATH_WIDTH;
    let lane = index % DATAPATH_WIDTH;
    chunk * DATAPATH_WIDTH + DATAPATH_WIDTH - 1 - lane
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mirror_index() {
        assert_eq!(mirror(0), 15);
        assert_eq!(mirror(15), 0);
        assert_eq!(mirror(16), 31);
        assert_eq!(mirror(18), 29);
        for index in 0..512 {
            assert_eq!(mirror(mirror(index)), index);
        }
    }

    #[test]
    fn default_table() {
        let table = ChunkRegisterTable::default();
        assert!(table.chunk_selection.iter().all(|&c| c == 31));
        assert!(table.position_selection.iter().all(|&p| p == 0));
    }

    #[test]
    fn sentinels() {
        assert_eq!(SlotAssignment::Data(3).data(), Some(3));
        assert!(SlotAssignment::DontCare.is_sentinel());
        assert!(SlotAssignment::Junk.is_sentinel());
        let spec = ExpandedSpecification::from(vec![SlotAssignment::Data(0); 16]);
        assert!(!spec.has_sentinels());
        let spec = ExpandedSpecification::from(vec![SlotAssignment::Data(0), SlotAssignment::Junk]);
        assert!(spec.has_sentinels());
    }

    #[test]
    fn display() {
        let mut slots = vec![SlotAssignment::Data(7); 16];
        slots[0] = SlotAssignment::DontCare;
        slots[1] = SlotAssignment::Junk;
        let spec = ExpandedSpecification::from(slots);
        let text = spec.to_string();
        assert!(text.starts_with("  -   x   7"));
        assert_eq!(text.lines().count(), 1);
    }
}
