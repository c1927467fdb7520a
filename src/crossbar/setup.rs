//! Crossbar register tabulation.
//!
//! This module turns an [`ExpandedSpecification`] into the register values of
//! each buffer chunk.

use super::{mirror, ChunkRegisterTable, ExpandedSpecification, SlotAssignment};
use crate::constants::{DATAPATH_LENGTH, DATAPATH_WIDTH, WINDOW_SIZE};
use crate::error::{ConfigurationError, Result};
use crate::stream::next_power_of_two;
use std::collections::BTreeSet;

/// Calculates the pull crossbar registers of an input stream.
///
/// Each data slot first selects, in the lane of the burst word it reads, the
/// chunk of the burst that holds the word. Then it selects that lane as its
/// position. Slots without data keep the default register values.
pub fn tabulate_input(expanded: &ExpandedSpecification) -> Vec<ChunkRegisterTable> {
    let mut tables = vec![ChunkRegisterTable::default(); expanded.len().div_ceil(DATAPATH_WIDTH)];
    for (slot, source) in expanded
        .iter()
        .enumerate()
        .filter_map(|(slot, assignment)| assignment.data().map(|source| (slot, source)))
    {
        let table = &mut tables[slot / DATAPATH_WIDTH];
        table.chunk_selection[source % DATAPATH_WIDTH] = source / DATAPATH_WIDTH;
        table.position_selection[slot % DATAPATH_WIDTH] = source % DATAPATH_WIDTH;
    }
    tables
}

/// Returns `true` if the records of an output burst occupy so many slots that
/// unused chunk selections must point to a chunk that is not written.
pub fn needs_free_chunk_reclamation(expanded: &ExpandedSpecification) -> bool {
    let occupied = expanded
        .iter()
        .filter(|&&slot| slot != SlotAssignment::Junk)
        .count();
    occupied > WINDOW_SIZE - DATAPATH_WIDTH
}

/// Calculates the push crossbar registers of an output stream.
///
/// The buffer holds one record every `chunks_per_record` chunks. Junk slots
/// are skipped, so the records are pushed densely to the interface. Returns
/// one table per buffer chunk. Unless free chunks have to be reclaimed, the
/// tables of each record are padded to a power of two number of chunks.
pub fn tabulate_output(
    expanded: &ExpandedSpecification,
    chunks_per_record: usize,
    records_per_burst: usize,
) -> Result<Vec<ChunkRegisterTable>> {
    let table_count = chunks_per_record
        .checked_mul(records_per_burst)
        .filter(|&count| count > 0 && count <= DATAPATH_LENGTH)
        .ok_or_else(|| {
            ConfigurationError::InvalidChunkCount(format!(
                "cannot tabulate {records_per_burst} records of {chunks_per_record} chunks"
            ))
        })?;
    if expanded.len() % DATAPATH_WIDTH != 0 {
        return Err(ConfigurationError::InvalidChunkCount(format!(
            "an expanded specification of {} slots does not fill whole chunks",
            expanded.len()
        )));
    }
    let mut tables = vec![ChunkRegisterTable::default(); table_count];
    // chunk selections stay unresolved until every data slot is placed
    let mut chunk_selections = vec![[None; DATAPATH_WIDTH]; table_count];

    let mut junk = 0;
    for index in 0..expanded.len() {
        let source = match expanded[mirror(index)] {
            SlotAssignment::Data(source) => source,
            SlotAssignment::DontCare => continue,
            SlotAssignment::Junk => {
                junk += 1;
                continue;
            }
        };
        let destination = mirror(index - junk);
        let chunk = source / DATAPATH_WIDTH;
        if chunk >= table_count {
            return Err(ConfigurationError::InvalidChunkCount(format!(
                "slot {source} is outside of the {table_count} chunks of the burst"
            )));
        }
        let lane = destination % DATAPATH_WIDTH;
        tables[chunk].position_selection[lane] = source % DATAPATH_WIDTH;
        chunk_selections[chunk][lane] = Some(destination / DATAPATH_WIDTH);
    }

    if needs_free_chunk_reclamation(expanded) {
        for lane in 0..DATAPATH_WIDTH {
            let used: BTreeSet<usize> = chunk_selections
                .iter()
                .filter_map(|selection| selection[lane])
                .collect();
            let free = (0..DATAPATH_LENGTH).rev().find(|chunk| !used.contains(chunk));
            for (table, selection) in tables.iter_mut().zip(&chunk_selections) {
                table.chunk_selection[lane] = match (selection[lane], free) {
                    (Some(chunk), _) => chunk,
                    (None, Some(free)) => free,
                    (None, None) => {
                        return Err(ConfigurationError::InvalidChunkCount(format!(
                            "no free chunk is left in lane {lane}"
                        )))
                    }
                };
            }
        }
        Ok(tables)
    } else {
        for (table, selection) in tables.iter_mut().zip(&chunk_selections) {
            for (register, chunk) in table.chunk_selection.iter_mut().zip(selection) {
                if let Some(chunk) = chunk {
                    *register = *chunk;
                }
            }
        }
        Ok(pad_records(tables, chunks_per_record))
    }
}

// Inserts default tables after each record so that every record uses a power
// of two number of chunks.
fn pad_records(
    tables: Vec<ChunkRegisterTable>,
    chunks_per_record: usize,
) -> Vec<ChunkRegisterTable> {
    let padding = next_power_of_two(chunks_per_record) - chunks_per_record;
    if padding == 0 {
        return tables;
    }
    tables
        .chunks(chunks_per_record)
        .flat_map(|record| {
            record
                .iter()
                .copied()
                .chain(std::iter::repeat(ChunkRegisterTable::default()).take(padding))
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constants::DEFAULT_CHUNK;
    use crate::crossbar::specifier::{
        expand_multi_channel_input, expand_output, expand_single_channel_input, is_input_clashing,
        is_output_clashing, is_output_overwriting_data,
    };
    use crate::stream::{chunks_per_record, min_viable_records_per_burst};

    fn identity(record_size: usize) -> Vec<Option<usize>> {
        (0..record_size).map(Some).collect()
    }

    #[test]
    fn input_identity() {
        let expanded = expand_single_channel_input(16, &identity(16), 32).unwrap();
        let tables = tabulate_input(&expanded);
        assert_eq!(tables.len(), 32);
        for (chunk, table) in tables.iter().enumerate() {
            assert_eq!(table.chunk_selection, [chunk; DATAPATH_WIDTH]);
            let positions: Vec<usize> = (0..DATAPATH_WIDTH).collect();
            assert_eq!(&table.position_selection[..], &positions[..]);
        }
    }

    #[test]
    fn input_unaligned_records() {
        let expanded = expand_single_channel_input(18, &identity(18), 16).unwrap();
        let tables = tabulate_input(&expanded);
        assert_eq!(tables.len(), 32);
        for (slot, assignment) in expanded.iter().enumerate() {
            if let SlotAssignment::Data(source) = assignment {
                let table = &tables[slot / DATAPATH_WIDTH];
                let (chunk, lane) = (source / DATAPATH_WIDTH, source % DATAPATH_WIDTH);
                assert_eq!(table.position_selection[slot % DATAPATH_WIDTH], lane);
                assert_eq!(table.chunk_selection[lane], chunk);
            }
        }
        // the second record starts at word 18 of the burst, chunk 1 lane 13
        assert_eq!(tables[2].position_selection[15], 13);
        assert_eq!(tables[2].chunk_selection[13], 1);
    }

    #[test]
    fn output_packing() {
        let expanded = expand_output(&identity(18), 16, 2).unwrap();
        assert!(!needs_free_chunk_reclamation(&expanded));
        let tables = tabulate_output(&expanded, 2, 16).unwrap();
        assert_eq!(tables.len(), 32);
        for lane in 0..DATAPATH_WIDTH {
            assert_eq!(tables[0].position_selection[lane], lane);
            assert_eq!(tables[0].chunk_selection[lane], 0);
        }
        // the first word of the second record is pushed right after the
        // 18 words of the first one
        assert_eq!(tables[2].position_selection[13], 15);
        assert_eq!(tables[2].chunk_selection[13], 1);
        // unused lanes keep the default
        assert_eq!(tables[1].chunk_selection[0], DEFAULT_CHUNK);
    }

    #[test]
    fn output_padding() {
        let expanded = expand_output(&identity(40), 8, 3).unwrap();
        let tables = tabulate_output(&expanded, 3, 8).unwrap();
        assert_eq!(tables.len(), 32);
        for record in 0..8 {
            assert_eq!(tables[record * 4 + 3], ChunkRegisterTable::default());
        }
        assert_eq!(tables[0].chunk_selection, [0; DATAPATH_WIDTH]);
    }

    #[test]
    fn output_reclamation() {
        let expanded = expand_output(&identity(16), 32, 1).unwrap();
        assert!(needs_free_chunk_reclamation(&expanded));
        let tables = tabulate_output(&expanded, 1, 32).unwrap();
        assert_eq!(tables.len(), 32);
        for (chunk, table) in tables.iter().enumerate() {
            assert_eq!(table.chunk_selection, [chunk; DATAPATH_WIDTH]);
        }

        // the second word is not needed, so lane 14 of the even chunks is
        // unused and gets the highest chunk that is free in that lane
        let mut specification = identity(32);
        specification[1] = None;
        let expanded = expand_output(&specification, 16, 2).unwrap();
        assert!(needs_free_chunk_reclamation(&expanded));
        let tables = tabulate_output(&expanded, 2, 16).unwrap();
        assert_eq!(tables.len(), 32);
        assert_eq!(tables[0].chunk_selection[14], 30);
        assert_eq!(tables[2].chunk_selection[14], 30);
        assert_eq!(tables[1].chunk_selection[14], 1);
        assert_eq!(tables[3].chunk_selection[14], 3);
    }

    #[test]
    fn output_chunk_out_of_range() {
        let expanded = expand_output(&identity(18), 16, 2).unwrap();
        assert!(matches!(
            tabulate_output(&expanded, 1, 16),
            Err(ConfigurationError::InvalidChunkCount(_))
        ));
        assert!(tabulate_output(&expanded, 0, 16).is_err());
        // more tables than buffer chunks
        assert!(tabulate_output(&expanded, 4, 16).is_err());
        assert!(tabulate_output(&expanded, usize::MAX, 2).is_err());
    }

    #[test]
    fn output_partial_chunk() {
        let expanded = ExpandedSpecification::from(vec![SlotAssignment::Data(0); 3]);
        assert!(matches!(
            tabulate_output(&expanded, 1, 1),
            Err(ConfigurationError::InvalidChunkCount(_))
        ));
        let expanded = ExpandedSpecification::from(vec![SlotAssignment::Junk; 17]);
        assert!(tabulate_output(&expanded, 2, 1).is_err());
    }

    #[test]
    fn idempotent() {
        let expanded = expand_output(&identity(18), 16, 2).unwrap();
        assert_eq!(
            tabulate_output(&expanded, 2, 16).unwrap(),
            tabulate_output(&expanded, 2, 16).unwrap()
        );
        let expanded = expand_single_channel_input(18, &identity(18), 16).unwrap();
        assert_eq!(tabulate_input(&expanded), tabulate_input(&expanded));
    }

    // identity, reversed, sparse, repeated and rotated selections
    fn selections(record_size: usize) -> Vec<Vec<Option<usize>>> {
        vec![
            identity(record_size),
            (0..record_size).rev().map(Some).collect(),
            (0..record_size).map(|w| (w % 3 != 1).then_some(w)).collect(),
            (0..record_size).map(|w| Some(w / 2)).collect(),
            (0..record_size).map(|w| Some((w + 5) % record_size)).collect(),
        ]
    }

    // Moves a burst through the pull crossbar. Each lane selects a chunk of
    // the burst, and each position then selects a lane. Slot t of the burst
    // holds burst word mirror(t). Returns the burst word in each buffer slot.
    fn pull(tables: &[ChunkRegisterTable]) -> Vec<usize> {
        tables
            .iter()
            .flat_map(|table| {
                (0..DATAPATH_WIDTH).map(move |position| {
                    let lane = table.position_selection[position];
                    mirror(table.chunk_selection[lane] * DATAPATH_WIDTH + lane)
                })
            })
            .collect()
    }

    // Moves a buffer through the push crossbar, one table after the other. Each
    // lane selects a position of its buffer chunk and writes it to the selected
    // interface chunk. Buffer words are numbered with one record every
    // chunks_per_record chunks. Padding tables write garbage (None). Returns
    // the buffer word in each interface slot.
    fn push(
        tables: &[ChunkRegisterTable],
        chunks_per_record: usize,
        records_per_burst: usize,
    ) -> Vec<Option<usize>> {
        let tables_per_record = tables.len() / records_per_burst;
        let mut interface = vec![None; WINDOW_SIZE];
        for (index, table) in tables.iter().enumerate() {
            let (record, chunk) = (index / tables_per_record, index % tables_per_record);
            for lane in 0..DATAPATH_WIDTH {
                let word = (chunk < chunks_per_record).then(|| {
                    let chunk = record * chunks_per_record + chunk;
                    mirror(chunk * DATAPATH_WIDTH + table.position_selection[lane])
                });
                interface[table.chunk_selection[lane] * DATAPATH_WIDTH + lane] = word;
            }
        }
        interface
    }

    fn check_pull(
        specification: &[Option<usize>],
        expanded: &ExpandedSpecification,
        records_per_burst: usize,
        record_size: usize,
    ) {
        let buffer = pull(&tabulate_input(expanded));
        let slots_per_record = expanded.len() / records_per_burst;
        let mut delivered = 0;
        for (slot, &word) in buffer.iter().enumerate() {
            let record = slot / slots_per_record;
            let entry = mirror(slot) - record * slots_per_record;
            if let Some(Some(selected)) = specification.get(entry) {
                assert_eq!(
                    word,
                    selected + record * record_size,
                    "{specification:?}, buffer slot {slot}"
                );
                delivered += 1;
            }
        }
        let selected = specification.iter().flatten().count();
        assert_eq!(delivered, selected * records_per_burst);
    }

    #[test]
    fn single_channel_input_round_trip() {
        for record_size in (1..=64).chain([100, 200, 255, 512]) {
            let records_per_burst = min_viable_records_per_burst(record_size).unwrap();
            for specification in selections(record_size) {
                if is_input_clashing(&specification) {
                    assert_ne!(specification, identity(record_size));
                    continue;
                }
                let expanded =
                    expand_single_channel_input(record_size, &specification, records_per_burst)
                        .unwrap();
                check_pull(&specification, &expanded, records_per_burst, record_size);
            }
        }
    }

    #[test]
    fn multi_channel_input_round_trip() {
        for record_size in 1..=48 {
            let chunks = chunks_per_record(record_size).unwrap();
            for records_per_burst in [1, 3, 4, 6, 12] {
                if records_per_burst * next_power_of_two(chunks) * DATAPATH_WIDTH > WINDOW_SIZE {
                    continue;
                }
                for specification in selections(record_size) {
                    if is_input_clashing(&specification) {
                        continue;
                    }
                    let expanded = expand_multi_channel_input(
                        record_size,
                        &specification,
                        records_per_burst,
                        chunks,
                    )
                    .unwrap();
                    check_pull(&specification, &expanded, records_per_burst, record_size);
                }
            }
        }
    }

    #[test]
    fn output_round_trip() {
        let mut reclaimed = 0;
        for record_size in (1..=64).chain([100, 256, 512]) {
            let minimum = chunks_per_record(record_size).unwrap();
            for chunks in [minimum, minimum + 1] {
                if chunks > DATAPATH_LENGTH {
                    continue;
                }
                let records_per_burst = DATAPATH_LENGTH / next_power_of_two(chunks);
                for specification in selections(record_size) {
                    if is_output_overwriting_data(&specification)
                        || is_output_clashing(&specification)
                    {
                        assert_ne!(specification, identity(record_size));
                        continue;
                    }
                    let expanded =
                        expand_output(&specification, records_per_burst, chunks).unwrap();
                    if needs_free_chunk_reclamation(&expanded) {
                        reclaimed += 1;
                    }
                    let tables = tabulate_output(&expanded, chunks, records_per_burst).unwrap();
                    let interface = push(&tables, chunks, records_per_burst);
                    for record in 0..records_per_burst {
                        for (entry, selected) in specification.iter().enumerate() {
                            let Some(word) = selected else { continue };
                            let slot = mirror(record * specification.len() + entry);
                            assert_eq!(
                                interface[slot],
                                Some(word + record * chunks * DATAPATH_WIDTH),
                                "{specification:?}, {chunks} chunks, record {record}"
                            );
                        }
                    }
                }
            }
        }
        assert!(reclaimed > 0);
    }
}
