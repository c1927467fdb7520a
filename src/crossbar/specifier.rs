//! Crossbar specification checks and expansion.
//!
//! A record specification lists, for each word of a record after the
//! crossbar, the word of the record before the crossbar that it holds. `None`
//! means that any word will do. The functions in this module check whether a
//! record specification can be realized by the crossbar hardware and expand it
//! to cover all the records of a DDR burst.

use super::{mirror, ExpandedSpecification, SlotAssignment};
use crate::constants::{DATAPATH_WIDTH, WINDOW_SIZE};
use crate::error::{ConfigurationError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Checks if an input record specification needs two words from the same lane
/// in the same chunk.
///
/// The pull crossbar can only select one chunk per lane, so all the distinct
/// words that a chunk reads must come from distinct lanes. Reading the same
/// word twice is allowed.
///
/// # Examples
///
/// ```
/// use dma_crossbar::crossbar::specifier::is_input_clashing;
/// assert!(!is_input_clashing(&[Some(0), Some(1), Some(2)]));
/// assert!(is_input_clashing(&[Some(0), Some(16)]));
/// assert!(!is_input_clashing(&[Some(0), Some(0), None]));
/// ```
pub fn is_input_clashing(specification: &[Option<usize>]) -> bool {
    specification.chunks(DATAPATH_WIDTH).any(|chunk| {
        let words: BTreeSet<usize> = chunk.iter().flatten().copied().collect();
        let mut lanes = [false; DATAPATH_WIDTH];
        words
            .iter()
            .any(|&word| std::mem::replace(&mut lanes[word % DATAPATH_WIDTH], true))
    })
}

/// Checks if an output record specification sends two words from the same
/// source chunk to the same lane.
///
/// Specifications that fit in a single chunk never clash.
pub fn is_output_clashing(specification: &[Option<usize>]) -> bool {
    if specification.len() <= DATAPATH_WIDTH {
        return false;
    }
    (0..DATAPATH_WIDTH).any(|position| {
        let mut chunks = BTreeSet::new();
        specification
            .iter()
            .skip(position)
            .step_by(DATAPATH_WIDTH)
            .flatten()
            .any(|&word| !chunks.insert(word / DATAPATH_WIDTH))
    })
}

/// Checks if an output record specification reads more than
/// [`DATAPATH_WIDTH`] words from a single source chunk.
pub fn is_output_overwriting_data(specification: &[Option<usize>]) -> bool {
    let mut counts = BTreeMap::new();
    for word in specification.iter().flatten() {
        *counts.entry(word / DATAPATH_WIDTH).or_insert(0usize) += 1;
    }
    counts.values().any(|&count| count > DATAPATH_WIDTH)
}

/// Expands the specification of a single-channel input stream.
///
/// Each record gets `WINDOW_SIZE / records_per_burst` slots in the buffer and
/// is read from consecutive positions of the burst.
pub fn expand_single_channel_input(
    record_size: usize,
    specification: &[Option<usize>],
    records_per_burst: usize,
) -> Result<ExpandedSpecification> {
    if records_per_burst == 0 {
        return Err(no_records());
    }
    expand(
        specification,
        records_per_burst,
        record_size,
        WINDOW_SIZE / records_per_burst,
        SlotAssignment::DontCare,
    )
}

/// Expands the specification of a multi-channel input stream.
///
/// Each record gets as many chunks as the next power of two of
/// `chunks_per_record`, so the burst can hold a number of records that is not
/// a power of two.
pub fn expand_multi_channel_input(
    record_size: usize,
    specification: &[Option<usize>],
    records_per_burst: usize,
    chunks_per_record: usize,
) -> Result<ExpandedSpecification> {
    let slots_per_record = chunks_per_record
        .checked_next_power_of_two()
        .and_then(|chunks| chunks.checked_mul(DATAPATH_WIDTH))
        .ok_or_else(|| too_many_chunks(chunks_per_record))?;
    expand(
        specification,
        records_per_burst,
        record_size,
        slots_per_record,
        SlotAssignment::DontCare,
    )
}

/// Expands the specification of an output stream.
///
/// Records are laid out in the buffer every `chunks_per_record` chunks. The
/// slots after the end of each record are marked as junk so that the push
/// crossbar can pack the records densely.
pub fn expand_output(
    specification: &[Option<usize>],
    records_per_burst: usize,
    chunks_per_record: usize,
) -> Result<ExpandedSpecification> {
    if records_per_burst == 0 {
        return Err(no_records());
    }
    let record_stride = chunks_per_record
        .checked_mul(DATAPATH_WIDTH)
        .ok_or_else(|| too_many_chunks(chunks_per_record))?;
    expand(
        specification,
        records_per_burst,
        record_stride,
        WINDOW_SIZE / records_per_burst,
        SlotAssignment::Junk,
    )
}

fn no_records() -> ConfigurationError {
    ConfigurationError::InvalidChunkCount("bursts must contain at least one record".to_string())
}

fn too_many_chunks(chunks_per_record: usize) -> ConfigurationError {
    ConfigurationError::InvalidChunkCount(format!(
        "records of {chunks_per_record} chunks do not fit in the buffer"
    ))
}

// Repeats the specification once per record, offsetting the selected words by
// record_stride and padding each record to slots_per_record with filler. The
// lane order is mirrored both in the selected words and in the slots.
fn expand(
    specification: &[Option<usize>],
    records_per_burst: usize,
    record_stride: usize,
    slots_per_record: usize,
    filler: SlotAssignment,
) -> Result<ExpandedSpecification> {
    if records_per_burst == 0 {
        return Err(no_records());
    }
    if specification.len() > slots_per_record {
        return Err(ConfigurationError::InvalidChunkCount(format!(
            "a record specification of {} words does not fit in {slots_per_record} slots",
            specification.len()
        )));
    }
    let total_slots = records_per_burst
        .checked_mul(slots_per_record)
        .filter(|&total| total <= WINDOW_SIZE && slots_per_record % DATAPATH_WIDTH == 0)
        .ok_or_else(|| {
            ConfigurationError::InvalidChunkCount(format!(
                "{records_per_burst} records of {slots_per_record} slots do not fit in the buffer"
            ))
        })?;

    let mut slots = Vec::with_capacity(total_slots);
    for record in 0..records_per_burst {
        for selection in specification {
            let slot = match *selection {
                Some(word) => {
                    SlotAssignment::Data(mirror(window_index(word, record, record_stride)?))
                }
                None => SlotAssignment::DontCare,
            };
            slots.push(slot);
        }
        slots.extend(std::iter::repeat(filler).take(slots_per_record - specification.len()));
    }
    for chunk in slots.chunks_mut(DATAPATH_WIDTH) {
        chunk.reverse();
    }
    Ok(ExpandedSpecification::from(slots))
}

// index of a word of a record within the window
fn window_index(word: usize, record: usize, record_stride: usize) -> Result<usize> {
    record
        .checked_mul(record_stride)
        .and_then(|offset| offset.checked_add(word))
        .filter(|&index| index < WINDOW_SIZE)
        .ok_or_else(|| {
            ConfigurationError::InvalidChunkCount(format!(
                "word {word} of record {record} is outside of the buffer"
            ))
        })
}
