//! Stream parameter calculation.
//!
//! This module contains the sizing functions that decide how a stream of
//! records is cut into DDR bursts and datapath chunks. All the functions are
//! pure. They fail on a record size of zero and on sizes whose products do
//! not fit in a `usize`.

use crate::constants::{DATAPATH_WIDTH, MAX_RECORDS_PER_BURST, WINDOW_SIZE, WORDS_PER_CYCLE};
use crate::error::{ConfigurationError, Result};

/// Calculates how many chunks are required to hold a record.
///
/// # Examples
///
/// ```
/// use dma_crossbar::stream::chunks_per_record;
/// assert_eq!(chunks_per_record(18)?, 2);
/// # Ok::<(), dma_crossbar::error::ConfigurationError>(())
/// ```
pub fn chunks_per_record(record_size: usize) -> Result<usize> {
    check_record_size(record_size)?;
    Ok(record_size.div_ceil(DATAPATH_WIDTH))
}

/// Calculates how many records to transfer in each DDR burst.
///
/// This is the largest power of two number of records that fits in a burst,
/// capped to [`MAX_RECORDS_PER_BURST`]. Records that are larger than a whole
/// burst are transferred one at a time.
pub fn min_viable_records_per_burst(record_size: usize) -> Result<usize> {
    check_record_size(record_size)?;
    let records_per_window = WINDOW_SIZE / record_size;
    if records_per_window == 0 {
        return Ok(1);
    }
    Ok(previous_power_of_two(records_per_window).min(MAX_RECORDS_PER_BURST))
}

/// Calculates how many clock cycles a DDR burst takes.
pub fn burst_length_cycles(record_size: usize, records_per_burst: usize) -> Result<usize> {
    check_record_size(record_size)?;
    let words = record_size.checked_mul(records_per_burst).ok_or_else(|| {
        ConfigurationError::InvalidStreamParameters(format!(
            "bursts of {records_per_burst} records of {record_size} words are too long"
        ))
    })?;
    Ok(words.div_ceil(WORDS_PER_CYCLE))
}

/// Returns the smallest power of two that is greater or equal to `value`.
///
/// A `value` of zero gives one.
pub fn next_power_of_two(value: usize) -> usize {
    value.next_power_of_two()
}

// largest power of two not greater than value; value must be non-zero
fn previous_power_of_two(value: usize) -> usize {
    debug_assert!(value > 0);
    1 << (usize::BITS - 1 - value.leading_zeros())
}

fn check_record_size(record_size: usize) -> Result<()> {
    if record_size == 0 {
        return Err(ConfigurationError::InvalidRecordSize(record_size));
    }
    Ok(())
}

/// Calculates the size of the sort buffer of each merge sort channel.
///
/// The `buffer_space` is given in chunks. The result is given in records and
/// can be zero or negative if the buffer is too small for the number of
/// channels. Without channels or chunks there is no sort buffer, and the
/// result is zero.
pub fn sort_buffer_size(
    buffer_space: usize,
    channel_count: usize,
    chunks_per_record: usize,
) -> i64 {
    if channel_count == 0 || chunks_per_record == 0 {
        return 0;
    }
    let to_i64 = |value: usize| i64::try_from(value).unwrap_or(i64::MAX);
    // reserve used by the sorter internal logic, which grows with the number
    // of channels
    let mut internal_reserve: i64 = 240;
    let mut channels: usize = 32;
    while channels <= channel_count {
        internal_reserve = internal_reserve.saturating_add(to_i64(channels).saturating_mul(2));
        channels = match channels.checked_mul(2) {
            Some(channels) => channels,
            None => break,
        };
    }
    let buffer_space = to_i64(buffer_space);
    let channel_count = to_i64(channel_count);
    // 16 records are held in the pipelines
    let max_buffered_records = buffer_space / to_i64(chunks_per_record) - 16;
    let sorter_records = max_buffered_records.saturating_sub(internal_reserve);
    (buffer_space / channel_count).min(sorter_records / channel_count)
}

/// Calculates how many records a merge sort channel fetches at a time.
///
/// The fetch is at most half of the sort buffer, and the fetched records must
/// fill whole DDR words.
pub fn record_count_per_fetch(sort_buffer_size: i64, record_size: usize) -> Result<usize> {
    check_record_size(record_size)?;
    let fits = |count: i64| match count % 4 {
        0 => true,
        2 => record_size % 2 == 0,
        _ => record_size % 4 == 0,
    };
    let count = (1..=sort_buffer_size / 2).rev().find(|&count| fits(count));
    match count {
        Some(count) => Ok(count as usize),
        None => Err(ConfigurationError::RecordTooLargeForBuffer {
            record_size,
            sort_buffer_size,
        }),
    }
}

/// Calculates the records per DDR burst of a multi-channel input stream.
///
/// Multi-channel streams feed merge sorters, so each burst carries exactly one
/// fetch of the smallest merge sorter that consumes the stream. The size of
/// that merge sorter, `smallest_module_size`, is given in channels.
pub fn multi_channel_records_per_burst(
    smallest_module_size: usize,
    chunks_per_record: usize,
    record_size: usize,
) -> Result<usize> {
    if smallest_module_size == 0 {
        return Err(ConfigurationError::InvalidStreamParameters(
            "merge sort module size must not be zero".to_string(),
        ));
    }
    if chunks_per_record == 0 {
        return Err(ConfigurationError::InvalidChunkCount(
            "records must use at least one chunk".to_string(),
        ));
    }
    let buffer_space = (smallest_module_size / 32)
        .checked_mul(1024)
        .ok_or_else(|| {
            ConfigurationError::InvalidStreamParameters(format!(
                "merge sort module size {smallest_module_size} is too large"
            ))
        })?;
    let sort_buffer = sort_buffer_size(buffer_space, smallest_module_size, chunks_per_record);
    record_count_per_fetch(sort_buffer, record_size)
}
