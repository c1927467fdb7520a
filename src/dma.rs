//! DMA stream configuration.
//!
//! This module computes the complete configuration of the streams of one
//! direction of the DMA engine. For each stream, it sizes the bursts, checks
//! and expands the record specification, and tabulates the crossbar
//! registers. The resulting [`StreamConfiguration`]s are written to the
//! hardware by [`program_streams`](crate::registers::program_streams).

use crate::constants::{
    BUFFER_COUNT, DATAPATH_LENGTH, DATAPATH_WIDTH, MAX_IO_STREAMS, MAX_RECORDS_PER_BURST,
    WINDOW_SIZE, WORD_BYTES,
};
use crate::crossbar::{
    setup::{tabulate_input, tabulate_output},
    specifier::{
        expand_multi_channel_input, expand_output, expand_single_channel_input, is_input_clashing,
        is_output_clashing, is_output_overwriting_data,
    },
    ChunkRegisterTable, ExpandedSpecification, TableListing,
};
use crate::error::{ConfigurationError, Result};
use crate::stream::{
    burst_length_cycles, chunks_per_record, min_viable_records_per_burst,
    multi_channel_records_per_burst, next_power_of_two,
};

/// Stream direction.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Direction {
    /// DRAM to accelerator.
    Input,
    /// Accelerator to DRAM.
    Output,
}

impl From<Direction> for dma_crossbar_json::Direction {
    fn from(direction: Direction) -> dma_crossbar_json::Direction {
        match direction {
            Direction::Input => dma_crossbar_json::Direction::Input,
            Direction::Output => dma_crossbar_json::Direction::Output,
        }
    }
}

impl From<dma_crossbar_json::Direction> for Direction {
    fn from(direction: dma_crossbar_json::Direction) -> Direction {
        match direction {
            dma_crossbar_json::Direction::Input => Direction::Input,
            dma_crossbar_json::Direction::Output => Direction::Output,
        }
    }
}

/// Parameters of a stream.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct StreamParameters {
    /// Stream ID.
    pub stream_id: usize,
    /// Number of words in each record in DRAM.
    pub record_size: usize,
    /// Number of records in the stream.
    pub record_count: usize,
    /// Physical byte address of the first record.
    pub address: u64,
    /// Record specification.
    ///
    /// `None` selects every word of the record in order.
    pub specification: Option<Vec<Option<usize>>>,
    /// Chunks per record before the output crossbar. Required for output
    /// streams.
    pub input_chunks_per_record: Option<usize>,
    /// Channel layout of multi-channel input streams.
    pub multi_channel: Option<MultiChannelParameters>,
}

impl StreamParameters {
    /// Creates the parameters of a single-channel stream with the identity
    /// specification.
    pub fn new(
        stream_id: usize,
        record_size: usize,
        record_count: usize,
        address: u64,
    ) -> StreamParameters {
        StreamParameters {
            stream_id,
            record_size,
            record_count,
            address,
            specification: None,
            input_chunks_per_record: None,
            multi_channel: None,
        }
    }
}

/// Channel layout of a multi-channel input stream.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct MultiChannelParameters {
    /// Maximum number of channels that the stream can use.
    pub max_channel_count: usize,
    /// Size (in channels) of the smallest merge sorter consuming the stream.
    pub smallest_module_size: usize,
    /// Number of records in each channel. The channels are stored one after
    /// the other starting at the stream address.
    pub records_per_channel: Vec<usize>,
}

impl TryFrom<&dma_crossbar_json::StreamParameters> for StreamParameters {
    type Error = ConfigurationError;

    fn try_from(json: &dma_crossbar_json::StreamParameters) -> Result<StreamParameters> {
        Ok(StreamParameters {
            stream_id: json.stream_id,
            record_size: json.record_size,
            record_count: json.record_count,
            address: json.address,
            specification: json
                .specification
                .as_deref()
                .map(specification_from_json)
                .transpose()?,
            input_chunks_per_record: json.input_chunks_per_record,
            multi_channel: json.multi_channel.as_ref().map(|mc| MultiChannelParameters {
                max_channel_count: mc.max_channel_count,
                smallest_module_size: mc.smallest_module_size,
                records_per_channel: mc.records_per_channel.clone(),
            }),
        })
    }
}

/// Converts a JSON record specification, where `-1` marks an unneeded word.
pub fn specification_from_json(values: &[i64]) -> Result<Vec<Option<usize>>> {
    values
        .iter()
        .map(|&value| match value {
            -1 => Ok(None),
            _ => usize::try_from(value).map(Some).map_err(|_| {
                ConfigurationError::InvalidStreamParameters(format!(
                    "invalid word index {value} in record specification"
                ))
            }),
        })
        .collect()
}

/// Configuration of a stream.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct StreamConfiguration {
    /// Stream ID.
    pub stream_id: usize,
    /// Stream direction.
    pub direction: Direction,
    /// Number of records to transfer. This is zero for output streams, since
    /// the accelerator decides how many records it writes.
    pub record_count: usize,
    /// Number of datapath chunks used by each record.
    pub chunks_per_record: usize,
    /// Number of records moved by each DDR burst.
    pub records_per_burst: usize,
    /// Length of each DDR burst in clock cycles.
    pub burst_length: usize,
    /// First on-chip buffer assigned to the stream.
    pub buffer_start: usize,
    /// Last on-chip buffer assigned to the stream.
    pub buffer_end: usize,
    /// Physical byte address of the stream.
    pub stream_address: u64,
    /// Chunk ID used at each interface cycle, indexed by cycle.
    pub record_chunk_ids: Vec<usize>,
    /// Crossbar register tables, one per buffer chunk.
    pub crossbar: Vec<ChunkRegisterTable>,
    /// Channel layout of multi-channel input streams.
    pub multi_channel: Option<MultiChannelSetup>,
}

/// Channel layout of a configured multi-channel stream.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct MultiChannelSetup {
    /// Number of channels enabled in the hardware.
    pub active_channel_count: usize,
    /// Channels, in channel ID order.
    pub channels: Vec<ChannelSetup>,
}

/// A channel of a multi-channel stream.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ChannelSetup {
    /// Channel ID.
    pub channel_id: usize,
    /// Physical byte address of the first record of the channel.
    pub address: u64,
    /// Number of records in the channel.
    pub record_count: usize,
}

/// Configuration of all the streams in one direction.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct DirectionConfiguration {
    /// Direction of the streams.
    pub direction: Direction,
    /// Stream configurations, in the order in which they were given.
    pub streams: Vec<StreamConfiguration>,
    /// Number of multi-channel streams.
    pub multi_channel_stream_count: usize,
}

impl From<&StreamConfiguration> for dma_crossbar_json::StreamConfiguration {
    fn from(stream: &StreamConfiguration) -> dma_crossbar_json::StreamConfiguration {
        dma_crossbar_json::StreamConfiguration {
            stream_id: stream.stream_id,
            direction: stream.direction.into(),
            record_count: stream.record_count,
            chunks_per_record: stream.chunks_per_record,
            records_per_burst: stream.records_per_burst,
            burst_length: stream.burst_length,
            buffer_start: stream.buffer_start,
            buffer_end: stream.buffer_end,
            stream_address: stream.stream_address,
            record_chunk_ids: stream.record_chunk_ids.clone(),
            crossbar: stream.crossbar.iter().map(Into::into).collect(),
            multi_channel: stream.multi_channel.as_ref().map(|mc| {
                dma_crossbar_json::MultiChannelConfiguration {
                    active_channel_count: mc.active_channel_count,
                    channels: mc
                        .channels
                        .iter()
                        .map(|channel| dma_crossbar_json::Channel {
                            channel_id: channel.channel_id,
                            address: channel.address,
                            record_count: channel.record_count,
                        })
                        .collect(),
                }
            }),
        }
    }
}

/// Returns the first and last buffer assigned to a stream.
///
/// The buffers are split evenly between the streams of a direction.
pub fn buffer_range(stream_count: usize, index: usize) -> (usize, usize) {
    let size = BUFFER_COUNT / stream_count.max(1);
    let start = size * index;
    (start, (start + size).saturating_sub(1))
}

/// Configures all the streams of a direction.
///
/// The on-chip buffers are split evenly between the streams. Configuration
/// stops at the first stream that fails.
#[tracing::instrument(level = "debug", skip(streams), fields(stream_count = streams.len()))]
pub fn configure_streams(
    direction: Direction,
    streams: &[StreamParameters],
) -> Result<DirectionConfiguration> {
    if streams.len() > MAX_IO_STREAMS {
        return Err(ConfigurationError::InvalidStreamParameters(format!(
            "{} streams given, but at most {MAX_IO_STREAMS} are supported",
            streams.len()
        )));
    }
    let streams = streams
        .iter()
        .enumerate()
        .map(|(index, parameters)| {
            let (buffer_start, buffer_end) = buffer_range(streams.len(), index);
            configure_stream(direction, parameters, buffer_start, buffer_end).inspect_err(|err| {
                tracing::error!(
                    "failed to configure {direction:?} stream {}: {err}",
                    parameters.stream_id
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let multi_channel_stream_count = streams
        .iter()
        .filter(|stream| stream.multi_channel.is_some())
        .count();
    Ok(DirectionConfiguration {
        direction,
        streams,
        multi_channel_stream_count,
    })
}

/// Configures a single stream.
pub fn configure_stream(
    direction: Direction,
    parameters: &StreamParameters,
    buffer_start: usize,
    buffer_end: usize,
) -> Result<StreamConfiguration> {
    let record_size = parameters.record_size;
    // rejects empty records
    chunks_per_record(record_size)?;
    let specification = match &parameters.specification {
        Some(specification) => specification.clone(),
        // no burst can hold the whole record
        None if record_size > WINDOW_SIZE => {
            return Err(ConfigurationError::InvalidChunkCount(format!(
                "records of {record_size} words do not fit in the buffer"
            )))
        }
        None => (0..record_size).map(Some).collect(),
    };
    if specification.is_empty() {
        return Err(ConfigurationError::InvalidStreamParameters(
            "the record specification is empty".to_string(),
        ));
    }

    let layout = match direction {
        Direction::Input => input_layout(parameters, &specification)?,
        Direction::Output => output_layout(parameters, &specification)?,
    };
    let burst_length = burst_length_cycles(record_size, layout.records_per_burst)?;
    let padded_chunks = next_power_of_two(layout.chunks_per_record);
    let record_chunk_ids = (0..DATAPATH_LENGTH)
        .map(|cycle| cycle % padded_chunks)
        .collect();

    if tracing::enabled!(tracing::Level::TRACE) {
        tracing::trace!(
            "stream {} expanded specification:\n{}{}",
            parameters.stream_id,
            layout.expanded,
            TableListing(&layout.crossbar)
        );
    }
    tracing::debug!(
        stream_id = parameters.stream_id,
        ?direction,
        chunks_per_record = layout.chunks_per_record,
        records_per_burst = layout.records_per_burst,
        burst_length,
        "configured stream"
    );

    Ok(StreamConfiguration {
        stream_id: parameters.stream_id,
        direction,
        record_count: match direction {
            Direction::Input => parameters.record_count,
            Direction::Output => 0,
        },
        chunks_per_record: layout.chunks_per_record,
        records_per_burst: layout.records_per_burst,
        burst_length,
        buffer_start,
        buffer_end,
        stream_address: parameters.address,
        record_chunk_ids,
        crossbar: layout.crossbar,
        multi_channel: layout.multi_channel,
    })
}

struct Layout {
    chunks_per_record: usize,
    records_per_burst: usize,
    expanded: ExpandedSpecification,
    crossbar: Vec<ChunkRegisterTable>,
    multi_channel: Option<MultiChannelSetup>,
}

fn input_layout(parameters: &StreamParameters, specification: &[Option<usize>]) -> Result<Layout> {
    let record_size = parameters.record_size;
    check_word_range(specification, record_size)?;
    let chunks_per_record = chunks_per_record(specification.len())?;
    if is_input_clashing(specification) {
        return Err(ConfigurationError::InputClash);
    }
    let (records_per_burst, expanded, multi_channel) = match &parameters.multi_channel {
        None => {
            let records_per_burst =
                min_viable_records_per_burst(record_size.max(specification.len()))?;
            let expanded =
                expand_single_channel_input(record_size, specification, records_per_burst)?;
            (records_per_burst, expanded, None)
        }
        Some(multi_channel) => {
            let records_per_burst = multi_channel_records_per_burst(
                multi_channel.smallest_module_size,
                chunks_per_record,
                record_size,
            )?;
            let expanded = expand_multi_channel_input(
                record_size,
                specification,
                records_per_burst,
                chunks_per_record,
            )?;
            let setup = multi_channel_setup(multi_channel, parameters.address, record_size)?;
            (records_per_burst, expanded, Some(setup))
        }
    };
    let crossbar = tabulate_input(&expanded);
    Ok(Layout {
        chunks_per_record,
        records_per_burst,
        expanded,
        crossbar,
        multi_channel,
    })
}

fn output_layout(parameters: &StreamParameters, specification: &[Option<usize>]) -> Result<Layout> {
    if parameters.multi_channel.is_some() {
        return Err(ConfigurationError::InvalidStreamParameters(
            "output streams cannot use multiple channels".to_string(),
        ));
    }
    if specification.len() != parameters.record_size {
        return Err(ConfigurationError::InvalidStreamParameters(format!(
            "output record specification has {} words but records have {}",
            specification.len(),
            parameters.record_size
        )));
    }
    let input_chunks_per_record = parameters.input_chunks_per_record.ok_or_else(|| {
        ConfigurationError::InvalidStreamParameters(
            "output streams need the chunks per record before the crossbar".to_string(),
        )
    })?;
    let chunks_per_record = input_chunks_per_record.max(chunks_per_record(specification.len())?);
    if chunks_per_record > MAX_RECORDS_PER_BURST {
        return Err(ConfigurationError::InvalidChunkCount(format!(
            "records of {chunks_per_record} chunks do not fit in the buffer"
        )));
    }
    check_word_range(specification, chunks_per_record * DATAPATH_WIDTH)?;
    if is_output_overwriting_data(specification) {
        return Err(ConfigurationError::OutputOverwrite {
            width: DATAPATH_WIDTH,
        });
    }
    if is_output_clashing(specification) {
        return Err(ConfigurationError::OutputClash);
    }
    let records_per_burst = MAX_RECORDS_PER_BURST / next_power_of_two(chunks_per_record);
    let expanded = expand_output(specification, records_per_burst, chunks_per_record)?;
    let crossbar = tabulate_output(&expanded, chunks_per_record, records_per_burst)?;
    Ok(Layout {
        chunks_per_record,
        records_per_burst,
        expanded,
        crossbar,
        multi_channel: None,
    })
}

fn check_word_range(specification: &[Option<usize>], word_count: usize) -> Result<()> {
    match specification.iter().flatten().find(|&&word| word >= word_count) {
        Some(word) => Err(ConfigurationError::InvalidStreamParameters(format!(
            "word {word} selected but records only have {word_count} words"
        ))),
        None => Ok(()),
    }
}

fn multi_channel_setup(
    parameters: &MultiChannelParameters,
    address: u64,
    record_size: usize,
) -> Result<MultiChannelSetup> {
    if parameters.max_channel_count == 0 {
        return Err(ConfigurationError::InvalidStreamParameters(
            "multi-channel streams need at least one channel".to_string(),
        ));
    }
    if parameters.records_per_channel.len() > parameters.max_channel_count {
        return Err(ConfigurationError::InvalidStreamParameters(format!(
            "{} channels given, but at most {} are supported",
            parameters.records_per_channel.len(),
            parameters.max_channel_count
        )));
    }
    let record_bytes = u64::try_from(record_size)
        .ok()
        .and_then(|record_size| record_size.checked_mul(WORD_BYTES));
    let mut records_before: u64 = 0;
    let mut channels = Vec::with_capacity(parameters.records_per_channel.len());
    for (channel_id, &record_count) in parameters.records_per_channel.iter().enumerate() {
        let out_of_range = || {
            ConfigurationError::InvalidStreamParameters(format!(
                "channel {channel_id} does not fit in the address space"
            ))
        };
        let address = record_bytes
            .and_then(|bytes| bytes.checked_mul(records_before))
            .and_then(|offset| offset.checked_add(address))
            .ok_or_else(out_of_range)?;
        channels.push(ChannelSetup {
            channel_id,
            address,
            record_count,
        });
        records_before = u64::try_from(record_count)
            .ok()
            .and_then(|record_count| records_before.checked_add(record_count))
            .ok_or_else(out_of_range)?;
    }
    Ok(MultiChannelSetup {
        active_channel_count: parameters.max_channel_count,
        channels,
    })
}
