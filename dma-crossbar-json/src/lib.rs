//! dma-crossbar-json contains the JSON schemas used to describe DMA streams
//! and the crossbar configurations computed for them by dma-crossbar.

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};

/// Stream set JSON schema.
///
/// This is the input of the `dma-crossbar` binary. It lists every stream that
/// takes part in a single accelerator run, split by direction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamSet {
    /// Streams read from DRAM into the accelerator.
    #[serde(default)]
    pub input_streams: Vec<StreamParameters>,
    /// Streams written from the accelerator back to DRAM.
    #[serde(default)]
    pub output_streams: Vec<StreamParameters>,
}

/// Stream parameters JSON schema.
///
/// Describes a single stream as seen by the table layer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StreamParameters {
    /// Stream ID.
    pub stream_id: usize,
    /// Number of 32-bit words in each record in DRAM.
    pub record_size: usize,
    /// Number of records in the stream.
    #[serde(default)]
    pub record_count: usize,
    /// Physical byte address of the first record.
    #[serde(default)]
    pub address: u64,
    /// Column selection.
    ///
    /// One entry per word of the record after the crossbar. An entry of `-1`
    /// marks a word whose contents are not needed. When omitted, the identity
    /// selection is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specification: Option<Vec<i64>>,
    /// Chunks per record before the output crossbar.
    ///
    /// Required for output streams.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_chunks_per_record: Option<usize>,
    /// Multi-channel layout, for input streams consumed by merge sorters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_channel: Option<MultiChannelParameters>,
}

/// Multi-channel stream parameters JSON schema.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MultiChannelParameters {
    /// Maximum number of channels that the stream can use.
    pub max_channel_count: usize,
    /// Size (in channels) of the smallest merge sorter consuming the stream.
    pub smallest_module_size: usize,
    /// Number of records in each channel, in channel order.
    pub records_per_channel: Vec<usize>,
}

/// Stream direction.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// DRAM to accelerator.
    Input,
    /// Accelerator to DRAM.
    Output,
}

/// Configuration JSON schema.
///
/// This is the output of the `dma-crossbar` binary.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Configuration {
    /// Configured input streams.
    pub input_streams: Vec<StreamConfiguration>,
    /// Configured output streams.
    pub output_streams: Vec<StreamConfiguration>,
    /// Number of input streams that use multiple channels.
    pub multi_channel_stream_count: usize,
    /// Register writes that program this configuration, in order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register_writes: Option<Vec<RegisterWrite>>,
}

/// Stream configuration JSON schema.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StreamConfiguration {
    /// Stream ID.
    pub stream_id: usize,
    /// Stream direction.
    pub direction: Direction,
    /// Number of records to transfer.
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
    pub crossbar: Vec<ChunkRegisters>,
    /// Channel layout for multi-channel streams.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_channel: Option<MultiChannelConfiguration>,
}

/// Crossbar registers of a single chunk.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChunkRegisters {
    /// Chunk selected for each lane.
    pub chunk_selection: Vec<usize>,
    /// Position selected for each lane.
    pub position_selection: Vec<usize>,
}

/// Multi-channel configuration JSON schema.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MultiChannelConfiguration {
    /// Number of active channels.
    pub active_channel_count: usize,
    /// Per-channel setup.
    pub channels: Vec<Channel>,
}

/// Channel setup JSON schema.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Channel ID.
    pub channel_id: usize,
    /// Physical byte address of the first record of the channel.
    pub address: u64,
    /// Number of records in the channel.
    pub record_count: usize,
}

/// Register write JSON schema.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RegisterWrite {
    /// Byte offset of the register within the DMA module.
    pub offset: u32,
    /// Value written to the register.
    pub value: u32,
}
