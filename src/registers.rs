//! DMA engine registers.
//!
//! This module writes stream configurations to the registers of the DMA
//! engine. Register access is abstracted by the [`DmaRegisters`] trait, so
//! that the same programming sequence can drive a memory-mapped register block
//! or a [`RegisterTrace`] that records the writes.

use crate::constants::{DATAPATH_WIDTH, LANES_PER_REGISTER};
use crate::dma::{Direction, DirectionConfiguration, StreamConfiguration};

/// Crossbar register bank.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CrossbarSelection {
    /// Chunk selection of the input crossbar.
    BufferToInterfaceChunk,
    /// Position selection of the input crossbar.
    BufferToInterfacePosition,
    /// Chunk selection of the output crossbar.
    InterfaceToBufferChunk,
    /// Position selection of the output crossbar.
    InterfaceToBufferPosition,
}

/// DMA engine register access.
///
/// Sizes and counts are given as plain numbers. Implementations take care of
/// the encoding used by each register.
pub trait DmaRegisters {
    /// Sets the burst parameters and the buffer range of a stream.
    fn set_controller_params(
        &mut self,
        direction: Direction,
        stream_id: usize,
        burst_length: usize,
        records_per_burst: usize,
        buffer_start: usize,
        buffer_end: usize,
    );
    /// Sets the byte address of a stream.
    fn set_controller_stream_address(
        &mut self,
        direction: Direction,
        stream_id: usize,
        address: u64,
    );
    /// Sets the number of records of a stream.
    fn set_controller_stream_size(&mut self, direction: Direction, stream_id: usize, size: usize);
    /// Sets the chunks per record of an input stream.
    fn set_record_size(&mut self, stream_id: usize, chunks_per_record: usize);
    /// Sets the chunk ID used by an input stream at an interface cycle.
    fn set_record_chunk_id(&mut self, stream_id: usize, interface_cycle: usize, chunk_id: usize);
    /// Sets the values of a group of four crossbar lanes.
    ///
    /// `values` must already be in the order expected by the hardware, which
    /// is the reverse of the lane order.
    fn set_crossbar_values(
        &mut self,
        selection: CrossbarSelection,
        stream_id: usize,
        chunk: usize,
        group: usize,
        values: [usize; LANES_PER_REGISTER],
    );
    /// Sets how many input streams use multiple channels.
    fn set_multi_channel_stream_count(&mut self, count: usize);
    /// Sets the records per burst of a multi-channel stream.
    fn set_multi_channel_records_per_burst(&mut self, stream_id: usize, records_per_burst: usize);
    /// Sets the burst length of a multi-channel stream.
    fn set_multi_channel_burst_length(&mut self, stream_id: usize, burst_length: usize);
    /// Sets the number of active channels of a multi-channel stream.
    fn set_active_channel_count(&mut self, stream_id: usize, count: usize);
    /// Sets the byte address of a channel.
    fn set_channel_address(&mut self, stream_id: usize, channel_id: usize, address: u64);
    /// Sets the number of records of a channel.
    fn set_channel_record_count(
        &mut self,
        stream_id: usize,
        channel_id: usize,
        record_count: usize,
    );
}

/// Writes the configuration of all the streams to the DMA engine.
///
/// Input streams are written first, followed by the number of multi-channel
/// input streams, and then the output streams.
pub fn program_streams<R: DmaRegisters + ?Sized>(
    registers: &mut R,
    input: &DirectionConfiguration,
    output: &DirectionConfiguration,
) {
    for stream in &input.streams {
        program_stream(registers, stream);
    }
    registers.set_multi_channel_stream_count(input.multi_channel_stream_count);
    for stream in &output.streams {
        program_stream(registers, stream);
    }
}

/// Writes the configuration of a stream to the DMA engine.
pub fn program_stream<R: DmaRegisters + ?Sized>(registers: &mut R, stream: &StreamConfiguration) {
    let id = stream.stream_id;
    registers.set_controller_params(
        stream.direction,
        id,
        stream.burst_length,
        stream.records_per_burst,
        stream.buffer_start,
        stream.buffer_end,
    );
    match stream.direction {
        Direction::Input => {
            registers.set_record_size(id, stream.chunks_per_record);
            for (cycle, &chunk_id) in stream.record_chunk_ids.iter().enumerate() {
                registers.set_record_chunk_id(id, cycle, chunk_id);
            }
            match &stream.multi_channel {
                None => {
                    registers.set_controller_stream_address(
                        Direction::Input,
                        id,
                        stream.stream_address,
                    );
                    registers.set_controller_stream_size(Direction::Input, id, stream.record_count);
                }
                Some(multi_channel) => {
                    registers.set_active_channel_count(id, multi_channel.active_channel_count);
                    for channel in &multi_channel.channels {
                        registers.set_channel_record_count(
                            id,
                            channel.channel_id,
                            channel.record_count,
                        );
                        registers.set_channel_address(id, channel.channel_id, channel.address);
                    }
                    registers.set_multi_channel_burst_length(id, stream.burst_length);
                    registers.set_multi_channel_records_per_burst(id, stream.records_per_burst);
                }
            }
        }
        Direction::Output => {
            registers.set_controller_stream_address(Direction::Output, id, stream.stream_address);
            registers.set_controller_stream_size(Direction::Output, id, stream.record_count);
        }
    }

    let (chunk_bank, position_bank) = match stream.direction {
        Direction::Input => (
            CrossbarSelection::BufferToInterfaceChunk,
            CrossbarSelection::BufferToInterfacePosition,
        ),
        Direction::Output => (
            CrossbarSelection::InterfaceToBufferChunk,
            CrossbarSelection::InterfaceToBufferPosition,
        ),
    };
    for (chunk, table) in stream.crossbar.iter().enumerate() {
        for group in 0..DATAPATH_WIDTH / LANES_PER_REGISTER {
            registers.set_crossbar_values(
                chunk_bank,
                id,
                chunk,
                group,
                reversed_group(&table.chunk_selection, group),
            );
            registers.set_crossbar_values(
                position_bank,
                id,
                chunk,
                group,
                reversed_group(&table.position_selection, group),
            );
        }
    }
}

/// Returns the values of a group of four lanes in hardware order.
///
/// # Examples
///
/// ```
/// use dma_crossbar::registers::reversed_group;
/// let lanes = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];
/// assert_eq!(reversed_group(&lanes, 1), [7, 6, 5, 4]);
/// ```
pub fn reversed_group(
    lanes: &[usize; DATAPATH_WIDTH],
    group: usize,
) -> [usize; LANES_PER_REGISTER] {
    let mut values = [0; LANES_PER_REGISTER];
    values.copy_from_slice(&lanes[group * LANES_PER_REGISTER..(group + 1) * LANES_PER_REGISTER]);
    values.reverse();
    values
}

/// A single register write.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RegisterWrite {
    /// Byte offset of the register within the DMA engine.
    pub offset: u32,
    /// Value written.
    pub value: u32,
}

impl From<RegisterWrite> for dma_crossbar_json::RegisterWrite {
    fn from(write: RegisterWrite) -> dma_crossbar_json::RegisterWrite {
        dma_crossbar_json::RegisterWrite {
            offset: write.offset,
            value: write.value,
        }
    }
}

/// Register trace.
///
/// This [`DmaRegisters`] implementation encodes each write with the register
/// map of the DMA engine and records it instead of performing it.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct RegisterTrace {
    writes: Vec<RegisterWrite>,
}

const MULTI_CHANNEL_BASE: u32 = 0x80000;

impl RegisterTrace {
    /// Creates an empty trace.
    pub fn new() -> RegisterTrace {
        RegisterTrace::default()
    }

    /// Returns the writes recorded so far, in order.
    pub fn writes(&self) -> &[RegisterWrite] {
        &self.writes
    }

    fn write(&mut self, offset: u32, value: u32) {
        tracing::trace!("write {value:#010x} to {offset:#07x}");
        self.writes.push(RegisterWrite { offset, value });
    }
}

// Register fields are narrower than usize. Values are truncated to the field
// width like the hardware does.
fn field(value: usize) -> u32 {
    value as u32
}

impl DmaRegisters for RegisterTrace {
    fn set_controller_params(
        &mut self,
        direction: Direction,
        stream_id: usize,
        burst_length: usize,
        records_per_burst: usize,
        buffer_start: usize,
        buffer_end: usize,
    ) {
        let base = match direction {
            Direction::Input => 1 << 6,
            Direction::Output => 1 << 16,
        };
        let value = (field(burst_length.saturating_sub(1)) << 24)
            | (records_per_burst.max(1).ilog2() << 16)
            | (field(buffer_start) << 8)
            | field(buffer_end);
        self.write(base + field(stream_id) * 4, value);
    }

    fn set_controller_stream_address(
        &mut self,
        direction: Direction,
        stream_id: usize,
        address: u64,
    ) {
        let base = match direction {
            Direction::Input => 2 << 6,
            Direction::Output => (1 << 16) + (1 << 6),
        };
        self.write(base + field(stream_id) * 4, (address >> 4) as u32);
    }

    fn set_controller_stream_size(&mut self, direction: Direction, stream_id: usize, size: usize) {
        let base = match direction {
            Direction::Input => 3 << 6,
            Direction::Output => (1 << 16) + (2 << 6),
        };
        self.write(base + field(stream_id) * 4, field(size));
    }

    fn set_record_size(&mut self, stream_id: usize, chunks_per_record: usize) {
        self.write(
            (1 << 17) + (1 << 8) + field(stream_id) * 4,
            field(chunks_per_record.saturating_sub(1)),
        );
    }

    fn set_record_chunk_id(&mut self, stream_id: usize, interface_cycle: usize, chunk_id: usize) {
        self.write(
            (1 << 17) + (1 << 13) + (field(stream_id) << 8) + (field(interface_cycle) << 2),
            field(chunk_id),
        );
    }

    fn set_crossbar_values(
        &mut self,
        selection: CrossbarSelection,
        stream_id: usize,
        chunk: usize,
        group: usize,
        values: [usize; LANES_PER_REGISTER],
    ) {
        let base = match selection {
            CrossbarSelection::BufferToInterfaceChunk => (2 << 17) + (1 << 16),
            CrossbarSelection::BufferToInterfacePosition => 2 << 17,
            CrossbarSelection::InterfaceToBufferChunk => (3 << 17) + (1 << 16),
            CrossbarSelection::InterfaceToBufferPosition => 3 << 17,
        };
        let value = values
            .iter()
            .fold(0, |acc, &value| (acc << 8) | (field(value) & 0xff));
        self.write(
            base + (field(stream_id) << 12) + (field(chunk) << 5) + (field(group) << 2),
            value,
        );
    }

    fn set_multi_channel_stream_count(&mut self, count: usize) {
        self.write(4, field(count));
    }

    fn set_multi_channel_records_per_burst(&mut self, stream_id: usize, records_per_burst: usize) {
        self.write(MULTI_CHANNEL_BASE + field(stream_id) * 4, field(records_per_burst));
    }

    fn set_multi_channel_burst_length(&mut self, stream_id: usize, burst_length: usize) {
        self.write(
            MULTI_CHANNEL_BASE + (1 << 6) + field(stream_id) * 4,
            field(burst_length.saturating_sub(1)),
        );
    }

    fn set_active_channel_count(&mut self, stream_id: usize, count: usize) {
        self.write(MULTI_CHANNEL_BASE + (2 << 6) + field(stream_id) * 4, field(count));
    }

    fn set_channel_address(&mut self, stream_id: usize, channel_id: usize, address: u64) {
        self.write(
            MULTI_CHANNEL_BASE + (1 << 16) + (field(stream_id) << 14) + (field(channel_id) << 2),
            (address >> 4) as u32,
        );
    }

    fn set_channel_record_count(
        &mut self,
        stream_id: usize,
        channel_id: usize,
        record_count: usize,
    ) {
        self.write(
            MULTI_CHANNEL_BASE + (2 << 16) + (field(stream_id) << 14) + (field(channel_id) << 2),
            field(record_count + 1),
        );
    }
}
