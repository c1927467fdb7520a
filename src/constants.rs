//! Datapath constants.
//!
//! This module contains constants that define the characteristics of the DMA
//! engine and of the datapath that it feeds in the FPGA. Sizes are given in
//! 32-bit words unless noted otherwise.

/// Number of words that the datapath carries in each clock cycle.
///
/// Each of these words travels on its own lane. A row of this many words is
/// called a chunk.
pub const DATAPATH_WIDTH: usize = 16;

/// Number of chunks held by the on-chip buffer of a stream.
pub const DATAPATH_LENGTH: usize = 32;

/// Number of words covered by one set of crossbar registers.
///
/// This is also the number of words moved by a full DDR burst.
pub const WINDOW_SIZE: usize = DATAPATH_WIDTH * DATAPATH_LENGTH;

/// Number of words transferred from DDR in each clock cycle.
pub const WORDS_PER_CYCLE: usize = 4;

/// Maximum number of records that can be transferred in a DDR burst.
///
/// This restriction is given by the width of the records per burst register.
pub const MAX_RECORDS_PER_BURST: usize = 32;

/// Maximum number of streams in each direction.
pub const MAX_IO_STREAMS: usize = 16;

/// Number of on-chip buffers shared by the streams of each direction.
pub const BUFFER_COUNT: usize = 16;

/// Number of bytes in a word.
pub const WORD_BYTES: u64 = 4;

/// Number of lanes written by each crossbar register.
pub const LANES_PER_REGISTER: usize = 4;

/// Chunk selection written to lanes that carry no data.
///
/// Together with [`DEFAULT_POSITION`] this is a no-op for the hardware.
pub const DEFAULT_CHUNK: usize = DATAPATH_LENGTH - 1;

/// Position selection written to lanes that carry no data.
pub const DEFAULT_POSITION: usize = 0;
