//! dma-crossbar computes the configuration of the DMA engine that feeds an FPGA
//! query acceleration datapath. For every stream that enters or leaves the
//! datapath, it sizes the DDR bursts and calculates the crossbar registers
//! that move records of any size between the DDR burst order and the on-chip
//! buffer chunks, without losing or corrupting words. Infeasible record layouts
//! are reported as errors before any register is written.

#![warn(missing_docs)]

pub mod app;
pub mod args;
pub mod constants;
pub mod crossbar;
pub mod dma;
pub mod error;
pub mod registers;
pub mod stream;
