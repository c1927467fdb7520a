//! dma-crossbar application.
//!
//! This module contains a top-level structure [`App`] that represents the whole
//! dma-crossbar application.

use crate::{
    args::Args,
    dma::{configure_streams, Direction, DirectionConfiguration, StreamParameters},
    registers::{program_streams, RegisterTrace},
};
use anyhow::{Context, Result};
use dma_crossbar_json::{Configuration, StreamSet};

/// dma-crossbar application.
///
/// This struct represents the dma-crossbar application. It holds the stream
/// set read from the command line and computes its configuration.
#[derive(Debug, Clone)]
pub struct App {
    streams: StreamSet,
    pretty: bool,
    registers: bool,
}

impl App {
    /// Creates a new application.
    ///
    /// The stream set is read and parsed here, so that malformed input is
    /// reported before any configuration is computed.
    #[tracing::instrument(name = "App::new", level = "debug")]
    pub fn new(args: &Args) -> Result<App> {
        tracing::info!(
            "dma-crossbar {} (git {})",
            env!("CARGO_PKG_VERSION"),
            git_version::git_version!(fallback = "unknown")
        );
        let json = std::fs::read_to_string(&args.streams)
            .with_context(|| format!("failed to read {}", args.streams.display()))?;
        let streams = serde_json::from_str(&json)
            .with_context(|| format!("failed to parse {}", args.streams.display()))?;
        Ok(App::from_stream_set(streams, args.pretty, args.registers))
    }

    /// Creates an application for a stream set that has already been parsed.
    pub fn from_stream_set(streams: StreamSet, pretty: bool, registers: bool) -> App {
        App {
            streams,
            pretty,
            registers,
        }
    }

    /// Runs the application.
    ///
    /// The configuration is printed to stdout as JSON.
    #[tracing::instrument(name = "App::run", level = "debug", skip_all)]
    pub fn run(self) -> Result<()> {
        let configuration = self.configure()?;
        let json = if self.pretty {
            serde_json::to_string_pretty(&configuration)?
        } else {
            serde_json::to_string(&configuration)?
        };
        println!("{json}");
        Ok(())
    }

    /// Computes the configuration of all the streams.
    pub fn configure(&self) -> Result<Configuration> {
        let input = configure_direction(Direction::Input, &self.streams.input_streams)?;
        let output = configure_direction(Direction::Output, &self.streams.output_streams)?;
        let register_writes = if self.registers {
            let mut trace = RegisterTrace::new();
            program_streams(&mut trace, &input, &output);
            tracing::debug!("{} register writes", trace.writes().len());
            Some(trace.writes().iter().copied().map(Into::into).collect())
        } else {
            None
        };
        Ok(Configuration {
            input_streams: input.streams.iter().map(Into::into).collect(),
            output_streams: output.streams.iter().map(Into::into).collect(),
            multi_channel_stream_count: input.multi_channel_stream_count,
            register_writes,
        })
    }
}

fn configure_direction(
    direction: Direction,
    streams: &[dma_crossbar_json::StreamParameters],
) -> Result<DirectionConfiguration> {
    let parameters = streams
        .iter()
        .map(|stream| {
            StreamParameters::try_from(stream)
                .with_context(|| format!("invalid {direction:?} stream {}", stream.stream_id))
        })
        .collect::<Result<Vec<_>>>()?;
    configure_streams(direction, &parameters)
        .with_context(|| format!("failed to configure {direction:?} streams"))
}
