//! Downstream flow sinks.
//!
//! A single sink thread drains the annotators' shared output channel and
//! writes each flow as one JSON object per line.

use crate::config::SinkKind;
use crate::error::{CollectorError, Result};
use crate::handoff::{Shutdown, POLL_INTERVAL};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use sonic_flow_types::Flow;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::thread::{self, JoinHandle};
use tracing::{error, info};

pub trait FlowSink: Send {
    fn write(&mut self, flow: &Flow) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Newline-delimited JSON writer.
pub struct JsonLinesSink<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| CollectorError::Sink(e.error().to_string()))
    }
}

impl<W: Write + Send> FlowSink for JsonLinesSink<W> {
    fn write(&mut self, flow: &Flow) -> Result<()> {
        serde_json::to_writer(&mut self.writer, flow)
            .map_err(|e| CollectorError::Sink(format!("Failed to serialize flow: {}", e)))?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Discards every flow.
#[derive(Debug, Default)]
pub struct NullSink;

impl FlowSink for NullSink {
    fn write(&mut self, _flow: &Flow) -> Result<()> {
        Ok(())
    }
}

/// Opens the sink described by `kind`.
pub fn open_sink(kind: &SinkKind) -> Result<Box<dyn FlowSink>> {
    match kind {
        SinkKind::Stdout => Ok(Box::new(JsonLinesSink::new(io::stdout()))),
        SinkKind::Null => Ok(Box::new(NullSink)),
        SinkKind::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    CollectorError::Sink(format!("Failed to open {}: {}", path.display(), e))
                })?;
            Ok(Box::new(JsonLinesSink::new(file)))
        }
    }
}

/// Starts the thread draining `input` into `sink`.
///
/// The sink is flushed whenever the channel goes idle and once more before
/// the thread exits.
pub fn spawn_sink_worker(
    input: Receiver<Flow>,
    mut sink: Box<dyn FlowSink>,
    shutdown: Shutdown,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("flow-sink".to_string())
        .spawn(move || {
            let mut written = 0u64;
            loop {
                match input.recv_timeout(POLL_INTERVAL) {
                    Ok(flow) => {
                        if let Err(e) = sink.write(&flow) {
                            error!(error = %e, "Failed to write flow");
                        } else {
                            written += 1;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        if let Err(e) = sink.flush() {
                            error!(error = %e, "Failed to flush sink");
                        }
                        if shutdown.is_triggered() {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }

            if let Err(e) = sink.flush() {
                error!(error = %e, "Failed to flush sink");
            }
            info!(flows = written, "Flow sink stopped");
        })
}
