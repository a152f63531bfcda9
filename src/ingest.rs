//! Hop event ingestion.
//!
//! The tracer emits one JSON object per hop, one object per line.
//! Blank lines and lines starting with `#` are ignored; malformed lines are
//! logged and skipped so one bad event does not lose the rest of the trace.

use std::path::Path;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use crate::error_handling::IngestError;
use crate::session::HopObservation;

/// Input opened by [`open_events`]: a file or stdin.
pub type EventSource = Box<dyn AsyncBufRead + Unpin + Send>;

/// Hop events read from one input.
#[derive(Debug, Default)]
pub struct HopEvents {
    /// Observations in input order
    pub observations: Vec<HopObservation>,
    /// Lines that could not be decoded
    pub malformed: usize,
}

/// Decodes one input line.
///
/// Returns `Ok(None)` for lines that carry no event.
///
/// # Errors
///
/// Returns `IngestError::Malformed` if the line is not a hop event.
pub fn parse_line(line_no: usize, line: &str) -> Result<Option<HopObservation>, IngestError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|source| IngestError::Malformed {
            line: line_no,
            source,
        })
}

/// Streams hop events from a line-oriented input.
///
/// Each event is handed out as soon as its line is complete, so a live
/// producer piping into stdin is consumed while it is still running.
pub struct HopEventReader<R> {
    lines: Lines<R>,
    line_no: usize,
    events: usize,
    malformed: usize,
}

impl<R: AsyncBufRead + Unpin> HopEventReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            events: 0,
            malformed: 0,
        }
    }

    /// Waits for the next hop event.
    ///
    /// Returns `Ok(None)` at end of input. Blank, comment and malformed lines
    /// are consumed without being returned; malformed ones are logged and
    /// counted. Cancel-safe: dropping the future loses no complete line.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::Io` if reading fails.
    pub async fn next_event(&mut self) -> Result<Option<HopObservation>, IngestError> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            match parse_line(self.line_no, &line) {
                Ok(Some(observation)) => {
                    self.events += 1;
                    return Ok(Some(observation));
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("Skipping hop event: {}", e);
                    self.malformed += 1;
                }
            }
        }
        Ok(None)
    }

    /// Lines read so far.
    pub fn lines_read(&self) -> usize {
        self.line_no
    }

    /// Hop events returned so far.
    pub fn events_read(&self) -> usize {
        self.events
    }

    /// Lines skipped as malformed so far.
    pub fn malformed(&self) -> usize {
        self.malformed
    }
}

/// Opens a file, or stdin when `path` is `-`, for streaming.
///
/// # Errors
///
/// Returns `IngestError::Io` if the file cannot be opened.
pub async fn open_events(path: &Path) -> Result<HopEventReader<EventSource>, IngestError> {
    let source: EventSource = if path.as_os_str() == "-" {
        Box::new(BufReader::new(tokio::io::stdin()))
    } else {
        Box::new(BufReader::new(tokio::fs::File::open(path).await?))
    };
    Ok(HopEventReader::new(source))
}

/// Reads every hop event from `reader` until end of input.
///
/// # Errors
///
/// Returns `IngestError::Io` if reading fails. Malformed lines are not errors.
pub async fn read_events<R>(reader: R) -> Result<HopEvents, IngestError>
where
    R: AsyncBufRead + Unpin,
{
    collect(HopEventReader::new(reader)).await
}

/// Reads every hop event from a file, or from stdin when `path` is `-`.
///
/// # Errors
///
/// Returns `IngestError::Io` if the file cannot be opened or read.
pub async fn read_events_from(path: &Path) -> Result<HopEvents, IngestError> {
    collect(open_events(path).await?).await
}

async fn collect<R>(mut reader: HopEventReader<R>) -> Result<HopEvents, IngestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut observations = Vec::new();
    while let Some(observation) = reader.next_event().await? {
        observations.push(observation);
    }
    log::debug!(
        "Read {} hop event(s) from {} line(s), {} malformed",
        observations.len(),
        reader.lines_read(),
        reader.malformed()
    );
    Ok(HopEvents {
        observations,
        malformed: reader.malformed(),
    })
}
