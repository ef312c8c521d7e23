//! # Device Wire Protocol
//!
//! Line-oriented ASCII framing spoken by the acquisition device.
//!
//! ```text
//! STATUS:...      informational, ignored by capture
//! BUFFER:FULL     device buffer filled, flush now
//! DATA:START      new segment, clear the accumulator
//! DATA:END        segment done, flush
//! v1,v2,...       several samples
//! v               one sample
//! ```
//!
//! Outbound commands are `LEAD:<n>`, `START` and `STOP`.
//!
//! The parser is stateless: every line of the chunk handed to
//! [`parse_frames`] is treated as complete. Transports that can split a line
//! across reads go through [`LineBuffer`] first.

use crate::recorder::Lead;
use std::fmt;

/// One classified protocol line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Status(String),
    BufferFull,
    DataStart,
    DataEnd,
    SampleLine(Vec<i32>),
    SingleSample(i32),
}

/// Classify a single line. Returns `None` for blank or unrecognised lines.
///
/// Inside a comma-separated line every token that is not a number is dropped;
/// a line where no token survives produces no frame.
pub fn classify_line(line: &str) -> Option<Frame> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(status) = line.strip_prefix("STATUS:") {
        Some(Frame::Status(status.to_string()))
    } else if line.starts_with("BUFFER:FULL") {
        Some(Frame::BufferFull)
    } else if line.starts_with("DATA:START") {
        Some(Frame::DataStart)
    } else if line.starts_with("DATA:END") {
        Some(Frame::DataEnd)
    } else if line.contains(',') {
        let values: Vec<i32> = line.split(',').filter_map(parse_sample).collect();
        if values.is_empty() {
            log::trace!("Dropping sample line without numbers: {:?}", line);
            None
        } else {
            Some(Frame::SampleLine(values))
        }
    } else if let Some(value) = parse_sample(line) {
        Some(Frame::SingleSample(value))
    } else {
        log::trace!("Dropping unrecognised line: {:?}", line);
        None
    }
}

/// Lazily classify every line in `chunk`, in arrival order.
pub fn parse_frames(chunk: &str) -> impl Iterator<Item = Frame> + '_ {
    chunk.split('\n').filter_map(classify_line)
}

/// Parse one sample token.
///
/// Integers parse directly. A finite decimal inside `i32` range is truncated
/// toward zero.
fn parse_sample(token: &str) -> Option<i32> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    if let Ok(value) = token.parse::<i32>() {
        return Some(value);
    }
    match token.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= i32::MIN as f64 && value <= i32::MAX as f64 => {
            Some(value.trunc() as i32)
        }
        _ => None,
    }
}

/// Carries partial lines between reads of a byte-stream transport.
///
/// Only newline-terminated lines are parsed by [`push`](Self::push); the tail
/// waits for the next chunk or for [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Vec<Frame> {
        self.pending.push_str(chunk);
        match self.pending.rfind('\n') {
            Some(end) => {
                let complete: String = self.pending.drain(..=end).collect();
                parse_frames(&complete).collect()
            }
            None => Vec::new(),
        }
    }

    /// Parse whatever is left as a final line
    pub fn finish(&mut self) -> Vec<Frame> {
        let rest = std::mem::take(&mut self.pending);
        parse_frames(&rest).collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Commands sent to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SelectLead(Lead),
    Start,
    Stop,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SelectLead(lead) => write!(f, "LEAD:{}", lead.number()),
            Command::Start => write!(f, "START"),
            Command::Stop => write!(f, "STOP"),
        }
    }
}
