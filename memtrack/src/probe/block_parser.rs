//! # Block Parser
//!
//! Reassembles the tracer's line-oriented output into records.
//!
//! ## State Machine
//!
//! ```text
//!            OP_START                      OP_END (emit body)
//!   ┌──────┐ ───────────────▶ ┌──────────┐ ─────────────────▶ ┌──────┐
//!   │ Idle │                  │ InRecord │                    │ Idle │
//!   └──────┘ ◀─ other lines   └──────────┘ ◀─ other lines     └──────┘
//!              (ignored)                      (buffered)
//! ```
//!
//! Lines outside a record are tracer banners, pass progress from `stap -v`
//! or the blank separator line, and are dropped. The completed body is then
//! handed to a [`DecodeRecord`] implementation for the probe kind.

use memtrack_common::{
    ProbeKind, ALLOC_BYTES_PREFIX, ALLOC_RETURN_PREFIX, DEBUGINFO_NOISE, FREE_MEM_PREFIX, OP_END,
    OP_START, STACK_END, STACK_START,
};

use crate::domain::{Address, ParseError};
use crate::events::{AllocationEvent, DeallocationEvent};

/// Where the parser is relative to record boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserState {
    #[default]
    Idle,
    InRecord,
}

/// Line-at-a-time record delimiter, one per probe stdout stream
#[derive(Debug, Default)]
pub struct BlockParser {
    state: ParserState,
    buffer: Vec<String>,
}

impl BlockParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Feed one line (without its terminator).
    ///
    /// Returns the buffered body when `line` closes a record.
    pub fn push_line(&mut self, line: &str) -> Option<Vec<String>> {
        match self.state {
            ParserState::Idle => {
                if line == OP_START {
                    self.buffer.clear();
                    self.state = ParserState::InRecord;
                }
                None
            }
            ParserState::InRecord => {
                if line == OP_END {
                    self.state = ParserState::Idle;
                    Some(std::mem::take(&mut self.buffer))
                } else {
                    self.buffer.push(line.to_owned());
                    None
                }
            }
        }
    }
}

/// Decoding of one record body into a typed event
pub trait DecodeRecord: Sized {
    /// Probe whose output this record comes from
    const KIND: ProbeKind;

    /// # Errors
    /// Returns a [`ParseError`] if a field prefix, a number or a stack
    /// sentinel does not match the protocol.
    fn decode(lines: &[String]) -> Result<Self, ParseError>;
}

impl DecodeRecord for AllocationEvent {
    const KIND: ProbeKind = ProbeKind::Allocation;

    fn decode(lines: &[String]) -> Result<Self, ParseError> {
        check_len(lines, Self::KIND)?;

        let bytes = field(&lines[0], ALLOC_BYTES_PREFIX)?;
        let size_bytes: i64 = bytes.parse().map_err(|source| ParseError::InvalidNumber {
            field: "bytes",
            value: bytes.to_owned(),
            source,
        })?;
        if size_bytes < 0 {
            return Err(ParseError::NegativeSize(size_bytes));
        }

        let ret = field(&lines[1], ALLOC_RETURN_PREFIX)?;
        let address = u64::from_str_radix(ret, 16).map_err(|source| ParseError::InvalidNumber {
            field: "return",
            value: ret.to_owned(),
            source,
        })?;

        let stack = stack_frames(lines, Self::KIND)?;
        Ok(AllocationEvent::new(size_bytes, Address(address), stack))
    }
}

impl DecodeRecord for DeallocationEvent {
    const KIND: ProbeKind = ProbeKind::Deallocation;

    fn decode(lines: &[String]) -> Result<Self, ParseError> {
        check_len(lines, Self::KIND)?;

        // `%d` prints the pointer signed; reinterpret the bits
        let mem = field(&lines[0], FREE_MEM_PREFIX)?;
        let signed: i64 = mem.parse().map_err(|source| ParseError::InvalidNumber {
            field: "mem",
            value: mem.to_owned(),
            source,
        })?;
        let address = u64::from_ne_bytes(signed.to_ne_bytes());

        let stack = stack_frames(lines, Self::KIND)?;
        Ok(DeallocationEvent::new(Address(address), stack))
    }
}

/// Header lines, both stack sentinels and at least one frame
fn check_len(lines: &[String], kind: ProbeKind) -> Result<(), ParseError> {
    let expected = kind.header_lines() + 3;
    if lines.len() < expected {
        return Err(ParseError::Truncated { lines: lines.len(), expected });
    }
    Ok(())
}

fn field<'a>(line: &'a str, prefix: &'static str) -> Result<&'a str, ParseError> {
    line.strip_prefix(prefix)
        .ok_or_else(|| ParseError::MissingField { expected: prefix, line: line.to_owned() })
}

/// Frames between the stack sentinels, in emitted order
fn stack_frames(lines: &[String], kind: ProbeKind) -> Result<Vec<String>, ParseError> {
    let start = kind.header_lines();
    let last = lines.len() - 1;

    if lines[start] != STACK_START {
        return Err(ParseError::MissingSentinel { expected: STACK_START, line: lines[start].clone() });
    }
    if lines[last] != STACK_END {
        return Err(ParseError::MissingSentinel { expected: STACK_END, line: lines[last].clone() });
    }
    Ok(lines[start + 1..last].to_vec())
}

/// Whether a diagnostic-stream line should be reported as an error
#[must_use]
pub fn is_reportable_diagnostic(line: &str) -> bool {
    !line.contains(DEBUGINFO_NOISE)
}
