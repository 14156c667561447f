//! # Probe Output Protocol (tracer ↔ memtrack)
//!
//! Defines the literals shared between the probe programs memtrack renders for
//! the SystemTap runtime and the parser that reads their output back. Keeping
//! them in one place means the producer and the consumer cannot drift apart.
//!
//! ## Record Layout
//!
//! Every probe hit prints one record, terminated by a blank line:
//!
//! ```text
//! ---===                    OP_START
//! bytes=<decimal>           ALLOC_BYTES_PREFIX   (allocation only)
//! return=0x<hex>            ALLOC_RETURN_PREFIX  (allocation only)
//! mem=<decimal>             FREE_MEM_PREFIX      (deallocation only)
//! ***===                    STACK_START
//! <frame>                   one line per user-space frame, innermost first
//! ===***                    STACK_END
//! ===---                    OP_END
//! ```
//!
//! Frame lines look like `<file:line> : <symbol>+<offset> [<module-path>]`.
//! memtrack never interprets them beyond hashing and display.

#![no_std]

// ============================================================================
// Sentinel Lines
// ============================================================================

/// Opens a record. Anything seen before it is tracer noise.
pub const OP_START: &str = "---===";

/// Closes a record. The buffered body is handed to the decoder.
pub const OP_END: &str = "===---";

/// Opens the backtrace section inside a record.
pub const STACK_START: &str = "***===";

/// Closes the backtrace section inside a record.
pub const STACK_END: &str = "===***";

// ============================================================================
// Record Fields
// ============================================================================

/// Requested byte count of an allocation, printed in decimal.
pub const ALLOC_BYTES_PREFIX: &str = "bytes=";

/// Pointer returned by `malloc`, printed by `$$return` as hex.
pub const ALLOC_RETURN_PREFIX: &str = "return=0x";

/// Pointer passed to `free`, printed in (signed) decimal.
pub const FREE_MEM_PREFIX: &str = "mem=";

// ============================================================================
// Diagnostic Stream
// ============================================================================

/// Routine SystemTap complaint about missing debuginfo packages for
/// unrelated libraries. Lines containing it are not errors.
pub const DEBUGINFO_NOISE: &str = "Missing separate debuginfos";

/// Which half of the session a probe belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    /// Return probe on `malloc`
    Allocation,
    /// Entry probe on `free`
    Deallocation,
}

impl ProbeKind {
    /// Short name used in log lines and error messages
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ProbeKind::Allocation => "malloc",
            ProbeKind::Deallocation => "free",
        }
    }

    /// Number of fixed lines preceding the stack section in a record body
    #[must_use]
    pub const fn header_lines(self) -> usize {
        match self {
            ProbeKind::Allocation => 2,
            ProbeKind::Deallocation => 1,
        }
    }
}

impl core::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
