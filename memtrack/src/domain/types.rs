//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep a process id, a heap address and a stack
//! fingerprint from being mixed up, and make function signatures say which
//! one they expect.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process ID of the traced target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub i32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

impl From<i32> for Pid {
    fn from(pid: i32) -> Self {
        Pid(pid)
    }
}

/// Heap address returned by `malloc` or handed to `free`
///
/// Only ever used as an identifier for matching allocations with
/// deallocations. It is never dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub u64);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Aggregation key for a call stack
///
/// CRC-32 (IEEE) over the frame strings concatenated in order, without
/// separators. Equal stacks always hash equal; distinct stacks may collide
/// and are then counted as one call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub u32);

impl Fingerprint {
    /// Fingerprint an ordered list of frames
    #[must_use]
    pub fn of_stack<S: AsRef<str>>(frames: &[S]) -> Self {
        let mut hasher = crc32fast::Hasher::new();
        for frame in frames {
            hasher.update(frame.as_ref().as_bytes());
        }
        Fingerprint(hasher.finalize())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display() {
        assert_eq!(Address(0x1000).to_string(), "0x1000");
    }

    #[test]
    fn test_pid_display() {
        assert_eq!(Pid(4242).to_string(), "PID:4242");
    }

    #[test]
    fn test_fingerprint_is_crc32_of_concatenation() {
        let frames = ["main.c:10 : main+0x1a [/usr/bin/app]", "libc.so.6+0x29d90"];
        let joined: String = frames.concat();
        assert_eq!(Fingerprint::of_stack(&frames), Fingerprint(crc32fast::hash(joined.as_bytes())));
    }

    #[test]
    fn test_fingerprint_is_order_sensitive() {
        let a = Fingerprint::of_stack(&["foo", "bar"]);
        let b = Fingerprint::of_stack(&["bar", "foo"]);
        assert_ne!(a, b);
        assert_eq!(a, Fingerprint::of_stack(&["foo".to_string(), "bar".to_string()]));
    }

    #[test]
    fn test_fingerprint_ignores_frame_boundaries() {
        // Concatenation without separators: boundaries are not part of the key
        assert_eq!(Fingerprint::of_stack(&["ab", "c"]), Fingerprint::of_stack(&["a", "bc"]));
    }
}
