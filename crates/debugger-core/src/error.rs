//! Error taxonomy for the debugger core.
//!
//! Construction-time and decode-time failures are raised synchronously to
//! the immediate caller. Everything else degrades to a safe default at the
//! point of use so multi-step runs never abort mid-flight because of a
//! single malformed watch condition.

use thiserror::Error;

/// Disassembler could not decode the byte sequence at an address.
///
/// Fatal to the current step only; the cycle state machine leaves all state
/// unchanged at the pre-step clock and reports "cannot proceed".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot decode instruction bytes at address {address:#x}")]
pub struct DecodeError {
    /// Address the failed decode attempt started at.
    pub address: u64,
}

/// Session constructed with out-of-range or degenerate memory parameters.
///
/// Fatal at construction; the session never starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionParameterError {
    /// Mapped memory size was zero.
    #[error("memory size must be positive")]
    ZeroMemorySize,
    /// Code size was zero.
    #[error("code size must be positive")]
    ZeroCodeSize,
    /// Mapped memory range overflows the address space.
    #[error("memory range starting at {address:#x} leaves the address space")]
    MemoryRangeOverflow {
        /// Start of the offending memory range.
        address: u64,
    },
    /// Code range is not fully contained in the mapped memory range.
    #[error("code range starting at {address:#x} is outside mapped memory")]
    CodeOutsideMemory {
        /// Start of the offending code range.
        address: u64,
    },
    /// Provided machine code does not fit the declared code size.
    #[error("machine code image of {provided} bytes exceeds code size {declared}")]
    CodeImageTooLarge {
        /// Bytes of machine code provided.
        provided: usize,
        /// Declared code size in bytes.
        declared: u64,
    },
}

/// Failure reported by the external emulator collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("emulator failure: {0}")]
pub struct EmulatorError(pub String);

impl EmulatorError {
    /// Convenience constructor from any displayable cause.
    pub fn new(cause: impl Into<String>) -> Self {
        Self(cause.into())
    }
}

/// Top-level failure surface of stepping and run operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebuggerError {
    /// Invalid session parameters at construction.
    #[error(transparent)]
    Parameters(#[from] SessionParameterError),
    /// Emulator-level failure during an elementary step.
    #[error(transparent)]
    Emulator(#[from] EmulatorError),
    /// Emulator-level failure during session rebuild replay.
    ///
    /// Stepping cannot safely resume with an inconsistent emulator, so this
    /// terminates the debugging session.
    #[error("session rebuild failed: {0}")]
    Rebuild(EmulatorError),
}
