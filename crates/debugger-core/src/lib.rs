//! Reversible instruction-cycle debugger core for x86-64 visualization.

/// Logical clock ordering elementary steps.
pub mod version;
pub use version::{Version, PHASE_COUNT};

/// Register and flag identifiers with sub-register widening.
pub mod registers;
pub use registers::{FlagId, RegisterId, FULL_REGISTER_BYTES};

/// Error taxonomy for session setup, emulation and rebuilds.
pub mod error;
pub use error::{DebuggerError, DecodeError, EmulatorError, SessionParameterError};

/// Host collaborator contracts: emulator, disassembler, factory.
pub mod backend;
pub use backend::{
    AccessSink, Backend, BackendFactory, DecodedInstruction, Disassembler, Emulator,
    InstructionOperands, MemoryAccessMode, MemoryOperand, NullAccessSink, MAX_INSTRUCTION_BYTES,
};

/// Session parameters and address ranges.
pub mod session;
pub use session::{
    AddressRange, SessionParameters, DEFAULT_TRACKED_FLAGS, DEFAULT_TRACKED_REGISTERS,
};

/// Observable CPU state value types.
pub mod state;
pub use state::{
    AccessedElements, ByteInformation, ChangeHistoryEntry, Flag, MemoryAccess, MemorySnapshot,
    ObservableState, Register, StateView,
};

/// Versioned per-field transaction log with replay-based rebuilds.
pub mod journal;
pub use journal::{ReversalOutcome, ReverseLog};

/// Cycle state machine: FETCH, ADVANCE_POINTER, EXECUTE.
pub mod step;
pub use step::{CyclePhase, CycleStep, SavedStepEffects, StepController};

/// Break condition language: validation and evaluation.
pub mod expr;
pub use expr::{evaluate_condition, validate_condition, ConditionError};

/// Breakpoints, watchpoints and multi-step runs.
pub mod debugger;
pub use debugger::{
    Breakpoint, Condition, DebugEvent, DebugEventSink, DebuggerController, LineTable,
    NullEventSink, RecordingEventSink, Watchpoint,
};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
