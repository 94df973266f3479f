//! Transaction/undo journal making every observable field cheaply
//! reversible.
//!
//! Every write to a tracked field goes through a typed setter that appends
//! `(clock, value)` to the field's [`FieldLog`] before the value becomes the
//! live one; the live value *is* the newest log entry, so recording is
//! synchronous and ordered by construction. Reversal pops entries at or
//! after the target clock. When a backward step has to undo an emulator
//! execution, the journal rebuilds the backend from the original code image
//! and replays the recorded instruction history forward.

use log::debug;

use crate::backend::{Backend, BackendFactory, DecodedInstruction, NullAccessSink};
use crate::error::DebuggerError;
use crate::session::SessionParameters;
use crate::state::{
    AccessedElements, ByteInformation, ChangeHistoryEntry, Flag, MemorySnapshot, ObservableState,
    Register, StateView,
};
use crate::version::Version;

/// One `(clock, value)` pair of a field history.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry<T> {
    version: Version,
    value: T,
}

/// Append-only per-field history enabling reversal.
///
/// Never empty after initialization: the seed entry at clock `(0, 0)` holds
/// the field's initial value and is never popped.
#[derive(Debug, Clone)]
pub struct FieldLog<T> {
    entries: Vec<Entry<T>>,
}

impl<T: Clone> FieldLog<T> {
    fn new(initial: T) -> Self {
        Self {
            entries: vec![Entry {
                version: Version::default(),
                value: initial,
            }],
        }
    }

    /// The live value of the field.
    #[must_use]
    pub fn current(&self) -> &T {
        &self
            .entries
            .last()
            .expect("field log holds at least its seed entry")
            .value
    }

    /// Number of recorded entries, the seed included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`; present for container-API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn record(&mut self, version: Version, value: T) {
        self.entries.push(Entry { version, value });
    }

    /// Pops every entry at or after `target`, never popping the sole
    /// remaining entry. Returns `true` when anything was popped.
    fn rollback(&mut self, target: Version) -> bool {
        let mut popped = false;
        while self.entries.len() > 1 {
            let newest = self
                .entries
                .last()
                .expect("field log holds at least its seed entry");
            if !newest.version.is_at_or_after(target) {
                break;
            }
            self.entries.pop();
            popped = true;
        }
        popped
    }

    fn iter(&self) -> impl Iterator<Item = (Version, &T)> {
        self.entries.iter().map(|entry| (entry.version, &entry.value))
    }
}

/// Per-field histories of the observable state record.
#[derive(Debug)]
struct StateJournal {
    memory: FieldLog<MemorySnapshot>,
    registers: FieldLog<Vec<Register>>,
    current_instruction: FieldLog<DecodedInstruction>,
    instruction_pointer: FieldLog<u64>,
    flags: FieldLog<Vec<Flag>>,
    accessed_elements: FieldLog<AccessedElements>,
    byte_information: FieldLog<ByteInformation>,
    change_history: FieldLog<Vec<ChangeHistoryEntry>>,
}

impl StateJournal {
    fn new(initial: ObservableState) -> Self {
        Self {
            memory: FieldLog::new(initial.memory),
            registers: FieldLog::new(initial.registers),
            current_instruction: FieldLog::new(initial.current_instruction),
            instruction_pointer: FieldLog::new(initial.instruction_pointer),
            flags: FieldLog::new(initial.flags),
            accessed_elements: FieldLog::new(initial.accessed_elements),
            byte_information: FieldLog::new(initial.byte_information),
            change_history: FieldLog::new(initial.change_history),
        }
    }

    /// Rolls every field back to `target`; returns `true` when the
    /// decoded-instruction history popped, signalling that a fetch was
    /// undone.
    fn rollback(&mut self, target: Version) -> bool {
        self.memory.rollback(target);
        self.registers.rollback(target);
        let instruction_popped = self.current_instruction.rollback(target);
        self.instruction_pointer.rollback(target);
        self.flags.rollback(target);
        self.accessed_elements.rollback(target);
        self.byte_information.rollback(target);
        self.change_history.rollback(target);
        instruction_popped
    }
}

/// Result of one elementary backward step of the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReversalOutcome {
    /// Clock the session now sits at.
    pub target: Version,
    /// A decoded-instruction entry was popped (the fetch was undone).
    pub instruction_entry_popped: bool,
    /// At least one session-parameter entry was discarded.
    pub parameters_discarded: bool,
    /// The emulator/disassembler pair must be rebuilt before any further
    /// step is accepted.
    pub needs_rebuild: bool,
}

/// The transaction/undo log of one debugging session.
///
/// Owns the logical clock, the per-field state histories and the
/// session-parameter history. All mutation of observable state flows
/// through the typed `set_*` recorders.
#[derive(Debug)]
pub struct ReverseLog {
    clock: Version,
    state: StateJournal,
    parameters: FieldLog<SessionParameters>,
}

impl ReverseLog {
    /// Seeds all histories with the initial state at clock `(0, 0)`.
    #[must_use]
    pub fn new(initial: ObservableState, parameters: SessionParameters) -> Self {
        Self {
            clock: Version::default(),
            state: StateJournal::new(initial),
            parameters: FieldLog::new(parameters),
        }
    }

    /// Current logical clock.
    #[must_use]
    pub const fn clock(&self) -> Version {
        self.clock
    }

    /// Returns `true` at the session start clock.
    #[must_use]
    pub const fn is_initial_step(&self) -> bool {
        self.clock.is_initial()
    }

    /// Advances the clock by one elementary step.
    pub fn advance_clock(&mut self) {
        self.clock = self.clock.advanced();
    }

    /// Live session parameters.
    #[must_use]
    pub fn parameters(&self) -> &SessionParameters {
        self.parameters.current()
    }

    /// Records a session-parameter mutation at the current clock.
    pub fn set_parameters(&mut self, value: SessionParameters) {
        self.parameters.record(self.clock, value);
    }

    /// Records a memory-snapshot mutation at the current clock.
    pub fn set_memory(&mut self, value: MemorySnapshot) {
        self.state.memory.record(self.clock, value);
    }

    /// Records a register-set mutation at the current clock.
    pub fn set_registers(&mut self, value: Vec<Register>) {
        self.state.registers.record(self.clock, value);
    }

    /// Records a decoded-instruction mutation at the current clock.
    pub fn set_current_instruction(&mut self, value: DecodedInstruction) {
        self.state.current_instruction.record(self.clock, value);
    }

    /// Records an instruction-pointer mutation at the current clock.
    pub fn set_instruction_pointer(&mut self, value: u64) {
        self.state.instruction_pointer.record(self.clock, value);
    }

    /// Records a flag-set mutation at the current clock.
    pub fn set_flags(&mut self, value: Vec<Flag>) {
        self.state.flags.record(self.clock, value);
    }

    /// Records an accessed-elements mutation at the current clock.
    pub fn set_accessed_elements(&mut self, value: AccessedElements) {
        self.state.accessed_elements.record(self.clock, value);
    }

    /// Records a byte-information mutation at the current clock.
    pub fn set_byte_information(&mut self, value: ByteInformation) {
        self.state.byte_information.record(self.clock, value);
    }

    /// Records a change-history mutation at the current clock.
    pub fn set_change_history(&mut self, value: Vec<ChangeHistoryEntry>) {
        self.state.change_history.record(self.clock, value);
    }

    /// Live decoded instruction.
    #[must_use]
    pub fn current_instruction(&self) -> &DecodedInstruction {
        self.state.current_instruction.current()
    }

    /// Live instruction pointer.
    #[must_use]
    pub fn instruction_pointer(&self) -> u64 {
        *self.state.instruction_pointer.current()
    }

    /// Live accessed-elements scratch.
    #[must_use]
    pub fn accessed_elements(&self) -> &AccessedElements {
        self.state.accessed_elements.current()
    }

    /// Live byte information.
    #[must_use]
    pub fn byte_information(&self) -> &ByteInformation {
        self.state.byte_information.current()
    }

    /// Live register set.
    #[must_use]
    pub fn registers(&self) -> &[Register] {
        self.state.registers.current()
    }

    /// Live change history.
    #[must_use]
    pub fn change_history(&self) -> &[ChangeHistoryEntry] {
        self.state.change_history.current()
    }

    /// Read-only view of the complete live state.
    #[must_use]
    pub fn view(&self) -> StateView<'_> {
        StateView {
            memory: self.state.memory.current(),
            registers: self.state.registers.current(),
            current_instruction: self.state.current_instruction.current(),
            instruction_pointer: *self.state.instruction_pointer.current(),
            flags: self.state.flags.current(),
            accessed_elements: self.state.accessed_elements.current(),
            byte_information: self.state.byte_information.current(),
            change_history: self.state.change_history.current(),
        }
    }

    /// Deep copy of the complete live state.
    #[must_use]
    pub fn snapshot(&self) -> ObservableState {
        self.view().to_owned_state()
    }

    /// Reverses one elementary step, or returns `None` at the initial
    /// clock.
    ///
    /// Pops every field entry at or after the target clock (never a sole
    /// seed), making the previous values live. A rebuild is required when
    /// the step undoes an emulator execution (the instruction count
    /// decreased) or when a fetch was undone together with discarded
    /// session-parameter growth, which cannot be un-grown in place.
    pub fn step_back(&mut self) -> Option<ReversalOutcome> {
        let target = self.clock.retreated()?;
        let crossed_boundary = target.instruction_count < self.clock.instruction_count;

        let instruction_entry_popped = self.state.rollback(target);
        let parameters_discarded = self.parameters.rollback(target);

        let needs_rebuild =
            crossed_boundary || (instruction_entry_popped && parameters_discarded);
        self.clock = target;

        Some(ReversalOutcome {
            target,
            instruction_entry_popped,
            parameters_discarded,
            needs_rebuild,
        })
    }

    /// Rebuilds the emulator/disassembler pair after a boundary-crossing
    /// reversal.
    ///
    /// Creates a fresh backend from the original code image and replays, by
    /// forward execution only, every recorded instruction from session
    /// start up to but not including the current instruction. The cost is
    /// linear in the number of instructions executed so far.
    ///
    /// # Errors
    ///
    /// Returns [`DebuggerError::Rebuild`] when the factory or the replay
    /// fails; the session cannot safely continue afterwards.
    pub fn rebuild_backend(
        &self,
        factory: &dyn BackendFactory,
    ) -> Result<Backend, DebuggerError> {
        let parameters = self.parameters.current();
        let mut backend = factory.create(parameters).map_err(DebuggerError::Rebuild)?;

        let mut sink = NullAccessSink;
        let mut replayed = 0u64;
        for (version, instruction) in self.state.current_instruction.iter().skip(1) {
            if version.instruction_count < self.clock.instruction_count {
                backend
                    .emulator
                    .execute_one(instruction.address, &mut sink)
                    .map_err(DebuggerError::Rebuild)?;
                replayed += 1;
            }
        }
        debug!(
            "session rebuild replayed {replayed} instructions to clock {:?}",
            self.clock
        );
        Ok(backend)
    }
}
