//! Cycle state machine driving one instruction through its three phases.
//!
//! FETCH decodes at the instruction pointer and records the read-set,
//! ADVANCE_POINTER computes the next pointer value without touching the
//! emulator, and EXECUTE runs exactly one instruction on the emulator while
//! capturing its memory traffic. Every state mutation flows through the
//! transaction journal, which is what makes the whole cycle reversible.

use log::warn;

use crate::backend::{
    AccessSink, Backend, BackendFactory, DecodedInstruction, Emulator, MemoryOperand,
    MAX_INSTRUCTION_BYTES,
};
use crate::error::{DebuggerError, EmulatorError};
use crate::journal::ReverseLog;
use crate::registers::{FlagId, RegisterId};
use crate::session::SessionParameters;
use crate::state::{
    AccessedElements, ByteInformation, ChangeHistoryEntry, Flag, MemoryAccess, MemorySnapshot,
    ObservableState, Register, StateView,
};
use crate::version::Version;

/// The three elementary phases of one instruction cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum CyclePhase {
    /// Read and decode the instruction at the instruction pointer.
    Fetch,
    /// Compute the next instruction pointer value.
    AdvancePointer,
    /// Execute the instruction on the emulator.
    Execute,
}

impl CyclePhase {
    /// Phase for a clock phase index.
    #[must_use]
    pub const fn from_index(index: u8) -> Self {
        match index {
            1 => Self::AdvancePointer,
            2 => Self::Execute,
            _ => Self::Fetch,
        }
    }

    /// Clock phase index of this phase.
    #[must_use]
    pub const fn index(self) -> u8 {
        match self {
            Self::Fetch => 0,
            Self::AdvancePointer => 1,
            Self::Execute => 2,
        }
    }

    /// Display name of this phase.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fetch => "Get Instruction",
            Self::AdvancePointer => "Increment Instr. Pointer",
            Self::Execute => "Execute Instruction",
        }
    }
}

/// One named cycle phase with its animate flag.
///
/// The flag is irrelevant to stepping itself; it is carried so hosts can
/// toggle per-phase visual work and so multi-step runs can suppress it
/// wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CycleStep {
    /// Phase this entry describes.
    pub phase: CyclePhase,
    /// Whether stepwise visual side effects are enabled for this phase.
    pub animate: bool,
}

/// Saved animate flags returned by [`StepController::suppress_step_effects`].
pub type SavedStepEffects = [bool; 3];

#[derive(Default)]
struct RecordingSink {
    reads: Vec<MemoryAccess>,
    writes: Vec<MemoryAccess>,
}

impl AccessSink for RecordingSink {
    fn on_memory_read(&mut self, address: u64, bytes: &[u8]) {
        self.reads.push(MemoryAccess {
            address,
            bytes: bytes.to_vec(),
        });
    }

    fn on_memory_write(&mut self, address: u64, bytes: &[u8]) {
        self.writes.push(MemoryAccess {
            address,
            bytes: bytes.to_vec(),
        });
    }
}

fn push_unique<T: PartialEq>(values: &mut Vec<T>, value: T) {
    if !values.contains(&value) {
        values.push(value);
    }
}

/// Drives the FETCH / ADVANCE_POINTER / EXECUTE cycle over the external
/// emulator and disassembler, journaling every observable mutation.
pub struct StepController {
    journal: ReverseLog,
    backend: Backend,
    factory: Box<dyn BackendFactory>,
    steps: [CycleStep; 3],
}

impl StepController {
    /// Starts a debugging session.
    ///
    /// Validates the parameters, builds the backend through the factory and
    /// seeds the journal with the initial observable state (synthetic
    /// all-zero instruction, clock `(0, 0)`).
    ///
    /// # Errors
    ///
    /// Returns [`DebuggerError::Parameters`] for invalid session parameters
    /// and [`DebuggerError::Emulator`] when the initial state cannot be read
    /// from a fresh backend.
    pub fn new(
        mut parameters: SessionParameters,
        factory: Box<dyn BackendFactory>,
    ) -> Result<Self, DebuggerError> {
        parameters.validate()?;
        parameters.canonicalize_tracked_registers();

        let mut backend = factory.create(&parameters)?;
        let initial = Self::initial_state(backend.emulator.as_mut(), &parameters)?;
        let journal = ReverseLog::new(initial, parameters);

        Ok(Self {
            journal,
            backend,
            factory,
            steps: [
                CycleStep {
                    phase: CyclePhase::Fetch,
                    animate: true,
                },
                CycleStep {
                    phase: CyclePhase::AdvancePointer,
                    animate: true,
                },
                CycleStep {
                    phase: CyclePhase::Execute,
                    animate: true,
                },
            ],
        })
    }

    fn initial_state(
        emulator: &mut dyn Emulator,
        parameters: &SessionParameters,
    ) -> Result<ObservableState, EmulatorError> {
        let registers = Self::read_registers(emulator, &parameters.tracked_registers)?;
        let flags = Self::read_flags(emulator, &parameters.tracked_flags)?;
        let memory = Self::read_memory_snapshot(emulator, parameters)?;

        let mut byte_information = ByteInformation {
            code: parameters.code_range(),
            instruction_pointer: parameters.code_address,
            stack_pointer: register_as_u64(&registers, RegisterId::Rsp),
            base_pointer: register_as_u64(&registers, RegisterId::Rbp),
            ..ByteInformation::default()
        };
        byte_information
            .mark_used(parameters.code_address..parameters.code_address + parameters.code.len() as u64);

        Ok(ObservableState {
            memory,
            registers,
            current_instruction: DecodedInstruction::empty(),
            instruction_pointer: parameters.code_address,
            flags,
            accessed_elements: AccessedElements::default(),
            byte_information,
            change_history: Vec::new(),
        })
    }

    /// Executes the current phase and advances the logical clock.
    ///
    /// Returns `Ok(false)` when no further step is available: either the
    /// instruction pointer left the code range, or the disassembler could
    /// not decode the bytes at the pointer (reported, state left unchanged
    /// at the pre-step clock).
    ///
    /// # Errors
    ///
    /// Returns [`DebuggerError::Emulator`] for emulator failures, which are
    /// fatal to the session.
    pub fn step(&mut self) -> Result<bool, DebuggerError> {
        if self.is_final_step() {
            return Ok(false);
        }
        match self.current_phase() {
            CyclePhase::Fetch => self.fetch(),
            CyclePhase::AdvancePointer => {
                self.advance_pointer();
                Ok(true)
            }
            CyclePhase::Execute => self.execute(),
        }
    }

    /// Reverses one elementary step.
    ///
    /// No-op at the initial step. When the reversal crosses an instruction
    /// boundary, the emulator/disassembler pair is torn down and rebuilt by
    /// replaying the recorded instruction history; the rebuild completes
    /// before this method returns, so partial states are never observable.
    ///
    /// # Errors
    ///
    /// Returns [`DebuggerError::Rebuild`] when the replay fails; the
    /// session cannot continue afterwards.
    pub fn step_back(&mut self) -> Result<(), DebuggerError> {
        let Some(outcome) = self.journal.step_back() else {
            return Ok(());
        };
        if outcome.needs_rebuild {
            self.backend = self.journal.rebuild_backend(self.factory.as_ref())?;
        }
        Ok(())
    }

    fn fetch(&mut self) -> Result<bool, DebuggerError> {
        let pointer = self.journal.instruction_pointer();
        let code_range = self.journal.parameters().code_range();
        let available = code_range
            .to
            .saturating_sub(pointer)
            .min(MAX_INSTRUCTION_BYTES as u64) as usize;
        let bytes = self.backend.emulator.read_memory(pointer, available)?;

        let decoded = match self.backend.disassembler.decode_one(&bytes, pointer) {
            Ok(decoded) => decoded,
            Err(error) => {
                warn!("{error}; cannot proceed past the current step");
                return Ok(false);
            }
        };

        let mut parameters = self.journal.parameters().clone();
        if parameters.track_registers(decoded.operands.referenced_registers()) {
            self.journal.set_parameters(parameters.clone());
        }

        let emulator = self.backend.emulator.as_mut();
        let accessed = Self::read_set(emulator, &decoded)?;
        let registers = Self::read_registers(emulator, &parameters.tracked_registers)?;

        let mut byte_information = self.journal.byte_information().clone();
        byte_information.mark_used(decoded.address..decoded.next_address());

        self.journal.set_accessed_elements(accessed);
        self.journal.set_registers(registers);
        self.journal.set_byte_information(byte_information);
        self.journal.set_current_instruction(decoded);
        self.journal.advance_clock();
        Ok(true)
    }

    fn advance_pointer(&mut self) {
        let next = self.journal.current_instruction().next_address();
        let mut byte_information = self.journal.byte_information().clone();
        byte_information.instruction_pointer = next;

        self.journal.set_instruction_pointer(next);
        self.journal.set_byte_information(byte_information);
        self.journal.advance_clock();
    }

    fn execute(&mut self) -> Result<bool, DebuggerError> {
        let instruction = self.journal.current_instruction().clone();

        let mut sink = RecordingSink::default();
        self.backend
            .emulator
            .execute_one(instruction.address, &mut sink)?;

        let mut accessed = self.journal.accessed_elements().clone();
        for register in &instruction.operands.registers_written {
            push_unique(&mut accessed.registers_written, register.widened());
        }
        for flag in &instruction.operands.flags_written {
            push_unique(&mut accessed.flags_written, *flag);
        }
        accessed.memory_reads.extend(sink.reads);
        accessed.memory_writes.extend(sink.writes);

        let parameters = self.journal.parameters().clone();
        let emulator = self.backend.emulator.as_mut();
        let registers = Self::read_registers(emulator, &parameters.tracked_registers)?;
        let flags = Self::read_flags(emulator, &parameters.tracked_flags)?;
        let memory = Self::read_memory_snapshot(emulator, &parameters)?;
        // Control transfers land somewhere other than the sequential next
        // address computed at ADVANCE_POINTER.
        let landed = u64_from_le(&emulator.read_register(RegisterId::Rip)?);

        let mut byte_information = self.journal.byte_information().clone();
        byte_information.instruction_pointer = landed;
        byte_information.stack_pointer = register_as_u64(&registers, RegisterId::Rsp);
        byte_information.base_pointer = register_as_u64(&registers, RegisterId::Rbp);
        byte_information.mark_used(accessed.memory_writes.iter().map(|access| access.address));

        let mut change_history = self.journal.change_history().to_vec();
        change_history.push(ChangeHistoryEntry {
            instruction: instruction.display_text(),
            changed_elements: accessed.changed_element_names(),
        });

        self.journal.set_accessed_elements(accessed);
        self.journal.set_registers(registers);
        self.journal.set_flags(flags);
        self.journal.set_memory(memory);
        if landed != self.journal.instruction_pointer() {
            self.journal.set_instruction_pointer(landed);
        }
        self.journal.set_byte_information(byte_information);
        self.journal.set_change_history(change_history);
        // Scratch space starts empty for the next cycle.
        self.journal.set_accessed_elements(AccessedElements::default());
        self.journal.advance_clock();
        Ok(!self.is_final_step())
    }

    fn read_set(
        emulator: &mut dyn Emulator,
        decoded: &DecodedInstruction,
    ) -> Result<AccessedElements, EmulatorError> {
        let mut accessed = AccessedElements::default();
        for register in &decoded.operands.registers_read {
            push_unique(&mut accessed.registers_read, register.widened());
        }
        for flag in &decoded.operands.flags_tested {
            push_unique(&mut accessed.flags_tested, *flag);
        }
        for operand in &decoded.operands.memory {
            if !operand.access.reads() {
                continue;
            }
            let address = effective_address(emulator, operand)?;
            let bytes = emulator.read_memory(address, usize::from(operand.size))?;
            accessed.memory_reads.push(MemoryAccess { address, bytes });
        }
        Ok(accessed)
    }

    fn read_registers(
        emulator: &mut dyn Emulator,
        tracked: &[RegisterId],
    ) -> Result<Vec<Register>, EmulatorError> {
        tracked
            .iter()
            .map(|&id| {
                emulator
                    .read_register(id)
                    .map(|value| Register { id, value })
            })
            .collect()
    }

    fn read_flags(
        emulator: &mut dyn Emulator,
        tracked: &[FlagId],
    ) -> Result<Vec<Flag>, EmulatorError> {
        let rflags = emulator.read_register(RegisterId::Rflags)?;
        Ok(tracked
            .iter()
            .map(|&id| Flag {
                id,
                set: id.is_set_in(&rflags),
            })
            .collect())
    }

    fn read_memory_snapshot(
        emulator: &mut dyn Emulator,
        parameters: &SessionParameters,
    ) -> Result<MemorySnapshot, EmulatorError> {
        let bytes =
            emulator.read_memory(parameters.memory_address, parameters.memory_size as usize)?;
        Ok(MemorySnapshot {
            base: parameters.memory_address,
            bytes,
        })
    }

    /// Phase the next forward step will run.
    #[must_use]
    pub fn current_phase(&self) -> CyclePhase {
        CyclePhase::from_index(self.journal.clock().phase)
    }

    /// The cycle step descriptor for the current phase.
    #[must_use]
    pub fn current_step(&self) -> CycleStep {
        self.steps[usize::from(self.current_phase().index())]
    }

    /// All three cycle step descriptors.
    #[must_use]
    pub const fn steps(&self) -> &[CycleStep; 3] {
        &self.steps
    }

    /// Toggles the animate flag of one phase.
    pub fn toggle_step_animation(&mut self, phase: CyclePhase) {
        let step = &mut self.steps[usize::from(phase.index())];
        step.animate = !step.animate;
    }

    /// Disables all stepwise visual side effects, returning the previous
    /// flags for [`Self::restore_step_effects`].
    pub fn suppress_step_effects(&mut self) -> SavedStepEffects {
        let saved = [
            self.steps[0].animate,
            self.steps[1].animate,
            self.steps[2].animate,
        ];
        for step in &mut self.steps {
            step.animate = false;
        }
        saved
    }

    /// Restores animate flags saved by [`Self::suppress_step_effects`].
    pub fn restore_step_effects(&mut self, saved: SavedStepEffects) {
        for (step, animate) in self.steps.iter_mut().zip(saved) {
            step.animate = animate;
        }
    }

    /// Returns `true` at the session start clock `(0, 0)`.
    #[must_use]
    pub const fn is_initial_step(&self) -> bool {
        self.journal.is_initial_step()
    }

    /// Returns `true` when the instruction pointer has left the declared
    /// code range at a cycle boundary, so no further forward step exists.
    #[must_use]
    pub fn is_final_step(&self) -> bool {
        self.current_phase() == CyclePhase::Fetch
            && !self
                .journal
                .parameters()
                .code_range()
                .contains(self.journal.instruction_pointer())
    }

    /// Current logical clock.
    #[must_use]
    pub const fn clock(&self) -> Version {
        self.journal.clock()
    }

    /// Read-only view of the live observable state.
    #[must_use]
    pub fn observable_state(&self) -> StateView<'_> {
        self.journal.view()
    }

    /// Deep copy of the live observable state.
    #[must_use]
    pub fn state_snapshot(&self) -> ObservableState {
        self.journal.snapshot()
    }

    /// Live session parameters.
    #[must_use]
    pub fn parameters(&self) -> &SessionParameters {
        self.journal.parameters()
    }
}

fn register_as_u64(registers: &[Register], id: RegisterId) -> u64 {
    registers
        .iter()
        .find(|register| register.id == id)
        .map_or(0, |register| u64_from_le(&register.value))
}

fn u64_from_le(bytes: &[u8]) -> u64 {
    let mut value = [0u8; 8];
    for (slot, byte) in value.iter_mut().zip(bytes) {
        *slot = *byte;
    }
    u64::from_le_bytes(value)
}

fn effective_address(
    emulator: &mut dyn Emulator,
    operand: &MemoryOperand,
) -> Result<u64, EmulatorError> {
    #[allow(clippy::cast_sign_loss)]
    let mut address = operand.displacement as u64;
    if let Some(base) = operand.base {
        let value = emulator.read_register(base.widened())?;
        address = address.wrapping_add(u64_from_le(&value));
    }
    if let Some(index) = operand.index {
        let value = emulator.read_register(index.widened())?;
        address =
            address.wrapping_add(u64_from_le(&value).wrapping_mul(u64::from(operand.scale)));
    }
    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::{u64_from_le, CyclePhase};

    #[test]
    fn phase_indices_round_trip() {
        for phase in [
            CyclePhase::Fetch,
            CyclePhase::AdvancePointer,
            CyclePhase::Execute,
        ] {
            assert_eq!(CyclePhase::from_index(phase.index()), phase);
        }
    }

    #[test]
    fn little_endian_conversion_tolerates_short_images() {
        assert_eq!(u64_from_le(&[0x34, 0x12]), 0x1234);
        assert_eq!(u64_from_le(&[]), 0);
        assert_eq!(u64_from_le(&[0; 8]), 0);
    }
}
