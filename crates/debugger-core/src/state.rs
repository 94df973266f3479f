//! Observable CPU state surfaced to the host UI.
//!
//! Every field of [`ObservableState`] is independently versioned by the
//! transaction journal; this module only defines the value types and the
//! read-only [`StateView`] handed to the host and to the condition
//! evaluator.

use crate::backend::DecodedInstruction;
use crate::registers::{FlagId, RegisterId};
use crate::session::AddressRange;

/// One surfaced register with its little-endian value image.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Register {
    /// Canonical full-width register identifier.
    pub id: RegisterId,
    /// Little-endian value bytes as read from the emulator.
    pub value: Vec<u8>,
}

/// One surfaced status flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Flag {
    /// Flag identifier.
    pub id: FlagId,
    /// Current flag value.
    pub set: bool,
}

/// Snapshot of the mapped memory region.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MemorySnapshot {
    /// Base address of the snapshot.
    pub base: u64,
    /// Raw memory bytes.
    pub bytes: Vec<u8>,
}

/// One memory access observed for the in-flight instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MemoryAccess {
    /// Accessed address.
    pub address: u64,
    /// Bytes read or written.
    pub bytes: Vec<u8>,
}

/// Registers, flags and memory touched by the in-flight instruction.
///
/// The read-set is recorded at FETCH from the decoded operands; the
/// write-set is merged in at EXECUTE from the operand descriptors and the
/// emulator's memory hooks. Cleared after every completed cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct AccessedElements {
    /// Registers read by the instruction.
    pub registers_read: Vec<RegisterId>,
    /// Registers written by the instruction.
    pub registers_written: Vec<RegisterId>,
    /// Flags tested by the instruction.
    pub flags_tested: Vec<FlagId>,
    /// Flags written by the instruction.
    pub flags_written: Vec<FlagId>,
    /// Memory reads, in execution order.
    pub memory_reads: Vec<MemoryAccess>,
    /// Memory writes, in execution order.
    pub memory_writes: Vec<MemoryAccess>,
}

impl AccessedElements {
    /// Returns `true` when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registers_read.is_empty()
            && self.registers_written.is_empty()
            && self.flags_tested.is_empty()
            && self.flags_written.is_empty()
            && self.memory_reads.is_empty()
            && self.memory_writes.is_empty()
    }

    /// Human-readable names of everything the instruction changed.
    #[must_use]
    pub fn changed_element_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for register in &self.registers_written {
            names.push(register.name().to_owned());
        }
        for flag in &self.flags_written {
            names.push(flag.name().to_owned());
        }
        for write in &self.memory_writes {
            names.push(format!("mem[{:#x}]", write.address));
        }
        names
    }
}

/// One entry of the append-only change history.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ChangeHistoryEntry {
    /// Instruction text (mnemonic plus operands).
    pub instruction: String,
    /// Names of the changed registers, flags and memory cells.
    pub changed_elements: Vec<String>,
}

/// Derived byte and pointer annotations over the memory view.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ByteInformation {
    /// Declared code range.
    pub code: AddressRange,
    /// Addresses known to hold meaningful bytes, in first-use order.
    pub used_bytes: Vec<u64>,
    /// Address the instruction pointer annotation points at.
    pub instruction_pointer: u64,
    /// Address the stack pointer annotation points at.
    pub stack_pointer: u64,
    /// Address the base pointer annotation points at.
    pub base_pointer: u64,
}

impl ByteInformation {
    /// Marks `addresses` as used, keeping first-use order.
    pub fn mark_used<I>(&mut self, addresses: I)
    where
        I: IntoIterator<Item = u64>,
    {
        for address in addresses {
            if !self.used_bytes.contains(&address) {
                self.used_bytes.push(address);
            }
        }
    }
}

/// Complete observable state record, used for seeding and for deep-equality
/// snapshots; the live copy is owned field-by-field by the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ObservableState {
    /// Mapped memory snapshot.
    pub memory: MemorySnapshot,
    /// Surfaced register set.
    pub registers: Vec<Register>,
    /// Currently decoded instruction.
    pub current_instruction: DecodedInstruction,
    /// Instruction pointer.
    pub instruction_pointer: u64,
    /// Surfaced flag set.
    pub flags: Vec<Flag>,
    /// Elements touched by the in-flight instruction.
    pub accessed_elements: AccessedElements,
    /// Derived byte and pointer annotations.
    pub byte_information: ByteInformation,
    /// Append-only change history.
    pub change_history: Vec<ChangeHistoryEntry>,
}

/// Read-only borrow of the current observable state.
#[derive(Debug, Clone, Copy)]
pub struct StateView<'a> {
    /// Mapped memory snapshot.
    pub memory: &'a MemorySnapshot,
    /// Surfaced register set.
    pub registers: &'a [Register],
    /// Currently decoded instruction.
    pub current_instruction: &'a DecodedInstruction,
    /// Instruction pointer.
    pub instruction_pointer: u64,
    /// Surfaced flag set.
    pub flags: &'a [Flag],
    /// Elements touched by the in-flight instruction.
    pub accessed_elements: &'a AccessedElements,
    /// Derived byte and pointer annotations.
    pub byte_information: &'a ByteInformation,
    /// Append-only change history.
    pub change_history: &'a [ChangeHistoryEntry],
}

impl StateView<'_> {
    /// Little-endian value of a surfaced register, by canonical id.
    #[must_use]
    pub fn register_value(&self, id: RegisterId) -> Option<&[u8]> {
        let canonical = id.widened();
        self.registers
            .iter()
            .find(|register| register.id == canonical)
            .map(|register| register.value.as_slice())
    }

    /// Current value of a surfaced flag.
    #[must_use]
    pub fn flag_set(&self, id: FlagId) -> Option<bool> {
        self.flags
            .iter()
            .find(|flag| flag.id == id)
            .map(|flag| flag.set)
    }

    /// Deep copy of the whole record.
    #[must_use]
    pub fn to_owned_state(&self) -> ObservableState {
        ObservableState {
            memory: self.memory.clone(),
            registers: self.registers.to_vec(),
            current_instruction: self.current_instruction.clone(),
            instruction_pointer: self.instruction_pointer,
            flags: self.flags.to_vec(),
            accessed_elements: self.accessed_elements.clone(),
            byte_information: self.byte_information.clone(),
            change_history: self.change_history.to_vec(),
        }
    }
}
