//! Collaborator contracts required from the host environment.
//!
//! The emulator and disassembler are opaque, forward-only black boxes. The
//! session owns exactly one [`Backend`] at a time; the reversal path tears
//! it down and asks the [`BackendFactory`] for a fresh one when a backward
//! step has to be resynchronized by replay. Teardown is `Drop`.

use crate::error::{DecodeError, EmulatorError};
use crate::registers::{FlagId, RegisterId};
use crate::session::SessionParameters;

/// Upper bound on the byte length of one x86-64 instruction.
pub const MAX_INSTRUCTION_BYTES: usize = 15;

/// Forward-only CPU emulator contract.
///
/// Register images are little-endian byte sequences. No native undo
/// primitive is assumed or required.
pub trait Emulator {
    /// Reads `size` bytes of mapped memory starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError`] when the emulator cannot complete the read.
    fn read_memory(&mut self, address: u64, size: usize) -> Result<Vec<u8>, EmulatorError>;

    /// Writes bytes into mapped memory starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError`] when the emulator cannot complete the
    /// write.
    fn write_memory(&mut self, address: u64, bytes: &[u8]) -> Result<(), EmulatorError>;

    /// Reads a register as a little-endian byte sequence.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError`] when the register cannot be read.
    fn read_register(&mut self, register: RegisterId) -> Result<Vec<u8>, EmulatorError>;

    /// Writes a register from a little-endian byte sequence.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError`] when the register cannot be written.
    fn write_register(&mut self, register: RegisterId, bytes: &[u8]) -> Result<(), EmulatorError>;

    /// Executes exactly one instruction at `address`.
    ///
    /// Memory accesses performed while executing are reported synchronously
    /// through `sink`, in architected order.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError`] when execution cannot complete; the session
    /// treats this as fatal.
    fn execute_one(&mut self, address: u64, sink: &mut dyn AccessSink)
        -> Result<(), EmulatorError>;
}

/// Synchronous observer for memory traffic during [`Emulator::execute_one`].
pub trait AccessSink {
    /// Records a memory read in execution order.
    fn on_memory_read(&mut self, address: u64, bytes: &[u8]);

    /// Records a memory write in execution order.
    fn on_memory_write(&mut self, address: u64, bytes: &[u8]);
}

/// Sink that discards all access reports; used by replay.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAccessSink;

impl AccessSink for NullAccessSink {
    fn on_memory_read(&mut self, _address: u64, _bytes: &[u8]) {}

    fn on_memory_write(&mut self, _address: u64, _bytes: &[u8]) {}
}

/// Disassembler contract decoding one instruction at a time.
pub trait Disassembler {
    /// Decodes a single instruction from `bytes` located at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] for malformed byte sequences.
    fn decode_one(&mut self, bytes: &[u8], address: u64)
        -> Result<DecodedInstruction, DecodeError>;
}

/// The emulator/disassembler pair exclusively owned by one session.
pub struct Backend {
    /// Forward-only CPU emulator handle.
    pub emulator: Box<dyn Emulator>,
    /// Instruction decoder handle.
    pub disassembler: Box<dyn Disassembler>,
}

/// Creates fresh backends from the original code image.
///
/// Called once at session start and again for every session rebuild; the
/// factory is responsible for mapping memory and loading the machine code
/// described by the session parameters.
pub trait BackendFactory {
    /// Builds a backend with the code image loaded and registers at their
    /// program-start values.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError`] when the backend cannot be constructed.
    fn create(&self, parameters: &SessionParameters) -> Result<Backend, EmulatorError>;
}

/// Direction of a decoded memory operand's data movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum MemoryAccessMode {
    /// Operand is only read.
    Read,
    /// Operand is only written.
    Write,
    /// Operand is read and written.
    ReadWrite,
}

impl MemoryAccessMode {
    /// Returns `true` when the operand is read.
    #[must_use]
    pub const fn reads(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// Returns `true` when the operand is written.
    #[must_use]
    pub const fn writes(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// Decoded memory operand in `base + index * scale + displacement` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MemoryOperand {
    /// Base register, if present.
    pub base: Option<RegisterId>,
    /// Index register, if present.
    pub index: Option<RegisterId>,
    /// Index scale factor (1, 2, 4 or 8).
    pub scale: u8,
    /// Signed displacement.
    pub displacement: i64,
    /// Access width in bytes.
    pub size: u8,
    /// Read/write direction.
    pub access: MemoryAccessMode,
}

/// Strongly-typed operand descriptor produced at the disassembler boundary.
///
/// Adapters translate the external tool's raw output into this shape so the
/// core never sees it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct InstructionOperands {
    /// Registers the instruction reads.
    pub registers_read: Vec<RegisterId>,
    /// Registers the instruction writes.
    pub registers_written: Vec<RegisterId>,
    /// Flags the instruction tests.
    pub flags_tested: Vec<FlagId>,
    /// Flags the instruction writes.
    pub flags_written: Vec<FlagId>,
    /// Decoded memory operands.
    pub memory: Vec<MemoryOperand>,
    /// Immediate values.
    pub immediates: Vec<u64>,
}

impl InstructionOperands {
    /// All registers referenced by the instruction, read or written.
    pub fn referenced_registers(&self) -> impl Iterator<Item = RegisterId> + '_ {
        self.registers_read
            .iter()
            .chain(self.registers_written.iter())
            .copied()
            .chain(self.memory.iter().flat_map(|operand| {
                operand.base.into_iter().chain(operand.index.into_iter())
            }))
    }
}

/// One decoded instruction, as recorded in the observable state.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DecodedInstruction {
    /// Address the instruction was decoded at.
    pub address: u64,
    /// Encoded length in bytes.
    pub length: u8,
    /// Lower-case mnemonic.
    pub mnemonic: String,
    /// Textual operand list as the disassembler rendered it.
    pub operands_text: String,
    /// Raw instruction bytes.
    pub bytes: Vec<u8>,
    /// Typed operand descriptors.
    pub operands: InstructionOperands,
}

impl DecodedInstruction {
    /// Synthetic all-zero instruction seeding a fresh session at clock
    /// `(0, 0)`.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            address: 0,
            length: 0,
            mnemonic: String::new(),
            operands_text: String::new(),
            bytes: Vec::new(),
            operands: InstructionOperands::default(),
        }
    }

    /// Mnemonic plus operand text, as shown in the change history.
    #[must_use]
    pub fn display_text(&self) -> String {
        if self.operands_text.is_empty() {
            self.mnemonic.clone()
        } else {
            format!("{} {}", self.mnemonic, self.operands_text)
        }
    }

    /// Address of the instruction following this one, wrapped to the
    /// architecture's address width.
    #[must_use]
    pub const fn next_address(&self) -> u64 {
        self.address.wrapping_add(self.length as u64)
    }
}
