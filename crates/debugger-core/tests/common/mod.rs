//! Scripted emulator and disassembler used by the integration suites.
//!
//! Programs are small lists of [`Op`]s with fixed encoded lengths. The
//! factory rebuilds the exact same initial machine every time it is asked,
//! which is what replay-based reversal relies on.

#![allow(dead_code)]

use std::collections::BTreeMap;

use debugger_core::{
    AccessSink, AddressRange, Backend, BackendFactory, DecodeError, DecodedInstruction,
    Disassembler, Emulator, EmulatorError, FlagId, InstructionOperands, LineTable,
    MemoryAccessMode, MemoryOperand, RegisterId, SessionParameters,
};

pub const MEMORY_BASE: u64 = 0x1_0000;
pub const MEMORY_SIZE: u64 = 0x1000;

/// Semantic operation of one scripted instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// `mov dst, imm`
    MovImm { dst: RegisterId, value: u64 },
    /// `add dst, src`; sets ZF, SF and CF.
    Add { dst: RegisterId, src: RegisterId },
    /// Load `size` bytes from `[base + displacement]` into `dst`.
    Load {
        dst: RegisterId,
        base: RegisterId,
        displacement: i64,
        size: u8,
    },
    /// Store the low `size` bytes of `src` to `[base + displacement]`.
    Store {
        src: RegisterId,
        base: RegisterId,
        displacement: i64,
        size: u8,
    },
    /// Absolute jump.
    Jmp { target: u64 },
    /// No operation.
    Nop,
}

/// One scripted instruction with its fake encoding length.
#[derive(Debug, Clone)]
pub struct ScriptedInstruction {
    pub op: Op,
    pub length: u8,
    pub mnemonic: &'static str,
    pub text: String,
}

fn register_text(register: RegisterId) -> String {
    register.name().to_ascii_lowercase()
}

pub fn mov(dst: RegisterId, value: u64) -> ScriptedInstruction {
    ScriptedInstruction {
        op: Op::MovImm { dst, value },
        length: 7,
        mnemonic: "mov",
        text: format!("{}, {value:#x}", register_text(dst)),
    }
}

pub fn add(dst: RegisterId, src: RegisterId) -> ScriptedInstruction {
    ScriptedInstruction {
        op: Op::Add { dst, src },
        length: 3,
        mnemonic: "add",
        text: format!("{}, {}", register_text(dst), register_text(src)),
    }
}

pub fn load(dst: RegisterId, base: RegisterId, displacement: i64, size: u8) -> ScriptedInstruction {
    ScriptedInstruction {
        op: Op::Load {
            dst,
            base,
            displacement,
            size,
        },
        length: 4,
        mnemonic: "mov",
        text: format!(
            "{}, [{} + {displacement:#x}]",
            register_text(dst),
            register_text(base)
        ),
    }
}

pub fn store(src: RegisterId, base: RegisterId, displacement: i64, size: u8) -> ScriptedInstruction {
    ScriptedInstruction {
        op: Op::Store {
            src,
            base,
            displacement,
            size,
        },
        length: 4,
        mnemonic: "mov",
        text: format!(
            "[{} + {displacement:#x}], {}",
            register_text(base),
            register_text(src)
        ),
    }
}

pub fn jmp(target: u64) -> ScriptedInstruction {
    ScriptedInstruction {
        op: Op::Jmp { target },
        length: 5,
        mnemonic: "jmp",
        text: format!("{target:#x}"),
    }
}

pub fn nop() -> ScriptedInstruction {
    ScriptedInstruction {
        op: Op::Nop,
        length: 1,
        mnemonic: "nop",
        text: String::new(),
    }
}

fn operands_for(op: Op) -> InstructionOperands {
    match op {
        Op::MovImm { dst, value } => InstructionOperands {
            registers_written: vec![dst],
            immediates: vec![value],
            ..InstructionOperands::default()
        },
        Op::Add { dst, src } => InstructionOperands {
            registers_read: vec![dst, src],
            registers_written: vec![dst],
            flags_written: vec![FlagId::Zf, FlagId::Sf, FlagId::Cf],
            ..InstructionOperands::default()
        },
        Op::Load {
            dst,
            base,
            displacement,
            size,
        } => InstructionOperands {
            registers_written: vec![dst],
            memory: vec![MemoryOperand {
                base: Some(base),
                index: None,
                scale: 1,
                displacement,
                size,
                access: MemoryAccessMode::Read,
            }],
            ..InstructionOperands::default()
        },
        Op::Store {
            src,
            base,
            displacement,
            size,
        } => InstructionOperands {
            registers_read: vec![src],
            memory: vec![MemoryOperand {
                base: Some(base),
                index: None,
                scale: 1,
                displacement,
                size,
                access: MemoryAccessMode::Write,
            }],
            ..InstructionOperands::default()
        },
        Op::Jmp { .. } | Op::Nop => InstructionOperands::default(),
    }
}

/// Concatenated fake machine code for a program; one filler byte pattern
/// per instruction so used-byte tracking has something to look at.
pub fn assemble(program: &[ScriptedInstruction]) -> Vec<u8> {
    program
        .iter()
        .enumerate()
        .flat_map(|(index, instruction)| {
            std::iter::repeat(0x90 + index as u8).take(usize::from(instruction.length))
        })
        .collect()
}

/// Address of each instruction when the program is laid out at `base`.
pub fn layout(program: &[ScriptedInstruction], base: u64) -> Vec<u64> {
    let mut addresses = Vec::with_capacity(program.len());
    let mut address = base;
    for instruction in program {
        addresses.push(address);
        address += u64::from(instruction.length);
    }
    addresses
}

/// Maps the `index`-th instruction to source line `lines[index]`.
pub fn line_table(program: &[ScriptedInstruction], lines: &[u32]) -> LineTable {
    let addresses = layout(program, MEMORY_BASE);
    let mut table = LineTable::new();
    for ((&address, instruction), &line) in addresses.iter().zip(program).zip(lines) {
        table.insert(
            line,
            AddressRange::new(address, address + u64::from(instruction.length)),
        );
    }
    table
}

pub struct ScriptedEmulator {
    registers: BTreeMap<RegisterId, u64>,
    rip: u64,
    rflags: u64,
    memory_base: u64,
    memory: Vec<u8>,
    program: BTreeMap<u64, (Op, u8)>,
}

impl ScriptedEmulator {
    fn register(&self, id: RegisterId) -> u64 {
        match id.widened() {
            RegisterId::Rip => self.rip,
            RegisterId::Rflags => self.rflags,
            other => self.registers.get(&other).copied().unwrap_or(0),
        }
    }

    fn set_register(&mut self, id: RegisterId, value: u64) {
        match id.widened() {
            RegisterId::Rip => self.rip = value,
            RegisterId::Rflags => self.rflags = value,
            other => {
                self.registers.insert(other, value);
            }
        }
    }

    fn offset(&self, address: u64, size: usize) -> Result<usize, EmulatorError> {
        let offset = address
            .checked_sub(self.memory_base)
            .ok_or_else(|| EmulatorError::new(format!("unmapped address {address:#x}")))?;
        let end = offset as usize + size;
        if end > self.memory.len() {
            return Err(EmulatorError::new(format!(
                "access past end of memory at {address:#x}"
            )));
        }
        Ok(offset as usize)
    }

    fn set_flag(&mut self, flag: FlagId, value: bool) {
        let mask = 1_u64 << flag.bit();
        if value {
            self.rflags |= mask;
        } else {
            self.rflags &= !mask;
        }
    }
}

impl Emulator for ScriptedEmulator {
    fn read_memory(&mut self, address: u64, size: usize) -> Result<Vec<u8>, EmulatorError> {
        let offset = self.offset(address, size)?;
        Ok(self.memory[offset..offset + size].to_vec())
    }

    fn write_memory(&mut self, address: u64, bytes: &[u8]) -> Result<(), EmulatorError> {
        let offset = self.offset(address, bytes.len())?;
        self.memory[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read_register(&mut self, register: RegisterId) -> Result<Vec<u8>, EmulatorError> {
        Ok(self.register(register).to_le_bytes().to_vec())
    }

    fn write_register(&mut self, register: RegisterId, bytes: &[u8]) -> Result<(), EmulatorError> {
        let mut image = [0_u8; 8];
        for (slot, byte) in image.iter_mut().zip(bytes) {
            *slot = *byte;
        }
        self.set_register(register, u64::from_le_bytes(image));
        Ok(())
    }

    fn execute_one(
        &mut self,
        address: u64,
        sink: &mut dyn AccessSink,
    ) -> Result<(), EmulatorError> {
        let (op, length) = self
            .program
            .get(&address)
            .copied()
            .ok_or_else(|| EmulatorError::new(format!("no instruction at {address:#x}")))?;
        self.rip = address + u64::from(length);

        match op {
            Op::MovImm { dst, value } => self.set_register(dst, value),
            Op::Add { dst, src } => {
                let lhs = self.register(dst);
                let rhs = self.register(src);
                let (result, carry) = lhs.overflowing_add(rhs);
                self.set_register(dst, result);
                self.set_flag(FlagId::Zf, result == 0);
                self.set_flag(FlagId::Sf, result >> 63 == 1);
                self.set_flag(FlagId::Cf, carry);
            }
            Op::Load {
                dst,
                base,
                displacement,
                size,
            } => {
                let target = self
                    .register(base)
                    .wrapping_add(displacement as u64);
                let bytes = self.read_memory(target, usize::from(size))?;
                sink.on_memory_read(target, &bytes);
                let mut image = [0_u8; 8];
                image[..bytes.len()].copy_from_slice(&bytes);
                self.set_register(dst, u64::from_le_bytes(image));
            }
            Op::Store {
                src,
                base,
                displacement,
                size,
            } => {
                let target = self
                    .register(base)
                    .wrapping_add(displacement as u64);
                let bytes = self.register(src).to_le_bytes()[..usize::from(size)].to_vec();
                self.write_memory(target, &bytes)?;
                sink.on_memory_write(target, &bytes);
            }
            Op::Jmp { target } => self.rip = target,
            Op::Nop => {}
        }
        Ok(())
    }
}

pub struct ScriptedDisassembler {
    table: BTreeMap<u64, DecodedInstruction>,
}

impl Disassembler for ScriptedDisassembler {
    fn decode_one(
        &mut self,
        _bytes: &[u8],
        address: u64,
    ) -> Result<DecodedInstruction, DecodeError> {
        self.table
            .get(&address)
            .cloned()
            .ok_or(DecodeError { address })
    }
}

/// Builds identical fresh machines from the same program on every call.
pub struct ScriptedBackendFactory {
    program: Vec<ScriptedInstruction>,
}

impl ScriptedBackendFactory {
    pub fn new(program: Vec<ScriptedInstruction>) -> Self {
        Self { program }
    }
}

impl BackendFactory for ScriptedBackendFactory {
    fn create(&self, parameters: &SessionParameters) -> Result<Backend, EmulatorError> {
        let addresses = layout(&self.program, parameters.code_address);

        let mut program = BTreeMap::new();
        let mut table = BTreeMap::new();
        for (&address, instruction) in addresses.iter().zip(&self.program) {
            program.insert(address, (instruction.op, instruction.length));
            let offset = (address - parameters.code_address) as usize;
            table.insert(
                address,
                DecodedInstruction {
                    address,
                    length: instruction.length,
                    mnemonic: instruction.mnemonic.to_owned(),
                    operands_text: instruction.text.clone(),
                    bytes: parameters.code
                        [offset..offset + usize::from(instruction.length)]
                        .to_vec(),
                    operands: operands_for(instruction.op),
                },
            );
        }

        let mut memory = vec![0_u8; parameters.memory_size as usize];
        let code_offset = (parameters.code_address - parameters.memory_address) as usize;
        memory[code_offset..code_offset + parameters.code.len()]
            .copy_from_slice(&parameters.code);

        let mut emulator = ScriptedEmulator {
            registers: BTreeMap::new(),
            rip: parameters.code_address,
            rflags: 0,
            memory_base: parameters.memory_address,
            memory,
            program,
        };
        emulator.set_register(
            RegisterId::Rsp,
            parameters.memory_address + parameters.memory_size,
        );

        Ok(Backend {
            emulator: Box::new(emulator),
            disassembler: Box::new(ScriptedDisassembler { table }),
        })
    }
}

/// Session parameters mapping the program at [`MEMORY_BASE`].
pub fn parameters_for(program: &[ScriptedInstruction]) -> SessionParameters {
    SessionParameters::new(MEMORY_BASE, MEMORY_SIZE, MEMORY_BASE, assemble(program))
}

/// Parameters plus factory for a program, ready for a controller.
pub fn session_for(
    program: Vec<ScriptedInstruction>,
) -> (SessionParameters, Box<dyn BackendFactory>) {
    let parameters = parameters_for(&program);
    (parameters, Box::new(ScriptedBackendFactory::new(program)))
}
