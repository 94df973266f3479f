//! Per-session emulator parameters.
//!
//! [`SessionParameters`] describes the mapped memory and code ranges, the
//! machine code image, and the dynamically growing set of registers and
//! flags the visualization currently surfaces. The tracked sets only ever
//! grow during forward execution, which is exactly why naive backward
//! stepping of this record is unsafe without a journal (see `journal`).

use crate::error::SessionParameterError;
use crate::registers::{FlagId, RegisterId};

/// Half-open address range `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct AddressRange {
    /// First address inside the range.
    pub from: u64,
    /// First address past the range.
    pub to: u64,
}

impl AddressRange {
    /// Creates a range from its bounds.
    #[must_use]
    pub const fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    /// Returns `true` when `address` falls inside the range.
    #[must_use]
    pub const fn contains(self, address: u64) -> bool {
        address >= self.from && address < self.to
    }

    /// Number of bytes covered.
    #[must_use]
    pub const fn len(self) -> u64 {
        self.to.saturating_sub(self.from)
    }

    /// Returns `true` for a degenerate empty range.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.to <= self.from
    }
}

/// Registers surfaced for a fresh session before any operand discovery.
pub const DEFAULT_TRACKED_REGISTERS: [RegisterId; 6] = [
    RegisterId::Rax,
    RegisterId::Rbx,
    RegisterId::Rcx,
    RegisterId::Rdx,
    RegisterId::Rsp,
    RegisterId::Rbp,
];

/// Flags surfaced for a fresh session.
pub const DEFAULT_TRACKED_FLAGS: [FlagId; 4] = [FlagId::Cf, FlagId::Zf, FlagId::Sf, FlagId::Of];

/// Emulator session parameters, journaled alongside the observable state.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SessionParameters {
    /// Base address of mapped memory.
    pub memory_address: u64,
    /// Size of mapped memory in bytes.
    pub memory_size: u64,
    /// Base address of the code range.
    pub code_address: u64,
    /// Size of the code range in bytes.
    pub code_size: u64,
    /// Accumulated machine code bytes, loaded at `code_address`.
    pub code: Vec<u8>,
    /// Registers currently of interest, canonical full-width, in discovery
    /// order. Monotonic non-decreasing during forward execution.
    pub tracked_registers: Vec<RegisterId>,
    /// Flags currently of interest.
    pub tracked_flags: Vec<FlagId>,
}

impl SessionParameters {
    /// Creates parameters with the default tracked sets.
    #[must_use]
    pub fn new(memory_address: u64, memory_size: u64, code_address: u64, code: Vec<u8>) -> Self {
        let code_size = code.len() as u64;
        Self {
            memory_address,
            memory_size,
            code_address,
            code_size,
            code,
            tracked_registers: DEFAULT_TRACKED_REGISTERS.to_vec(),
            tracked_flags: DEFAULT_TRACKED_FLAGS.to_vec(),
        }
    }

    /// Validates ranges at construction time.
    ///
    /// # Errors
    ///
    /// Returns [`SessionParameterError`] for non-positive sizes, address
    /// space overflow, a code range outside mapped memory, or a code image
    /// larger than the declared code size.
    pub fn validate(&self) -> Result<(), SessionParameterError> {
        if self.memory_size == 0 {
            return Err(SessionParameterError::ZeroMemorySize);
        }
        if self.code_size == 0 {
            return Err(SessionParameterError::ZeroCodeSize);
        }
        let memory_end = self
            .memory_address
            .checked_add(self.memory_size)
            .ok_or(SessionParameterError::MemoryRangeOverflow {
                address: self.memory_address,
            })?;
        let code_end = self
            .code_address
            .checked_add(self.code_size)
            .ok_or(SessionParameterError::CodeOutsideMemory {
                address: self.code_address,
            })?;
        if self.code_address < self.memory_address || code_end > memory_end {
            return Err(SessionParameterError::CodeOutsideMemory {
                address: self.code_address,
            });
        }
        if self.code.len() as u64 > self.code_size {
            return Err(SessionParameterError::CodeImageTooLarge {
                provided: self.code.len(),
                declared: self.code_size,
            });
        }
        Ok(())
    }

    /// The mapped memory range.
    #[must_use]
    pub const fn memory_range(&self) -> AddressRange {
        AddressRange::new(
            self.memory_address,
            self.memory_address.wrapping_add(self.memory_size),
        )
    }

    /// The declared code range.
    #[must_use]
    pub const fn code_range(&self) -> AddressRange {
        AddressRange::new(
            self.code_address,
            self.code_address.wrapping_add(self.code_size),
        )
    }

    /// Replaces the tracked register set with canonical full-width forms,
    /// dropping duplicates while keeping first-seen order.
    pub fn canonicalize_tracked_registers(&mut self) {
        let mut canonical: Vec<RegisterId> = Vec::with_capacity(self.tracked_registers.len());
        for register in &self.tracked_registers {
            let widened = register.widened();
            if !canonical.contains(&widened) {
                canonical.push(widened);
            }
        }
        self.tracked_registers = canonical;
    }

    /// Adds the canonical full-width form of `register` to the tracked set.
    ///
    /// Returns `true` when the set grew. The instruction-pointer and flags
    /// pseudo-registers are never tracked; they are surfaced separately.
    pub fn track_register(&mut self, register: RegisterId) -> bool {
        let widened = register.widened();
        if matches!(widened, RegisterId::Rip | RegisterId::Rflags) {
            return false;
        }
        if self.tracked_registers.contains(&widened) {
            return false;
        }
        self.tracked_registers.push(widened);
        true
    }

    /// Tracks every register in `registers`; returns `true` when the set
    /// grew at all.
    pub fn track_registers<I>(&mut self, registers: I) -> bool
    where
        I: IntoIterator<Item = RegisterId>,
    {
        let mut grew = false;
        for register in registers {
            grew |= self.track_register(register);
        }
        grew
    }
}
