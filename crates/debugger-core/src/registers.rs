//! x86-64 register and flag identifiers.
//!
//! Conditions, tracked sets and the observable register file only ever deal
//! in canonical full-width names; [`RegisterId::widened`] maps every
//! sub-width alias discovered in instruction operands to its full-width
//! form. `RIP` is a pseudo-register resolved from the instruction pointer
//! rather than a register lookup.

/// Width of a full x86-64 register in bytes.
pub const FULL_REGISTER_BYTES: usize = 8;

/// x86-64 register identifier, including sub-width aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(missing_docs)]
pub enum RegisterId {
    Rax, Eax, Ax, Al, Ah,
    Rbx, Ebx, Bx, Bl, Bh,
    Rcx, Ecx, Cx, Cl, Ch,
    Rdx, Edx, Dx, Dl, Dh,
    Rsi, Esi, Si, Sil,
    Rdi, Edi, Di, Dil,
    Rbp, Ebp, Bp, Bpl,
    Rsp, Esp, Sp, Spl,
    R8, R8d, R8w, R8b,
    R9, R9d, R9w, R9b,
    R10, R10d, R10w, R10b,
    R11, R11d, R11w, R11b,
    R12, R12d, R12w, R12b,
    R13, R13d, R13w, R13b,
    R14, R14d, R14w, R14b,
    R15, R15d, R15w, R15b,
    Rip, Eip,
    Rflags, Eflags,
}

impl RegisterId {
    /// Canonical full-width form of this register.
    #[must_use]
    pub const fn widened(self) -> Self {
        match self {
            Self::Rax | Self::Eax | Self::Ax | Self::Al | Self::Ah => Self::Rax,
            Self::Rbx | Self::Ebx | Self::Bx | Self::Bl | Self::Bh => Self::Rbx,
            Self::Rcx | Self::Ecx | Self::Cx | Self::Cl | Self::Ch => Self::Rcx,
            Self::Rdx | Self::Edx | Self::Dx | Self::Dl | Self::Dh => Self::Rdx,
            Self::Rsi | Self::Esi | Self::Si | Self::Sil => Self::Rsi,
            Self::Rdi | Self::Edi | Self::Di | Self::Dil => Self::Rdi,
            Self::Rbp | Self::Ebp | Self::Bp | Self::Bpl => Self::Rbp,
            Self::Rsp | Self::Esp | Self::Sp | Self::Spl => Self::Rsp,
            Self::R8 | Self::R8d | Self::R8w | Self::R8b => Self::R8,
            Self::R9 | Self::R9d | Self::R9w | Self::R9b => Self::R9,
            Self::R10 | Self::R10d | Self::R10w | Self::R10b => Self::R10,
            Self::R11 | Self::R11d | Self::R11w | Self::R11b => Self::R11,
            Self::R12 | Self::R12d | Self::R12w | Self::R12b => Self::R12,
            Self::R13 | Self::R13d | Self::R13w | Self::R13b => Self::R13,
            Self::R14 | Self::R14d | Self::R14w | Self::R14b => Self::R14,
            Self::R15 | Self::R15d | Self::R15w | Self::R15b => Self::R15,
            Self::Rip | Self::Eip => Self::Rip,
            Self::Rflags | Self::Eflags => Self::Rflags,
        }
    }

    /// Returns `true` for the synthetic instruction-pointer pseudo-register.
    #[must_use]
    pub const fn is_instruction_pointer(self) -> bool {
        matches!(self.widened(), Self::Rip)
    }

    /// Canonical upper-case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Rax => "RAX", Self::Eax => "EAX", Self::Ax => "AX",
            Self::Al => "AL", Self::Ah => "AH",
            Self::Rbx => "RBX", Self::Ebx => "EBX", Self::Bx => "BX",
            Self::Bl => "BL", Self::Bh => "BH",
            Self::Rcx => "RCX", Self::Ecx => "ECX", Self::Cx => "CX",
            Self::Cl => "CL", Self::Ch => "CH",
            Self::Rdx => "RDX", Self::Edx => "EDX", Self::Dx => "DX",
            Self::Dl => "DL", Self::Dh => "DH",
            Self::Rsi => "RSI", Self::Esi => "ESI", Self::Si => "SI",
            Self::Sil => "SIL",
            Self::Rdi => "RDI", Self::Edi => "EDI", Self::Di => "DI",
            Self::Dil => "DIL",
            Self::Rbp => "RBP", Self::Ebp => "EBP", Self::Bp => "BP",
            Self::Bpl => "BPL",
            Self::Rsp => "RSP", Self::Esp => "ESP", Self::Sp => "SP",
            Self::Spl => "SPL",
            Self::R8 => "R8", Self::R8d => "R8D", Self::R8w => "R8W",
            Self::R8b => "R8B",
            Self::R9 => "R9", Self::R9d => "R9D", Self::R9w => "R9W",
            Self::R9b => "R9B",
            Self::R10 => "R10", Self::R10d => "R10D", Self::R10w => "R10W",
            Self::R10b => "R10B",
            Self::R11 => "R11", Self::R11d => "R11D", Self::R11w => "R11W",
            Self::R11b => "R11B",
            Self::R12 => "R12", Self::R12d => "R12D", Self::R12w => "R12W",
            Self::R12b => "R12B",
            Self::R13 => "R13", Self::R13d => "R13D", Self::R13w => "R13W",
            Self::R13b => "R13B",
            Self::R14 => "R14", Self::R14d => "R14D", Self::R14w => "R14W",
            Self::R14b => "R14B",
            Self::R15 => "R15", Self::R15d => "R15D", Self::R15w => "R15W",
            Self::R15b => "R15B",
            Self::Rip => "RIP", Self::Eip => "EIP",
            Self::Rflags => "RFLAGS", Self::Eflags => "EFLAGS",
        }
    }

    /// Looks up a register by name, case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        match upper.as_str() {
            "RAX" => Some(Self::Rax), "EAX" => Some(Self::Eax),
            "AX" => Some(Self::Ax), "AL" => Some(Self::Al),
            "AH" => Some(Self::Ah),
            "RBX" => Some(Self::Rbx), "EBX" => Some(Self::Ebx),
            "BX" => Some(Self::Bx), "BL" => Some(Self::Bl),
            "BH" => Some(Self::Bh),
            "RCX" => Some(Self::Rcx), "ECX" => Some(Self::Ecx),
            "CX" => Some(Self::Cx), "CL" => Some(Self::Cl),
            "CH" => Some(Self::Ch),
            "RDX" => Some(Self::Rdx), "EDX" => Some(Self::Edx),
            "DX" => Some(Self::Dx), "DL" => Some(Self::Dl),
            "DH" => Some(Self::Dh),
            "RSI" => Some(Self::Rsi), "ESI" => Some(Self::Esi),
            "SI" => Some(Self::Si), "SIL" => Some(Self::Sil),
            "RDI" => Some(Self::Rdi), "EDI" => Some(Self::Edi),
            "DI" => Some(Self::Di), "DIL" => Some(Self::Dil),
            "RBP" => Some(Self::Rbp), "EBP" => Some(Self::Ebp),
            "BP" => Some(Self::Bp), "BPL" => Some(Self::Bpl),
            "RSP" => Some(Self::Rsp), "ESP" => Some(Self::Esp),
            "SP" => Some(Self::Sp), "SPL" => Some(Self::Spl),
            "R8" => Some(Self::R8), "R8D" => Some(Self::R8d),
            "R8W" => Some(Self::R8w), "R8B" => Some(Self::R8b),
            "R9" => Some(Self::R9), "R9D" => Some(Self::R9d),
            "R9W" => Some(Self::R9w), "R9B" => Some(Self::R9b),
            "R10" => Some(Self::R10), "R10D" => Some(Self::R10d),
            "R10W" => Some(Self::R10w), "R10B" => Some(Self::R10b),
            "R11" => Some(Self::R11), "R11D" => Some(Self::R11d),
            "R11W" => Some(Self::R11w), "R11B" => Some(Self::R11b),
            "R12" => Some(Self::R12), "R12D" => Some(Self::R12d),
            "R12W" => Some(Self::R12w), "R12B" => Some(Self::R12b),
            "R13" => Some(Self::R13), "R13D" => Some(Self::R13d),
            "R13W" => Some(Self::R13w), "R13B" => Some(Self::R13b),
            "R14" => Some(Self::R14), "R14D" => Some(Self::R14d),
            "R14W" => Some(Self::R14w), "R14B" => Some(Self::R14b),
            "R15" => Some(Self::R15), "R15D" => Some(Self::R15d),
            "R15W" => Some(Self::R15w), "R15B" => Some(Self::R15b),
            "RIP" => Some(Self::Rip), "EIP" => Some(Self::Eip),
            "RFLAGS" => Some(Self::Rflags), "EFLAGS" => Some(Self::Eflags),
            _ => None,
        }
    }
}

/// Architectural status flag identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(missing_docs)]
pub enum FlagId {
    Cf,
    Pf,
    Af,
    Zf,
    Sf,
    Tf,
    If,
    Df,
    Of,
}

impl FlagId {
    /// Ordered list of all status flags.
    pub const ALL: [Self; 9] = [
        Self::Cf,
        Self::Pf,
        Self::Af,
        Self::Zf,
        Self::Sf,
        Self::Tf,
        Self::If,
        Self::Df,
        Self::Of,
    ];

    /// Bit position of this flag inside `RFLAGS`.
    #[must_use]
    pub const fn bit(self) -> u32 {
        match self {
            Self::Cf => 0,
            Self::Pf => 2,
            Self::Af => 4,
            Self::Zf => 6,
            Self::Sf => 7,
            Self::Tf => 8,
            Self::If => 9,
            Self::Df => 10,
            Self::Of => 11,
        }
    }

    /// Canonical upper-case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cf => "CF",
            Self::Pf => "PF",
            Self::Af => "AF",
            Self::Zf => "ZF",
            Self::Sf => "SF",
            Self::Tf => "TF",
            Self::If => "IF",
            Self::Df => "DF",
            Self::Of => "OF",
        }
    }

    /// Looks up a flag by name, case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        Self::ALL.into_iter().find(|flag| flag.name() == upper)
    }

    /// Extracts this flag from a little-endian `RFLAGS` byte image.
    #[must_use]
    pub fn is_set_in(self, rflags: &[u8]) -> bool {
        let byte = (self.bit() / 8) as usize;
        let mask = 1u8 << (self.bit() % 8);
        rflags.get(byte).is_some_and(|value| value & mask != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::{FlagId, RegisterId};

    #[test]
    fn sub_width_aliases_widen_to_canonical_registers() {
        assert_eq!(RegisterId::Al.widened(), RegisterId::Rax);
        assert_eq!(RegisterId::Ah.widened(), RegisterId::Rax);
        assert_eq!(RegisterId::Ebx.widened(), RegisterId::Rbx);
        assert_eq!(RegisterId::Spl.widened(), RegisterId::Rsp);
        assert_eq!(RegisterId::R15b.widened(), RegisterId::R15);
        assert_eq!(RegisterId::Eip.widened(), RegisterId::Rip);
        assert_eq!(RegisterId::R10.widened(), RegisterId::R10);
    }

    #[test]
    fn register_lookup_is_case_insensitive() {
        assert_eq!(RegisterId::from_name("rax"), Some(RegisterId::Rax));
        assert_eq!(RegisterId::from_name("r11w"), Some(RegisterId::R11w));
        assert_eq!(RegisterId::from_name("RIP"), Some(RegisterId::Rip));
        assert_eq!(RegisterId::from_name("XMM0"), None);
    }

    #[test]
    fn flag_bits_match_rflags_layout() {
        let rflags = [0b0100_0001u8, 0b0000_1000];
        assert!(FlagId::Cf.is_set_in(&rflags));
        assert!(FlagId::Zf.is_set_in(&rflags));
        assert!(!FlagId::Sf.is_set_in(&rflags));
        assert!(FlagId::Of.is_set_in(&rflags));
        assert!(!FlagId::Df.is_set_in(&rflags));
    }

    #[test]
    fn flag_lookup_is_case_insensitive() {
        assert_eq!(FlagId::from_name("zf"), Some(FlagId::Zf));
        assert_eq!(FlagId::from_name("OF"), Some(FlagId::Of));
        assert_eq!(FlagId::from_name("QF"), None);
    }
}
