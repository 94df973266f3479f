//! Logical clock ordering every observable mutation of a debugging session.
//!
//! A [`Version`] is a `(instruction_count, phase)` pair ordered
//! lexicographically. The phase cycles `0 -> 1 -> 2 -> 0` as the instruction
//! cycle advances and the instruction count increments on every wrap, so the
//! sequence of clocks visited while stepping forward is strictly increasing
//! and backward stepping visits the exact reverse sequence.

/// Number of elementary phases in one instruction cycle.
pub const PHASE_COUNT: u8 = 3;

/// Logical clock tagging every undo-log entry.
///
/// `Ord` derives lexicographic `(instruction_count, phase)` ordering, which
/// is the sole ordering authority for all undo operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Version {
    /// Number of completed instruction cycles.
    pub instruction_count: u64,
    /// Elementary phase within the current cycle (`0..PHASE_COUNT`).
    pub phase: u8,
}

impl Version {
    /// Creates a clock value from its two components.
    #[must_use]
    pub const fn new(instruction_count: u64, phase: u8) -> Self {
        Self {
            instruction_count,
            phase,
        }
    }

    /// Returns `true` at the session start clock `(0, 0)`.
    #[must_use]
    pub const fn is_initial(self) -> bool {
        self.instruction_count == 0 && self.phase == 0
    }

    /// Clock after one elementary forward step.
    ///
    /// The phase wraps `2 -> 0`, incrementing the instruction count; this is
    /// the only place the instruction count grows.
    #[must_use]
    pub const fn advanced(self) -> Self {
        if self.phase + 1 == PHASE_COUNT {
            Self::new(self.instruction_count + 1, 0)
        } else {
            Self::new(self.instruction_count, self.phase + 1)
        }
    }

    /// Clock after one elementary backward step, or `None` at `(0, 0)`.
    ///
    /// The phase wraps `0 -> 2`, decrementing the instruction count; this is
    /// the only place the instruction count decreases.
    #[must_use]
    pub const fn retreated(self) -> Option<Self> {
        if self.phase == 0 {
            if self.instruction_count == 0 {
                None
            } else {
                Some(Self::new(self.instruction_count - 1, PHASE_COUNT - 1))
            }
        } else {
            Some(Self::new(self.instruction_count, self.phase - 1))
        }
    }

    /// Wrap-around comparison rule deciding whether a log entry is ahead of
    /// or at a reversal target.
    ///
    /// An entry is "at or after" the target when the instruction counts are
    /// equal and the entry's phase is not below the target phase, or when the
    /// entry belongs to a future instruction entirely. Lexicographic ordering
    /// expresses exactly that, so this is a documented alias for `>=`.
    #[must_use]
    pub fn is_at_or_after(self, target: Self) -> bool {
        self >= target
    }
}

#[cfg(test)]
mod tests {
    use super::{Version, PHASE_COUNT};

    #[test]
    fn advance_walks_phases_and_wraps_into_next_instruction() {
        let mut clock = Version::default();
        assert!(clock.is_initial());

        clock = clock.advanced();
        assert_eq!(clock, Version::new(0, 1));
        clock = clock.advanced();
        assert_eq!(clock, Version::new(0, 2));
        clock = clock.advanced();
        assert_eq!(clock, Version::new(1, 0));
    }

    #[test]
    fn retreat_reverses_advance_exactly() {
        let mut clock = Version::default();
        let mut visited = vec![clock];
        for _ in 0..10 {
            clock = clock.advanced();
            visited.push(clock);
        }

        while let Some(previous) = clock.retreated() {
            let expected = visited.pop().expect("forward history present");
            assert_eq!(clock, expected);
            clock = previous;
        }
        assert_eq!(clock, Version::default());
        assert_eq!(visited, vec![Version::default()]);
    }

    #[test]
    fn retreat_stops_at_the_initial_clock() {
        assert_eq!(Version::default().retreated(), None);
        assert_eq!(
            Version::new(1, 0).retreated(),
            Some(Version::new(0, PHASE_COUNT - 1))
        );
    }

    #[test]
    fn ordering_is_lexicographic_across_instruction_boundaries() {
        assert!(Version::new(1, 0) > Version::new(0, 2));
        assert!(Version::new(2, 0).is_at_or_after(Version::new(1, 2)));
        assert!(Version::new(1, 2).is_at_or_after(Version::new(1, 2)));
        assert!(!Version::new(1, 1).is_at_or_after(Version::new(1, 2)));
    }

    #[test]
    fn forward_clock_sequence_is_strictly_increasing() {
        let mut clock = Version::default();
        for _ in 0..32 {
            let next = clock.advanced();
            assert!(next > clock);
            clock = next;
        }
    }
}
