//! Breakpoint and watchpoint engine layered over the cycle stepper.
//!
//! Breakpoints attach to source lines through a host-supplied line table;
//! watchpoints are free-standing conditions re-evaluated after every
//! elementary step in either direction. Multi-step runs suppress stepwise
//! visual effects for their whole duration. Breakpoint stops park the
//! session at an instruction boundary; a watchpoint stop parks exactly on
//! the elementary step where the condition first held.

use std::collections::BTreeMap;

use crate::error::DebuggerError;
use crate::expr::{evaluate_condition, validate_condition, ConditionError};
use crate::session::AddressRange;
use crate::state::{ObservableState, StateView};
use crate::step::{CyclePhase, StepController};
use crate::version::Version;

/// A validated break condition.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Condition {
    text: String,
}

impl Condition {
    /// Validates and wraps a condition.
    ///
    /// # Errors
    ///
    /// Returns the user-facing [`ConditionError`] when the text is not a
    /// well-formed boolean condition.
    pub fn new(text: impl Into<String>) -> Result<Self, ConditionError> {
        let text = text.into();
        validate_condition(&text)?;
        Ok(Self { text })
    }

    /// The condition text as entered.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Evaluates the condition against `state`; failures log and read as
    /// not holding.
    #[must_use]
    pub fn holds(&self, state: &StateView<'_>) -> bool {
        evaluate_condition(&self.text, state)
    }
}

/// A breakpoint on one source line, optionally guarded by a condition.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Breakpoint {
    /// One-based source line the breakpoint is attached to.
    pub line: u32,
    /// Guard condition; an unconditional breakpoint always stops.
    pub condition: Option<Condition>,
}

/// A condition checked after every elementary step of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Watchpoint {
    /// Watched condition.
    pub condition: Condition,
}

/// Maps source lines to the address ranges their instructions occupy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct LineTable {
    ranges: BTreeMap<u32, AddressRange>,
}

impl LineTable {
    /// Empty table; every address maps to no line.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ranges: BTreeMap::new(),
        }
    }

    /// Associates `line` with the half-open address range of its code.
    pub fn insert(&mut self, line: u32, range: AddressRange) {
        self.ranges.insert(line, range);
    }

    /// Address range of a line, if it produced code.
    #[must_use]
    pub fn range_for(&self, line: u32) -> Option<AddressRange> {
        self.ranges.get(&line).copied()
    }

    /// Line whose range contains `address`.
    #[must_use]
    pub fn line_for(&self, address: u64) -> Option<u32> {
        self.ranges
            .iter()
            .find(|(_, range)| range.contains(address))
            .map(|(&line, _)| line)
    }

    /// Lines with code, ascending.
    pub fn lines(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranges.keys().copied()
    }

    /// Number of mapped lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Returns `true` when no line is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Notifications emitted while a multi-step run executes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum DebugEvent {
    /// A breakpoint stopped the run at `line`.
    BreakpointHit {
        /// Line the session is parked on.
        line: u32,
    },
    /// A watchpoint condition became true.
    WatchpointHit {
        /// Text of the triggering condition.
        condition: String,
    },
    /// A backward run reached the initial step.
    ProgramStart,
    /// A forward run ran out of instructions.
    ProgramEnd,
}

/// Receives [`DebugEvent`]s as they occur.
pub trait DebugEventSink {
    /// Called once per event, in order.
    fn on_event(&mut self, event: &DebugEvent);
}

/// Sink that ignores all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl DebugEventSink for NullEventSink {
    fn on_event(&mut self, _event: &DebugEvent) {}
}

/// Sink that records events for later inspection.
#[derive(Debug, Default, Clone)]
pub struct RecordingEventSink {
    /// Events in emission order.
    pub events: Vec<DebugEvent>,
}

impl DebugEventSink for RecordingEventSink {
    fn on_event(&mut self, event: &DebugEvent) {
        self.events.push(event.clone());
    }
}

/// Bidirectional debugger: breakpoints, watchpoints and multi-step runs
/// over a [`StepController`].
pub struct DebuggerController {
    stepper: StepController,
    line_table: LineTable,
    breakpoints: BTreeMap<u32, Breakpoint>,
    watchpoints: Vec<Watchpoint>,
    sink: Box<dyn DebugEventSink>,
}

impl DebuggerController {
    /// Wraps a stepper with an initially empty breakpoint set.
    #[must_use]
    pub fn new(stepper: StepController, line_table: LineTable) -> Self {
        Self {
            stepper,
            line_table,
            breakpoints: BTreeMap::new(),
            watchpoints: Vec::new(),
            sink: Box::new(NullEventSink),
        }
    }

    /// Replaces the event sink.
    pub fn set_event_sink(&mut self, sink: Box<dyn DebugEventSink>) {
        self.sink = sink;
    }

    /// The underlying cycle stepper.
    #[must_use]
    pub const fn stepper(&self) -> &StepController {
        &self.stepper
    }

    /// Mutable access to the underlying cycle stepper.
    pub fn stepper_mut(&mut self) -> &mut StepController {
        &mut self.stepper
    }

    /// The line table.
    #[must_use]
    pub const fn line_table(&self) -> &LineTable {
        &self.line_table
    }

    /// Source line of the instruction currently executing, if it maps to
    /// code.
    ///
    /// Mid-cycle the instruction pointer may already name the following
    /// instruction (it advances during ADVANCE_POINTER while the EXECUTE of
    /// the fetched instruction is still owed), so the line is resolved from
    /// the in-flight instruction's address until the cycle completes.
    #[must_use]
    pub fn current_line(&self) -> Option<u32> {
        let state = self.stepper.observable_state();
        let address = if self.stepper.current_phase() == CyclePhase::Fetch {
            state.instruction_pointer
        } else {
            state.current_instruction.address
        };
        self.line_table.line_for(address)
    }

    /// Arms an unconditional breakpoint, replacing any previous breakpoint
    /// on the same line.
    pub fn set_breakpoint(&mut self, line: u32) {
        self.breakpoints.insert(
            line,
            Breakpoint {
                line,
                condition: None,
            },
        );
    }

    /// Arms a conditional breakpoint, replacing any previous breakpoint on
    /// the same line.
    ///
    /// # Errors
    ///
    /// Returns the user-facing [`ConditionError`] for a malformed
    /// condition; the previous breakpoint on the line is left untouched.
    pub fn set_conditional_breakpoint(
        &mut self,
        line: u32,
        condition: &str,
    ) -> Result<(), ConditionError> {
        let condition = Condition::new(condition)?;
        self.breakpoints.insert(
            line,
            Breakpoint {
                line,
                condition: Some(condition),
            },
        );
        Ok(())
    }

    /// Removes the breakpoint on `line`; returns `true` when one existed.
    pub fn clear_breakpoint(&mut self, line: u32) -> bool {
        self.breakpoints.remove(&line).is_some()
    }

    /// Arms the breakpoint when absent, clears it when present. Returns
    /// `true` when the line now has a breakpoint, so toggling twice always
    /// restores the previous state.
    pub fn toggle_breakpoint(&mut self, line: u32) -> bool {
        if self.clear_breakpoint(line) {
            false
        } else {
            self.set_breakpoint(line);
            true
        }
    }

    /// Armed breakpoints, ascending by line.
    pub fn breakpoints(&self) -> impl Iterator<Item = &Breakpoint> + '_ {
        self.breakpoints.values()
    }

    /// Arms a watchpoint.
    ///
    /// # Errors
    ///
    /// Returns the user-facing [`ConditionError`] for a malformed
    /// condition.
    pub fn set_watchpoint(&mut self, condition: &str) -> Result<(), ConditionError> {
        let condition = Condition::new(condition)?;
        if !self
            .watchpoints
            .iter()
            .any(|watchpoint| watchpoint.condition == condition)
        {
            self.watchpoints.push(Watchpoint { condition });
        }
        Ok(())
    }

    /// Removes the watchpoint with exactly this condition text; returns
    /// `true` when one existed.
    pub fn unset_watchpoint(&mut self, condition: &str) -> bool {
        let before = self.watchpoints.len();
        self.watchpoints
            .retain(|watchpoint| watchpoint.condition.text() != condition);
        self.watchpoints.len() != before
    }

    /// Armed watchpoints, in arming order.
    #[must_use]
    pub fn watchpoints(&self) -> &[Watchpoint] {
        &self.watchpoints
    }

    /// Executes one elementary step forward.
    ///
    /// # Errors
    ///
    /// Propagates stepper errors; see [`StepController::step`].
    pub fn step(&mut self) -> Result<bool, DebuggerError> {
        self.stepper.step()
    }

    /// Reverses one elementary step.
    ///
    /// # Errors
    ///
    /// Propagates rebuild errors; see [`StepController::step_back`].
    pub fn step_back(&mut self) -> Result<(), DebuggerError> {
        self.stepper.step_back()
    }

    /// Runs the remaining phases of the current instruction, stopping at
    /// the next instruction boundary. Returns `false` when the program has
    /// no further instruction.
    ///
    /// # Errors
    ///
    /// Propagates stepper errors.
    pub fn step_instruction(&mut self) -> Result<bool, DebuggerError> {
        loop {
            if !self.stepper.step()? {
                return Ok(false);
            }
            if self.stepper.current_phase() == CyclePhase::Fetch {
                return Ok(!self.stepper.is_final_step());
            }
        }
    }

    /// Reverses to the previous instruction boundary.
    ///
    /// # Errors
    ///
    /// Propagates rebuild errors.
    pub fn step_back_instruction(&mut self) -> Result<(), DebuggerError> {
        loop {
            if self.stepper.is_initial_step() {
                return Ok(());
            }
            self.stepper.step_back()?;
            if self.stepper.current_phase() == CyclePhase::Fetch {
                return Ok(());
            }
        }
    }

    /// Runs forward to the next triggering breakpoint or watchpoint.
    ///
    /// The target is the nearest armed line strictly after the current one
    /// (a pointer outside any line counts as before the first); a guarded
    /// breakpoint whose condition does not hold on arrival is skipped and
    /// the search continues. Watchpoints are checked after every elementary
    /// step and win over the breakpoint target. Without a trigger the run
    /// ends at the final step. Returns `true` when further forward steps
    /// remain.
    ///
    /// # Errors
    ///
    /// Propagates stepper errors.
    pub fn run_to_next_breakpoint(&mut self) -> Result<bool, DebuggerError> {
        let saved = self.stepper.suppress_step_effects();
        let outcome = self.run_forward();
        self.stepper.restore_step_effects(saved);
        outcome
    }

    /// Runs backward to the nearest preceding breakpoint, or to the initial
    /// step. Watchpoints are checked after every elementary backward step
    /// and win over the breakpoint target.
    ///
    /// # Errors
    ///
    /// Propagates rebuild errors.
    pub fn run_to_previous_breakpoint(&mut self) -> Result<(), DebuggerError> {
        let saved = self.stepper.suppress_step_effects();
        let outcome = self.run_backward();
        self.stepper.restore_step_effects(saved);
        outcome
    }

    /// Runs forward until no further step exists, ignoring breakpoints but
    /// honoring watchpoints.
    ///
    /// # Errors
    ///
    /// Propagates stepper errors.
    pub fn run_to_end_of_program(&mut self) -> Result<(), DebuggerError> {
        let saved = self.stepper.suppress_step_effects();
        let outcome = self.run_forward_to_end().map(|_| ());
        self.stepper.restore_step_effects(saved);
        outcome
    }

    /// Rewinds the session back to the initial step, ignoring breakpoints
    /// but honoring watchpoints.
    ///
    /// # Errors
    ///
    /// Propagates rebuild errors.
    pub fn run_to_start_of_program(&mut self) -> Result<(), DebuggerError> {
        let saved = self.stepper.suppress_step_effects();
        let outcome = self.rewind_to_start();
        self.stepper.restore_step_effects(saved);
        outcome
    }

    fn run_forward(&mut self) -> Result<bool, DebuggerError> {
        let mut current_line = self.line_projection();
        loop {
            let Some(target) = self.nearest_line_after(current_line) else {
                return self.run_forward_to_end();
            };
            let Some(target_range) = self.line_table.range_for(target) else {
                current_line = i64::from(target);
                continue;
            };

            loop {
                if !self.stepper.step()? {
                    self.sink.on_event(&DebugEvent::ProgramEnd);
                    return Ok(false);
                }
                if let Some(condition) = self.triggered_watchpoint() {
                    self.sink.on_event(&DebugEvent::WatchpointHit { condition });
                    return Ok(!self.stepper.is_final_step());
                }
                if self.stepper.current_phase() == CyclePhase::Fetch
                    && self.stepper.observable_state().instruction_pointer == target_range.from
                {
                    break;
                }
            }

            if self.breakpoint_holds(target) {
                self.sink.on_event(&DebugEvent::BreakpointHit { line: target });
                return Ok(!self.stepper.is_final_step());
            }
            current_line = i64::from(target);
        }
    }

    fn run_backward(&mut self) -> Result<(), DebuggerError> {
        let mut current_line = self.line_projection();
        loop {
            let Some(target) = self.nearest_line_before(current_line) else {
                return self.rewind_to_start();
            };
            let Some(target_range) = self.line_table.range_for(target) else {
                current_line = i64::from(target);
                continue;
            };

            loop {
                if self.stepper.is_initial_step() {
                    self.sink.on_event(&DebugEvent::ProgramStart);
                    return Ok(());
                }
                self.stepper.step_back()?;
                if let Some(condition) = self.triggered_watchpoint() {
                    self.sink.on_event(&DebugEvent::WatchpointHit { condition });
                    return Ok(());
                }
                if self.stepper.current_phase() == CyclePhase::Fetch
                    && self.stepper.observable_state().instruction_pointer == target_range.from
                {
                    break;
                }
            }

            if self.breakpoint_holds(target) {
                self.sink.on_event(&DebugEvent::BreakpointHit { line: target });
                return Ok(());
            }
            current_line = i64::from(target);
        }
    }

    fn run_forward_to_end(&mut self) -> Result<bool, DebuggerError> {
        loop {
            if !self.stepper.step()? {
                self.sink.on_event(&DebugEvent::ProgramEnd);
                return Ok(false);
            }
            if let Some(condition) = self.triggered_watchpoint() {
                self.sink.on_event(&DebugEvent::WatchpointHit { condition });
                return Ok(!self.stepper.is_final_step());
            }
        }
    }

    fn rewind_to_start(&mut self) -> Result<(), DebuggerError> {
        while !self.stepper.is_initial_step() {
            self.stepper.step_back()?;
            if let Some(condition) = self.triggered_watchpoint() {
                self.sink.on_event(&DebugEvent::WatchpointHit { condition });
                return Ok(());
            }
        }
        self.sink.on_event(&DebugEvent::ProgramStart);
        Ok(())
    }

    fn triggered_watchpoint(&self) -> Option<String> {
        let state = self.stepper.observable_state();
        self.watchpoints
            .iter()
            .find(|watchpoint| watchpoint.condition.holds(&state))
            .map(|watchpoint| watchpoint.condition.text().to_owned())
    }

    fn breakpoint_holds(&self, line: u32) -> bool {
        let Some(breakpoint) = self.breakpoints.get(&line) else {
            return false;
        };
        breakpoint.condition.as_ref().map_or(true, |condition| {
            condition.holds(&self.stepper.observable_state())
        })
    }

    /// Current line projected onto a signed axis; a pointer that maps to no
    /// line sorts before line zero.
    fn line_projection(&self) -> i64 {
        self.current_line().map_or(-1, i64::from)
    }

    fn nearest_line_after(&self, line: i64) -> Option<u32> {
        self.breakpoints
            .keys()
            .copied()
            .find(|&candidate| i64::from(candidate) > line)
    }

    fn nearest_line_before(&self, line: i64) -> Option<u32> {
        self.breakpoints
            .keys()
            .copied()
            .rev()
            .find(|&candidate| i64::from(candidate) < line)
    }

    /// Deep copy of the current observable state.
    #[must_use]
    pub fn state_snapshot(&self) -> ObservableState {
        self.stepper.state_snapshot()
    }

    /// Current logical clock.
    #[must_use]
    pub const fn clock(&self) -> Version {
        self.stepper.clock()
    }
}

#[cfg(test)]
mod tests {
    use super::{Condition, LineTable};
    use crate::session::AddressRange;

    #[test]
    fn line_table_maps_addresses_to_lines() {
        let mut table = LineTable::new();
        table.insert(2, AddressRange::new(0x10, 0x14));
        table.insert(5, AddressRange::new(0x14, 0x1B));
        table.insert(9, AddressRange::new(0x1B, 0x1D));

        assert_eq!(table.line_for(0x10), Some(2));
        assert_eq!(table.line_for(0x13), Some(2));
        assert_eq!(table.line_for(0x14), Some(5));
        assert_eq!(table.line_for(0x1C), Some(9));
        assert_eq!(table.line_for(0x1D), None);
        assert_eq!(table.range_for(5), Some(AddressRange::new(0x14, 0x1B)));
        assert_eq!(table.lines().collect::<Vec<_>>(), vec![2, 5, 9]);
    }

    #[test]
    fn conditions_reject_invalid_text_on_construction() {
        assert!(Condition::new("RAX = 1").is_ok());
        assert!(Condition::new("RAX ++ RBX").is_err());
        assert!(Condition::new("").is_err());
    }
}
