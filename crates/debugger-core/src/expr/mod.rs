//! Break condition language.
//!
//! Conditions are infix expressions over registers, flags and constants,
//! for example `RAX >= 1F AND ZF = 0`. Constants are hexadecimal without a
//! prefix, operand names are case-insensitive, and `RIP` resolves to the
//! current instruction pointer. All arithmetic is arbitrary-precision, so
//! comparisons against values wider than 64 bits behave exactly.
//!
//! [`validate_condition`] gives the host a user-facing diagnostic before a
//! condition is armed; [`evaluate_condition`] is the hot path used while
//! running and never fails, reporting problems to the log and yielding
//! `false` instead.

mod eval;
mod parser;

use num_bigint::{BigInt, Sign};
use num_traits::One;

use self::eval::{evaluate, EvalError, Value};
use self::parser::{alternates, parse, tokenize, Expr, Token};
use crate::registers::{FlagId, RegisterId};
use crate::state::StateView;

/// User-facing diagnostic for a condition that cannot be armed.
///
/// The `Display` text is the exact message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionError {
    /// The condition is empty or whitespace.
    #[error("Please enter your condition.")]
    Empty,
    /// One or more terms are neither registers, flags nor constants.
    #[error("{}", describe_invalid_operands(.0))]
    InvalidOperands(Vec<String>),
    /// Operators and operands do not alternate, or the expression does not
    /// parse.
    #[error("Your arrangement of operations and operands is formally not correct")]
    Malformed,
    /// A single operand with no operator.
    #[error("Missing at least one other operand or value")]
    MissingOperand,
    /// The expression evaluates to a number instead of a truth value.
    #[error("Your Condition does not evaluate to TRUE or FALSE")]
    NotBoolean,
}

fn describe_invalid_operands(operands: &[String]) -> String {
    let list = operands.join(", ");
    if operands.len() == 1 {
        format!("{list} is not a valid operand. Use registers, flags or constants.")
    } else {
        format!("{list} are not valid operands. Use registers, flags or constants.")
    }
}

fn is_valid_operand(term: &str) -> bool {
    FlagId::from_name(term).is_some()
        || RegisterId::from_name(term).is_some()
        || (!term.is_empty() && term.bytes().all(|byte| byte.is_ascii_hexdigit()))
}

/// Checks a condition without any machine state.
///
/// Structure is verified by parsing; the result type is verified by
/// evaluating the expression with every operand replaced by the constant
/// `1`, which exercises each operator exactly as a real run would.
///
/// # Errors
///
/// Returns the first applicable [`ConditionError`], in the order empty,
/// invalid operands, malformed, missing operand, non-boolean result.
pub fn validate_condition(text: &str) -> Result<(), ConditionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ConditionError::Empty);
    }

    let tokens = tokenize(trimmed).map_err(|_| ConditionError::Malformed)?;

    let mut invalid: Vec<String> = Vec::new();
    for token in &tokens {
        if let Token::Term(term) = token {
            if !is_valid_operand(term) && !invalid.contains(term) {
                invalid.push(term.clone());
            }
        }
    }
    if !invalid.is_empty() {
        return Err(ConditionError::InvalidOperands(invalid));
    }

    if !alternates(&tokens) {
        return Err(ConditionError::Malformed);
    }
    let expr = parse(&tokens).map_err(|_| ConditionError::Malformed)?;
    if matches!(expr, Expr::Term(_)) {
        return Err(ConditionError::MissingOperand);
    }

    let placeholder = |_: &str| Ok(Value::Int(BigInt::one()));
    match evaluate(&expr, &placeholder) {
        Ok(Value::Bool(_)) => Ok(()),
        _ => Err(ConditionError::NotBoolean),
    }
}

fn resolve_with_state(term: &str, state: &StateView<'_>) -> Result<Value, EvalError> {
    if let Some(flag) = FlagId::from_name(term) {
        let set = state.flag_set(flag).unwrap_or(false);
        return Ok(Value::Int(BigInt::from(u8::from(set))));
    }
    if let Some(register) = RegisterId::from_name(term) {
        if register.is_instruction_pointer() {
            return Ok(Value::Int(BigInt::from(state.instruction_pointer)));
        }
        return state
            .register_value(register)
            .map(|bytes| Value::Int(BigInt::from_bytes_le(Sign::Plus, bytes)))
            .ok_or_else(|| EvalError::UnknownOperand(term.to_owned()));
    }
    BigInt::parse_bytes(term.as_bytes(), 16)
        .map(Value::Int)
        .ok_or_else(|| EvalError::UnknownOperand(term.to_owned()))
}

/// Evaluates a condition against the current observable state.
///
/// Register images are little-endian and converted to unbounded unsigned
/// integers before comparing; flags read as `0` or `1`. Any failure,
/// including division by zero and oversized exponents, is reported via
/// [`log::error!`] and treated as the condition not holding.
#[must_use]
pub fn evaluate_condition(text: &str, state: &StateView<'_>) -> bool {
    let trimmed = text.trim();
    let tokens = match tokenize(trimmed) {
        Ok(tokens) => tokens,
        Err(error) => {
            log::error!("condition {trimmed:?} is malformed: {error}");
            return false;
        }
    };
    let expr = match parse(&tokens) {
        Ok(expr) => expr,
        Err(error) => {
            log::error!("condition {trimmed:?} is malformed: {error}");
            return false;
        }
    };

    let resolver = |term: &str| resolve_with_state(term, state);
    match evaluate(&expr, &resolver) {
        Ok(Value::Bool(result)) => result,
        Ok(Value::Int(_)) => {
            log::error!("condition {trimmed:?} does not evaluate to TRUE or FALSE");
            false
        }
        Err(error) => {
            log::error!("condition {trimmed:?} failed to evaluate: {error}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{evaluate_condition, validate_condition, ConditionError};
    use crate::backend::DecodedInstruction;
    use crate::registers::{FlagId, RegisterId};
    use crate::state::{
        AccessedElements, ByteInformation, Flag, MemorySnapshot, ObservableState, Register,
        StateView,
    };

    fn sample_state() -> ObservableState {
        ObservableState {
            memory: MemorySnapshot::default(),
            registers: vec![
                Register {
                    id: RegisterId::Rax,
                    value: vec![0x2A, 0, 0, 0, 0, 0, 0, 0],
                },
                Register {
                    id: RegisterId::Rbx,
                    value: vec![0, 1, 0, 0, 0, 0, 0, 0],
                },
            ],
            current_instruction: DecodedInstruction::empty(),
            instruction_pointer: 0x1_0004,
            flags: vec![
                Flag {
                    id: FlagId::Zf,
                    set: true,
                },
                Flag {
                    id: FlagId::Cf,
                    set: false,
                },
            ],
            accessed_elements: AccessedElements::default(),
            byte_information: ByteInformation::default(),
            change_history: Vec::new(),
        }
    }

    fn view(state: &ObservableState) -> StateView<'_> {
        StateView {
            memory: &state.memory,
            registers: &state.registers,
            current_instruction: &state.current_instruction,
            instruction_pointer: state.instruction_pointer,
            flags: &state.flags,
            accessed_elements: &state.accessed_elements,
            byte_information: &state.byte_information,
            change_history: &state.change_history,
        }
    }

    #[test]
    fn empty_conditions_are_rejected_with_a_prompt() {
        assert_eq!(validate_condition("   "), Err(ConditionError::Empty));
        assert_eq!(
            validate_condition("").unwrap_err().to_string(),
            "Please enter your condition."
        );
    }

    #[test]
    fn invalid_operands_are_listed_singular_and_plural() {
        assert_eq!(
            validate_condition("FOO = 1").unwrap_err().to_string(),
            "FOO is not a valid operand. Use registers, flags or constants."
        );
        // BAD is a hex literal; only the two bogus terms are listed.
        assert_eq!(
            validate_condition("FOO = BAD AND XYZ = 1")
                .unwrap_err()
                .to_string(),
            "FOO, XYZ are not valid operands. Use registers, flags or constants."
        );
        // BAR is neither a register nor hex (`R` is not a hex digit).
        assert_eq!(
            validate_condition("RAX = BAR").unwrap_err().to_string(),
            "BAR is not a valid operand. Use registers, flags or constants."
        );
    }

    #[test]
    fn broken_arrangements_are_rejected() {
        for text in ["RAX ++ RBX", "RAX RBX", "= RAX", "RAX = 1 AND"] {
            assert_eq!(validate_condition(text), Err(ConditionError::Malformed));
        }
    }

    #[test]
    fn lone_operands_need_a_counterpart() {
        assert_eq!(
            validate_condition("RAX").unwrap_err().to_string(),
            "Missing at least one other operand or value"
        );
    }

    #[test]
    fn arithmetic_without_comparison_is_not_boolean() {
        assert_eq!(
            validate_condition("RAX + RBX").unwrap_err().to_string(),
            "Your Condition does not evaluate to TRUE or FALSE"
        );
    }

    #[test]
    fn well_formed_conditions_validate() {
        for text in [
            "RAX = RAX",
            "rax >= 1F AND zf = 0",
            "(RAX + RBX) * 2 > FF OR CF = 1",
            "2 ^ 8 = 100",
        ] {
            assert_eq!(validate_condition(text), Ok(()));
        }
    }

    #[test]
    fn registers_resolve_little_endian() {
        let state = sample_state();
        let view = view(&state);
        assert!(evaluate_condition("RAX = 2A", &view));
        assert!(evaluate_condition("RBX = 100", &view));
        assert!(evaluate_condition("rbx > rax", &view));
    }

    #[test]
    fn flags_resolve_to_zero_or_one() {
        let state = sample_state();
        let view = view(&state);
        assert!(evaluate_condition("ZF = 1", &view));
        assert!(evaluate_condition("CF = 0", &view));
        assert!(!evaluate_condition("ZF = 0", &view));
    }

    #[test]
    fn rip_resolves_to_the_instruction_pointer() {
        let state = sample_state();
        assert!(evaluate_condition("RIP = 10004", &view(&state)));
    }

    #[test]
    fn tautologies_and_contradictions() {
        let state = sample_state();
        let view = view(&state);
        assert!(evaluate_condition("RAX = RAX", &view));
        assert!(!evaluate_condition("RAX = 1 AND RAX = 2", &view));
        assert!(evaluate_condition("2 / 2 = 1", &view));
    }

    #[test]
    fn failures_evaluate_to_false() {
        let state = sample_state();
        let view = view(&state);
        // Division by zero, untracked register, non-boolean result.
        assert!(!evaluate_condition("RAX / 0 = 1", &view));
        assert!(!evaluate_condition("R15 = 0", &view));
        assert!(!evaluate_condition("RAX + RBX", &view));
    }
}
