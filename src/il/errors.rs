use super::code::Label;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// A structural edit was attempted at a position that does not hold an instruction
    PositionOutOfRange { position: isize, length: usize },

    /// `ensure_valid` found the cursor on a sentinel
    InvalidCursor {
        explanation: String,
        last_error: Option<String>,
    },

    /// `ensure_match*` did not find the expected sequence
    PatternMismatch { explanation: String, position: isize },

    /// `ensure` was given a predicate that does not hold
    ConditionFailed(String),

    /// `repeat` was called without a preceding `match_forward` or `match_back`
    NoPriorMatch,

    /// No call to the described method exists at or after the cursor
    CallNotFound(String),

    /// `this` was requested, but there is no receiver
    StaticContext(String),

    ParameterOutOfRange { index: usize, count: usize },

    ParameterTypeMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    MissingLocal(String),

    /// Only strings, integers, and floating point values can be loaded as literals
    UnsupportedLiteral(String),

    /// A call used as an argument does not produce a value
    VoidArgument(String),

    MissingMember(String),
    AmbiguousMethod(String, String),

    /// Labels used as branch targets that do not tag any instruction
    DanglingLabels(Vec<Label>),

    /// A label tags more than one instruction
    DuplicateLabel(Label),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PositionOutOfRange { position, length } => write!(
                f,
                "cursor position {} is outside of the {} instructions",
                position, length
            ),
            Error::InvalidCursor {
                explanation,
                last_error: Some(last_error),
            } => write!(f, "{} - {}", explanation, last_error),
            Error::InvalidCursor {
                explanation,
                last_error: None,
            } => write!(f, "{} - cursor is out of range", explanation),
            Error::PatternMismatch {
                explanation,
                position,
            } => write!(f, "{} - no match at position {}", explanation, position),
            Error::ConditionFailed(explanation) => f.write_str(explanation),
            Error::NoPriorMatch => f.write_str("no previous match operation, cannot repeat"),
            Error::CallNotFound(call) => write!(f, "no call to {} found", call),
            Error::StaticContext(context) => {
                write!(f, "cannot load 'this' in static context {}", context)
            }
            Error::ParameterOutOfRange { index, count } => write!(
                f,
                "parameter index {} is out of range (method has {} parameters)",
                index, count
            ),
            Error::ParameterTypeMismatch {
                index,
                expected,
                found,
            } => write!(
                f,
                "parameter {} has type {} but {} was expected",
                index, found, expected
            ),
            Error::MissingLocal(local) => write!(f, "no local variable {}", local),
            Error::UnsupportedLiteral(literal) => {
                write!(f, "cannot load {} as a literal", literal)
            }
            Error::VoidArgument(method) => {
                write!(f, "{} returns nothing and cannot be an argument", method)
            }
            Error::MissingMember(member) => write!(f, "missing member {}", member),
            Error::AmbiguousMethod(first, second) => {
                write!(f, "ambiguous method: both {} and {} match", first, second)
            }
            Error::DanglingLabels(labels) => {
                write!(f, "branch labels {:?} do not tag any instruction", labels)
            }
            Error::DuplicateLabel(label) => {
                write!(f, "label {:?} tags more than one instruction", label)
            }
        }
    }
}

impl std::error::Error for Error {}
