use crate::parser::Rule;
use std::fmt;
use std::num::{ParseFloatError, ParseIntError};

pub type ParseError = pest::error::Error<Rule>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    Parse(ParseError),
    ParseInt(ParseIntError),
    ParseFloat(ParseFloatError),
    UnknownConditionalJump { mnemonic: String, line: usize },
    UnresolvedBranchTarget { label: String, line: usize },
    MissingJumpTarget { line: usize },
    DanglingConditionalJump { line: usize },
    EmptyListAllocation { name: String },
    InvalidAllocationSize { name: String },
    InvalidEscape { sequence: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Parse(err) => write!(f, "{}", err),
            Error::ParseInt(err) => write!(f, "Parsing integer failed: {}", err),
            Error::ParseFloat(err) => write!(f, "Parsing float failed: {}", err),
            Error::UnknownConditionalJump { mnemonic, line } => write!(
                f,
                "Unknown conditional jump mnemonic \"{}\" on line {}.",
                mnemonic, line
            ),
            Error::UnresolvedBranchTarget { label, line } => write!(
                f,
                "Branch target \"{}\" on line {} does not name a known block.",
                label, line
            ),
            Error::MissingJumpTarget { line } => write!(
                f,
                "Jump instruction on line {} has no resolvable target label.",
                line
            ),
            Error::DanglingConditionalJump { line } => write!(
                f,
                "Conditional jump on line {} has no block to fall through to.",
                line
            ),
            Error::EmptyListAllocation { name } => {
                write!(f, "Cannot allocate empty list for \"{}\".", name)
            }
            Error::InvalidAllocationSize { name } => {
                write!(f, "Size must be positive for allocation \"{}\".", name)
            }
            Error::InvalidEscape { sequence } => write!(
                f,
                "Unsupported escape sequence \"{}\" in string literal.",
                sequence
            ),
        }
    }
}

impl std::error::Error for Error {}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Error {
        Error::Parse(err)
    }
}

impl From<ParseIntError> for Error {
    fn from(err: ParseIntError) -> Error {
        Error::ParseInt(err)
    }
}

impl From<ParseFloatError> for Error {
    fn from(err: ParseFloatError) -> Error {
        Error::ParseFloat(err)
    }
}
