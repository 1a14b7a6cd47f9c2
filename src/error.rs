use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HarnessError {
    #[error("host runtime does not support `{0}` performance entries")]
    UnsupportedEntryType(String),

    #[error("observe() needs at least one entry type")]
    NoEntryTypes,

    #[error("invalid range {lo}..{hi}: lower bound must be below upper bound")]
    InvalidRange { lo: u64, hi: u64 },

    #[error("cannot parse `{0}` as a range, expected LO..HI in milliseconds")]
    RangeSyntax(String),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
