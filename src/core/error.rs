use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValuationError {
    #[error("end year {end} precedes start year {start}")]
    InvalidRange { start: i32, end: i32 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("division by zero: {0}")]
    DivisionByZero(&'static str),

    #[error("unknown condition category: {0:?}")]
    UnknownCategory(String),

    #[error("incomplete input: missing {}", .0.join(", "))]
    IncompleteInput(Vec<&'static str>),
}

impl ValuationError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
