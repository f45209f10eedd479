use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingError {
    #[error("Invalid rental agreement: {0}")]
    InvalidAgreement(String),

    #[error("Invalid payment amount: {0}")]
    InvalidAmount(String),

    /// A stored or configured value outside a known set.
    #[error("Unrecognized {kind} '{value}'")]
    UnknownValue { kind: &'static str, value: String },

    /// Soft condition: the generator stops at the period bound and still
    /// returns what it produced. Reported alongside the partial schedule.
    #[error("Schedule generation stopped after {0} periods")]
    GenerationLimitExceeded(usize),
}

pub type BillingResult<T> = Result<T, BillingError>;
