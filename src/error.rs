use thiserror::Error;

/// Errors raised while validating input or talking to the solver.
///
/// An infeasible model is not an error: it is reported through
/// [`Outcome::Infeasible`](crate::Outcome::Infeasible).
#[derive(Debug, Error)]
pub enum Error {
    #[error("duplicate {kind} id `{id}`")]
    DuplicateId { kind: &'static str, id: String },

    #[error("unknown requester `{0}`")]
    UnknownRequester(String),

    #[error("unknown provider `{0}`")]
    UnknownProvider(String),

    #[error("requester `{requester}` references unknown group `{group}`")]
    UnknownGroup { requester: String, group: String },

    #[error("{what} must be a finite non-negative number (found {value})")]
    NegativeValue { what: String, value: f64 },

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("at least one facility is required")]
    NoFacilities,

    #[error("solver failed: {0}")]
    Solver(String),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Reject NaN, infinities and negative numbers.
pub(crate) fn ensure_non_negative(what: impl Into<String>, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::NegativeValue {
            what: what.into(),
            value,
        })
    }
}
