use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlanError>;

/// Input rejected at the crate boundary. The engine itself clamps and never returns these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("invalid household field {field}: {reason}")]
    InvalidHousehold { field: &'static str, reason: String },

    #[error("invalid goal `{id}`: {reason}")]
    InvalidGoal { id: String, reason: String },

    #[error("duplicate goal id `{0}`")]
    DuplicateGoalId(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("failed to encode evaluation: {0}")]
    Encode(String),
}

impl PlanError {
    pub fn invalid_household(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidHousehold {
            field,
            reason: reason.into(),
        }
    }

    pub fn invalid_goal(id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidGoal {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }
}
