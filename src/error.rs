//! Error types shared by every simulator in the crate.

use thiserror::Error;

use crate::config::ConfigError;

/// Result alias for simulator operations.
pub type SimResult<T> = Result<T, SimError>;

/// Errors surfaced synchronously to the caller of a simulator.
///
/// "No new data this step" and "voltage below threshold" are normal outcomes
/// and never produce one of these.
#[derive(Debug, Error)]
pub enum SimError {
    /// An operation was addressed to an entity id that was never created.
    #[error("unknown entity id \"{eid}\"")]
    UnknownEntity { eid: String },

    /// An attribute outside the model's declared set was requested.
    #[error("unknown attribute \"{attr}\" for {eid}")]
    UnknownAttribute { eid: String, attr: String },

    /// `create` was called with a model name the simulator does not offer.
    #[error("unknown model \"{model}\"")]
    UnknownModel { model: String },

    /// A simulator was used before `init`, or received malformed input.
    #[error("invalid input: {what}")]
    InvalidInput { what: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl SimError {
    pub(crate) fn unknown_entity(eid: &str) -> Self {
        Self::UnknownEntity {
            eid: eid.to_string(),
        }
    }

    pub(crate) fn unknown_attribute(eid: &str, attr: &str) -> Self {
        Self::UnknownAttribute {
            eid: eid.to_string(),
            attr: attr.to_string(),
        }
    }
}
