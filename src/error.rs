// error.rs
use crate::message::AgentId;
use thiserror::Error;

/// Everything that can go wrong inside the framework.
///
/// Parse failures and unhandled commands are deliberately absent: both are
/// non-fatal and resolve to a logged drop inside the agent loop.
#[derive(Debug, Error)]
pub enum Error {
    /// An operation that needs an identity was attempted before `register`.
    #[error("agent {agent} is not registered with an environment")]
    Unregistered { agent: String },

    /// `register` was called on an agent that already holds an identity.
    #[error("agent {agent} is already registered")]
    AlreadyRegistered { agent: String },

    /// The directory already holds an enrollment under this name.
    #[error("name {name} is already enrolled as {id}")]
    DuplicateIdentity { name: String, id: AgentId },

    /// A receiver pattern failed to compile.
    #[error("invalid receiver pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// A coordinate token in the solver input file is not a number.
    #[error("input token {0:?} is not a valid coordinate")]
    BadPoint(String),

    /// The evaluator answered the session with a failure.
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// The session finished without producing an output line.
    #[error("session ended without a result")]
    MissingResult,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
