//! Error types
//!
//! Gameplay precondition violations are not errors; they are silently
//! ignored by the state machine. These types cover the edges of the core:
//! the realtime database, the question file and room membership.

use thiserror::Error;

/// Failure talking to the realtime database
#[derive(Error, Debug)]
pub enum TransportError {
    /// Transport is offline or not reachable
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// Write or read refused (rules, malformed path)
    #[error("transport rejected {path}: {reason}")]
    Rejected { path: String, reason: String },

    /// Record could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Question bank could not be used as supplied
#[derive(Error, Debug)]
pub enum QuestionError {
    #[error("question data is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("question bank is empty")]
    Empty,

    #[error("question {id:?} is invalid: {reason}")]
    Invalid { id: String, reason: String },
}

/// Room creation or join failure
#[derive(Error, Debug)]
pub enum RoomError {
    #[error("room {0} does not exist")]
    NotFound(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("room full")]
    RoomFull,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type TransportResult<T> = Result<T, TransportError>;
