use thiserror::Error;

/// Failures surfaced by the conversation core.
///
/// `Clone` so a failure can travel inside a `ManagerEvent`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid history: {0}")]
    InvalidHistory(String),

    #[error("endpoint error: {0}")]
    Endpoint(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn conversation_not_found(id: impl ToString) -> Self {
        Error::NotFound {
            entity: "conversation",
            id: id.to_string(),
        }
    }

    pub fn message_not_found(id: impl ToString) -> Self {
        Error::NotFound {
            entity: "message",
            id: id.to_string(),
        }
    }

    /// Map an `llm` crate failure, keeping the whole context chain.
    pub fn endpoint(e: anyhow::Error) -> Self {
        Error::Endpoint(format!("{e:#}"))
    }
}

#[cfg(feature = "rusqlite")]
impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
