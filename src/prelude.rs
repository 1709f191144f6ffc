pub use entwine_core::*;

use miette::Diagnostic;
use std::fmt::Display;
use thiserror::Error;

use crate::model::Cid;

#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    #[error("io error: {0}")]
    IO(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("client error: {0}")]
    ClientError(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("invalid parameters: {0}")]
    InvalidParameters(#[from] ParamError),

    #[error("entanglement error: {0}")]
    EntangleError(#[from] EntangleError),

    #[error("recovery error: {0}")]
    RecoveryError(#[from] RecoveryError),

    #[error("source error: {0}")]
    SourceError(#[from] SourceError),

    #[error("repaired block {index} hashes to {actual}, expected {expected}")]
    ReuploadMismatch {
        index: BlockIndex,
        expected: Cid,
        actual: Cid,
    },

    #[error("{0}")]
    Message(String),
}

impl Error {
    pub fn config(text: impl Display) -> Error {
        Error::ConfigError(text.to_string())
    }

    pub fn client(error: impl Display) -> Error {
        Error::ClientError(error.to_string())
    }

    pub fn message(text: impl Into<String>) -> Error {
        Error::Message(text.into())
    }
}
