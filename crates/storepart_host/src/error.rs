#![allow(missing_docs)]

use storepart::SliceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Cannot get the store: there is no current container. Either this is a bug or it was called outside of a store scope.")]
    NoCurrentContainer,

    #[error("Trying to register two different reducers sharing the same name {0:?}")]
    DuplicateReducer(String),

    #[error("Effect routines can only be started from within a tokio runtime")]
    NoRuntime,

    #[error("Invalid host configuration: {0}")]
    Config(String),

    #[error("Could not load slice manifest {path}: {reason}")]
    Manifest { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Slice(#[from] SliceError),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type HostResult<T> = Result<T, HostError>;
