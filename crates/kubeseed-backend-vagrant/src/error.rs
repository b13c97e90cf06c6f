//! Vagrant backend error types

use kubeseed_backend::BackendError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VagrantError {
    #[error("vagrant not found on PATH. It can be downloaded from https://www.vagrantup.com")]
    VagrantNotFound,

    #[error("vagrant command failed: {0}")]
    CommandFailed(String),

    #[error("machine not found: {0}")]
    MachineNotFound(String),

    #[error("could not parse vagrant output: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<VagrantError> for BackendError {
    fn from(err: VagrantError) -> Self {
        match err {
            VagrantError::VagrantNotFound => BackendError::Terminal(err.to_string()),
            VagrantError::MachineNotFound(name) => BackendError::NotFound(name),
            VagrantError::CommandFailed(msg) => BackendError::Terminal(msg),
            VagrantError::ParseError(msg) => BackendError::Terminal(msg),
            VagrantError::Io(io) => BackendError::Io(io),
        }
    }
}

pub type Result<T> = std::result::Result<T, VagrantError>;
