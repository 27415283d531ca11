use std::io;
use std::path::PathBuf;

use axum::http::StatusCode;
use thiserror::Error;

use crate::platform::PlatformError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("chat_id '{prefix}' in address '{address}' is not recognized as UUID")]
    InvalidAddress { prefix: String, address: String },
    #[error("required 'Authorization: Bearer <token>' header")]
    MissingToken,
    #[error("provided token is not authorized")]
    UnknownToken,
    #[error("bot is muted in this chat")]
    Muted,
    #[error("no users found")]
    NotFound,
    #[error("found more than one recipients")]
    Ambiguous,
    #[error("user is not {expected}")]
    WrongKind { expected: &'static str },
    #[error("{0}")]
    Dependency(#[from] PlatformError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) | GatewayError::InvalidAddress { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            GatewayError::MissingToken | GatewayError::UnknownToken => StatusCode::UNAUTHORIZED,
            GatewayError::Muted => StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::Ambiguous => StatusCode::EXPECTATION_FAILED,
            GatewayError::WrongKind { .. } => StatusCode::PRECONDITION_REQUIRED,
            GatewayError::Dependency(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenLoadError {
    #[error("unable to read token file {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("unable to parse token file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("token number {index} in file {} is empty", .path.display())]
    EmptyToken { path: PathBuf, index: usize },
    #[error("no tokens found in {}", .path.display())]
    NoTokens { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("unable to back up {}: {source}", .path.display())]
    Backup { path: PathBuf, source: io::Error },
    #[error("unable to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("unable to replace {}: {source}", .path.display())]
    Replace { path: PathBuf, source: io::Error },
    #[error("unable to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("mute file path {} has no parent directory", .0.display())]
    NoParent(PathBuf),
    #[error("identifier {0:?} cannot be stored as a mute file line")]
    InvalidIdent(String),
}
