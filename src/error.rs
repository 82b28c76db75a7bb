use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::path::PathBuf;
use thiserror::Error;

use crate::templates::TemplateError;

#[derive(Debug, Error)]
pub enum NotepadError {
    /// No note file exists for this title yet.
    #[error("note '{0}' not found")]
    NotFound(String),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl NotepadError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        NotepadError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, NotepadError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, NotepadError>;

impl IntoResponse for NotepadError {
    fn into_response(self) -> Response {
        let status = match self {
            NotepadError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
