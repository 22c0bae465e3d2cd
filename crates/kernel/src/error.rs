//! Application error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::search::SearchError;

/// Application errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Search(#[from] SearchError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Internal(_) | AppError::Search(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::UnknownTable(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        let body = match &self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal server error");
                json!({ "error": "internal server error" })
            }
            AppError::Search(e) => {
                // Data source failures are reported with their cause chain.
                let details = error_chain(e);
                tracing::error!(error = %e, details = %details.join(": "), "search failed");
                json!({ "error": e.to_string(), "details": details })
            }
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

fn error_chain(error: &dyn std::error::Error) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = error.source();
    while let Some(cause) = current {
        chain.push(cause.to_string());
        current = cause.source();
    }
    chain
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::search::SourceStage;
    use crate::source::SourceError;

    #[test]
    fn search_errors_are_server_errors_with_details() {
        let err = AppError::from(SearchError::DataSource {
            stage: SourceStage::DirectFetch,
            table: "divisions".to_string(),
            source: SourceError::Backend("connection reset".to_string()),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn cause_chain_is_collected() {
        let err = SearchError::DataSource {
            stage: SourceStage::ForeignKeyLookup,
            table: "users".to_string(),
            source: SourceError::Backend("connection reset".to_string()),
        };
        assert_eq!(
            error_chain(&err),
            vec!["data source error: connection reset".to_string()]
        );
    }

    #[test]
    fn unknown_table_is_not_found() {
        let response = AppError::UnknownTable("nope".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
