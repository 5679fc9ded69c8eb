use axum::{
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use crate::db::repo::StoreError;

/// Everything a handler can fail with. Clients only ever see the status code.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("error while getting body: {0}")]
    Body(#[from] BytesRejection),

    #[error("error while unmarshalling body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid query parameter `{name}`: {value:?}")]
    Query { name: &'static str, value: String },

    #[error("error while {action} user: {source}")]
    Store {
        action: &'static str,
        status: StatusCode,
        #[source]
        source: StoreError,
    },
}

impl ApiError {
    pub fn store(action: &'static str, status: StatusCode) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::Store {
            action,
            status,
            source,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Body(_) | Self::Decode(_) | Self::Query { .. } => StatusCode::BAD_REQUEST,
            Self::Store { status, .. } => *status,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, "{self}");
        } else {
            warn!(%status, "{self}");
        }

        status.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(ApiError::from(err).status(), StatusCode::BAD_REQUEST);

        let err = ApiError::Query {
            name: "page",
            value: "abc".to_string(),
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "invalid query parameter `page`: \"abc\"");

        let err = ApiError::store("getting", StatusCode::INTERNAL_SERVER_ERROR)(
            StoreError::NotFound("u1".to_string()),
        );
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "error while getting user: user \"u1\" not found");
    }

    #[tokio::test]
    async fn test_response_has_no_body() {
        let response = ApiError::store("creating", StatusCode::BAD_REQUEST)(StoreError::InvalidId)
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(body.is_empty());
    }
}
