use crate::gateway::SyncError;
use crate::models::MetricsError;
use crate::session::SessionError;
use axum::http::StatusCode;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl From<MetricsError> for AppError {
    fn from(err: MetricsError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        match err {
            SessionError::UnknownAction(_) | SessionError::SyncDisabled | SessionError::Metrics(_) => {
                Self::bad_request(message)
            }
            SessionError::InvalidTransition { .. } | SessionError::NotOnDashboard => {
                Self::conflict(message)
            }
            SessionError::ModelUnavailable(_) => Self::unavailable(message),
        }
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        let message = err.to_string();
        match err {
            SyncError::NotConnected => Self::unavailable(message),
            SyncError::DuplicateName(_) => Self::conflict(message),
            SyncError::Transport(_) => Self::new(StatusCode::BAD_GATEWAY, message),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}
