use axum::response::{IntoResponse, Response};
use http::StatusCode;

#[derive(Debug)]
pub enum AppError {
    /// The owner has no enabled destination, a session cannot relay
    NoDestinations(String),
    ConfigNotFound(String),
    SessionNotFound(String),
    DestinationNotFound(String),
    SessionAlreadyActive(String),
    InvalidTransition(String),
    InternalServerError(anyhow::Error),
}

impl AppError {
    pub fn no_destinations<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::NoDestinations(t.to_string())
    }

    pub fn config_not_found<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::ConfigNotFound(t.to_string())
    }

    pub fn session_not_found<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::SessionNotFound(t.to_string())
    }

    pub fn destination_not_found<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::DestinationNotFound(t.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::NoDestinations(owner) => write!(f, "no enabled destinations for {owner}"),
            AppError::ConfigNotFound(id) => write!(f, "streaming config not found: {id}"),
            AppError::SessionNotFound(id) => write!(f, "session not found: {id}"),
            AppError::DestinationNotFound(id) => write!(f, "destination not found: {id}"),
            AppError::SessionAlreadyActive(id) => write!(f, "session already active: {id}"),
            AppError::InvalidTransition(msg) => write!(f, "invalid transition: {msg}"),
            AppError::InternalServerError(err) => write!(f, "{err}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::NoDestinations(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ConfigNotFound(_)
            | AppError::SessionNotFound(_)
            | AppError::DestinationNotFound(_) => StatusCode::NOT_FOUND,
            AppError::SessionAlreadyActive(_) | AppError::InvalidTransition(_) => {
                StatusCode::CONFLICT
            }
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        AppError::InternalServerError(err.into())
    }
}
