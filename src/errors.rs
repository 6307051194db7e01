use thiserror::Error;

use crate::protocol::ResultCode;

/// Server-wide error taxonomy. Every command handler funnels into one of
/// these kinds, which map onto the wire result codes.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("{0}")]
    BadCommand(String),

    #[error("{0}")]
    ResourceNotFound(String),

    #[error("{0}")]
    AccessDenied(String),

    #[error("{0}")]
    NotReady(String),

    #[error("turn was not completed in time")]
    Timeout,

    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal server error")]
    Internal,
}

impl ServerError {
    pub fn result_code(&self) -> ResultCode {
        match self {
            ServerError::BadCommand(_) | ServerError::Payload(_) => ResultCode::BadCommand,
            ServerError::ResourceNotFound(_) => ResultCode::ResourceNotFound,
            ServerError::AccessDenied(_) => ResultCode::AccessDenied,
            ServerError::NotReady(_) => ResultCode::NotReady,
            ServerError::Timeout => ResultCode::Timeout,
            ServerError::Database(_) | ServerError::Io(_) | ServerError::Internal => {
                ResultCode::InternalServerError
            }
        }
    }

    /// Whether the client should see the error text. Internal faults are
    /// logged server-side and answered without details.
    pub fn is_internal(&self) -> bool {
        self.result_code() == ResultCode::InternalServerError
    }
}

impl From<sqlx::Error> for ServerError {
    fn from(err: sqlx::Error) -> Self {
        ServerError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_code_mapping() {
        assert_eq!(
            ServerError::BadCommand("x".into()).result_code(),
            ResultCode::BadCommand
        );
        assert_eq!(
            ServerError::ResourceNotFound("x".into()).result_code(),
            ResultCode::ResourceNotFound
        );
        assert_eq!(
            ServerError::AccessDenied("x".into()).result_code(),
            ResultCode::AccessDenied
        );
        assert_eq!(
            ServerError::NotReady("x".into()).result_code(),
            ResultCode::NotReady
        );
        assert_eq!(ServerError::Timeout.result_code(), ResultCode::Timeout);
        assert_eq!(
            ServerError::Internal.result_code(),
            ResultCode::InternalServerError
        );
    }

    #[test]
    fn test_internal_errors_hide_details() {
        assert!(ServerError::Database("secret".into()).is_internal());
        assert!(!ServerError::BadCommand("visible".into()).is_internal());
    }
}
