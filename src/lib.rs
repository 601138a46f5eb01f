//! Tally is a backend for tracking personal finances.
//!
//! Users register, log in with their email and password, and then manage the
//! bank statements they have received and the transactions listed on each
//! statement. Every route behind the log in is scoped to the caller: a user
//! can only ever see or change the statements they own, and the transactions
//! that belong to those statements.
//!
//! This library provides a JSON REST API.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod app_state;
mod auth;
mod config;
mod db;
mod dispatch;
mod endpoints;
mod institution;
mod logging;
mod password;
mod routing;
mod statement;
mod transaction;
mod transaction_type;
mod user;

#[cfg(test)]
mod test_utils;

pub use app_state::AppState;
pub use auth::{ApiKey, TokenKeys};
pub use config::{Config, ConfigError};
pub use db::initialize as initialize_db;
pub use institution::{Institution, InstitutionID, create_institution};
pub use logging::{LOG_BODY_LENGTH_LIMIT, MAX_BODY_SIZE, logging_middleware};
pub use password::{PasswordHash, ValidatedPassword};
pub use routing::build_router;
pub use statement::{Statement, StatementID, StatementInput, create_statement};
pub use transaction::{Transaction, TransactionID, TransactionInput, create_transaction};
pub use user::{NewUser, User, UserID, create_user};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
///
/// Every request handler reports failures with this type, and
/// [IntoResponse] turns each variant into one fixed HTTP status with a JSON
/// body of the form `{"error": "<message>"}`.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// A path parameter or request body could not be parsed.
    ///
    /// The string is shown to the client, so it must not contain internal
    /// details.
    #[error("{0}")]
    MalformedInput(String),

    /// The request did not include the `X-API-Key` header.
    #[error("API key required")]
    MissingApiKey,

    /// The `X-API-Key` header did not match the configured key.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// The request did not include a bearer token.
    #[error("Authorization header required")]
    MissingToken,

    /// The bearer token could not be decoded, was signed with the wrong key
    /// or algorithm, or did not name a valid user.
    #[error("Invalid token")]
    InvalidToken,

    /// The bearer token was valid but its expiry time has passed.
    #[error("Token expired")]
    ExpiredToken,

    /// A protected handler ran without a caller identity in the request.
    ///
    /// This means the route was mounted without the auth middleware.
    #[error("User not authenticated")]
    Unauthenticated,

    /// The email and password did not match a registered user.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// The caller named another user's ID in the request path.
    #[error("Access denied: cannot access other users' data")]
    Forbidden,

    /// The requested resource does not exist or is not owned by the caller.
    ///
    /// The two cases are deliberately reported the same way so that callers
    /// cannot probe for other users' resources.
    #[error("Resource not found or access denied")]
    NotFound,

    /// The email used to register or update a user is already taken.
    #[error("The email is already in use")]
    DuplicateEmail,

    /// An institution with the same name already exists.
    #[error("An institution with that name already exists")]
    DuplicateInstitution,

    /// The user provided a password that is too easy to guess.
    #[error("Password is too weak: {0}")]
    TooWeak(String),

    /// A statement period ends before it starts.
    #[error("The statement period must not end before it starts")]
    InvalidPeriod,

    /// A foreign key in the request, such as an institution ID or
    /// transaction type code, does not refer to an existing row.
    #[error("A referenced resource does not exist")]
    InvalidReference,

    /// The request body is larger than [MAX_BODY_SIZE] bytes.
    #[error("Request body too large")]
    PayloadTooLarge,

    /// A batch request did not contain any items.
    #[error("The batch must contain at least one item")]
    EmptyBatch,

    /// An unexpected error occurred with the underlying hashing library.
    ///
    /// The error string should only be logged for debugging on the server.
    #[error("hashing failed: {0}")]
    HashingError(String),

    /// The token could not be signed.
    #[error("could not create token: {0}")]
    TokenCreation(String),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Code 787 occurs when a FOREIGN KEY constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, _) if sql_error.extended_code == 787 => {
                Error::InvalidReference
            }
            // Code 2067 occurs when a UNIQUE constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.ends_with("user.email") =>
            {
                Error::DuplicateEmail
            }
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.ends_with("institution.name") =>
            {
                Error::DuplicateInstitution
            }
            // Code 275 occurs when a CHECK constraint failed. The statement period is the only one.
            rusqlite::Error::SqliteFailure(sql_error, _) if sql_error.extended_code == 275 => {
                Error::InvalidPeriod
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::MalformedInput(_)
            | Error::TooWeak(_)
            | Error::InvalidPeriod
            | Error::InvalidReference
            | Error::EmptyBatch => StatusCode::BAD_REQUEST,
            Error::MissingApiKey
            | Error::InvalidApiKey
            | Error::MissingToken
            | Error::InvalidToken
            | Error::ExpiredToken
            | Error::Unauthenticated
            | Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::DuplicateEmail | Error::DuplicateInstitution => StatusCode::CONFLICT,
            Error::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Error::HashingError(_)
            | Error::TokenCreation(_)
            | Error::DatabaseLockError
            | Error::SqlError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match self {
            Error::SqlError(_) => {
                tracing::error!("{self}");
                "Database error".to_owned()
            }
            // Any other server errors are not intended to be shown to the client.
            error if status.is_server_error() => {
                tracing::error!("An unexpected error occurred: {error}");
                "Internal server error".to_owned()
            }
            error => error.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
