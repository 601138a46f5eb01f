//! Route handlers for logging in and for reading the caller's own profile.

use axum::{
    Json,
    extract::{FromRef, State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    auth::TokenKeys,
    dispatch::{DatabaseState, extract_json},
    user::{UserID, UserSummary, get_user_by_email, get_user_by_id},
};

/// The state needed to log a user in.
#[derive(Debug, Clone)]
pub struct LogInState {
    /// The keys for signing tokens.
    pub token_keys: TokenKeys,
    /// The database connection shared with the rest of the app.
    pub database: DatabaseState,
}

impl FromRef<AppState> for LogInState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            token_keys: state.token_keys.clone(),
            database: DatabaseState::from_ref(state),
        }
    }
}

/// The credentials sent to the log in route.
#[derive(Clone, Deserialize)]
pub struct LogInData {
    /// The email the user registered with.
    pub email: String,
    /// The user's raw password.
    pub password: String,
}

/// The response to a successful log in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogInResponse {
    /// The bearer token for later requests.
    pub token: String,
    /// Who the token was issued to.
    pub user: UserSummary,
}

/// Handler for log-in requests.
///
/// An unknown email and a wrong password produce the same error so that
/// clients cannot find out which emails are registered.
///
/// # Errors
///
/// This function will return an error in a few situations.
/// - The email or password is not correct.
/// - An internal error occurred when verifying the password or signing the token.
pub async fn post_log_in(
    State(state): State<LogInState>,
    body: Result<Json<LogInData>, JsonRejection>,
) -> Result<Json<LogInResponse>, Error> {
    let credentials = extract_json(body)?;

    let user = match state
        .database
        .with_connection(|connection| get_user_by_email(credentials.email.trim(), connection))
    {
        Ok(user) => user,
        Err(Error::NotFound) => return Err(Error::InvalidCredentials),
        Err(error) => return Err(error),
    };

    if !user.password_hash.verify(&credentials.password)? {
        tracing::info!("Failed log in attempt for user {}", user.id);
        return Err(Error::InvalidCredentials);
    }

    let token = state.token_keys.issue(user.id)?;

    Ok(Json(LogInResponse {
        token,
        user: UserSummary::from(&user),
    }))
}

/// A route handler that returns the caller's own profile.
pub async fn get_me(
    State(database): State<DatabaseState>,
    caller: UserID,
) -> Result<Json<UserSummary>, Error> {
    database
        .with_connection(|connection| get_user_by_id(caller, connection))
        .map(|user| Json(UserSummary::from(&user)))
}
