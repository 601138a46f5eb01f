//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex};

use axum::extract::FromRef;
use rusqlite::Connection;

use crate::{
    Error, PasswordHash,
    auth::{ApiKey, TokenKeys},
    db::initialize,
};

/// The state of the REST server.
///
/// Route handlers take the part they need through a sub-state that
/// implements `FromRef<AppState>`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The key clients must send in the `X-API-Key` header.
    pub api_key: ApiKey,

    /// The keys for signing and verifying bearer tokens.
    pub token_keys: TokenKeys,

    /// The bcrypt cost for hashing new passwords.
    pub password_cost: u32,

    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection.
    ///
    /// This function will initialize the database by adding the tables for the domain models.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(db_connection: Connection, api_key: &str, jwt_secret: &str) -> Result<Self, Error> {
        initialize(&db_connection)?;

        Ok(Self {
            api_key: ApiKey::new(api_key),
            token_keys: TokenKeys::from_secret(jwt_secret),
            password_cost: PasswordHash::DEFAULT_COST,
            db_connection: Arc::new(Mutex::new(db_connection)),
        })
    }

    /// Use `cost` when hashing passwords of newly registered users.
    pub fn with_password_cost(mut self, cost: u32) -> Self {
        self.password_cost = cost;
        self
    }
}

impl FromRef<AppState> for ApiKey {
    fn from_ref(state: &AppState) -> Self {
        state.api_key.clone()
    }
}
