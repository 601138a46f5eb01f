//! Code for creating the user table, registering users and the owner-scoped
//! user operations.

use std::{fmt::Display, str::FromStr};

use axum::{
    Json,
    extract::{FromRef, State, rejection::JsonRejection},
    http::StatusCode,
};
use email_address::EmailAddress;
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    AppState, Error, PasswordHash, ValidatedPassword,
    dispatch::{ByResourceId, DatabaseState, DeleteByResourceId, PathId, extract_json},
};

/// A newtype wrapper for integer user IDs.
///
/// This helps disambiguate user IDs from other types of IDs, leading to better compile time
/// errors, and more flexible generics that can have distinct implementations for multiple ID types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct UserID(i64);

impl UserID {
    /// Create a new user ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the user ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    /// The user's ID in the application database.
    pub id: UserID,
    /// The name shown to the user.
    pub username: String,
    /// The email the user logs in with.
    pub email: String,
    /// The bcrypt hash of the user's password. Never sent to clients.
    #[serde(skip)]
    pub password_hash: PasswordHash,
    /// When the user registered.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the user's profile last changed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The public part of a user's profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    /// The user's ID.
    pub id: UserID,
    /// The user's email.
    pub email: String,
    /// The user's display name.
    pub username: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
        }
    }
}

/// The data needed to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// The name shown to the user.
    pub username: String,
    /// The email the user logs in with.
    pub email: EmailAddress,
    /// The hash of the user's password.
    pub password_hash: PasswordHash,
}

/// Create the user table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_user_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

const USER_COLUMNS: &str = "id, username, email, password, created_at, updated_at";

fn map_user_row(row: &Row) -> Result<User, rusqlite::Error> {
    let raw_password_hash: String = row.get(3)?;

    Ok(User {
        id: UserID::new(row.get(0)?),
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: PasswordHash::new_unchecked(&raw_password_hash),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// Create and insert a new user into the database.
///
/// This skips every ownership check and is meant for registration and
/// seeding only.
///
/// # Errors
///
/// Returns a [Error::DuplicateEmail] if the email is taken, or [Error::SqlError]
/// if an SQL related error occurred.
pub fn create_user(new_user: NewUser, connection: &Connection) -> Result<User, Error> {
    let now = OffsetDateTime::now_utc();

    connection
        .prepare(&format!(
            "INSERT INTO user (username, email, password, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            RETURNING {USER_COLUMNS}"
        ))?
        .query_row(
            (
                &new_user.username,
                new_user.email.as_str(),
                new_user.password_hash.as_str(),
                now,
            ),
            map_user_row,
        )
        .map_err(Error::from)
}

/// Get the user with the ID `user_id`, ignoring ownership.
///
/// # Errors
///
/// This function will return an error if:
/// - `user_id` does not belong to a registered user.
/// - there was an error trying to access the store.
pub fn get_user_by_id(user_id: UserID, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare(&format!("SELECT {USER_COLUMNS} FROM user WHERE id = :id"))?
        .query_row(&[(":id", &user_id.as_i64())], map_user_row)
        .map_err(Error::from)
}

/// Get the user registered with `email`.
///
/// # Errors
///
/// Returns [Error::NotFound] if no user has that email.
pub fn get_user_by_email(email: &str, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare(&format!("SELECT {USER_COLUMNS} FROM user WHERE email = :email"))?
        .query_row(&[(":email", email)], map_user_row)
        .map_err(Error::from)
}

/// Get the number of users in the database.
///
/// # Errors
///
/// Returns a [Error::SqlError] if an SQL related error occurred.
pub fn count_users(connection: &Connection) -> Result<usize, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM user;", [], |row| row.get(0))
        .map_err(|error| error.into())
}

fn parse_email(raw_email: &str) -> Result<EmailAddress, Error> {
    EmailAddress::from_str(raw_email.trim())
        .map_err(|_| Error::MalformedInput("Invalid email address".to_owned()))
}

fn parse_username(raw_username: &str) -> Result<String, Error> {
    let username = raw_username.trim();

    if username.is_empty() {
        return Err(Error::MalformedInput("Username must not be empty".to_owned()));
    }

    Ok(username.to_owned())
}

/// The request body for updating a user's profile.
///
/// The password is only re-hashed when `password` is present.
#[derive(Debug, Clone, Deserialize)]
pub struct UserUpdate {
    /// The new display name.
    pub username: String,
    /// The new email.
    pub email: String,
    /// An optional new password.
    #[serde(default)]
    pub password: Option<String>,
}

/// A checked profile update, ready to be written.
#[derive(Debug, Clone)]
pub struct UserChanges {
    /// The new display name.
    pub username: String,
    /// The new email.
    pub email: EmailAddress,
    /// The hash of the new password, if the password changes.
    pub password_hash: Option<PasswordHash>,
}

impl ByResourceId for User {
    type Output = User;

    /// A user can only read their own profile.
    fn get(id: i64, caller: UserID, connection: &Connection) -> Result<User, Error> {
        connection
            .prepare(&format!(
                "SELECT {USER_COLUMNS} FROM user WHERE id = ?1 AND id = ?2"
            ))?
            .query_row((id, caller.as_i64()), map_user_row)
            .map_err(Error::from)
    }
}

/// Update the profile of user `id` if it is the caller.
///
/// # Errors
///
/// Returns [Error::NotFound] if `id` is not the caller, or
/// [Error::DuplicateEmail] if the new email is taken.
pub fn update_user(
    id: i64,
    changes: UserChanges,
    caller: UserID,
    connection: &Connection,
) -> Result<User, Error> {
    connection
        .prepare(&format!(
            "UPDATE user
            SET username = ?1, email = ?2, password = COALESCE(?3, password), updated_at = ?4
            WHERE id = ?5 AND id = ?6
            RETURNING {USER_COLUMNS}"
        ))?
        .query_row(
            (
                changes.username,
                changes.email.as_str(),
                changes.password_hash.as_ref().map(PasswordHash::as_str),
                OffsetDateTime::now_utc(),
                id,
                caller.as_i64(),
            ),
            map_user_row,
        )
        .map_err(Error::from)
}

impl DeleteByResourceId for User {
    type Output = User;

    /// Deleting a user also deletes their statements and transactions.
    fn delete(id: i64, caller: UserID, connection: &Connection) -> Result<User, Error> {
        connection
            .prepare(&format!(
                "DELETE FROM user WHERE id = ?1 AND id = ?2 RETURNING {USER_COLUMNS}"
            ))?
            .query_row((id, caller.as_i64()), map_user_row)
            .map_err(Error::from)
    }
}

/// The state needed for registering users and changing their passwords.
#[derive(Debug, Clone)]
pub struct RegistrationState {
    /// The bcrypt cost used to hash new passwords.
    pub password_cost: u32,
    /// The database connection shared with the rest of the app.
    pub database: DatabaseState,
}

impl FromRef<AppState> for RegistrationState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            password_cost: state.password_cost,
            database: DatabaseState::from_ref(state),
        }
    }
}

/// The request body for registering a user.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterBody {
    /// The display name.
    pub username: String,
    /// The email to log in with.
    pub email: String,
    /// The raw password. It is checked for strength and then hashed.
    pub password: String,
}

/// A route handler for registering a new user.
///
/// Responds with `201 Created` and the new user.
pub async fn register_user(
    State(state): State<RegistrationState>,
    body: Result<Json<RegisterBody>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), Error> {
    let body = extract_json(body)?;
    let username = parse_username(&body.username)?;
    let email = parse_email(&body.email)?;
    let validated_password = ValidatedPassword::new(&body.password)?;
    // Hash before taking the lock, bcrypt is slow on purpose.
    let password_hash = PasswordHash::new(validated_password, state.password_cost)?;

    let user = state.database.with_connection(|connection| {
        create_user(
            NewUser {
                username,
                email,
                password_hash,
            },
            connection,
        )
    })?;

    tracing::info!("Registered user {}", user.id);

    Ok((StatusCode::CREATED, Json(user)))
}

/// A route handler for updating the caller's profile.
///
/// A new password is checked and hashed before the database lock is taken.
/// Responds with [Error::NotFound] if the path names another user.
pub async fn update_user_endpoint(
    State(state): State<RegistrationState>,
    PathId(id): PathId,
    caller: UserID,
    body: Result<Json<UserUpdate>, JsonRejection>,
) -> Result<Json<User>, Error> {
    let body = extract_json(body)?;
    let changes = UserChanges {
        username: parse_username(&body.username)?,
        email: parse_email(&body.email)?,
        password_hash: body
            .password
            .as_deref()
            .map(|password| PasswordHash::from_raw_password(password, state.password_cost))
            .transpose()?,
    };

    let user = state
        .database
        .with_connection(|connection| update_user(id, changes, caller, connection))?;

    tracing::info!("Updated user {}", user.id);

    Ok(Json(user))
}



#[cfg(test)]
mod update_user_tests {
    use axum::{
        Router, middleware,
        routing::{post, put},
    };
    use axum_test::TestServer;
    use serde_json::{Value, json};

    use crate::{
        AppState,
        auth::{auth_guard, post_log_in},
        test_utils::{
            TEST_PASSWORD, TEST_PASSWORD_COST, get_test_app_state, insert_test_user_with_password,
        },
        user::{User, get_user_by_id, update_user_endpoint},
    };

    const NEW_PASSWORD: &str = "anotherverysafepassphrase";

    fn get_test_server() -> (TestServer, AppState) {
        let state = get_test_app_state();
        let app = Router::new()
            .route("/api/users/{user_id}", put(update_user_endpoint))
            .route_layer(middleware::from_fn_with_state(state.clone(), auth_guard))
            .route("/auth/login", post(post_log_in))
            .with_state(state.clone());

        (
            TestServer::try_new(app).expect("Could not create test server."),
            state,
        )
    }

    fn get_stored_user(user: &User, state: &AppState) -> User {
        let connection = state.db_connection.lock().unwrap();

        get_user_by_id(user.id, &connection).unwrap()
    }

    #[tokio::test]
    async fn password_change_uses_configured_cost() {
        let (server, state) = get_test_server();
        let alice = insert_test_user_with_password("alice@example.com", &state);
        let token = state.token_keys.issue(alice.id).unwrap();

        server
            .put(&format!("/api/users/{}", alice.id))
            .authorization_bearer(token)
            .json(&json!({
                "username": "alice",
                "email": "alice@example.com",
                "password": NEW_PASSWORD,
            }))
            .await
            .assert_status_ok();

        let stored = get_stored_user(&alice, &state);
        assert_ne!(stored.password_hash, alice.password_hash);
        assert!(
            stored
                .password_hash
                .as_str()
                .starts_with(&format!("$2b${TEST_PASSWORD_COST:02}$"))
        );

        server
            .post("/auth/login")
            .json(&json!({ "email": "alice@example.com", "password": NEW_PASSWORD }))
            .await
            .assert_status_ok();
        server
            .post("/auth/login")
            .json(&json!({ "email": "alice@example.com", "password": TEST_PASSWORD }))
            .await
            .assert_status_unauthorized();
    }

    #[tokio::test]
    async fn weak_password_leaves_user_unchanged() {
        let (server, state) = get_test_server();
        let alice = insert_test_user_with_password("alice@example.com", &state);
        let token = state.token_keys.issue(alice.id).unwrap();

        let response = server
            .put(&format!("/api/users/{}", alice.id))
            .authorization_bearer(token)
            .json(&json!({
                "username": "ally",
                "email": "ally@example.com",
                "password": "password",
            }))
            .await;

        response.assert_status_bad_request();
        assert!(
            response.json::<Value>()["error"]
                .as_str()
                .unwrap()
                .starts_with("Password is too weak")
        );
        assert_eq!(get_stored_user(&alice, &state), alice);
    }

    #[tokio::test]
    async fn invalid_email_is_rejected() {
        let (server, state) = get_test_server();
        let alice = insert_test_user_with_password("alice@example.com", &state);
        let token = state.token_keys.issue(alice.id).unwrap();

        server
            .put(&format!("/api/users/{}", alice.id))
            .authorization_bearer(token)
            .json(&json!({ "username": "alice", "email": "not an email" }))
            .await
            .assert_status_bad_request();

        assert_eq!(get_stored_user(&alice, &state), alice);
    }

    #[tokio::test]
    async fn cannot_update_another_user() {
        let (server, state) = get_test_server();
        let alice = insert_test_user_with_password("alice@example.com", &state);
        let bob = insert_test_user_with_password("bob@example.com", &state);
        let token = state.token_keys.issue(bob.id).unwrap();

        server
            .put(&format!("/api/users/{}", alice.id))
            .authorization_bearer(token)
            .json(&json!({ "username": "mallory", "email": "mallory@example.com" }))
            .await
            .assert_status_not_found();

        assert_eq!(get_stored_user(&alice, &state), alice);
    }
}
