#![allow(missing_docs)]

use email_address::EmailAddress;
use rusqlite::Connection;

use crate::{AppState, NewUser, PasswordHash, User, create_user};

pub(crate) const TEST_API_KEY: &str = "test-api-key";
pub(crate) const TEST_JWT_SECRET: &str = "test-jwt-secret";
pub(crate) const TEST_PASSWORD: &str = "averysafeandsecurepassword";

/// The lowest cost bcrypt accepts, so tests that hash passwords stay fast.
pub(crate) const TEST_PASSWORD_COST: u32 = 4;

#[track_caller]
pub(crate) fn get_test_app_state() -> AppState {
    let connection = Connection::open_in_memory().expect("Could not open database in memory.");

    AppState::new(connection, TEST_API_KEY, TEST_JWT_SECRET)
        .expect("Could not create app state.")
        .with_password_cost(TEST_PASSWORD_COST)
}

/// Insert a user whose password hash will never verify.
#[track_caller]
pub(crate) fn insert_test_user(email: &str, connection: &Connection) -> User {
    create_user(
        NewUser {
            username: username_from(email),
            email: email.parse::<EmailAddress>().expect("Invalid test email."),
            password_hash: PasswordHash::new_unchecked("not a real hash"),
        },
        connection,
    )
    .expect("Could not create test user.")
}

/// Insert a user that can log in with [TEST_PASSWORD].
#[track_caller]
pub(crate) fn insert_test_user_with_password(email: &str, state: &AppState) -> User {
    let password_hash = PasswordHash::from_raw_password(TEST_PASSWORD, TEST_PASSWORD_COST)
        .expect("Could not hash test password.");
    let connection = state
        .db_connection
        .lock()
        .expect("Could not acquire database lock.");

    create_user(
        NewUser {
            username: username_from(email),
            email: email.parse::<EmailAddress>().expect("Invalid test email."),
            password_hash,
        },
        &connection,
    )
    .expect("Could not create test user.")
}

fn username_from(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_owned()
}
