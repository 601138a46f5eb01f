//! Generic route handlers that scope every store call to the caller.
//!
//! Each family of operations is a trait. An entity (or a marker type for a
//! particular query) implements the trait with a synchronous store function
//! that receives the caller's [UserID], and the matching generic handler is
//! mounted with a turbofish, e.g. `get(get_by_id::<Statement>)`.
//!
//! The handlers enforce two policies:
//! - Routes addressed by a resource ID report a resource that is missing and
//!   one owned by someone else the same way, with [Error::NotFound].
//! - Routes addressed by a user ID reject any ID other than the caller's with
//!   [Error::Forbidden] before the store is touched.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, FromRequestParts, Path, RawPathParams, State, rejection::JsonRejection},
    http::{StatusCode, request::Parts},
};
use rusqlite::Connection;
use serde::{Serialize, de::DeserializeOwned};

use crate::{AppState, Error, user::UserID};

/// The shared database connection.
#[derive(Debug, Clone)]
pub struct DatabaseState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for DatabaseState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

impl DatabaseState {
    /// Run `f` while holding the database lock.
    ///
    /// `f` is synchronous, so the lock is never held across an `.await`.
    ///
    /// # Errors
    ///
    /// Returns [Error::DatabaseLockError] if the lock is poisoned, otherwise
    /// whatever `f` returns.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let connection = self.db_connection.lock().map_err(|error| {
            tracing::error!("could not acquire database lock: {error}");
            Error::DatabaseLockError
        })?;

        f(&connection)
    }
}

/// Unwrap a JSON body, mapping any rejection to [Error::MalformedInput].
///
/// Handlers take the body as `Result<Json<T>, JsonRejection>` so that a bad
/// body is reported in the crate's error format instead of axum's.
pub fn extract_json<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, Error> {
    body.map(|Json(value)| value).map_err(|rejection| {
        tracing::debug!("rejected request body: {}", rejection.body_text());
        Error::MalformedInput("Invalid request body".to_owned())
    })
}

fn invalid_id() -> Error {
    Error::MalformedInput("Invalid ID".to_owned())
}

fn parse_id(raw_id: &str) -> Result<i64, Error> {
    match raw_id.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(invalid_id()),
    }
}

/// A single positive integer ID taken from the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathId(pub i64);

impl<S> FromRequestParts<S> for PathId
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw_id) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| invalid_id())?;

        parse_id(&raw_id).map(Self)
    }
}

/// Every path parameter of the route, in order, parsed as positive integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathArgs(pub Vec<i64>);

impl<S> FromRequestParts<S> for PathArgs
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let params = RawPathParams::from_request_parts(parts, state)
            .await
            .map_err(|_| invalid_id())?;

        params
            .iter()
            .map(|(_, value)| parse_id(value))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

/// Reject the request unless `owner_id` is the caller.
fn ensure_caller_is(owner_id: i64, caller: UserID) -> Result<(), Error> {
    if owner_id == caller.as_i64() {
        Ok(())
    } else {
        tracing::warn!("User {caller} tried to access data of user {owner_id}");
        Err(Error::Forbidden)
    }
}

/// Read a resource by its ID, scoped to the caller.
pub trait ByResourceId {
    /// The response body.
    type Output: Serialize + Send + 'static;

    /// Get the resource with `id` if the caller owns it.
    ///
    /// Must return [Error::NotFound] when the resource is missing *or* owned by
    /// someone else.
    fn get(id: i64, caller: UserID, connection: &Connection) -> Result<Self::Output, Error>;
}

/// Replace a resource by its ID, scoped to the caller.
pub trait UpdateByResourceId {
    /// The request body. It never carries an owner.
    type Body: DeserializeOwned + Send + 'static;
    /// The response body.
    type Output: Serialize + Send + 'static;

    /// Update the resource with `id` if the caller owns it.
    fn update(
        id: i64,
        body: Self::Body,
        caller: UserID,
        connection: &Connection,
    ) -> Result<Self::Output, Error>;
}

/// Delete a resource by its ID, scoped to the caller.
pub trait DeleteByResourceId {
    /// The response body, usually the deleted row.
    type Output: Serialize + Send + 'static;

    /// Delete the resource with `id` if the caller owns it.
    fn delete(id: i64, caller: UserID, connection: &Connection) -> Result<Self::Output, Error>;
}

/// Read everything owned by the user named in the path.
pub trait ByOwnerId {
    /// The response body.
    type Output: Serialize + Send + 'static;

    /// Only ever called with the caller's own ID.
    fn get_by_owner(owner: UserID, connection: &Connection) -> Result<Self::Output, Error>;
}

/// Read with several positional path arguments, one of which names the owner.
pub trait ByOwnerArgs {
    /// How many path arguments the route has.
    const ARG_COUNT: usize;
    /// The index of the argument that must equal the caller's ID.
    const OWNER_ARG: usize;

    /// The response body.
    type Output: Serialize + Send + 'static;

    /// `args` has exactly [ByOwnerArgs::ARG_COUNT] entries and the owner
    /// argument has already been checked against `caller`.
    fn get_by_args(
        args: &[i64],
        caller: UserID,
        connection: &Connection,
    ) -> Result<Self::Output, Error>;
}

/// Create a resource owned by the caller.
pub trait CreateOwned {
    /// The request body. It never carries an owner.
    type Body: DeserializeOwned + Send + 'static;
    /// The response body.
    type Output: Serialize + Send + 'static;

    /// Insert `body` on behalf of `caller`.
    fn create(
        body: Self::Body,
        caller: UserID,
        connection: &Connection,
    ) -> Result<Self::Output, Error>;
}

/// Create many resources owned by the caller, all or nothing.
pub trait CreateOwnedBatch {
    /// One item of the request body.
    type Item: DeserializeOwned + Send + 'static;
    /// The response body.
    type Output: Serialize + Send + 'static;

    /// Insert every item on behalf of `caller` or none of them.
    ///
    /// `items` is never empty.
    fn create_batch(
        items: Vec<Self::Item>,
        caller: UserID,
        connection: &Connection,
    ) -> Result<Self::Output, Error>;
}

/// A route handler for `GET /<resource>/{id}`.
pub async fn get_by_id<T>(
    State(database): State<DatabaseState>,
    PathId(id): PathId,
    caller: UserID,
) -> Result<Json<T::Output>, Error>
where
    T: ByResourceId + 'static,
{
    database
        .with_connection(|connection| T::get(id, caller, connection))
        .map(Json)
}

/// A route handler for `PUT /<resource>/{id}`.
pub async fn update_by_id<T>(
    State(database): State<DatabaseState>,
    PathId(id): PathId,
    caller: UserID,
    body: Result<Json<T::Body>, JsonRejection>,
) -> Result<Json<T::Output>, Error>
where
    T: UpdateByResourceId + 'static,
{
    let body = extract_json(body)?;

    database
        .with_connection(|connection| T::update(id, body, caller, connection))
        .map(Json)
}

/// A route handler for `DELETE /<resource>/{id}`.
pub async fn delete_by_id<T>(
    State(database): State<DatabaseState>,
    PathId(id): PathId,
    caller: UserID,
) -> Result<Json<T::Output>, Error>
where
    T: DeleteByResourceId + 'static,
{
    database
        .with_connection(|connection| T::delete(id, caller, connection))
        .map(Json)
}

/// A route handler for `GET /<resource>/user/{id}`.
pub async fn get_by_owner_id<T>(
    State(database): State<DatabaseState>,
    PathId(owner_id): PathId,
    caller: UserID,
) -> Result<Json<T::Output>, Error>
where
    T: ByOwnerId + 'static,
{
    ensure_caller_is(owner_id, caller)?;

    database
        .with_connection(|connection| T::get_by_owner(caller, connection))
        .map(Json)
}

/// A route handler for routes with several ID arguments where one of them
/// names the owner.
pub async fn get_by_owner_args<T>(
    State(database): State<DatabaseState>,
    PathArgs(args): PathArgs,
    caller: UserID,
) -> Result<Json<T::Output>, Error>
where
    T: ByOwnerArgs + 'static,
{
    if args.len() != T::ARG_COUNT {
        return Err(Error::MalformedInput(format!(
            "Expected {} path arguments, got {}",
            T::ARG_COUNT,
            args.len()
        )));
    }

    let owner_id = args.get(T::OWNER_ARG).copied().ok_or_else(invalid_id)?;
    ensure_caller_is(owner_id, caller)?;

    database
        .with_connection(|connection| T::get_by_args(&args, caller, connection))
        .map(Json)
}

/// A route handler for `POST /<resource>`.
///
/// Responds with `201 Created`.
pub async fn create<T>(
    State(database): State<DatabaseState>,
    caller: UserID,
    body: Result<Json<T::Body>, JsonRejection>,
) -> Result<(StatusCode, Json<T::Output>), Error>
where
    T: CreateOwned + 'static,
{
    let body = extract_json(body)?;

    database
        .with_connection(|connection| T::create(body, caller, connection))
        .map(|output| (StatusCode::CREATED, Json(output)))
}

/// A route handler for `POST /<resource>/batch`.
///
/// Responds with `201 Created`. An empty list is rejected.
pub async fn create_batch<T>(
    State(database): State<DatabaseState>,
    caller: UserID,
    body: Result<Json<Vec<T::Item>>, JsonRejection>,
) -> Result<(StatusCode, Json<T::Output>), Error>
where
    T: CreateOwnedBatch + 'static,
{
    let items = extract_json(body)?;

    if items.is_empty() {
        return Err(Error::EmptyBatch);
    }

    database
        .with_connection(|connection| T::create_batch(items, caller, connection))
        .map(|output| (StatusCode::CREATED, Json(output)))
}

#[cfg(test)]
mod dispatch_tests {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use axum::{Json, extract::State};
    use rusqlite::Connection;

    use crate::{
        Error,
        dispatch::{
            ByOwnerArgs, ByOwnerId, ByResourceId, CreateOwnedBatch, DatabaseState, PathArgs,
            PathId, create_batch, get_by_id, get_by_owner_args, get_by_owner_id,
        },
        user::UserID,
    };

    fn get_database() -> DatabaseState {
        DatabaseState {
            db_connection: Arc::new(Mutex::new(Connection::open_in_memory().unwrap())),
        }
    }

    static OWNER_QUERIES: AtomicUsize = AtomicUsize::new(0);

    struct CountingOwnerQuery;

    impl ByOwnerId for CountingOwnerQuery {
        type Output = i64;

        fn get_by_owner(owner: UserID, _: &Connection) -> Result<i64, Error> {
            OWNER_QUERIES.fetch_add(1, Ordering::SeqCst);
            Ok(owner.as_i64())
        }
    }

    #[tokio::test]
    async fn owner_mismatch_is_forbidden_before_store_access() {
        let result =
            get_by_owner_id::<CountingOwnerQuery>(State(get_database()), PathId(2), UserID::new(1))
                .await;

        assert!(matches!(result, Err(Error::Forbidden)));
        assert_eq!(OWNER_QUERIES.load(Ordering::SeqCst), 0);

        let Json(owner) =
            get_by_owner_id::<CountingOwnerQuery>(State(get_database()), PathId(1), UserID::new(1))
                .await
                .unwrap();

        assert_eq!(owner, 1);
        assert_eq!(OWNER_QUERIES.load(Ordering::SeqCst), 1);
    }

    static ARGS_QUERIES: AtomicUsize = AtomicUsize::new(0);

    struct CountingArgsQuery;

    impl ByOwnerArgs for CountingArgsQuery {
        const ARG_COUNT: usize = 2;
        const OWNER_ARG: usize = 0;

        type Output = Vec<i64>;

        fn get_by_args(args: &[i64], _: UserID, _: &Connection) -> Result<Vec<i64>, Error> {
            ARGS_QUERIES.fetch_add(1, Ordering::SeqCst);
            Ok(args.to_vec())
        }
    }

    #[tokio::test]
    async fn owner_argument_is_checked_before_store_access() {
        let result = get_by_owner_args::<CountingArgsQuery>(
            State(get_database()),
            PathArgs(vec![2, 7]),
            UserID::new(1),
        )
        .await;
        assert!(matches!(result, Err(Error::Forbidden)));

        let result = get_by_owner_args::<CountingArgsQuery>(
            State(get_database()),
            PathArgs(vec![1]),
            UserID::new(1),
        )
        .await;
        assert!(matches!(result, Err(Error::MalformedInput(_))));

        assert_eq!(ARGS_QUERIES.load(Ordering::SeqCst), 0);

        let Json(args) = get_by_owner_args::<CountingArgsQuery>(
            State(get_database()),
            PathArgs(vec![1, 7]),
            UserID::new(1),
        )
        .await
        .unwrap();

        assert_eq!(args, vec![1, 7]);
        assert_eq!(ARGS_QUERIES.load(Ordering::SeqCst), 1);
    }

    struct NeverFound;

    impl ByResourceId for NeverFound {
        type Output = ();

        fn get(_: i64, _: UserID, _: &Connection) -> Result<(), Error> {
            Err(Error::NotFound)
        }
    }

    #[tokio::test]
    async fn store_miss_is_not_found() {
        let result = get_by_id::<NeverFound>(State(get_database()), PathId(3), UserID::new(1)).await;

        assert!(matches!(result, Err(Error::NotFound)));
    }

    static BATCH_CALLS: AtomicUsize = AtomicUsize::new(0);

    struct CountingBatch;

    impl CreateOwnedBatch for CountingBatch {
        type Item = i64;
        type Output = usize;

        fn create_batch(items: Vec<i64>, _: UserID, _: &Connection) -> Result<usize, Error> {
            BATCH_CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(items.len())
        }
    }

    #[tokio::test]
    async fn empty_batch_is_rejected_before_store_access() {
        let result =
            create_batch::<CountingBatch>(State(get_database()), UserID::new(1), Ok(Json(vec![])))
                .await;

        assert!(matches!(result, Err(Error::EmptyBatch)));
        assert_eq!(BATCH_CALLS.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn poisoned_lock_is_reported() {
        let database = get_database();
        let db_connection = database.db_connection.clone();

        let _ = std::thread::spawn(move || {
            let _guard = db_connection.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        let result = database.with_connection(|_| Ok(()));

        assert_eq!(result, Err(Error::DatabaseLockError));
    }
}
