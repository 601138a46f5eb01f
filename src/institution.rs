//! Banks and other institutions that issue statements.
//!
//! Institutions are shared reference data. Any logged in user can list and
//! add them, and they have no owner.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error,
    dispatch::{DatabaseState, PathId, extract_json},
};

/// Alias for the integer type used for institution IDs.
pub type InstitutionID = i64;

/// A bank or other issuer of statements.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Institution {
    /// The ID of the institution.
    pub id: InstitutionID,
    /// The unique name of the institution.
    pub name: String,
    /// When the institution was added.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Create the institution table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_institution_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS institution (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

fn map_institution_row(row: &Row) -> Result<Institution, rusqlite::Error> {
    Ok(Institution {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
    })
}

/// Insert an institution called `name`.
///
/// # Errors
///
/// Returns [Error::MalformedInput] if `name` is blank and
/// [Error::DuplicateInstitution] if the name is taken.
pub fn create_institution(name: &str, connection: &Connection) -> Result<Institution, Error> {
    let name = name.trim();

    if name.is_empty() {
        return Err(Error::MalformedInput(
            "Institution name must not be empty".to_owned(),
        ));
    }

    connection
        .prepare(
            "INSERT INTO institution (name, created_at) VALUES (?1, ?2)
            RETURNING id, name, created_at",
        )?
        .query_row((name, OffsetDateTime::now_utc()), map_institution_row)
        .map_err(Error::from)
}

/// Get the institution with `id`.
///
/// # Errors
///
/// Returns [Error::NotFound] if there is no such institution.
pub fn get_institution(id: InstitutionID, connection: &Connection) -> Result<Institution, Error> {
    connection
        .prepare("SELECT id, name, created_at FROM institution WHERE id = :id")?
        .query_row(&[(":id", &id)], map_institution_row)
        .map_err(Error::from)
}

/// Get every institution ordered by name.
///
/// # Errors
///
/// Returns a [Error::SqlError] if an SQL related error occurred.
pub fn get_institutions(connection: &Connection) -> Result<Vec<Institution>, Error> {
    connection
        .prepare("SELECT id, name, created_at FROM institution ORDER BY name")?
        .query_map([], map_institution_row)?
        .map(|maybe_institution| maybe_institution.map_err(Error::from))
        .collect()
}

/// The request body for adding an institution.
#[derive(Debug, Clone, Deserialize)]
pub struct InstitutionInput {
    /// The institution's name.
    pub name: String,
}

/// A route handler for listing institutions.
pub async fn list_institutions(
    State(database): State<DatabaseState>,
) -> Result<Json<Vec<Institution>>, Error> {
    database.with_connection(get_institutions).map(Json)
}

/// A route handler for getting a single institution.
pub async fn get_institution_endpoint(
    State(database): State<DatabaseState>,
    PathId(id): PathId,
) -> Result<Json<Institution>, Error> {
    database
        .with_connection(|connection| get_institution(id, connection))
        .map(Json)
}

/// A route handler for adding an institution.
///
/// Responds with `201 Created`.
pub async fn create_institution_endpoint(
    State(database): State<DatabaseState>,
    body: Result<Json<InstitutionInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Institution>), Error> {
    let InstitutionInput { name } = extract_json(body)?;

    let institution =
        database.with_connection(|connection| create_institution(&name, connection))?;

    tracing::info!("Added institution {} ({})", institution.id, institution.name);

    Ok((StatusCode::CREATED, Json(institution)))
}
