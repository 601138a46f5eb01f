//! Statements are the billing periods a user received from an institution.
//!
//! Every statement has exactly one owner, taken from the caller's token when
//! the statement is created. No request can change the owner afterwards.

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{
    Error,
    dispatch::{ByOwnerId, ByResourceId, CreateOwned, DeleteByResourceId, UpdateByResourceId},
    institution::InstitutionID,
    user::UserID,
};

/// Alias for the integer type used for statement IDs.
pub type StatementID = i64;

/// A statement covering the period from `period_start` to `period_end`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    /// The ID of the statement.
    pub id: StatementID,
    /// The user the statement belongs to.
    pub owner_id: UserID,
    /// The institution that issued the statement.
    pub institution_id: InstitutionID,
    /// The first day covered by the statement.
    pub period_start: Date,
    /// The last day covered by the statement.
    pub period_end: Date,
    /// When the statement was added.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The request body for creating or replacing a statement.
///
/// There is no owner field. Unknown fields such as `owner_id` are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatementInput {
    /// The institution that issued the statement.
    pub institution_id: InstitutionID,
    /// The first day covered by the statement.
    pub period_start: Date,
    /// The last day covered by the statement.
    pub period_end: Date,
}

impl StatementInput {
    fn validate(&self) -> Result<(), Error> {
        if self.period_start > self.period_end {
            return Err(Error::InvalidPeriod);
        }

        Ok(())
    }
}

/// Create the statement table.
///
/// Deleting a user deletes their statements.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_statement_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS statement (
                id INTEGER PRIMARY KEY,
                owner_id INTEGER NOT NULL,
                institution_id INTEGER NOT NULL,
                period_start TEXT NOT NULL,
                period_end TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY(owner_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE,
                FOREIGN KEY(institution_id) REFERENCES institution(id) ON UPDATE CASCADE ON DELETE RESTRICT,
                CHECK(period_start <= period_end)
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_statement_owner ON statement(owner_id)",
        (),
    )?;

    Ok(())
}

const STATEMENT_COLUMNS: &str =
    "id, owner_id, institution_id, period_start, period_end, created_at";

fn map_statement_row(row: &Row) -> Result<Statement, rusqlite::Error> {
    Ok(Statement {
        id: row.get(0)?,
        owner_id: UserID::new(row.get(1)?),
        institution_id: row.get(2)?,
        period_start: row.get(3)?,
        period_end: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Insert a statement owned by `owner`.
///
/// The owner is always the argument, never part of the input.
///
/// # Errors
///
/// This function will return an error if:
/// - the period ends before it starts,
/// - `owner` or the institution do not exist,
/// - or there was some other SQL error.
pub fn create_statement(
    input: &StatementInput,
    owner: UserID,
    connection: &Connection,
) -> Result<Statement, Error> {
    input.validate()?;

    connection
        .prepare(&format!(
            "INSERT INTO statement (owner_id, institution_id, period_start, period_end, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING {STATEMENT_COLUMNS}"
        ))?
        .query_row(
            (
                owner.as_i64(),
                input.institution_id,
                input.period_start,
                input.period_end,
                OffsetDateTime::now_utc(),
            ),
            map_statement_row,
        )
        .map_err(Error::from)
}

/// Check that the statement `id` exists and belongs to `caller`.
///
/// # Errors
///
/// Returns [Error::NotFound] if the statement is missing or owned by someone
/// else.
pub fn ensure_statement_owned(
    id: StatementID,
    caller: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    connection
        .prepare("SELECT 1 FROM statement WHERE id = ?1 AND owner_id = ?2")?
        .query_row((id, caller.as_i64()), |_| Ok(()))
        .map_err(Error::from)
}

impl ByResourceId for Statement {
    type Output = Statement;

    fn get(id: i64, caller: UserID, connection: &Connection) -> Result<Statement, Error> {
        connection
            .prepare(&format!(
                "SELECT {STATEMENT_COLUMNS} FROM statement WHERE id = ?1 AND owner_id = ?2"
            ))?
            .query_row((id, caller.as_i64()), map_statement_row)
            .map_err(Error::from)
    }
}

impl CreateOwned for Statement {
    type Body = StatementInput;
    type Output = Statement;

    fn create(
        body: StatementInput,
        caller: UserID,
        connection: &Connection,
    ) -> Result<Statement, Error> {
        let statement = create_statement(&body, caller, connection)?;
        tracing::info!("User {caller} created statement {}", statement.id);

        Ok(statement)
    }
}

impl UpdateByResourceId for Statement {
    type Body = StatementInput;
    type Output = Statement;

    /// `owner_id` is only used to match the row and is never written.
    fn update(
        id: i64,
        body: StatementInput,
        caller: UserID,
        connection: &Connection,
    ) -> Result<Statement, Error> {
        body.validate()?;

        connection
            .prepare(&format!(
                "UPDATE statement
                SET institution_id = ?1, period_start = ?2, period_end = ?3
                WHERE id = ?4 AND owner_id = ?5
                RETURNING {STATEMENT_COLUMNS}"
            ))?
            .query_row(
                (
                    body.institution_id,
                    body.period_start,
                    body.period_end,
                    id,
                    caller.as_i64(),
                ),
                map_statement_row,
            )
            .map_err(Error::from)
    }
}

impl DeleteByResourceId for Statement {
    type Output = Statement;

    /// Deleting a statement also deletes its transactions.
    fn delete(id: i64, caller: UserID, connection: &Connection) -> Result<Statement, Error> {
        connection
            .prepare(&format!(
                "DELETE FROM statement WHERE id = ?1 AND owner_id = ?2
                RETURNING {STATEMENT_COLUMNS}"
            ))?
            .query_row((id, caller.as_i64()), map_statement_row)
            .map_err(Error::from)
    }
}

/// Every statement owned by one user, oldest period first.
pub struct StatementsForUser;

impl ByOwnerId for StatementsForUser {
    type Output = Vec<Statement>;

    fn get_by_owner(owner: UserID, connection: &Connection) -> Result<Vec<Statement>, Error> {
        connection
            .prepare(&format!(
                "SELECT {STATEMENT_COLUMNS} FROM statement WHERE owner_id = :owner_id
                ORDER BY period_start, id"
            ))?
            .query_map(&[(":owner_id", &owner.as_i64())], map_statement_row)?
            .map(|maybe_statement| maybe_statement.map_err(Error::from))
            .collect()
    }
}
