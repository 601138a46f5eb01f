//! Defines the core data model and raw database queries for transactions.
//!
//! Nothing in here checks ownership. See `authorized` for the queries that
//! route handlers use.

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{Error, statement::StatementID};

/// Alias for the integer type used for transaction IDs.
pub type TransactionID = i64;

/// A single line on a statement.
///
/// Transactions have no owner of their own. They belong to whoever owns the
/// statement they are on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionID,
    /// The statement the transaction appears on.
    pub statement_id: StatementID,
    /// A code from the transaction type table.
    pub type_code: i64,
    /// A text description of what the transaction was for.
    pub description: String,
    /// The amount in minor units, e.g. cents.
    pub amount: i64,
    /// When the transaction happened.
    pub transaction_date: Date,
    /// When the transaction was added.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the transaction last changed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The request body for creating or replacing a transaction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransactionInput {
    /// The statement the transaction appears on.
    pub statement_id: StatementID,
    /// A code from the transaction type table.
    pub type_code: i64,
    /// A text description of what the transaction was for.
    pub description: String,
    /// The amount in minor units. Fractional amounts are rejected when the
    /// body is parsed.
    pub amount: i64,
    /// When the transaction happened.
    pub transaction_date: Date,
}

/// Create the transaction table.
///
/// Deleting a statement deletes its transactions.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY,
                statement_id INTEGER NOT NULL,
                type_code INTEGER NOT NULL,
                description TEXT NOT NULL,
                amount INTEGER NOT NULL,
                transaction_date TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY(statement_id) REFERENCES statement(id) ON UPDATE CASCADE ON DELETE CASCADE,
                FOREIGN KEY(type_code) REFERENCES transaction_type(code) ON UPDATE CASCADE ON DELETE RESTRICT
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_statement ON \"transaction\"(statement_id)",
        (),
    )?;

    Ok(())
}

pub(super) const TRANSACTION_COLUMNS: &str =
    "id, statement_id, type_code, description, amount, transaction_date, created_at, updated_at";

/// [TRANSACTION_COLUMNS] for queries where the transaction table is aliased as `t`.
pub(super) const QUALIFIED_TRANSACTION_COLUMNS: &str = "t.id, t.statement_id, t.type_code, \
    t.description, t.amount, t.transaction_date, t.created_at, t.updated_at";

/// Map a row selected with [TRANSACTION_COLUMNS] to a [Transaction].
pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    Ok(Transaction {
        id: row.get(0)?,
        statement_id: row.get(1)?,
        type_code: row.get(2)?,
        description: row.get(3)?,
        amount: row.get(4)?,
        transaction_date: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Insert a transaction without checking who owns its statement.
///
/// # Errors
///
/// Returns [Error::InvalidReference] if the statement or type code does not
/// exist, or [Error::SqlError] for any other SQL error.
pub fn create_transaction(
    input: &TransactionInput,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let now = OffsetDateTime::now_utc();

    connection
        .prepare(&format!(
            "INSERT INTO \"transaction\"
            (statement_id, type_code, description, amount, transaction_date, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            RETURNING {TRANSACTION_COLUMNS}"
        ))?
        .query_row(
            (
                input.statement_id,
                input.type_code,
                &input.description,
                input.amount,
                input.transaction_date,
                now,
            ),
            map_transaction_row,
        )
        .map_err(Error::from)
}

/// Get the number of transactions in the database.
#[cfg(test)]
pub fn count_transactions(connection: &Connection) -> Result<usize, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM \"transaction\";", [], |row| row.get(0))
        .map_err(|error| error.into())
}
