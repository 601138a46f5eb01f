//! The lookup table of transaction types, e.g. debit or fee.

use axum::{Json, extract::State};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{Error, dispatch::DatabaseState};

/// A kind of transaction that can appear on a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionType {
    /// The code stored on each transaction.
    pub code: i64,
    /// A human readable name for the code.
    pub description: String,
}

/// The types every new database starts with.
pub const DEFAULT_TRANSACTION_TYPES: [(i64, &str); 5] = [
    (1, "Debit"),
    (2, "Credit"),
    (3, "Transfer"),
    (4, "Fee"),
    (5, "Interest"),
];

/// Create the transaction type table and insert [DEFAULT_TRANSACTION_TYPES].
///
/// Existing rows are left alone.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_transaction_type_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS transaction_type (
                code INTEGER PRIMARY KEY,
                description TEXT NOT NULL
                )",
        (),
    )?;

    let mut insert = connection
        .prepare("INSERT OR IGNORE INTO transaction_type (code, description) VALUES (?1, ?2)")?;

    for (code, description) in DEFAULT_TRANSACTION_TYPES {
        insert.execute((code, description))?;
    }

    Ok(())
}

/// Get every transaction type ordered by code.
///
/// # Errors
///
/// Returns a [Error::SqlError] if an SQL related error occurred.
pub fn get_transaction_types(connection: &Connection) -> Result<Vec<TransactionType>, Error> {
    connection
        .prepare("SELECT code, description FROM transaction_type ORDER BY code")?
        .query_map([], |row| {
            Ok(TransactionType {
                code: row.get(0)?,
                description: row.get(1)?,
            })
        })?
        .map(|maybe_type| maybe_type.map_err(Error::from))
        .collect()
}

/// A route handler for listing the transaction types.
pub async fn list_transaction_types(
    State(database): State<DatabaseState>,
) -> Result<Json<Vec<TransactionType>>, Error> {
    database
        .with_connection(get_transaction_types)
        .map(Json)
}

#[cfg(test)]
mod transaction_type_tests {
    use rusqlite::Connection;

    use crate::{
        db::initialize,
        transaction_type::{DEFAULT_TRANSACTION_TYPES, get_transaction_types},
    };

    #[test]
    fn defaults_are_seeded_once() {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        initialize(&connection).unwrap();

        let types = get_transaction_types(&connection).unwrap();

        assert_eq!(types.len(), DEFAULT_TRANSACTION_TYPES.len());
        assert_eq!(types[0].code, 1);
        assert_eq!(types[0].description, "Debit");
    }

    #[test]
    fn seeding_keeps_custom_descriptions() {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        connection
            .execute(
                "UPDATE transaction_type SET description = 'Card purchase' WHERE code = 1",
                (),
            )
            .unwrap();

        initialize(&connection).unwrap();

        let types = get_transaction_types(&connection).unwrap();
        assert_eq!(types[0].description, "Card purchase");
    }
}
