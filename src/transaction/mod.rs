//! Transactions are the individual lines on a statement.
//!
//! This module contains:
//! - The `Transaction` model and the raw queries for storing transactions
//! - The owner-scoped queries that the route handlers dispatch to

mod authorized;
mod core;

pub use authorized::{InstitutionTransactions, StatementTransactions, UserTransactions};
pub use self::core::{
    Transaction, TransactionID, TransactionInput, create_transaction, create_transaction_table,
};
