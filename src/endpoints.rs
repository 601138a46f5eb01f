//! The API endpoint URIs.
//!
//! Tests fill in parameters such as '{user_id}' with `format_endpoint` or
//! `format_endpoint_args`.

/// The route to request a cup of coffee. Used as a liveness probe.
pub const COFFEE: &str = "/api/coffee";

/// The route for logging in a user.
pub const LOG_IN: &str = "/auth/login";
/// The route for the caller's own profile.
pub const ME: &str = "/auth/me";

/// The route to register users.
pub const USERS: &str = "/api/users";
/// The route to access a single user.
pub const USER: &str = "/api/users/{user_id}";

/// The route to list and add institutions.
pub const INSTITUTIONS: &str = "/api/institutions";
/// The route to access a single institution.
pub const INSTITUTION: &str = "/api/institutions/{institution_id}";

/// The route to list transaction types.
pub const TRANSACTION_TYPES: &str = "/api/transaction_types";

/// The route to create statements.
pub const STATEMENTS: &str = "/api/statements";
/// The route to access a single statement.
pub const STATEMENT: &str = "/api/statements/{statement_id}";
/// The route to list a user's statements.
pub const USER_STATEMENTS: &str = "/api/statements/user/{user_id}";

/// The route to create transactions.
pub const TRANSACTIONS: &str = "/api/transactions";
/// The route to create many transactions at once.
pub const TRANSACTIONS_BATCH: &str = "/api/transactions/batch";
/// The route to access a single transaction.
pub const TRANSACTION: &str = "/api/transactions/{transaction_id}";
/// The route to list the transactions on a statement.
pub const STATEMENT_TRANSACTIONS: &str = "/api/transactions/statement/{statement_id}";
/// The route to list a user's transactions.
pub const USER_TRANSACTIONS: &str = "/api/transactions/user/{user_id}";
/// The route to list a user's transactions from one institution.
pub const INSTITUTION_TRANSACTIONS: &str =
    "/api/transactions/by_institution/user/{user_id}/institution/{institution_id}";

/// Replace the parameter in `endpoint_path` with `id`.
///
/// If no parameter is found in `endpoint_path`, the function returns the
/// original `endpoint_path`.
#[cfg(test)]
pub fn format_endpoint(endpoint_path: &str, id: i64) -> String {
    format_endpoint_args(endpoint_path, &[id])
}

/// Replace the parameters in `endpoint_path` with `ids`, in order.
///
/// A parameter is a string that starts with a left brace and ends with a
/// right brace, e.g. '{user_id}'. Parameters left over once `ids` runs out
/// are kept as they are.
#[cfg(test)]
pub fn format_endpoint_args(endpoint_path: &str, ids: &[i64]) -> String {
    let mut formatted = String::with_capacity(endpoint_path.len());
    let mut rest = endpoint_path;
    let mut ids = ids.iter();

    while let Some(start) = rest.find('{') {
        let Some(length) = rest[start..].find('}') else {
            break;
        };
        let Some(id) = ids.next() else {
            break;
        };

        formatted.push_str(&rest[..start]);
        formatted.push_str(&id.to_string());
        rest = &rest[start + length + 1..];
    }

    formatted.push_str(rest);
    formatted
}
