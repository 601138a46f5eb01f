//! Transaction queries scoped to the owner of the parent statement.

use std::collections::BTreeSet;

use rusqlite::Connection;

use crate::{
    Error,
    dispatch::{
        ByOwnerArgs, ByOwnerId, ByResourceId, CreateOwned, CreateOwnedBatch, DeleteByResourceId,
        UpdateByResourceId,
    },
    statement::ensure_statement_owned,
    user::UserID,
};

use super::core::{
    QUALIFIED_TRANSACTION_COLUMNS, TRANSACTION_COLUMNS, Transaction, TransactionInput,
    create_transaction, map_transaction_row,
};

fn get_owned_transaction(
    id: i64,
    caller: UserID,
    connection: &Connection,
) -> Result<Transaction, Error> {
    connection
        .prepare(&format!(
            "SELECT {QUALIFIED_TRANSACTION_COLUMNS} FROM \"transaction\" t
            INNER JOIN statement s ON s.id = t.statement_id
            WHERE t.id = ?1 AND s.owner_id = ?2"
        ))?
        .query_row((id, caller.as_i64()), map_transaction_row)
        .map_err(Error::from)
}

impl ByResourceId for Transaction {
    type Output = Transaction;

    fn get(id: i64, caller: UserID, connection: &Connection) -> Result<Transaction, Error> {
        get_owned_transaction(id, caller, connection)
    }
}

impl CreateOwned for Transaction {
    type Body = TransactionInput;
    type Output = Transaction;

    /// The parent statement must belong to the caller.
    fn create(
        body: TransactionInput,
        caller: UserID,
        connection: &Connection,
    ) -> Result<Transaction, Error> {
        let sql_transaction = connection.unchecked_transaction()?;

        ensure_statement_owned(body.statement_id, caller, &sql_transaction)?;
        let transaction = create_transaction(&body, &sql_transaction)?;

        sql_transaction.commit()?;

        Ok(transaction)
    }
}

impl CreateOwnedBatch for Transaction {
    type Item = TransactionInput;
    type Output = Vec<Transaction>;

    /// Every distinct statement in the batch is checked before anything is
    /// inserted. Any failure rolls back the whole batch.
    fn create_batch(
        items: Vec<TransactionInput>,
        caller: UserID,
        connection: &Connection,
    ) -> Result<Vec<Transaction>, Error> {
        let sql_transaction = connection.unchecked_transaction()?;

        let statement_ids: BTreeSet<i64> = items.iter().map(|item| item.statement_id).collect();
        for statement_id in statement_ids {
            ensure_statement_owned(statement_id, caller, &sql_transaction)?;
        }

        let transactions = items
            .iter()
            .map(|item| create_transaction(item, &sql_transaction))
            .collect::<Result<Vec<_>, _>>()?;

        sql_transaction.commit()?;

        tracing::info!(
            "User {caller} created {} transactions in one batch",
            transactions.len()
        );

        Ok(transactions)
    }
}

impl UpdateByResourceId for Transaction {
    type Body = TransactionInput;
    type Output = Transaction;

    /// A transaction can only move to another statement the caller owns.
    fn update(
        id: i64,
        body: TransactionInput,
        caller: UserID,
        connection: &Connection,
    ) -> Result<Transaction, Error> {
        let sql_transaction = connection.unchecked_transaction()?;

        let existing = get_owned_transaction(id, caller, &sql_transaction)?;
        if existing.statement_id != body.statement_id {
            ensure_statement_owned(body.statement_id, caller, &sql_transaction)?;
        }

        let transaction = sql_transaction
            .prepare(&format!(
                "UPDATE \"transaction\"
                SET statement_id = ?1, type_code = ?2, description = ?3, amount = ?4,
                    transaction_date = ?5, updated_at = ?6
                WHERE id = ?7
                RETURNING {TRANSACTION_COLUMNS}"
            ))?
            .query_row(
                (
                    body.statement_id,
                    body.type_code,
                    &body.description,
                    body.amount,
                    body.transaction_date,
                    time::OffsetDateTime::now_utc(),
                    id,
                ),
                map_transaction_row,
            )?;

        sql_transaction.commit()?;

        Ok(transaction)
    }
}

impl DeleteByResourceId for Transaction {
    type Output = Transaction;

    fn delete(id: i64, caller: UserID, connection: &Connection) -> Result<Transaction, Error> {
        connection
            .prepare(&format!(
                "DELETE FROM \"transaction\"
                WHERE id = ?1 AND statement_id IN (SELECT id FROM statement WHERE owner_id = ?2)
                RETURNING {TRANSACTION_COLUMNS}"
            ))?
            .query_row((id, caller.as_i64()), map_transaction_row)
            .map_err(Error::from)
    }
}

/// The transactions on one statement, looked up by the statement's ID.
///
/// A statement owned by someone else is reported as not found, the same as
/// one that does not exist.
pub struct StatementTransactions;

impl ByResourceId for StatementTransactions {
    type Output = Vec<Transaction>;

    fn get(
        statement_id: i64,
        caller: UserID,
        connection: &Connection,
    ) -> Result<Vec<Transaction>, Error> {
        ensure_statement_owned(statement_id, caller, connection)?;

        connection
            .prepare(&format!(
                "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\"
                WHERE statement_id = :statement_id
                ORDER BY transaction_date, id"
            ))?
            .query_map(&[(":statement_id", &statement_id)], map_transaction_row)?
            .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
            .collect()
    }
}

/// Every transaction on any statement owned by one user.
pub struct UserTransactions;

impl ByOwnerId for UserTransactions {
    type Output = Vec<Transaction>;

    fn get_by_owner(owner: UserID, connection: &Connection) -> Result<Vec<Transaction>, Error> {
        connection
            .prepare(&format!(
                "SELECT {QUALIFIED_TRANSACTION_COLUMNS} FROM \"transaction\" t
                INNER JOIN statement s ON s.id = t.statement_id
                WHERE s.owner_id = :owner_id
                ORDER BY t.transaction_date, t.id"
            ))?
            .query_map(&[(":owner_id", &owner.as_i64())], map_transaction_row)?
            .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
            .collect()
    }
}

/// A user's transactions on statements from one institution.
///
/// The path arguments are `[user ID, institution ID]`.
pub struct InstitutionTransactions;

impl ByOwnerArgs for InstitutionTransactions {
    const ARG_COUNT: usize = 2;
    const OWNER_ARG: usize = 0;

    type Output = Vec<Transaction>;

    fn get_by_args(
        args: &[i64],
        caller: UserID,
        connection: &Connection,
    ) -> Result<Vec<Transaction>, Error> {
        let institution_id = args[1];

        connection
            .prepare(&format!(
                "SELECT {QUALIFIED_TRANSACTION_COLUMNS} FROM \"transaction\" t
                INNER JOIN statement s ON s.id = t.statement_id
                WHERE s.owner_id = ?1 AND s.institution_id = ?2
                ORDER BY t.transaction_date, t.id"
            ))?
            .query_map((caller.as_i64(), institution_id), map_transaction_row)?
            .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
            .collect()
    }
}

#[cfg(test)]
mod authorized_tests {
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        Error,
        db::initialize,
        dispatch::{
            ByOwnerArgs, ByOwnerId, ByResourceId, CreateOwned, CreateOwnedBatch,
            DeleteByResourceId, UpdateByResourceId,
        },
        institution::{Institution, create_institution},
        statement::{Statement, StatementInput, create_statement},
        test_utils::insert_test_user,
        transaction::{
            InstitutionTransactions, StatementTransactions, Transaction, TransactionInput,
            UserTransactions, core::count_transactions,
        },
        user::User,
    };

    struct Fixture {
        connection: Connection,
        alice: User,
        bob: User,
        kiwibank: Institution,
        alices_statement: Statement,
        bobs_statement: Statement,
    }

    fn statement_for(user: &User, institution: &Institution, connection: &Connection) -> Statement {
        create_statement(
            &StatementInput {
                institution_id: institution.id,
                period_start: date!(2025 - 01 - 01),
                period_end: date!(2025 - 01 - 31),
            },
            user.id,
            connection,
        )
        .unwrap()
    }

    fn get_fixture() -> Fixture {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        let alice = insert_test_user("alice@example.com", &connection);
        let bob = insert_test_user("bob@example.com", &connection);
        let kiwibank = create_institution("Kiwibank", &connection).unwrap();
        let alices_statement = statement_for(&alice, &kiwibank, &connection);
        let bobs_statement = statement_for(&bob, &kiwibank, &connection);

        Fixture {
            connection,
            alice,
            bob,
            kiwibank,
            alices_statement,
            bobs_statement,
        }
    }

    fn input(statement: &Statement, amount: i64) -> TransactionInput {
        TransactionInput {
            statement_id: statement.id,
            type_code: 1,
            description: "Groceries".to_owned(),
            amount,
            transaction_date: date!(2025 - 01 - 10),
        }
    }

    #[test]
    fn create_on_own_statement_succeeds() {
        let fixture = get_fixture();

        let transaction = Transaction::create(
            input(&fixture.alices_statement, 1234),
            fixture.alice.id,
            &fixture.connection,
        )
        .unwrap();

        assert_eq!(transaction.statement_id, fixture.alices_statement.id);
        assert_eq!(transaction.amount, 1234);
    }

    #[test]
    fn create_on_other_users_statement_is_not_found() {
        let fixture = get_fixture();

        let result = Transaction::create(
            input(&fixture.bobs_statement, 1234),
            fixture.alice.id,
            &fixture.connection,
        );

        assert_eq!(result, Err(Error::NotFound));
        assert_eq!(count_transactions(&fixture.connection), Ok(0));
    }

    #[test]
    fn get_hides_other_users_transactions() {
        let fixture = get_fixture();
        let transaction = Transaction::create(
            input(&fixture.alices_statement, 500),
            fixture.alice.id,
            &fixture.connection,
        )
        .unwrap();

        assert_eq!(
            Transaction::get(transaction.id, fixture.alice.id, &fixture.connection),
            Ok(transaction.clone())
        );
        assert_eq!(
            Transaction::get(transaction.id, fixture.bob.id, &fixture.connection),
            Err(Error::NotFound)
        );
    }

    #[test]
    fn batch_inserts_everything() {
        let fixture = get_fixture();
        let second_statement = statement_for(&fixture.alice, &fixture.kiwibank, &fixture.connection);

        let transactions = Transaction::create_batch(
            vec![
                input(&fixture.alices_statement, 100),
                input(&second_statement, 200),
                input(&fixture.alices_statement, 300),
            ],
            fixture.alice.id,
            &fixture.connection,
        )
        .unwrap();

        assert_eq!(transactions.len(), 3);
        assert_eq!(count_transactions(&fixture.connection), Ok(3));
    }

    #[test]
    fn batch_with_foreign_statement_inserts_nothing() {
        let fixture = get_fixture();

        let result = Transaction::create_batch(
            vec![
                input(&fixture.alices_statement, 100),
                input(&fixture.bobs_statement, 200),
            ],
            fixture.alice.id,
            &fixture.connection,
        );

        assert_eq!(result, Err(Error::NotFound));
        assert_eq!(count_transactions(&fixture.connection), Ok(0));
    }

    #[test]
    fn batch_rolls_back_when_a_later_insert_fails() {
        let fixture = get_fixture();
        let bad_item = TransactionInput {
            type_code: 999,
            ..input(&fixture.alices_statement, 200)
        };

        let result = Transaction::create_batch(
            vec![input(&fixture.alices_statement, 100), bad_item],
            fixture.alice.id,
            &fixture.connection,
        );

        assert_eq!(result, Err(Error::InvalidReference));
        assert_eq!(count_transactions(&fixture.connection), Ok(0));
    }

    #[test]
    fn update_cannot_move_to_other_users_statement() {
        let fixture = get_fixture();
        let transaction = Transaction::create(
            input(&fixture.alices_statement, 100),
            fixture.alice.id,
            &fixture.connection,
        )
        .unwrap();

        let result = Transaction::update(
            transaction.id,
            input(&fixture.bobs_statement, 100),
            fixture.alice.id,
            &fixture.connection,
        );

        assert_eq!(result, Err(Error::NotFound));
        assert_eq!(
            Transaction::get(transaction.id, fixture.alice.id, &fixture.connection),
            Ok(transaction)
        );
    }

    #[test]
    fn update_moves_between_own_statements() {
        let fixture = get_fixture();
        let second_statement = statement_for(&fixture.alice, &fixture.kiwibank, &fixture.connection);
        let transaction = Transaction::create(
            input(&fixture.alices_statement, 100),
            fixture.alice.id,
            &fixture.connection,
        )
        .unwrap();

        let updated = Transaction::update(
            transaction.id,
            input(&second_statement, 250),
            fixture.alice.id,
            &fixture.connection,
        )
        .unwrap();

        assert_eq!(updated.statement_id, second_statement.id);
        assert_eq!(updated.amount, 250);
        assert_eq!(updated.created_at, transaction.created_at);
    }

    #[test]
    fn update_by_other_user_is_not_found() {
        let fixture = get_fixture();
        let transaction = Transaction::create(
            input(&fixture.alices_statement, 100),
            fixture.alice.id,
            &fixture.connection,
        )
        .unwrap();

        let result = Transaction::update(
            transaction.id,
            input(&fixture.bobs_statement, 1),
            fixture.bob.id,
            &fixture.connection,
        );

        assert_eq!(result, Err(Error::NotFound));
    }

    #[test]
    fn delete_by_other_user_is_not_found() {
        let fixture = get_fixture();
        let transaction = Transaction::create(
            input(&fixture.alices_statement, 100),
            fixture.alice.id,
            &fixture.connection,
        )
        .unwrap();

        assert_eq!(
            Transaction::delete(transaction.id, fixture.bob.id, &fixture.connection),
            Err(Error::NotFound)
        );
        assert_eq!(
            Transaction::delete(transaction.id, fixture.alice.id, &fixture.connection),
            Ok(transaction)
        );
        assert_eq!(count_transactions(&fixture.connection), Ok(0));
    }

    #[test]
    fn statement_listing_checks_statement_owner() {
        let fixture = get_fixture();
        let transaction = Transaction::create(
            input(&fixture.alices_statement, 100),
            fixture.alice.id,
            &fixture.connection,
        )
        .unwrap();

        assert_eq!(
            StatementTransactions::get(
                fixture.alices_statement.id,
                fixture.alice.id,
                &fixture.connection
            ),
            Ok(vec![transaction])
        );
        assert_eq!(
            StatementTransactions::get(
                fixture.alices_statement.id,
                fixture.bob.id,
                &fixture.connection
            ),
            Err(Error::NotFound)
        );
    }

    #[test]
    fn user_listing_spans_statements_and_skips_others() {
        let fixture = get_fixture();
        let second_statement = statement_for(&fixture.alice, &fixture.kiwibank, &fixture.connection);
        Transaction::create_batch(
            vec![
                input(&fixture.alices_statement, 100),
                input(&second_statement, 200),
            ],
            fixture.alice.id,
            &fixture.connection,
        )
        .unwrap();
        Transaction::create(
            input(&fixture.bobs_statement, 300),
            fixture.bob.id,
            &fixture.connection,
        )
        .unwrap();

        let amounts: Vec<i64> = UserTransactions::get_by_owner(fixture.alice.id, &fixture.connection)
            .unwrap()
            .into_iter()
            .map(|transaction| transaction.amount)
            .collect();

        assert_eq!(amounts, [100, 200]);
    }

    #[test]
    fn institution_listing_filters_by_institution() {
        let fixture = get_fixture();
        let asb = create_institution("ASB", &fixture.connection).unwrap();
        let asb_statement = statement_for(&fixture.alice, &asb, &fixture.connection);
        Transaction::create_batch(
            vec![
                input(&fixture.alices_statement, 100),
                input(&asb_statement, 200),
            ],
            fixture.alice.id,
            &fixture.connection,
        )
        .unwrap();

        let transactions = InstitutionTransactions::get_by_args(
            &[fixture.alice.id.as_i64(), asb.id],
            fixture.alice.id,
            &fixture.connection,
        )
        .unwrap();

        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].statement_id, asb_statement.id);
    }

    #[test]
    fn deleting_statement_deletes_its_transactions() {
        let fixture = get_fixture();
        Transaction::create(
            input(&fixture.alices_statement, 100),
            fixture.alice.id,
            &fixture.connection,
        )
        .unwrap();

        Statement::delete(
            fixture.alices_statement.id,
            fixture.alice.id,
            &fixture.connection,
        )
        .unwrap();

        assert_eq!(count_transactions(&fixture.connection), Ok(0));
    }
}
