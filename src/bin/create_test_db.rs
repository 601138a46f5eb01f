use std::{error::Error, path::Path, process::exit};

use clap::Parser;
use email_address::EmailAddress;
use rusqlite::Connection;
use time::{Date, Month};

use tally_rs::{
    NewUser, PasswordHash, StatementInput, TransactionInput, ValidatedPassword,
    create_institution, create_statement, create_transaction, create_user, initialize_db,
};

/// The password of the demo user.
const DEMO_PASSWORD: &str = "test";

/// A utility for creating a test database for the REST API server of tally_rs.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,
}

/// Create and populate a database for manual testing.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    if output_path
        .extension()
        .is_none_or(|extension| extension.is_empty())
    {
        eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
        exit(1);
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let connection = Connection::open(output_path)?;
    initialize_db(&connection)?;

    println!("Creating demo user...");
    let user = create_user(
        NewUser {
            username: "demo".to_owned(),
            email: EmailAddress::new_unchecked("demo@example.com"),
            password_hash: PasswordHash::new(
                ValidatedPassword::new_unchecked(DEMO_PASSWORD),
                PasswordHash::DEFAULT_COST,
            )?,
        },
        &connection,
    )?;

    println!("Creating institution and statement...");
    let institution = create_institution("Demo Bank", &connection)?;
    let statement = create_statement(
        &StatementInput {
            institution_id: institution.id,
            period_start: Date::from_calendar_date(2024, Month::January, 1)?,
            period_end: Date::from_calendar_date(2024, Month::January, 31)?,
        },
        user.id,
        &connection,
    )?;

    println!("Creating transactions...");
    let transactions = [
        (1, "Groceries", -8_450, 3),
        (2, "Salary", 350_000, 15),
        (4, "Account fee", -500, 28),
        (5, "Interest", 123, 31),
    ];

    for (type_code, description, amount, day) in transactions {
        create_transaction(
            &TransactionInput {
                statement_id: statement.id,
                type_code,
                description: description.to_owned(),
                amount,
                transaction_date: Date::from_calendar_date(2024, Month::January, day)?,
            },
            &connection,
        )?;
    }

    println!("Success! Log in as demo@example.com with the password '{DEMO_PASSWORD}'.");

    Ok(())
}
