use std::error::Error;
use std::path::Path;
use std::process::exit;

use clap::Parser;
use rusqlite::Connection;
use time::{Duration, OffsetDateTime};

use budgetor_rs::{
    CategoryName, DayOfMonth, RecurringTransaction, create_category,
    create_recurring_transaction, initialize_db,
};

/// A utility for creating a test database for the REST API server of budgetor_rs.
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

    match output_path.extension() {
        None => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        _ => {}
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let conn = Connection::open(output_path)?;

    initialize_db(&conn)?;

    println!("Creating test categories...");
    let housing = create_category(CategoryName::new("Housing")?, &conn)?;
    let income = create_category(CategoryName::new("Income")?, &conn)?;

    println!("Creating test recurring transactions...");
    // Backdated so that the first materialization run has a few months to catch up on.
    let created_at = OffsetDateTime::now_utc() - Duration::days(100);

    create_recurring_transaction(
        RecurringTransaction::build("Rent", 450.0, DayOfMonth::LAST).category_id(Some(housing.id)),
        created_at,
        &conn,
    )?;
    create_recurring_transaction(
        RecurringTransaction::build("Salary", 3200.0, DayOfMonth::new(15)?)
            .is_expense(false)
            .category_id(Some(income.id)),
        created_at,
        &conn,
    )?;
    create_recurring_transaction(
        RecurringTransaction::build("Streaming", 17.99, DayOfMonth::new(29)?),
        created_at,
        &conn,
    )?;

    println!("Success!");

    Ok(())
}
