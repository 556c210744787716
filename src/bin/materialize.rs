use std::{error::Error, process::exit};

use clap::Parser;
use rusqlite::Connection;
use tracing_subscriber::EnvFilter;

use budgetor_rs::{initialize_db, local_now, materialize_all};

/// Create the transactions that recurring transactions are due for, up to today.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: String,

    /// The canonical name of the local timezone, e.g. "Pacific/Auckland".
    #[arg(long, default_value = "Etc/UTC")]
    timezone: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let Some(now) = local_now(&args.timezone) else {
        eprintln!("Invalid timezone {:?}", args.timezone);
        exit(1);
    };

    let conn = Connection::open(&args.db_path)?;
    initialize_db(&conn)?;

    let summary = materialize_all(now, &conn)?;

    println!("Created {} transactions.", summary.created);

    if !summary.failed.is_empty() {
        eprintln!(
            "Could not create transactions for recurring transactions {:?}, check the logs for details.",
            summary.failed
        );
        exit(1);
    }

    Ok(())
}
