//! Creates the database schema.

use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};

use crate::{
    Error, category::create_category_table, recurring::create_recurring_transaction_table,
    transaction::create_transaction_table,
};

/// Create the tables for the domain models if they do not exist.
///
/// Also turns on foreign key enforcement for `connection`, which SQLite leaves
/// off by default. Safe to call on a database that is already initialized.
///
/// # Errors
/// Returns an error if a table cannot be created or there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    connection.pragma_update(None, "foreign_keys", "ON")?;

    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    // Tables must be created after the tables they reference.
    create_category_table(&transaction)?;
    create_recurring_transaction_table(&transaction)?;
    create_transaction_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}

#[cfg(test)]
mod db_tests {
    use rusqlite::Connection;
    use time::macros::{date, datetime};

    use crate::{
        Error,
        recurring::{DayOfMonth, RecurringTransaction, create_recurring_transaction},
        transaction::{Transaction, create_transaction},
    };

    use super::initialize;

    fn get_table_names(conn: &Connection) -> Vec<String> {
        let mut statement = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();

        statement
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn initialize_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();

        initialize(&conn).expect("Could not initialize database");

        let tables = get_table_names(&conn);
        for table in ["category", "recurring_transaction", "transaction"] {
            assert!(
                tables.iter().any(|name| name == table),
                "missing table {table}, got {tables:?}"
            );
        }
    }

    #[test]
    fn initialize_twice_succeeds() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        assert_eq!(initialize(&conn), Ok(()));
    }

    #[test]
    fn initialize_enables_foreign_keys() {
        let conn = Connection::open_in_memory().unwrap();

        initialize(&conn).unwrap();

        let enabled: bool = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert!(enabled);
    }

    #[test]
    fn schema_allows_one_generated_transaction_per_month() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        let recurring = create_recurring_transaction(
            RecurringTransaction::build("Rent", 450.0, DayOfMonth::new(1).unwrap()),
            datetime!(2024-01-01 00:00 UTC),
            &conn,
        )
        .unwrap();
        create_transaction(
            Transaction::build("Rent", 450.0, date!(2024 - 02 - 01)).recurring_id(Some(recurring.id)),
            &conn,
        )
        .unwrap();

        let result = create_transaction(
            Transaction::build("Rent", 450.0, date!(2024 - 02 - 29)).recurring_id(Some(recurring.id)),
            &conn,
        );

        assert_eq!(result, Err(Error::DuplicateRecurringMonth(date!(2024 - 02 - 29))));
    }
}
